//! Test fixtures: graph builders and a capturing native port

use std::sync::mpsc::{self, Receiver};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use isolate_types::{BigInt, Heap, NativeArena, NativeRef, PortId, TypedDataKind, Value};
use message_ports::{close_native_port, new_native_port};
use parking_lot::Mutex;

/// Hex digits of the bigint used by the round-trip scenario
pub const LARGE_BIGINT_HEX: &str = "9876543210987654321098765432109876543210";

/// A list of `length` slots, every one pointing back at the list
pub fn self_referencing_list(heap: &mut Heap, length: usize) -> Result<Value> {
    let list = heap.new_array(length)?;
    for index in 0..length {
        heap.array_set(list, index, Value::Object(list))?;
    }
    Ok(Value::Object(list))
}

/// Ten entries alternating one shared `"A"` and one shared `2.72`
pub fn alternating_shared_list(heap: &mut Heap) -> Result<Value> {
    let text = Value::Object(heap.new_string("A")?);
    let double = Value::Object(heap.new_double(2.72)?);
    let elements = (0..10)
        .map(|i| if i % 2 == 0 { text } else { double })
        .collect();
    Ok(Value::Object(heap.new_array_from(elements)?))
}

/// A 256-byte `Uint8` list plus ten ten-element views at offsets 0..=9
pub fn overlapping_views(heap: &mut Heap) -> Result<Value> {
    let bytes: Vec<u8> = (0..=255).collect();
    let backing = heap.new_typed_data(TypedDataKind::Uint8, bytes)?;
    let views = (0..10)
        .map(|offset| {
            heap.new_typed_data_view(TypedDataKind::Uint8, backing, offset, 10)
                .map(Value::Object)
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Value::Object(heap.new_array_from(views)?))
}

pub fn large_bigint(heap: &mut Heap) -> Result<Value> {
    let value = BigInt::parse_bytes(LARGE_BIGINT_HEX.as_bytes(), 16)
        .ok_or_else(|| anyhow!("bad bigint literal"))?;
    Ok(Value::Object(heap.new_bigint(value)?))
}

/// Native port forwarding each decoded tree to the test thread
pub struct CapturePort {
    port: PortId,
    received: Receiver<(PortId, NativeArena, NativeRef)>,
    timeout: Duration,
}

impl CapturePort {
    pub fn open(name: &str, timeout: Duration) -> Result<Self> {
        let (tx, received) = mpsc::channel();
        let tx = Mutex::new(tx);
        let port = new_native_port(
            Some(name),
            move |_, reply, arena, root| {
                let _ = tx.lock().send((reply, arena.clone(), root));
            },
            false,
        )
        .context("opening capture port")?;
        Ok(Self {
            port,
            received,
            timeout,
        })
    }

    pub fn port(&self) -> PortId {
        self.port
    }

    /// Next decoded tree with the reply port it came with
    pub fn recv(&self) -> Result<(PortId, NativeArena, NativeRef)> {
        self.received
            .recv_timeout(self.timeout)
            .with_context(|| format!("no message on {} within {:?}", self.port, self.timeout))
    }
}

impl Drop for CapturePort {
    fn drop(&mut self) {
        close_native_port(self.port);
    }
}
