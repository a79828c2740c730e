//! Embedder façade
//!
//! Entry points for code outside any isolate: post native trees, managed
//! values or integer lists to a port, and open or close native ports.
//!
//! Every outgoing payload is written through a [`BoundedAllocator`] capped at
//! `max_message_bytes`, so an oversized message fails while encoding rather
//! than after it has been queued.

use std::sync::Arc;

use isolate_types::{Heap, NativeArena, NativeRef, PortId, Priority, Value, ILLEGAL_PORT};
use snapshot_codec::{BoundedAllocator, Payload, SnapshotResult, SnapshotWriter};
use tracing::warn;

use crate::error::{PortError, PortResult};
use crate::message::Message;
use crate::native_port;
use crate::port_map::PortMap;

fn message_writer() -> SnapshotWriter {
    let limits = transport_config::global().limits;
    SnapshotWriter::new(Arc::new(BoundedAllocator::new(limits.max_message_bytes)))
        .with_limits(limits)
}

fn submit(port: PortId, reply: PortId, encoded: SnapshotResult<Payload>) -> PortResult<()> {
    let payload = encoded.map_err(|source| PortError::encode(port, source))?;
    let message = Message::new(port, reply, payload, Priority::Normal);
    if PortMap::global().post(message) {
        Ok(())
    } else {
        Err(PortError::InvalidPort { port })
    }
}

/// Encode a native tree and post it to `port`, reporting why a post failed
pub fn try_post_native(port: PortId, arena: &NativeArena, root: NativeRef) -> PortResult<()> {
    submit(port, ILLEGAL_PORT, message_writer().write_native(arena, root))
}

/// Encode a native tree and post it to `port`
///
/// Returns false if the tree cannot be encoded or no such port exists. The
/// encoded buffer is released in either case.
pub fn post_native(port: PortId, arena: &NativeArena, root: NativeRef) -> bool {
    match try_post_native(port, arena, root) {
        Ok(()) => true,
        Err(error) => {
            if error.is_payload_error() {
                warn!(%port, %error, "Native post refused");
            }
            false
        }
    }
}

/// Encode a managed value from `heap` and post it to `port`
pub fn post_value(port: PortId, reply: PortId, heap: &Heap, value: Value) -> PortResult<()> {
    submit(port, reply, message_writer().write_value(heap, value))
}

/// Post a flat list of integers to `port`
pub fn post_int_array(port: PortId, values: &[i64]) -> bool {
    match submit(port, ILLEGAL_PORT, message_writer().write_int_array(values)) {
        Ok(()) => true,
        Err(error) => {
            if error.is_payload_error() {
                warn!(%port, %error, "Integer list post refused");
            }
            false
        }
    }
}

/// Open a live native port whose messages are handed to `handler`
///
/// `name` defaults to [`native_port::DEFAULT_NATIVE_PORT_NAME`]. With
/// `concurrent` set, several worker threads may run `handler` at once.
pub fn new_native_port<F>(name: Option<&str>, handler: F, concurrent: bool) -> PortResult<PortId>
where
    F: Fn(PortId, PortId, &NativeArena, NativeRef) + Send + Sync + 'static,
{
    native_port::open(name, Box::new(handler), concurrent)
}

/// Close a native port opened with [`new_native_port`]
pub fn close_native_port(port: PortId) -> bool {
    native_port::close(port)
}

/// Allocate a send port object for `port` in `heap`
pub fn new_send_port(heap: &mut Heap, port: PortId) -> PortResult<Value> {
    Ok(Value::Object(heap.new_send_port(port)?))
}

/// The receive port object for `port` in `heap`
///
/// Repeated calls return the same object. Fails with `InvalidPort` if
/// `port` is not open.
pub fn get_receive_port(heap: &mut Heap, port: PortId) -> PortResult<Value> {
    if !PortMap::global().is_active(port) {
        return Err(PortError::InvalidPort { port });
    }
    Ok(Value::Object(heap.receive_port(port)?))
}

/// True while the handler owning `port` still has a live port
pub fn has_live_ports(port: PortId) -> bool {
    PortMap::global()
        .lookup(port)
        .is_some_and(|handler| handler.core().has_live_ports())
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use isolate_types::{HeapError, HeapObject, NativeValue};
    use snapshot_codec::SnapshotError;
    use std::sync::mpsc;
    use std::time::Duration;

    #[test]
    fn test_post_to_missing_port() {
        let mut arena = NativeArena::new();
        let root = arena.int32(1);
        assert!(!post_native(PortId::new(i64::MAX - 7), &arena, root));
        assert_matches!(
            try_post_native(ILLEGAL_PORT, &arena, root),
            Err(PortError::InvalidPort { .. })
        );
        assert!(!post_int_array(ILLEGAL_PORT, &[1, 2, 3]));
    }

    #[test]
    fn test_unsupported_node_is_refused() {
        let mut arena = NativeArena::new();
        let bad = arena.push(NativeValue::Unsupported);
        let root = arena.array(vec![bad]);
        assert_matches!(
            try_post_native(PortId::new(1), &arena, root),
            Err(PortError::Encode {
                source: SnapshotError::Unsupported { .. },
                ..
            })
        );
    }

    #[test]
    fn test_new_send_port_allocates_object() {
        let mut heap = Heap::new();
        let value = new_send_port(&mut heap, PortId::new(12)).unwrap();
        let id = value.as_object().unwrap();
        assert_matches!(heap.get(id), Ok(HeapObject::SendPort(port)) if *port == PortId::new(12));

        let mut full = Heap::with_limit(0);
        assert_matches!(
            new_send_port(&mut full, PortId::new(1)),
            Err(PortError::Heap(HeapError::ObjectLimit { limit: 0 }))
        );
    }

    #[test]
    fn test_get_receive_port_returns_one_object() {
        let port = new_native_port(Some("receiver"), |_, _, _, _| {}, false).unwrap();
        let mut heap = Heap::new();
        let first = get_receive_port(&mut heap, port).unwrap();
        assert_eq!(get_receive_port(&mut heap, port).unwrap(), first);
        assert_matches!(
            heap.get(first.as_object().unwrap()),
            Ok(HeapObject::ReceivePort(owner)) if *owner == port
        );

        assert!(close_native_port(port));
        assert_matches!(
            get_receive_port(&mut heap, port),
            Err(PortError::InvalidPort { .. })
        );
    }

    #[test]
    fn test_int_array_reaches_native_port() {
        let (tx, rx) = mpsc::channel();
        let tx = parking_lot::Mutex::new(tx);
        let port = new_native_port(
            None,
            move |_, _, arena, root| {
                let values: Vec<_> = arena
                    .array_elements(root)
                    .unwrap_or_default()
                    .iter()
                    .map(|node| arena.get(*node).cloned())
                    .collect();
                let _ = tx.lock().send(values);
            },
            false,
        )
        .unwrap();
        assert!(has_live_ports(port));
        assert!(post_int_array(port, &[7, 1 << 40]));

        let values = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(
            values,
            vec![Some(NativeValue::Int32(7)), Some(NativeValue::Int64(1 << 40))]
        );
        assert!(close_native_port(port));
        assert!(!has_live_ports(port));
    }
}
