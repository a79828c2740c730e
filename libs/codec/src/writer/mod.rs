//! Snapshot writers
//!
//! ## Purpose
//!
//! Encode one root value, and everything reachable from it, into a message
//! snapshot. Two graph walkers share one [`RecordEncoder`]:
//!
//! - [`managed`]: walks an isolate [`Heap`] from a [`Value`]
//! - [`native`]: walks an embedder [`NativeArena`] from a [`NativeRef`]
//!
//! ## Interning
//!
//! Before emitting any non-primitive record, a walker looks the object up in
//! an identity map scoped to this one encode. A hit emits a back-reference; a
//! miss takes the next table index, emits the record inline, then recurses
//! into its children. Indices count inline registered records in emission
//! order, which is exactly the order a reader registers them in.
//!
//! ## Failure
//!
//! Any error aborts the encode. The partial [`WriteBuffer`] is dropped, which
//! releases it through its reallocator; no payload is returned.

mod managed;
mod native;

use std::sync::Arc;

use isolate_types::{Heap, NativeArena, NativeRef, PortId, TypedDataKind, Value};
use tracing::trace;
use transport_config::CodecLimits;

use crate::alloc::{HostAllocator, Reallocator};
use crate::bigint::BigintDigits;
use crate::buffers::{ByteSink, Payload, WriteBuffer};
use crate::error::{SnapshotError, SnapshotResult};
use crate::tags::{
    back_ref_parts, immediate_tag, ObjectTag, SnapshotHeader, CANONICAL_NAN_BITS,
};
use crate::varint::{write_ivarint, write_uvarint};

pub(crate) use managed::ManagedWriter;
pub(crate) use native::NativeWriter;

/// Record-level encoder shared by the graph walkers
pub(crate) struct RecordEncoder<S> {
    sink: S,
    limits: CodecLimits,
    next_index: u64,
}

impl<S: ByteSink> RecordEncoder<S> {
    pub(crate) fn new(sink: S, limits: CodecLimits) -> Self {
        Self {
            sink,
            limits,
            next_index: 0,
        }
    }

    /// Encoder whose first registered record takes index `next_index`
    pub(crate) fn starting_at(sink: S, limits: CodecLimits, next_index: u64) -> Self {
        Self {
            sink,
            limits,
            next_index,
        }
    }

    pub(crate) fn limits(&self) -> CodecLimits {
        self.limits
    }

    pub(crate) fn next_index(&self) -> u64 {
        self.next_index
    }

    pub(crate) fn position(&self) -> usize {
        self.sink.position()
    }

    pub(crate) fn into_sink(self) -> S {
        self.sink
    }

    /// Take the next back-reference table index
    pub(crate) fn register(&mut self) -> u64 {
        let index = self.next_index;
        self.next_index += 1;
        index
    }

    /// Entering a container nested inside `depth` others
    pub(crate) fn check_depth(&self, depth: usize) -> SnapshotResult<()> {
        if depth >= self.limits.max_nesting_depth {
            return Err(SnapshotError::NestingTooDeep {
                depth: depth + 1,
                limit: self.limits.max_nesting_depth,
            });
        }
        Ok(())
    }

    fn check_length(&self, length: usize, context: &'static str) -> SnapshotResult<()> {
        if length > self.limits.max_container_length {
            return Err(SnapshotError::too_large(
                length as u64,
                self.limits.max_container_length,
                context,
            ));
        }
        Ok(())
    }

    fn tag(&mut self, tag: ObjectTag) -> SnapshotResult<()> {
        self.sink.put_u8(tag.into())
    }

    pub(crate) fn write_null(&mut self) -> SnapshotResult<()> {
        self.tag(ObjectTag::Null)
    }

    pub(crate) fn write_bool(&mut self, value: bool) -> SnapshotResult<()> {
        self.tag(if value {
            ObjectTag::True
        } else {
            ObjectTag::False
        })
    }

    /// Integer known to be in smi range: immediate tag when it fits in six
    /// bits, smi record otherwise
    pub(crate) fn write_small_integer(&mut self, value: i64) -> SnapshotResult<()> {
        match immediate_tag(value) {
            Some(tag) => self.sink.put_u8(tag),
            None => {
                self.tag(ObjectTag::Smi)?;
                write_ivarint(&mut self.sink, value)
            }
        }
    }

    pub(crate) fn write_mint(&mut self, value: i64) -> SnapshotResult<()> {
        self.tag(ObjectTag::Mint)?;
        write_ivarint(&mut self.sink, value)
    }

    pub(crate) fn write_bigint(&mut self, value: &BigintDigits) -> SnapshotResult<()> {
        self.check_length(value.digits.len(), "bigint digits")?;
        self.tag(ObjectTag::Bigint)?;
        self.sink.put_u8(u8::from(value.negative))?;
        write_uvarint(&mut self.sink, value.digits.len() as u64)?;
        self.sink.put_slice(value.digits.as_bytes())
    }

    pub(crate) fn write_double(&mut self, value: f64) -> SnapshotResult<()> {
        let bits = if value.is_nan() {
            CANONICAL_NAN_BITS
        } else {
            value.to_bits()
        };
        self.tag(ObjectTag::Double)?;
        self.sink.put_slice(&bits.to_le_bytes())
    }

    pub(crate) fn write_latin1(&mut self, bytes: &[u8]) -> SnapshotResult<()> {
        self.check_length(bytes.len(), "string")?;
        self.tag(ObjectTag::Latin1String)?;
        write_uvarint(&mut self.sink, bytes.len() as u64)?;
        self.sink.put_slice(bytes)
    }

    pub(crate) fn write_utf16(&mut self, units: &[u16]) -> SnapshotResult<()> {
        self.check_length(units.len(), "string")?;
        self.tag(ObjectTag::Utf16String)?;
        write_uvarint(&mut self.sink, units.len() as u64)?;
        let raw: Vec<u8> = units.iter().flat_map(|unit| unit.to_le_bytes()).collect();
        self.sink.put_slice(&raw)
    }

    /// Text as the narrowest string record that holds it
    pub(crate) fn write_text(&mut self, text: &str) -> SnapshotResult<()> {
        if text.chars().all(|c| (c as u32) <= 0xFF) {
            let bytes: Vec<u8> = text.chars().map(|c| c as u8).collect();
            self.write_latin1(&bytes)
        } else {
            let units: Vec<u16> = text.encode_utf16().collect();
            self.write_utf16(&units)
        }
    }

    pub(crate) fn write_typed_data(
        &mut self,
        kind: TypedDataKind,
        bytes: &[u8],
    ) -> SnapshotResult<()> {
        let count = kind.element_count(bytes.len()).ok_or_else(|| {
            SnapshotError::typed_data(
                self.position(),
                format!(
                    "{} bytes is not a whole number of {} elements",
                    bytes.len(),
                    kind.name()
                ),
            )
        })?;
        self.check_length(count, "typed data")?;
        self.tag(ObjectTag::TypedData)?;
        self.sink.put_u8(kind.into())?;
        write_uvarint(&mut self.sink, count as u64)?;
        self.sink.put_slice(bytes)
    }

    /// View header; the backing store record follows
    pub(crate) fn write_view_header(
        &mut self,
        kind: TypedDataKind,
        offset_in_bytes: usize,
        length: usize,
    ) -> SnapshotResult<()> {
        self.check_length(length, "typed data view")?;
        self.tag(ObjectTag::TypedDataView)?;
        self.sink.put_u8(kind.into())?;
        write_uvarint(&mut self.sink, offset_in_bytes as u64)?;
        write_uvarint(&mut self.sink, length as u64)
    }

    /// Array header; `length` element records follow
    pub(crate) fn write_array_header(&mut self, length: usize) -> SnapshotResult<()> {
        self.check_length(length, "array")?;
        self.tag(ObjectTag::Array)?;
        write_uvarint(&mut self.sink, length as u64)
    }

    /// Map header; `entries` key and value record pairs follow
    pub(crate) fn write_map_header(&mut self, entries: usize) -> SnapshotResult<()> {
        self.check_length(entries, "map")?;
        self.tag(ObjectTag::Map)?;
        write_uvarint(&mut self.sink, entries as u64)
    }

    pub(crate) fn write_send_port(&mut self, port: PortId) -> SnapshotResult<()> {
        self.tag(ObjectTag::SendPort)?;
        write_ivarint(&mut self.sink, port.raw())
    }

    pub(crate) fn write_back_ref(&mut self, index: u64) -> SnapshotResult<()> {
        let (tag, rest) = back_ref_parts(index);
        self.sink.put_u8(tag)?;
        write_uvarint(&mut self.sink, rest)
    }
}

fn detached_bytes<F>(encode: F) -> SnapshotResult<Vec<u8>>
where
    F: FnOnce(&mut Vec<u8>) -> SnapshotResult<()>,
{
    crate::buffers::with_scratch_buffer(|scratch| {
        encode(scratch)?;
        Ok(scratch.clone())
    })
}

/// Order map entries by the canonical encoding of their keys, then of their
/// values where two distinct keys encode alike.
///
/// The encoders write one key or value detached from the output into the
/// given scratch sink. Entries equal in both encodings are indistinguishable
/// on the wire and keep their relative order.
pub(crate) fn sort_by_canonical_key<T, K, V>(
    entries: &[T],
    mut encode_key: K,
    mut encode_value: V,
) -> SnapshotResult<Vec<&T>>
where
    K: FnMut(&T, &mut Vec<u8>) -> SnapshotResult<()>,
    V: FnMut(&T, &mut Vec<u8>) -> SnapshotResult<()>,
{
    let mut keyed = Vec::with_capacity(entries.len());
    for entry in entries {
        keyed.push((detached_bytes(|scratch| encode_key(entry, scratch))?, entry));
    }
    keyed.sort_by(|a, b| a.0.cmp(&b.0));

    let mut start = 0;
    while start < keyed.len() {
        let first = &keyed[start].0;
        let run = keyed[start..].iter().take_while(|(key, _)| key == first).count();
        if run > 1 {
            let mut tied = Vec::with_capacity(run);
            for (_, entry) in &keyed[start..start + run] {
                tied.push((detached_bytes(|scratch| encode_value(entry, scratch))?, *entry));
            }
            tied.sort_by(|a, b| a.0.cmp(&b.0));
            for (slot, (_, entry)) in keyed[start..start + run].iter_mut().zip(tied) {
                slot.1 = entry;
            }
        }
        start += run;
    }
    Ok(keyed.into_iter().map(|(_, entry)| entry).collect())
}

/// Message snapshot writer bound to an output allocator
#[derive(Debug, Clone)]
pub struct SnapshotWriter {
    allocator: Arc<dyn Reallocator>,
    limits: CodecLimits,
}

impl SnapshotWriter {
    /// Writer using the process-wide codec limits
    pub fn new(allocator: Arc<dyn Reallocator>) -> Self {
        Self {
            allocator,
            limits: transport_config::global().limits,
        }
    }

    /// Writer on the host allocator
    pub fn host() -> Self {
        Self::new(HostAllocator::shared())
    }

    pub fn with_limits(mut self, limits: CodecLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn limits(&self) -> &CodecLimits {
        &self.limits
    }

    fn begin(&self) -> SnapshotResult<WriteBuffer> {
        let mut buffer = WriteBuffer::new(Arc::clone(&self.allocator));
        buffer.put_slice(&SnapshotHeader::message().to_bytes())?;
        Ok(buffer)
    }

    /// Encode a managed value and everything it reaches
    pub fn write_value(&self, heap: &Heap, root: Value) -> SnapshotResult<Payload> {
        let mut writer = ManagedWriter::new(heap, self.begin()?, self.limits);
        writer.write_root(root)?;
        let payload = writer.into_sink().into_payload();
        trace!(bytes = payload.len(), "encoded managed value");
        Ok(payload)
    }

    /// Encode an embedder tree rooted at `root`
    pub fn write_native(&self, arena: &NativeArena, root: NativeRef) -> SnapshotResult<Payload> {
        let mut writer = NativeWriter::new(arena, self.begin()?, self.limits);
        writer.write_root(root)?;
        let payload = writer.into_sink().into_payload();
        trace!(bytes = payload.len(), "encoded native tree");
        Ok(payload)
    }

    /// Encode a flat list of integers
    pub fn write_int_array(&self, values: &[i64]) -> SnapshotResult<Payload> {
        let mut encoder = RecordEncoder::new(self.begin()?, self.limits);
        encoder.register();
        encoder.write_array_header(values.len())?;
        for &value in values {
            if Value::is_smi_range(value) {
                encoder.write_small_integer(value)?;
            } else {
                encoder.register();
                encoder.write_mint(value)?;
            }
        }
        Ok(encoder.into_sink().into_payload())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode_with(f: impl FnOnce(&mut RecordEncoder<Vec<u8>>) -> SnapshotResult<()>) -> Vec<u8> {
        let mut encoder = RecordEncoder::new(Vec::new(), CodecLimits::default());
        f(&mut encoder).unwrap();
        encoder.into_sink()
    }

    #[test]
    fn test_small_integer_forms() {
        assert_eq!(encode_with(|e| e.write_small_integer(5)), vec![0x05]);
        assert_eq!(encode_with(|e| e.write_small_integer(-1)), vec![0x3F]);
        assert_eq!(encode_with(|e| e.write_small_integer(42)), vec![0x43, 0x54]);
    }

    #[test]
    fn test_double_canonical_nan() {
        let signalling = f64::from_bits(0x7FF0_0000_0000_0001);
        let bytes = encode_with(|e| e.write_double(signalling));
        assert_eq!(bytes[0], 0x46);
        assert_eq!(&bytes[1..], &CANONICAL_NAN_BITS.to_le_bytes());
    }

    #[test]
    fn test_text_picks_narrowest_form() {
        assert_eq!(encode_with(|e| e.write_text("é")), vec![0x47, 0x01, 0xE9]);
        assert_eq!(
            encode_with(|e| e.write_text("€")),
            vec![0x48, 0x01, 0xAC, 0x20]
        );
    }

    #[test]
    fn test_back_ref_encoding() {
        assert_eq!(encode_with(|e| e.write_back_ref(3)), vec![0x83, 0x00]);
        assert_eq!(encode_with(|e| e.write_back_ref(200)), vec![0xC8, 0x01]);
    }

    #[test]
    fn test_empty_containers_have_no_body() {
        assert_eq!(encode_with(|e| e.write_array_header(0)), vec![0x4A, 0x00]);
        assert_eq!(encode_with(|e| e.write_latin1(&[])), vec![0x47, 0x00]);
        assert_eq!(
            encode_with(|e| e.write_typed_data(TypedDataKind::Float64, &[])),
            vec![0x49, 10, 0x00]
        );
    }

    #[test]
    fn test_length_limit_enforced() {
        let limits = CodecLimits::default().with_max_container_length(2);
        let mut encoder = RecordEncoder::new(Vec::new(), limits);
        assert!(matches!(
            encoder.write_array_header(3),
            Err(SnapshotError::TooLarge { length: 3, limit: 2, .. })
        ));
        assert!(encoder.into_sink().is_empty());
    }

    #[test]
    fn test_partial_typed_element_rejected() {
        let mut encoder = RecordEncoder::new(Vec::new(), CodecLimits::default());
        assert!(matches!(
            encoder.write_typed_data(TypedDataKind::Int32, &[0, 0, 0]),
            Err(SnapshotError::TypedDataLength { .. })
        ));
    }

    #[test]
    fn test_int_array_encoding() {
        let payload = SnapshotWriter::host().write_int_array(&[1, 2, 40]).unwrap();
        assert_eq!(
            payload.as_bytes(),
            &[0xD7, 2, 1, 3, 0x4A, 0x03, 0x01, 0x02, 0x43, 0x50]
        );
    }
}
