//! Managed graph walker

use std::collections::HashMap;

use isolate_types::{Heap, HeapObject, HeapString, ObjectId, Value};
use transport_config::CodecLimits;

use super::{sort_by_canonical_key, RecordEncoder};
use crate::bigint::BigintDigits;
use crate::buffers::ByteSink;
use crate::error::{SnapshotError, SnapshotResult};

pub(crate) struct ManagedWriter<'h, 'o, S> {
    heap: &'h Heap,
    encoder: RecordEncoder<S>,
    seen: HashMap<ObjectId, u64>,
    /// Objects already registered by the writer this one encodes a map key
    /// or value for
    outer: Option<&'o HashMap<ObjectId, u64>>,
}

impl<'h, 'o, S: ByteSink> ManagedWriter<'h, 'o, S> {
    pub(crate) fn new(heap: &'h Heap, sink: S, limits: CodecLimits) -> Self {
        Self {
            heap,
            encoder: RecordEncoder::new(sink, limits),
            seen: HashMap::new(),
            outer: None,
        }
    }

    /// Writer for one map key or value, used only to order entries.
    /// Anything in `outer` is written as a back-reference, which stops cycles
    /// through the map being written.
    fn detached(
        heap: &'h Heap,
        sink: S,
        limits: CodecLimits,
        outer: &'o HashMap<ObjectId, u64>,
        next_index: u64,
    ) -> Self {
        Self {
            heap,
            encoder: RecordEncoder::starting_at(sink, limits, next_index),
            seen: HashMap::new(),
            outer: Some(outer),
        }
    }

    fn lookup(&self, id: ObjectId) -> Option<u64> {
        self.seen
            .get(&id)
            .or_else(|| self.outer.and_then(|outer| outer.get(&id)))
            .copied()
    }

    pub(crate) fn write_root(&mut self, root: Value) -> SnapshotResult<()> {
        self.write_value(root, 0)
    }

    pub(crate) fn into_sink(self) -> S {
        self.encoder.into_sink()
    }

    fn write_value(&mut self, value: Value, depth: usize) -> SnapshotResult<()> {
        match value {
            Value::Null => self.encoder.write_null(),
            Value::Bool(b) => self.encoder.write_bool(b),
            Value::Smi(v) if Value::is_smi_range(v) => self.encoder.write_small_integer(v),
            // Out-of-range smi handed in directly: boxed on the wire
            Value::Smi(v) => {
                self.encoder.register();
                self.encoder.write_mint(v)
            }
            Value::Object(id) => self.write_object(id, depth),
        }
    }

    fn write_object(&mut self, id: ObjectId, depth: usize) -> SnapshotResult<()> {
        if let Some(index) = self.lookup(id) {
            return self.encoder.write_back_ref(index);
        }
        let heap = self.heap;
        let object = heap
            .get(id)
            .map_err(|_| SnapshotError::not_transferable("dangling object handle"))?;
        if !object.is_transferable() {
            return Err(SnapshotError::not_transferable(object.kind_name()));
        }

        let index = self.encoder.register();
        self.seen.insert(id, index);

        match object {
            HeapObject::Mint(v) => self.encoder.write_mint(*v),
            HeapObject::Bigint(v) => self.encoder.write_bigint(&BigintDigits::from_bigint(v)),
            HeapObject::Double(v) => self.encoder.write_double(*v),
            HeapObject::String(HeapString::Latin1(bytes)) => self.encoder.write_latin1(bytes),
            HeapObject::String(text @ HeapString::Utf16(units)) => {
                if text.fits_latin1() {
                    let narrow: Vec<u8> = units.iter().map(|&unit| unit as u8).collect();
                    self.encoder.write_latin1(&narrow)
                } else {
                    self.encoder.write_utf16(units)
                }
            }
            HeapObject::Array(elements) => {
                self.encoder.check_depth(depth)?;
                self.encoder.write_array_header(elements.len())?;
                for &element in elements {
                    self.write_value(element, depth + 1)?;
                }
                Ok(())
            }
            HeapObject::Map(entries) => {
                self.encoder.check_depth(depth)?;
                self.encoder.write_map_header(entries.len())?;
                let limits = self.encoder.limits();
                let next_index = self.encoder.next_index();
                let merged: HashMap<ObjectId, u64>;
                let known = match self.outer {
                    None => &self.seen,
                    Some(outer) => {
                        merged = outer.iter().chain(&self.seen).map(|(k, v)| (*k, *v)).collect();
                        &merged
                    }
                };
                let ordered = sort_by_canonical_key(
                    entries,
                    |(key, _), scratch| {
                        ManagedWriter::detached(heap, scratch, limits, known, next_index)
                            .write_value(*key, depth + 1)
                    },
                    |(_, value), scratch| {
                        ManagedWriter::detached(heap, scratch, limits, known, next_index)
                            .write_value(*value, depth + 1)
                    },
                )?;
                for (key, value) in ordered {
                    self.write_value(*key, depth + 1)?;
                    self.write_value(*value, depth + 1)?;
                }
                Ok(())
            }
            HeapObject::TypedData { kind, bytes } => self.encoder.write_typed_data(*kind, bytes),
            HeapObject::TypedDataView {
                kind,
                backing,
                offset_in_bytes,
                length,
            } => {
                self.encoder.check_depth(depth)?;
                self.encoder
                    .write_view_header(*kind, *offset_in_bytes, *length)?;
                self.write_object(*backing, depth + 1)
            }
            HeapObject::SendPort(port) => self.encoder.write_send_port(*port),
            HeapObject::ReceivePort(_)
            | HeapObject::Closure { .. }
            | HeapObject::Code(_)
            | HeapObject::NativeResource(_) => {
                Err(SnapshotError::not_transferable(object.kind_name()))
            }
        }
    }
}
