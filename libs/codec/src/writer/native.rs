//! Native tree walker
//!
//! Node identity is the [`NativeRef`]. Typed data adds a second identity, the
//! arena buffer, so that nodes windowing one buffer decode as views sharing
//! a single backing store.

use std::collections::HashMap;

use isolate_types::{BufferId, NativeArena, NativeRef, NativeTypedData, NativeValue, TypedDataKind, Value};
use transport_config::CodecLimits;

use super::{sort_by_canonical_key, RecordEncoder};
use crate::bigint::BigintDigits;
use crate::buffers::ByteSink;
use crate::error::{SnapshotError, SnapshotResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Identity {
    Node(NativeRef),
    Buffer(BufferId),
}

pub(crate) struct NativeWriter<'a, 'o, S> {
    arena: &'a NativeArena,
    encoder: RecordEncoder<S>,
    seen: HashMap<Identity, u64>,
    outer: Option<&'o HashMap<Identity, u64>>,
}

impl<'a, 'o, S: ByteSink> NativeWriter<'a, 'o, S> {
    pub(crate) fn new(arena: &'a NativeArena, sink: S, limits: CodecLimits) -> Self {
        Self {
            arena,
            encoder: RecordEncoder::new(sink, limits),
            seen: HashMap::new(),
            outer: None,
        }
    }

    /// Writer for one map key or value, used only to order entries
    fn detached(
        arena: &'a NativeArena,
        sink: S,
        limits: CodecLimits,
        outer: &'o HashMap<Identity, u64>,
        next_index: u64,
    ) -> Self {
        Self {
            arena,
            encoder: RecordEncoder::starting_at(sink, limits, next_index),
            seen: HashMap::new(),
            outer: Some(outer),
        }
    }

    fn lookup(&self, identity: Identity) -> Option<u64> {
        self.seen
            .get(&identity)
            .or_else(|| self.outer.and_then(|outer| outer.get(&identity)))
            .copied()
    }

    pub(crate) fn write_root(&mut self, root: NativeRef) -> SnapshotResult<()> {
        self.write_node(root, 0)
    }

    pub(crate) fn into_sink(self) -> S {
        self.encoder.into_sink()
    }

    fn register(&mut self, identity: Identity) -> u64 {
        let index = self.encoder.register();
        self.seen.insert(identity, index);
        index
    }

    fn write_integer(&mut self, node: NativeRef, value: i64) -> SnapshotResult<()> {
        if Value::is_smi_range(value) {
            self.encoder.write_small_integer(value)
        } else {
            self.register(Identity::Node(node));
            self.encoder.write_mint(value)
        }
    }

    fn write_node(&mut self, node: NativeRef, depth: usize) -> SnapshotResult<()> {
        if let Some(index) = self.lookup(Identity::Node(node)) {
            return self.encoder.write_back_ref(index);
        }
        let arena = self.arena;
        let value = arena
            .get(node)
            .ok_or(SnapshotError::Unsupported { kind: "dangling node" })?;

        match value {
            NativeValue::Null => self.encoder.write_null(),
            NativeValue::Bool(b) => self.encoder.write_bool(*b),
            NativeValue::Int32(v) => self.write_integer(node, i64::from(*v)),
            NativeValue::Int64(v) => self.write_integer(node, *v),
            NativeValue::Bigint(text) => {
                let digits = BigintDigits::parse_native(text).map_err(|reason| {
                    SnapshotError::MalformedBigint {
                        offset: self.encoder.position(),
                        reason,
                    }
                })?;
                self.register(Identity::Node(node));
                self.encoder.write_bigint(&digits)
            }
            NativeValue::Double(v) => {
                self.register(Identity::Node(node));
                self.encoder.write_double(*v)
            }
            NativeValue::String(text) => {
                self.register(Identity::Node(node));
                self.encoder.write_text(text)
            }
            NativeValue::TypedData(data) => self.write_typed_data(node, data, depth),
            NativeValue::Array(elements) => {
                self.encoder.check_depth(depth)?;
                self.register(Identity::Node(node));
                self.encoder.write_array_header(elements.len())?;
                for &element in elements {
                    self.write_node(element, depth + 1)?;
                }
                Ok(())
            }
            NativeValue::Map(entries) => {
                self.encoder.check_depth(depth)?;
                self.register(Identity::Node(node));
                self.encoder.write_map_header(entries.len())?;
                let limits = self.encoder.limits();
                let next_index = self.encoder.next_index();
                let merged: HashMap<Identity, u64>;
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
                        NativeWriter::detached(arena, scratch, limits, known, next_index)
                            .write_node(*key, depth + 1)
                    },
                    |(_, value), scratch| {
                        NativeWriter::detached(arena, scratch, limits, known, next_index)
                            .write_node(*value, depth + 1)
                    },
                )?;
                for (key, value) in ordered {
                    self.write_node(*key, depth + 1)?;
                    self.write_node(*value, depth + 1)?;
                }
                Ok(())
            }
            NativeValue::SendPort(port) => {
                self.register(Identity::Node(node));
                self.encoder.write_send_port(*port)
            }
            NativeValue::Unsupported => Err(SnapshotError::Unsupported {
                kind: value.type_name(),
            }),
        }
    }

    /// A node covering its whole, not yet emitted, buffer goes out as plain
    /// typed data. Anything else is a view onto the buffer's record.
    fn write_typed_data(
        &mut self,
        node: NativeRef,
        data: &NativeTypedData,
        depth: usize,
    ) -> SnapshotResult<()> {
        let arena = self.arena;
        let buffer = arena
            .buffer(data.buffer)
            .ok_or(SnapshotError::Unsupported {
                kind: "dangling typed data buffer",
            })?;
        let window_end = data.offset.checked_add(data.byte_len);
        if window_end.map_or(true, |end| end > buffer.len()) {
            return Err(SnapshotError::typed_data(
                self.encoder.position(),
                format!(
                    "window {}+{} exceeds buffer of {} bytes",
                    data.offset,
                    data.byte_len,
                    buffer.len()
                ),
            ));
        }

        if data.kind.element_count(data.byte_len).is_none() {
            return Err(SnapshotError::typed_data(
                self.encoder.position(),
                format!(
                    "window of {} bytes is not a whole number of {} elements",
                    data.byte_len,
                    data.kind.name()
                ),
            ));
        }

        let buffer_key = Identity::Buffer(data.buffer);
        let whole = data.offset == 0 && data.byte_len == buffer.len();
        if whole && self.lookup(buffer_key).is_none() {
            let index = self.register(Identity::Node(node));
            self.seen.insert(buffer_key, index);
            return self.encoder.write_typed_data(data.kind, buffer);
        }

        self.encoder.check_depth(depth)?;
        self.register(Identity::Node(node));
        self.encoder
            .write_view_header(data.kind, data.offset, data.length())?;
        match self.lookup(buffer_key) {
            Some(index) => self.encoder.write_back_ref(index),
            None => {
                self.register(buffer_key);
                self.encoder.write_typed_data(TypedDataKind::Uint8, buffer)
            }
        }
    }
}
