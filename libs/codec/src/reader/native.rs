//! Decode into an embedder's native tree
//!
//! Integers come out as `Int32` when they fit and `Int64` otherwise. Strings
//! become Rust strings; a UTF-16 string with an unpaired surrogate has no
//! such form and decodes to an `Unsupported` node.

use isolate_types::{NativeArena, NativeRef, NativeTypedData, NativeValue, PortId, TypedDataKind};
use tracing::debug;

use super::GraphBuilder;
use crate::bigint::BigintDigits;
use crate::error::{SnapshotError, SnapshotResult};

pub(crate) struct ArenaBuilder<'a> {
    arena: &'a mut NativeArena,
}

impl<'a> ArenaBuilder<'a> {
    pub(crate) fn new(arena: &'a mut NativeArena) -> Self {
        Self { arena }
    }

    fn integer(&mut self, value: i64) -> NativeRef {
        match i32::try_from(value) {
            Ok(narrow) => self.arena.int32(narrow),
            Err(_) => self.arena.int64(value),
        }
    }
}

impl GraphBuilder for ArenaBuilder<'_> {
    type Node = NativeRef;
    type Shell = NativeRef;

    fn shell_node(&self, shell: NativeRef) -> NativeRef {
        shell
    }

    fn null(&mut self) -> SnapshotResult<NativeRef> {
        Ok(self.arena.null())
    }

    fn boolean(&mut self, value: bool) -> SnapshotResult<NativeRef> {
        Ok(self.arena.boolean(value))
    }

    fn small_integer(&mut self, value: i64) -> SnapshotResult<NativeRef> {
        Ok(self.integer(value))
    }

    fn mint(&mut self, value: i64) -> SnapshotResult<NativeRef> {
        Ok(self.arena.int64(value))
    }

    fn bigint(&mut self, value: BigintDigits) -> SnapshotResult<NativeRef> {
        Ok(self.arena.bigint(value.to_native()))
    }

    fn double(&mut self, value: f64) -> SnapshotResult<NativeRef> {
        Ok(self.arena.double(value))
    }

    fn latin1_string(&mut self, bytes: &[u8]) -> SnapshotResult<NativeRef> {
        let text: String = bytes.iter().map(|&b| char::from(b)).collect();
        Ok(self.arena.string(text))
    }

    fn utf16_string(&mut self, units: Vec<u16>) -> SnapshotResult<NativeRef> {
        match String::from_utf16(&units) {
            Ok(text) => Ok(self.arena.string(text)),
            Err(_) => {
                debug!(units = units.len(), "unpaired surrogate in native string");
                Ok(self.arena.push(NativeValue::Unsupported))
            }
        }
    }

    fn typed_data(
        &mut self,
        kind: TypedDataKind,
        bytes: &[u8],
        stream_offset: usize,
    ) -> SnapshotResult<NativeRef> {
        self.arena.typed_data(kind, bytes.to_vec()).ok_or_else(|| {
            SnapshotError::typed_data(
                stream_offset,
                format!("{} bytes is not a whole number of {} elements", bytes.len(), kind.name()),
            )
        })
    }

    fn send_port(&mut self, port: PortId) -> SnapshotResult<NativeRef> {
        Ok(self.arena.send_port(port))
    }

    fn array_shell(&mut self, length: usize) -> SnapshotResult<NativeRef> {
        Ok(self.arena.array(Vec::with_capacity(length)))
    }

    fn array_set(&mut self, array: NativeRef, _index: usize, element: NativeRef) -> SnapshotResult<()> {
        // Elements arrive in index order
        self.arena.array_push(array, element);
        Ok(())
    }

    fn map_shell(&mut self, entries: usize) -> SnapshotResult<NativeRef> {
        Ok(self.arena.map(Vec::with_capacity(entries)))
    }

    fn map_insert(&mut self, map: NativeRef, key: NativeRef, value: NativeRef) -> SnapshotResult<()> {
        self.arena.map_insert(map, key, value);
        Ok(())
    }

    fn view_shell(&mut self, _kind: TypedDataKind) -> SnapshotResult<NativeRef> {
        // Placeholder until the backing store is decoded
        Ok(self.arena.null())
    }

    fn view_fill(
        &mut self,
        view: NativeRef,
        kind: TypedDataKind,
        backing: NativeRef,
        offset_in_bytes: usize,
        length: usize,
        stream_offset: usize,
    ) -> SnapshotResult<()> {
        let Some(NativeValue::TypedData(window)) = self.arena.get(backing).cloned() else {
            return Err(SnapshotError::typed_data(
                stream_offset,
                "view backing store is not typed data",
            ));
        };
        let byte_len = length.checked_mul(kind.element_size());
        let end = byte_len.and_then(|len| offset_in_bytes.checked_add(len));
        match (byte_len, end) {
            (Some(byte_len), Some(end)) if end <= window.byte_len => {
                self.arena.replace(
                    view,
                    NativeValue::TypedData(NativeTypedData {
                        kind,
                        buffer: window.buffer,
                        offset: window.offset + offset_in_bytes,
                        byte_len,
                    }),
                );
                Ok(())
            }
            _ => Err(SnapshotError::typed_data(
                stream_offset,
                format!(
                    "view of {length} {} at byte {offset_in_bytes} exceeds backing store of {} bytes",
                    kind.name(),
                    window.byte_len
                ),
            )),
        }
    }
}
