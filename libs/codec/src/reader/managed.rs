//! Decode into a receiving isolate's heap

use isolate_types::{Heap, HeapError, HeapObject, HeapString, ObjectId, PortId, TypedDataKind, Value};

use super::GraphBuilder;
use crate::bigint::BigintDigits;
use crate::error::{SnapshotError, SnapshotResult};

pub(crate) struct HeapBuilder<'h> {
    heap: &'h mut Heap,
}

impl<'h> HeapBuilder<'h> {
    pub(crate) fn new(heap: &'h mut Heap) -> Self {
        Self { heap }
    }

    fn object(&mut self, object: HeapObject) -> SnapshotResult<Value> {
        Ok(Value::Object(self.heap.allocate(object)?))
    }
}

impl GraphBuilder for HeapBuilder<'_> {
    type Node = Value;
    type Shell = ObjectId;

    fn shell_node(&self, shell: ObjectId) -> Value {
        Value::Object(shell)
    }

    fn null(&mut self) -> SnapshotResult<Value> {
        Ok(Value::Null)
    }

    fn boolean(&mut self, value: bool) -> SnapshotResult<Value> {
        Ok(Value::Bool(value))
    }

    fn small_integer(&mut self, value: i64) -> SnapshotResult<Value> {
        Ok(Value::Smi(value))
    }

    fn mint(&mut self, value: i64) -> SnapshotResult<Value> {
        self.object(HeapObject::Mint(value))
    }

    fn bigint(&mut self, value: BigintDigits) -> SnapshotResult<Value> {
        self.object(HeapObject::Bigint(value.to_bigint()))
    }

    fn double(&mut self, value: f64) -> SnapshotResult<Value> {
        self.object(HeapObject::Double(value))
    }

    fn latin1_string(&mut self, bytes: &[u8]) -> SnapshotResult<Value> {
        self.object(HeapObject::String(HeapString::Latin1(bytes.to_vec())))
    }

    fn utf16_string(&mut self, units: Vec<u16>) -> SnapshotResult<Value> {
        self.object(HeapObject::String(HeapString::Utf16(units)))
    }

    fn typed_data(
        &mut self,
        kind: TypedDataKind,
        bytes: &[u8],
        _stream_offset: usize,
    ) -> SnapshotResult<Value> {
        Ok(Value::Object(self.heap.new_typed_data(kind, bytes.to_vec())?))
    }

    fn send_port(&mut self, port: PortId) -> SnapshotResult<Value> {
        Ok(Value::Object(self.heap.new_send_port(port)?))
    }

    fn array_shell(&mut self, length: usize) -> SnapshotResult<ObjectId> {
        Ok(self.heap.new_array(length)?)
    }

    fn array_set(&mut self, array: ObjectId, index: usize, element: Value) -> SnapshotResult<()> {
        Ok(self.heap.array_set(array, index, element)?)
    }

    fn map_shell(&mut self, entries: usize) -> SnapshotResult<ObjectId> {
        Ok(self.heap.new_map(Vec::with_capacity(entries))?)
    }

    fn map_insert(&mut self, map: ObjectId, key: Value, value: Value) -> SnapshotResult<()> {
        Ok(self.heap.map_insert(map, key, value)?)
    }

    fn view_shell(&mut self, kind: TypedDataKind) -> SnapshotResult<ObjectId> {
        Ok(self.heap.new_view_shell(kind)?)
    }

    fn view_fill(
        &mut self,
        view: ObjectId,
        _kind: TypedDataKind,
        backing: Value,
        offset_in_bytes: usize,
        length: usize,
        stream_offset: usize,
    ) -> SnapshotResult<()> {
        let Value::Object(backing) = backing else {
            return Err(SnapshotError::typed_data(
                stream_offset,
                "view backing store is not typed data",
            ));
        };
        self.heap
            .set_view_backing(view, backing, offset_in_bytes, length)
            .map_err(|error| match error {
                HeapError::ObjectLimit { .. } => SnapshotError::from(error),
                other => SnapshotError::typed_data(stream_offset, other.to_string()),
            })
    }
}
