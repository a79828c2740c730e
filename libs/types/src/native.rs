//! Native value tree handed to and received from embedders
//!
//! Embedders build a [`NativeArena`] and post one of its nodes; native port
//! handlers receive a decoded arena plus the root node. Nodes are addressed by
//! [`NativeRef`], so a node referenced from two places is one shared node and
//! a decoded graph may be a DAG or contain cycles.
//!
//! Typed data bytes live in arena-owned buffers. Several [`NativeTypedData`]
//! nodes can window into one buffer, which is how decoded views keep aliasing
//! their common backing store.

use crate::ports::PortId;
use crate::typed_data::TypedDataKind;

/// Handle to a node in a [`NativeArena`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NativeRef(u32);

impl NativeRef {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Handle to a byte buffer owned by a [`NativeArena`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BufferId(u32);

impl BufferId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Typed data node: a window of `byte_len` bytes into an arena buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NativeTypedData {
    pub kind: TypedDataKind,
    pub buffer: BufferId,
    pub offset: usize,
    pub byte_len: usize,
}

impl NativeTypedData {
    /// Number of elements of `kind` in the window
    pub fn length(&self) -> usize {
        self.byte_len / self.kind.element_size()
    }
}

/// One node of the native value tree
#[derive(Debug, Clone, PartialEq)]
pub enum NativeValue {
    Null,
    Bool(bool),
    Int32(i32),
    Int64(i64),
    /// Hex digits, uppercase, `-` prefixed when negative
    Bigint(String),
    Double(f64),
    String(String),
    TypedData(NativeTypedData),
    Array(Vec<NativeRef>),
    Map(Vec<(NativeRef, NativeRef)>),
    SendPort(PortId),
    /// Value the tree cannot represent
    Unsupported,
}

impl NativeValue {
    pub fn type_name(&self) -> &'static str {
        match self {
            NativeValue::Null => "Null",
            NativeValue::Bool(_) => "Bool",
            NativeValue::Int32(_) => "Int32",
            NativeValue::Int64(_) => "Int64",
            NativeValue::Bigint(_) => "Bigint",
            NativeValue::Double(_) => "Double",
            NativeValue::String(_) => "String",
            NativeValue::TypedData(_) => "TypedData",
            NativeValue::Array(_) => "Array",
            NativeValue::Map(_) => "Map",
            NativeValue::SendPort(_) => "SendPort",
            NativeValue::Unsupported => "Unsupported",
        }
    }
}

/// Owner of every node and buffer of one native tree
#[derive(Debug, Default, Clone)]
pub struct NativeArena {
    nodes: Vec<NativeValue>,
    buffers: Vec<Vec<u8>>,
}

impl NativeArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn push(&mut self, value: NativeValue) -> NativeRef {
        let node = NativeRef(self.nodes.len() as u32);
        self.nodes.push(value);
        node
    }

    pub fn get(&self, node: NativeRef) -> Option<&NativeValue> {
        self.nodes.get(node.index())
    }

    /// Overwrite a node in place. Used while a decoder fills a shell it has
    /// already registered.
    pub fn replace(&mut self, node: NativeRef, value: NativeValue) -> bool {
        match self.nodes.get_mut(node.index()) {
            Some(slot) => {
                *slot = value;
                true
            }
            None => false,
        }
    }

    /// Append `child` to an array node. Returns false if `array` is not one.
    pub fn array_push(&mut self, array: NativeRef, child: NativeRef) -> bool {
        match self.nodes.get_mut(array.index()) {
            Some(NativeValue::Array(elements)) => {
                elements.push(child);
                true
            }
            _ => false,
        }
    }

    pub fn map_insert(&mut self, map: NativeRef, key: NativeRef, value: NativeRef) -> bool {
        match self.nodes.get_mut(map.index()) {
            Some(NativeValue::Map(entries)) => {
                entries.push((key, value));
                true
            }
            _ => false,
        }
    }

    pub fn array_elements(&self, array: NativeRef) -> Option<&[NativeRef]> {
        match self.get(array)? {
            NativeValue::Array(elements) => Some(elements),
            _ => None,
        }
    }

    // Builders

    pub fn null(&mut self) -> NativeRef {
        self.push(NativeValue::Null)
    }

    pub fn boolean(&mut self, value: bool) -> NativeRef {
        self.push(NativeValue::Bool(value))
    }

    pub fn int32(&mut self, value: i32) -> NativeRef {
        self.push(NativeValue::Int32(value))
    }

    pub fn int64(&mut self, value: i64) -> NativeRef {
        self.push(NativeValue::Int64(value))
    }

    pub fn bigint(&mut self, hex: impl Into<String>) -> NativeRef {
        self.push(NativeValue::Bigint(hex.into()))
    }

    pub fn double(&mut self, value: f64) -> NativeRef {
        self.push(NativeValue::Double(value))
    }

    pub fn string(&mut self, text: impl Into<String>) -> NativeRef {
        self.push(NativeValue::String(text.into()))
    }

    pub fn array(&mut self, elements: Vec<NativeRef>) -> NativeRef {
        self.push(NativeValue::Array(elements))
    }

    pub fn map(&mut self, entries: Vec<(NativeRef, NativeRef)>) -> NativeRef {
        self.push(NativeValue::Map(entries))
    }

    pub fn send_port(&mut self, port: PortId) -> NativeRef {
        self.push(NativeValue::SendPort(port))
    }

    /// Take ownership of a byte buffer
    pub fn add_buffer(&mut self, bytes: Vec<u8>) -> BufferId {
        let id = BufferId(self.buffers.len() as u32);
        self.buffers.push(bytes);
        id
    }

    pub fn buffer(&self, id: BufferId) -> Option<&[u8]> {
        self.buffers.get(id.index()).map(Vec::as_slice)
    }

    /// Typed data node owning a fresh buffer.
    /// Returns `None` when `bytes` is not a whole number of elements.
    pub fn typed_data(&mut self, kind: TypedDataKind, bytes: Vec<u8>) -> Option<NativeRef> {
        kind.element_count(bytes.len())?;
        let byte_len = bytes.len();
        let buffer = self.add_buffer(bytes);
        Some(self.push(NativeValue::TypedData(NativeTypedData {
            kind,
            buffer,
            offset: 0,
            byte_len,
        })))
    }

    /// Typed data node windowing `length` elements of an existing buffer.
    /// Returns `None` when the window does not fit the buffer.
    pub fn typed_view(
        &mut self,
        kind: TypedDataKind,
        buffer: BufferId,
        offset: usize,
        length: usize,
    ) -> Option<NativeRef> {
        let byte_len = length.checked_mul(kind.element_size())?;
        let end = offset.checked_add(byte_len)?;
        if end > self.buffer(buffer)?.len() {
            return None;
        }
        Some(self.push(NativeValue::TypedData(NativeTypedData {
            kind,
            buffer,
            offset,
            byte_len,
        })))
    }

    /// Bytes visible through a typed data node
    pub fn typed_bytes(&self, data: &NativeTypedData) -> Option<&[u8]> {
        self.buffer(data.buffer)?
            .get(data.offset..data.offset + data.byte_len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shared_node_identity() {
        let mut arena = NativeArena::new();
        let text = arena.string("A");
        let list = arena.array(vec![text, text]);
        let elements = arena.array_elements(list).unwrap();
        assert_eq!(elements[0], elements[1]);
    }

    #[test]
    fn test_self_referencing_array() {
        let mut arena = NativeArena::new();
        let list = arena.array(Vec::new());
        assert!(arena.array_push(list, list));
        assert_eq!(arena.array_elements(list), Some(&[list][..]));
    }

    #[test]
    fn test_views_alias_one_buffer() {
        let mut arena = NativeArena::new();
        let buffer = arena.add_buffer((0..=255).collect());
        let first = arena.typed_view(TypedDataKind::Uint8, buffer, 3, 10).unwrap();
        let second = arena.typed_view(TypedDataKind::Uint8, buffer, 4, 10).unwrap();

        let (NativeValue::TypedData(a), NativeValue::TypedData(b)) =
            (arena.get(first).unwrap(), arena.get(second).unwrap())
        else {
            panic!("expected typed data nodes");
        };
        let a_bytes = arena.typed_bytes(a).unwrap();
        let b_bytes = arena.typed_bytes(b).unwrap();
        assert_eq!(a_bytes[0], 3);
        assert_eq!(a_bytes[1..].as_ptr(), b_bytes.as_ptr());
    }

    #[test]
    fn test_view_outside_buffer_rejected() {
        let mut arena = NativeArena::new();
        let buffer = arena.add_buffer(vec![0; 8]);
        assert!(arena.typed_view(TypedDataKind::Int32, buffer, 4, 2).is_none());
        assert!(arena.typed_view(TypedDataKind::Int32, buffer, 4, 1).is_some());
    }

    #[test]
    fn test_typed_data_rejects_partial_element() {
        let mut arena = NativeArena::new();
        assert!(arena.typed_data(TypedDataKind::Int16, vec![1, 2, 3]).is_none());
        assert!(arena.typed_data(TypedDataKind::Int32, vec![1, 2, 3, 4, 5, 6]).is_none());
        assert_eq!(arena.len(), 0);

        let node = arena.typed_data(TypedDataKind::Int16, vec![1, 2, 3, 4]).unwrap();
        let Some(NativeValue::TypedData(data)) = arena.get(node) else {
            panic!("expected typed data");
        };
        assert_eq!(data.byte_len, 4);
        assert_eq!(data.length(), 2);
    }
}
