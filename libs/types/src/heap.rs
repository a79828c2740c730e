//! Isolate heap: the managed object graph that messages are taken from and
//! rebuilt into
//!
//! ## Purpose
//!
//! Each isolate owns one [`Heap`]. Values are either immediates ([`Value::Null`],
//! [`Value::Bool`], [`Value::Smi`]) or handles to heap objects. Heap objects
//! carry identity: two handles are the same object exactly when their
//! [`ObjectId`]s are equal, which is what lets a snapshot preserve sharing and
//! cycles.
//!
//! ## Object Kinds
//!
//! Transferable objects are boxed integers, bigints, doubles, strings, arrays,
//! maps, typed data, typed data views and send ports. Receive ports, closures,
//! code blobs and native resource handles belong to their isolate and can never
//! be copied into a message.
//!
//! ## Allocation Limit
//!
//! A heap may be created with an object limit. Allocation past the limit fails
//! with [`HeapError::ObjectLimit`], which the managed snapshot reader surfaces
//! as an allocation failure.

use std::collections::HashMap;

use num_bigint::BigInt;

use crate::errors::{HeapError, HeapResult};
use crate::ports::PortId;
use crate::typed_data::TypedDataKind;

/// Smallest integer representable as an immediate smi
pub const SMI_MIN: i64 = -(1 << 62);
/// Largest integer representable as an immediate smi
pub const SMI_MAX: i64 = (1 << 62) - 1;

/// Handle to an object in a [`Heap`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId(u32);

impl ObjectId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// A managed value: an immediate or a reference to a heap object
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Smi(i64),
    Object(ObjectId),
}

impl Value {
    pub fn is_smi_range(value: i64) -> bool {
        (SMI_MIN..=SMI_MAX).contains(&value)
    }

    pub fn as_object(self) -> Option<ObjectId> {
        match self {
            Value::Object(id) => Some(id),
            _ => None,
        }
    }
}

impl From<ObjectId> for Value {
    fn from(id: ObjectId) -> Self {
        Value::Object(id)
    }
}

/// String storage: one byte per code unit when every unit fits Latin-1,
/// otherwise raw UTF-16 code units (unpaired surrogates allowed)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeapString {
    Latin1(Vec<u8>),
    Utf16(Vec<u16>),
}

impl HeapString {
    /// Pick the narrowest representation for `text`
    pub fn from_text(text: &str) -> Self {
        if text.chars().all(|c| (c as u32) <= 0xFF) {
            HeapString::Latin1(text.chars().map(|c| c as u8).collect())
        } else {
            HeapString::Utf16(text.encode_utf16().collect())
        }
    }

    /// Length in code units
    pub fn len(&self) -> usize {
        match self {
            HeapString::Latin1(bytes) => bytes.len(),
            HeapString::Utf16(units) => units.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Code units widened to UTF-16
    pub fn code_units(&self) -> Vec<u16> {
        match self {
            HeapString::Latin1(bytes) => bytes.iter().map(|&b| u16::from(b)).collect(),
            HeapString::Utf16(units) => units.clone(),
        }
    }

    /// True when every code unit fits in one byte
    pub fn fits_latin1(&self) -> bool {
        match self {
            HeapString::Latin1(_) => true,
            HeapString::Utf16(units) => units.iter().all(|&u| u <= 0xFF),
        }
    }

    /// Decode to Rust text; `None` when the string holds unpaired surrogates
    pub fn to_rust_string(&self) -> Option<String> {
        match self {
            HeapString::Latin1(bytes) => Some(bytes.iter().map(|&b| b as char).collect()),
            HeapString::Utf16(units) => String::from_utf16(units).ok(),
        }
    }
}

/// Object stored in a [`Heap`]
#[derive(Debug, Clone, PartialEq)]
pub enum HeapObject {
    /// 64-bit integer outside the smi range, boxed
    Mint(i64),
    Bigint(BigInt),
    Double(f64),
    String(HeapString),
    Array(Vec<Value>),
    /// Hash map; iteration order carries no meaning
    Map(Vec<(Value, Value)>),
    TypedData {
        kind: TypedDataKind,
        bytes: Vec<u8>,
    },
    TypedDataView {
        kind: TypedDataKind,
        backing: ObjectId,
        offset_in_bytes: usize,
        /// Length in elements
        length: usize,
    },
    /// Capability to post to a port
    SendPort(PortId),

    /// Open receiving end of one of this isolate's ports
    ReceivePort(PortId),
    /// Function closure with captured execution state
    Closure { function: String },
    /// Compiled native code
    Code(Vec<u8>),
    /// Handle to a host resource (file descriptor, socket, ...)
    NativeResource(u64),
}

impl HeapObject {
    pub fn kind_name(&self) -> &'static str {
        match self {
            HeapObject::Mint(_) => "Mint",
            HeapObject::Bigint(_) => "Bigint",
            HeapObject::Double(_) => "Double",
            HeapObject::String(_) => "String",
            HeapObject::Array(_) => "Array",
            HeapObject::Map(_) => "Map",
            HeapObject::TypedData { .. } => "TypedData",
            HeapObject::TypedDataView { .. } => "TypedDataView",
            HeapObject::SendPort(_) => "SendPort",
            HeapObject::ReceivePort(_) => "ReceivePort",
            HeapObject::Closure { .. } => "Closure",
            HeapObject::Code(_) => "Code",
            HeapObject::NativeResource(_) => "NativeResource",
        }
    }

    /// Whether the object may be copied into a message
    pub fn is_transferable(&self) -> bool {
        !matches!(
            self,
            HeapObject::ReceivePort(_)
                | HeapObject::Closure { .. }
                | HeapObject::Code(_)
                | HeapObject::NativeResource(_)
        )
    }
}

/// Object store of one isolate
#[derive(Debug, Default)]
pub struct Heap {
    objects: Vec<HeapObject>,
    limit: Option<usize>,
    /// The one receive port object per port id
    receive_ports: HashMap<PortId, ObjectId>,
}

impl Heap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Heap that refuses to hold more than `limit` objects
    pub fn with_limit(limit: usize) -> Self {
        Self {
            objects: Vec::new(),
            limit: Some(limit),
            receive_ports: HashMap::new(),
        }
    }

    /// Number of live objects
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn allocate(&mut self, object: HeapObject) -> HeapResult<ObjectId> {
        if let Some(limit) = self.limit {
            if self.objects.len() >= limit {
                return Err(HeapError::ObjectLimit { limit });
            }
        }
        let index = u32::try_from(self.objects.len()).map_err(|_| HeapError::ObjectLimit {
            limit: u32::MAX as usize,
        })?;
        self.objects.push(object);
        Ok(ObjectId(index))
    }

    pub fn get(&self, id: ObjectId) -> HeapResult<&HeapObject> {
        self.objects.get(id.index()).ok_or(HeapError::InvalidHandle {
            index: id.index(),
            len: self.objects.len(),
        })
    }

    fn get_mut(&mut self, id: ObjectId) -> HeapResult<&mut HeapObject> {
        let len = self.objects.len();
        self.objects.get_mut(id.index()).ok_or(HeapError::InvalidHandle {
            index: id.index(),
            len,
        })
    }

    // Constructors

    /// Smi when the value fits, boxed mint otherwise
    pub fn new_integer(&mut self, value: i64) -> HeapResult<Value> {
        if Value::is_smi_range(value) {
            Ok(Value::Smi(value))
        } else {
            self.allocate(HeapObject::Mint(value)).map(Value::Object)
        }
    }

    pub fn new_mint(&mut self, value: i64) -> HeapResult<ObjectId> {
        self.allocate(HeapObject::Mint(value))
    }

    pub fn new_bigint(&mut self, value: BigInt) -> HeapResult<ObjectId> {
        self.allocate(HeapObject::Bigint(value))
    }

    pub fn new_double(&mut self, value: f64) -> HeapResult<ObjectId> {
        self.allocate(HeapObject::Double(value))
    }

    pub fn new_string(&mut self, text: &str) -> HeapResult<ObjectId> {
        self.allocate(HeapObject::String(HeapString::from_text(text)))
    }

    /// String from raw UTF-16 code units, surrogates kept as they are
    pub fn new_utf16_string(&mut self, units: Vec<u16>) -> HeapResult<ObjectId> {
        self.allocate(HeapObject::String(HeapString::Utf16(units)))
    }

    /// Array of `length` nulls
    pub fn new_array(&mut self, length: usize) -> HeapResult<ObjectId> {
        self.allocate(HeapObject::Array(vec![Value::Null; length]))
    }

    pub fn new_array_from(&mut self, elements: Vec<Value>) -> HeapResult<ObjectId> {
        self.allocate(HeapObject::Array(elements))
    }

    pub fn new_map(&mut self, entries: Vec<(Value, Value)>) -> HeapResult<ObjectId> {
        self.allocate(HeapObject::Map(entries))
    }

    pub fn new_typed_data(&mut self, kind: TypedDataKind, bytes: Vec<u8>) -> HeapResult<ObjectId> {
        if kind.element_count(bytes.len()).is_none() {
            return Err(HeapError::PartialElement {
                kind: kind.name(),
                element_size: kind.element_size(),
                byte_len: bytes.len(),
            });
        }
        self.allocate(HeapObject::TypedData { kind, bytes })
    }

    /// View of `length` elements of `kind` starting `offset_in_bytes` into
    /// the typed data object `backing`
    pub fn new_typed_data_view(
        &mut self,
        kind: TypedDataKind,
        backing: ObjectId,
        offset_in_bytes: usize,
        length: usize,
    ) -> HeapResult<ObjectId> {
        self.check_view(kind, backing, offset_in_bytes, length)?;
        self.allocate(HeapObject::TypedDataView {
            kind,
            backing,
            offset_in_bytes,
            length,
        })
    }

    /// Allocate a view whose backing store is not known yet.
    ///
    /// The shell refers to itself until [`Heap::set_view_backing`] fills it in;
    /// readers use this to register a view before decoding its backing store.
    pub fn new_view_shell(&mut self, kind: TypedDataKind) -> HeapResult<ObjectId> {
        let next = ObjectId(self.objects.len() as u32);
        self.allocate(HeapObject::TypedDataView {
            kind,
            backing: next,
            offset_in_bytes: 0,
            length: 0,
        })
    }

    pub fn set_view_backing(
        &mut self,
        view: ObjectId,
        backing: ObjectId,
        offset_in_bytes: usize,
        length: usize,
    ) -> HeapResult<()> {
        let kind = match self.get(view)? {
            HeapObject::TypedDataView { kind, .. } => *kind,
            other => {
                return Err(HeapError::WrongKind {
                    index: view.index(),
                    expected: "TypedDataView",
                    found: other.kind_name(),
                })
            }
        };
        self.check_view(kind, backing, offset_in_bytes, length)?;
        if let HeapObject::TypedDataView {
            backing: slot_backing,
            offset_in_bytes: slot_offset,
            length: slot_length,
            ..
        } = self.get_mut(view)?
        {
            *slot_backing = backing;
            *slot_offset = offset_in_bytes;
            *slot_length = length;
        }
        Ok(())
    }

    fn check_view(
        &self,
        kind: TypedDataKind,
        backing: ObjectId,
        offset_in_bytes: usize,
        length: usize,
    ) -> HeapResult<()> {
        let backing_len = match self.get(backing)? {
            HeapObject::TypedData { bytes, .. } => bytes.len(),
            other => {
                return Err(HeapError::WrongKind {
                    index: backing.index(),
                    expected: "TypedData",
                    found: other.kind_name(),
                })
            }
        };
        let byte_len = length.saturating_mul(kind.element_size());
        match offset_in_bytes.checked_add(byte_len) {
            Some(end) if end <= backing_len => Ok(()),
            _ => Err(HeapError::ViewOutOfRange {
                offset_in_bytes,
                byte_len,
                backing_len,
            }),
        }
    }

    pub fn new_send_port(&mut self, port: PortId) -> HeapResult<ObjectId> {
        self.allocate(HeapObject::SendPort(port))
    }

    pub fn new_receive_port(&mut self, port: PortId) -> HeapResult<ObjectId> {
        self.allocate(HeapObject::ReceivePort(port))
    }

    /// Receive port object for `port`, allocated on first request
    pub fn receive_port(&mut self, port: PortId) -> HeapResult<ObjectId> {
        if let Some(&id) = self.receive_ports.get(&port) {
            return Ok(id);
        }
        let id = self.new_receive_port(port)?;
        self.receive_ports.insert(port, id);
        Ok(id)
    }

    // Mutation and access

    pub fn array_set(&mut self, array: ObjectId, index: usize, value: Value) -> HeapResult<()> {
        match self.get_mut(array)? {
            HeapObject::Array(elements) => {
                let length = elements.len();
                let slot = elements
                    .get_mut(index)
                    .ok_or(HeapError::IndexOutOfRange { index, length })?;
                *slot = value;
                Ok(())
            }
            other => Err(HeapError::WrongKind {
                index: array.index(),
                expected: "Array",
                found: other.kind_name(),
            }),
        }
    }

    pub fn array_elements(&self, array: ObjectId) -> HeapResult<&[Value]> {
        match self.get(array)? {
            HeapObject::Array(elements) => Ok(elements),
            other => Err(HeapError::WrongKind {
                index: array.index(),
                expected: "Array",
                found: other.kind_name(),
            }),
        }
    }

    pub fn map_insert(&mut self, map: ObjectId, key: Value, value: Value) -> HeapResult<()> {
        match self.get_mut(map)? {
            HeapObject::Map(entries) => {
                entries.push((key, value));
                Ok(())
            }
            other => Err(HeapError::WrongKind {
                index: map.index(),
                expected: "Map",
                found: other.kind_name(),
            }),
        }
    }

    /// Integer value of a smi or mint
    pub fn integer_value(&self, value: Value) -> Option<i64> {
        match value {
            Value::Smi(v) => Some(v),
            Value::Object(id) => match self.get(id).ok()? {
                HeapObject::Mint(v) => Some(*v),
                _ => None,
            },
            _ => None,
        }
    }

    pub fn double_value(&self, value: Value) -> Option<f64> {
        match self.get(value.as_object()?).ok()? {
            HeapObject::Double(v) => Some(*v),
            _ => None,
        }
    }

    pub fn string_value(&self, value: Value) -> Option<&HeapString> {
        match self.get(value.as_object()?).ok()? {
            HeapObject::String(s) => Some(s),
            _ => None,
        }
    }

    /// Bytes a typed data object or view observes
    pub fn typed_data_bytes(&self, id: ObjectId) -> HeapResult<&[u8]> {
        match self.get(id)? {
            HeapObject::TypedData { bytes, .. } => Ok(bytes),
            HeapObject::TypedDataView {
                kind,
                backing,
                offset_in_bytes,
                length,
            } => {
                let bytes = self.typed_data_bytes(*backing)?;
                let end = offset_in_bytes + length * kind.element_size();
                bytes
                    .get(*offset_in_bytes..end)
                    .ok_or(HeapError::ViewOutOfRange {
                        offset_in_bytes: *offset_in_bytes,
                        byte_len: length * kind.element_size(),
                        backing_len: bytes.len(),
                    })
            }
            other => Err(HeapError::WrongKind {
                index: id.index(),
                expected: "TypedData",
                found: other.kind_name(),
            }),
        }
    }

    /// Structural equality of two graphs that also requires the same sharing
    /// shape: object identity in `self` must map one-to-one onto identity in
    /// `other`. Maps are compared entry by entry in stored order.
    pub fn isomorphic(&self, a: Value, other: &Heap, b: Value) -> bool {
        let mut forward = HashMap::new();
        let mut backward = HashMap::new();
        let mut pending = vec![(a, b)];

        while let Some((left, right)) = pending.pop() {
            let (left_id, right_id) = match (left, right) {
                (Value::Object(l), Value::Object(r)) => (l, r),
                (Value::Smi(l), Value::Smi(r)) if l == r => continue,
                (Value::Null, Value::Null) => continue,
                (Value::Bool(l), Value::Bool(r)) if l == r => continue,
                _ => return false,
            };
            match (forward.get(&left_id), backward.get(&right_id)) {
                (Some(mapped), Some(back)) if *mapped == right_id && *back == left_id => continue,
                (None, None) => {
                    forward.insert(left_id, right_id);
                    backward.insert(right_id, left_id);
                }
                _ => return false,
            }
            let (Ok(left_obj), Ok(right_obj)) = (self.get(left_id), other.get(right_id)) else {
                return false;
            };
            let same = match (left_obj, right_obj) {
                (HeapObject::Mint(l), HeapObject::Mint(r)) => l == r,
                (HeapObject::Bigint(l), HeapObject::Bigint(r)) => l == r,
                (HeapObject::Double(l), HeapObject::Double(r)) => {
                    l.to_bits() == r.to_bits() || (l.is_nan() && r.is_nan())
                }
                (HeapObject::String(l), HeapObject::String(r)) => l.code_units() == r.code_units(),
                (HeapObject::Array(l), HeapObject::Array(r)) => {
                    if l.len() != r.len() {
                        return false;
                    }
                    pending.extend(l.iter().copied().zip(r.iter().copied()));
                    true
                }
                (HeapObject::Map(l), HeapObject::Map(r)) => {
                    if l.len() != r.len() {
                        return false;
                    }
                    for ((lk, lv), (rk, rv)) in l.iter().zip(r.iter()) {
                        pending.push((*lk, *rk));
                        pending.push((*lv, *rv));
                    }
                    true
                }
                (
                    HeapObject::TypedData { kind: lk, bytes: lb },
                    HeapObject::TypedData { kind: rk, bytes: rb },
                ) => lk == rk && lb == rb,
                (
                    HeapObject::TypedDataView {
                        kind: lk,
                        backing: lb,
                        offset_in_bytes: loff,
                        length: ll,
                    },
                    HeapObject::TypedDataView {
                        kind: rk,
                        backing: rb,
                        offset_in_bytes: roff,
                        length: rl,
                    },
                ) => {
                    pending.push((Value::Object(*lb), Value::Object(*rb)));
                    lk == rk && loff == roff && ll == rl
                }
                (HeapObject::SendPort(l), HeapObject::SendPort(r)) => l == r,
                _ => false,
            };
            if !same {
                return false;
            }
        }
        true
    }
}
