//! Element kinds of typed data buffers
//!
//! The discriminants double as the element-type byte on the wire, so they must
//! stay stable within one snapshot version.

use num_enum::{IntoPrimitive, TryFromPrimitive};

/// Element type of a typed data buffer or view
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, TryFromPrimitive, IntoPrimitive)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum TypedDataKind {
    Int8 = 0,
    Uint8 = 1,
    Uint8Clamped = 2,
    Int16 = 3,
    Uint16 = 4,
    Int32 = 5,
    Uint32 = 6,
    Int64 = 7,
    Uint64 = 8,
    Float32 = 9,
    Float64 = 10,
    Float32x4 = 11,
    ByteData = 12,
}

impl TypedDataKind {
    /// Size of one element in bytes
    pub const fn element_size(self) -> usize {
        match self {
            TypedDataKind::Int8
            | TypedDataKind::Uint8
            | TypedDataKind::Uint8Clamped
            | TypedDataKind::ByteData => 1,
            TypedDataKind::Int16 | TypedDataKind::Uint16 => 2,
            TypedDataKind::Int32 | TypedDataKind::Uint32 | TypedDataKind::Float32 => 4,
            TypedDataKind::Int64 | TypedDataKind::Uint64 | TypedDataKind::Float64 => 8,
            TypedDataKind::Float32x4 => 16,
        }
    }

    /// Number of whole elements in `byte_len` bytes, or `None` when the byte
    /// count is not a multiple of the element size
    pub const fn element_count(self, byte_len: usize) -> Option<usize> {
        let size = self.element_size();
        if byte_len % size == 0 {
            Some(byte_len / size)
        } else {
            None
        }
    }

    /// Check if elements are floating point
    pub fn is_float(self) -> bool {
        matches!(
            self,
            TypedDataKind::Float32 | TypedDataKind::Float64 | TypedDataKind::Float32x4
        )
    }

    pub const fn name(self) -> &'static str {
        match self {
            TypedDataKind::Int8 => "Int8List",
            TypedDataKind::Uint8 => "Uint8List",
            TypedDataKind::Uint8Clamped => "Uint8ClampedList",
            TypedDataKind::Int16 => "Int16List",
            TypedDataKind::Uint16 => "Uint16List",
            TypedDataKind::Int32 => "Int32List",
            TypedDataKind::Uint32 => "Uint32List",
            TypedDataKind::Int64 => "Int64List",
            TypedDataKind::Uint64 => "Uint64List",
            TypedDataKind::Float32 => "Float32List",
            TypedDataKind::Float64 => "Float64List",
            TypedDataKind::Float32x4 => "Float32x4List",
            TypedDataKind::ByteData => "ByteData",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_byte_round_trip() {
        for byte in 0u8..=12 {
            let kind = TypedDataKind::try_from(byte).unwrap();
            assert_eq!(u8::from(kind), byte);
        }
        assert!(TypedDataKind::try_from(13u8).is_err());
    }

    #[test]
    fn test_element_sizes() {
        assert_eq!(TypedDataKind::Uint8Clamped.element_size(), 1);
        assert_eq!(TypedDataKind::Uint16.element_size(), 2);
        assert_eq!(TypedDataKind::Float32.element_size(), 4);
        assert_eq!(TypedDataKind::Uint64.element_size(), 8);
        assert_eq!(TypedDataKind::Float32x4.element_size(), 16);
    }

    #[test]
    fn test_element_count_requires_whole_elements() {
        assert_eq!(TypedDataKind::Int32.element_count(16), Some(4));
        assert_eq!(TypedDataKind::Int32.element_count(15), None);
        assert_eq!(TypedDataKind::Float32x4.element_count(0), Some(0));
    }
}
