//! Record tags and the snapshot header
//!
//! ## Tag Space
//!
//! ```text
//! 0x00-0x3F  immediate small integer, 6-bit two's complement in the tag
//! 0x40-0x7F  object kind (see ObjectTag)
//! 0x80-0xFF  back-reference: index = (tag & 0x7F) | (varint << 7)
//! ```
//!
//! ## Header
//!
//! ```text
//! byte 0  magic 0xD7
//! byte 1  snapshot kind (full, script, message)
//! byte 2  format version
//! byte 3  flags: bit 0 back-references index non-primitives only,
//!                bit 1 little-endian doubles and typed data
//! ```

use num_enum::{IntoPrimitive, TryFromPrimitive};

use crate::error::{SnapshotError, SnapshotResult};

pub const SNAPSHOT_MAGIC: u8 = 0xD7;
pub const SNAPSHOT_VERSION: u8 = 1;
pub const HEADER_SIZE: usize = 4;

/// Back-reference table holds only non-primitive records
pub const FLAG_NON_PRIMITIVE_BACK_REFS: u8 = 0x01;
/// Multi-byte payloads are little-endian
pub const FLAG_LITTLE_ENDIAN: u8 = 0x02;
pub const REQUIRED_FLAGS: u8 = FLAG_NON_PRIMITIVE_BACK_REFS | FLAG_LITTLE_ENDIAN;

pub const IMMEDIATE_MIN: i64 = -32;
pub const IMMEDIATE_MAX: i64 = 31;
const IMMEDIATE_MASK: u8 = 0x3F;
pub const BACK_REF_FLAG: u8 = 0x80;
const BACK_REF_LOW_MASK: u8 = 0x7F;

/// Canonical bit pattern written for every NaN
pub const CANONICAL_NAN_BITS: u64 = 0x7FF8_0000_0000_0000;

/// Object kind tags (0x40-0x7F)
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, TryFromPrimitive, IntoPrimitive)]
pub enum ObjectTag {
    Null = 0x40,
    True = 0x41,
    False = 0x42,
    /// Integer in smi range, zigzag varint body
    Smi = 0x43,
    /// Boxed 64-bit integer, zigzag varint body
    Mint = 0x44,
    Bigint = 0x45,
    Double = 0x46,
    Latin1String = 0x47,
    Utf16String = 0x48,
    TypedData = 0x49,
    Array = 0x4A,
    TypedDataView = 0x4B,
    Map = 0x4C,
    SendPort = 0x4D,
}

impl ObjectTag {
    /// Whether records with this tag take a back-reference table slot
    pub fn is_registered(self) -> bool {
        !matches!(
            self,
            ObjectTag::Null | ObjectTag::True | ObjectTag::False | ObjectTag::Smi
        )
    }
}

/// Decoded meaning of a tag byte
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagClass {
    Immediate(i64),
    Object(ObjectTag),
    /// Low seven bits of a back-reference index
    BackRef(u8),
    Unknown,
}

pub fn classify(tag: u8) -> TagClass {
    match tag {
        0x00..=0x3F => TagClass::Immediate(immediate_value(tag)),
        0x40..=0x7F => match ObjectTag::try_from(tag) {
            Ok(object) => TagClass::Object(object),
            Err(_) => TagClass::Unknown,
        },
        _ => TagClass::BackRef(tag & BACK_REF_LOW_MASK),
    }
}

/// Tag byte encoding `value` directly, if it fits in six bits
pub fn immediate_tag(value: i64) -> Option<u8> {
    if (IMMEDIATE_MIN..=IMMEDIATE_MAX).contains(&value) {
        Some((value as u8) & IMMEDIATE_MASK)
    } else {
        None
    }
}

pub fn immediate_value(tag: u8) -> i64 {
    // Shift the 6-bit payload to the top of an i8 and back to sign-extend it
    i64::from(((tag & IMMEDIATE_MASK) << 2) as i8 >> 2)
}

/// Split a back-reference index into its tag byte and varint remainder
pub fn back_ref_parts(index: u64) -> (u8, u64) {
    (
        BACK_REF_FLAG | (index as u8 & BACK_REF_LOW_MASK),
        index >> 7,
    )
}

/// Which kind of snapshot a buffer holds
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, TryFromPrimitive, IntoPrimitive)]
pub enum SnapshotKind {
    Full = 0,
    Script = 1,
    Message = 2,
}

/// Four-byte snapshot header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SnapshotHeader {
    pub kind: SnapshotKind,
    pub version: u8,
    pub flags: u8,
}

impl SnapshotHeader {
    pub fn message() -> Self {
        Self {
            kind: SnapshotKind::Message,
            version: SNAPSHOT_VERSION,
            flags: REQUIRED_FLAGS,
        }
    }

    pub fn to_bytes(self) -> [u8; HEADER_SIZE] {
        [SNAPSHOT_MAGIC, self.kind.into(), self.version, self.flags]
    }

    pub fn parse(bytes: &[u8]) -> SnapshotResult<Self> {
        let Some(header) = bytes.get(..HEADER_SIZE) else {
            return Err(SnapshotError::truncated(0, HEADER_SIZE, bytes.len()));
        };
        if header[0] != SNAPSHOT_MAGIC {
            return Err(SnapshotError::bad_header(format!(
                "magic {:#04x}, expected {:#04x}",
                header[0], SNAPSHOT_MAGIC
            )));
        }
        let kind = SnapshotKind::try_from(header[1])
            .map_err(|_| SnapshotError::bad_header(format!("unknown kind {}", header[1])))?;
        Ok(Self {
            kind,
            version: header[2],
            flags: header[3],
        })
    }

    /// Check that a message reader can consume this snapshot
    pub fn expect_message(self) -> SnapshotResult<()> {
        if self.kind != SnapshotKind::Message {
            return Err(SnapshotError::bad_header(format!(
                "{:?} snapshot where a message was expected",
                self.kind
            )));
        }
        if self.version != SNAPSHOT_VERSION {
            return Err(SnapshotError::bad_header(format!(
                "version {}, this reader supports {}",
                self.version, SNAPSHOT_VERSION
            )));
        }
        if self.flags != REQUIRED_FLAGS {
            return Err(SnapshotError::bad_header(format!(
                "flags {:#04x}, expected {:#04x}",
                self.flags, REQUIRED_FLAGS
            )));
        }
        Ok(())
    }
}
