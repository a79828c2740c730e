//! Snapshot encoding and decoding errors
//!
//! Every error is local to the one encode or decode call that produced it.
//! Each variant carries enough context (stream offset, offending tag, limit)
//! to diagnose a bad payload from a log line alone.

use isolate_types::HeapError;
use thiserror::Error;

use crate::alloc::AllocError;

/// Snapshot errors with diagnostic context
#[derive(Debug, Error, Clone, PartialEq)]
pub enum SnapshotError {
    /// Encoder met a value bound to its isolate
    #[error("Not transferable: {kind} cannot cross an isolate boundary")]
    NotTransferable { kind: &'static str },

    /// Declared container length exceeds the configured limit
    #[error("Container too large: {length} elements exceeds limit {limit} ({context})")]
    TooLarge {
        length: u64,
        limit: usize,
        context: &'static str,
    },

    /// Output allocator refused to grow the buffer
    #[error("Out of space: allocator refused growth from {old_size} to {new_size} bytes ({cause})")]
    OutOfSpace {
        old_size: usize,
        new_size: usize,
        cause: AllocError,
    },

    /// Stream ended in the middle of a record
    #[error("Truncated snapshot: need {need} bytes at offset {offset}, {available} available")]
    Truncated {
        offset: usize,
        need: usize,
        available: usize,
    },

    /// Unknown tag, or a known tag where it cannot appear
    #[error("Bad tag {tag:#04x} at offset {offset}: {reason}")]
    BadTag {
        tag: u8,
        offset: usize,
        reason: &'static str,
    },

    /// Back-reference to an index that has not been registered
    #[error("Back-reference {index} out of range at offset {offset} (table has {table_len} entries)")]
    BackRefOutOfRange {
        index: u64,
        table_len: usize,
        offset: usize,
    },

    /// Destination heap refused an allocation
    #[error("Allocation failed in destination heap: {cause}")]
    AllocationFailed { cause: HeapError },

    /// Header magic, kind, version or flags do not match this reader
    #[error("Bad snapshot header: {reason}")]
    BadHeader { reason: String },

    /// Bytes remain after the root record
    #[error("Trailing bytes: {remaining} bytes after the root record at offset {offset}")]
    TrailingBytes { offset: usize, remaining: usize },

    /// Varint longer than 64 bits
    #[error("Varint overflow at offset {offset}")]
    VarintOverflow { offset: usize },

    /// Containers nested deeper than the configured limit
    #[error("Nesting too deep: depth {depth} exceeds limit {limit}")]
    NestingTooDeep { depth: usize, limit: usize },

    /// Typed data length or view window is inconsistent
    #[error("Bad typed data at offset {offset}: {reason}")]
    TypedDataLength { offset: usize, reason: String },

    /// Bigint digits are not in canonical form
    #[error("Malformed bigint at offset {offset}: {reason}")]
    MalformedBigint { offset: usize, reason: &'static str },

    /// Native value the encoder cannot represent
    #[error("Unsupported native value: {kind}")]
    Unsupported { kind: &'static str },
}

impl SnapshotError {
    pub fn not_transferable(kind: &'static str) -> Self {
        Self::NotTransferable { kind }
    }

    pub fn too_large(length: u64, limit: usize, context: &'static str) -> Self {
        Self::TooLarge {
            length,
            limit,
            context,
        }
    }

    pub fn truncated(offset: usize, need: usize, available: usize) -> Self {
        Self::Truncated {
            offset,
            need,
            available,
        }
    }

    pub fn bad_tag(tag: u8, offset: usize, reason: &'static str) -> Self {
        Self::BadTag {
            tag,
            offset,
            reason,
        }
    }

    pub fn bad_header(reason: impl Into<String>) -> Self {
        Self::BadHeader {
            reason: reason.into(),
        }
    }

    pub fn typed_data(offset: usize, reason: impl Into<String>) -> Self {
        Self::TypedDataLength {
            offset,
            reason: reason.into(),
        }
    }

    /// Whether the error describes a malformed stream rather than a refused
    /// value or resource
    pub fn is_malformed_input(&self) -> bool {
        matches!(
            self,
            Self::Truncated { .. }
                | Self::BadTag { .. }
                | Self::BackRefOutOfRange { .. }
                | Self::BadHeader { .. }
                | Self::TrailingBytes { .. }
                | Self::VarintOverflow { .. }
                | Self::TypedDataLength { .. }
                | Self::MalformedBigint { .. }
        )
    }
}

impl From<HeapError> for SnapshotError {
    fn from(cause: HeapError) -> Self {
        Self::AllocationFailed { cause }
    }
}

/// Result type for snapshot operations
pub type SnapshotResult<T> = std::result::Result<T, SnapshotError>;
