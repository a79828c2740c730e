//! Read cursor over a snapshot buffer
//!
//! All reads are bounds-checked against the buffer and fail with
//! `Truncated`, carrying the offset where the missing bytes were expected.

use crate::error::{SnapshotError, SnapshotResult};
use crate::varint::{read_uvarint, zigzag_decode};

#[derive(Debug, Clone)]
pub struct ReadStream<'a> {
    bytes: &'a [u8],
    position: usize,
}

impl<'a> ReadStream<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, position: 0 }
    }

    /// Cursor positioned at `position`
    pub fn at(bytes: &'a [u8], position: usize) -> Self {
        Self { bytes, position }
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn remaining(&self) -> usize {
        self.bytes.len().saturating_sub(self.position)
    }

    pub fn is_exhausted(&self) -> bool {
        self.remaining() == 0
    }

    pub fn read_u8(&mut self) -> SnapshotResult<u8> {
        let byte = *self
            .bytes
            .get(self.position)
            .ok_or_else(|| SnapshotError::truncated(self.position, 1, 0))?;
        self.position += 1;
        Ok(byte)
    }

    pub fn read_bytes(&mut self, len: usize) -> SnapshotResult<&'a [u8]> {
        let end = self
            .position
            .checked_add(len)
            .filter(|&end| end <= self.bytes.len())
            .ok_or_else(|| SnapshotError::truncated(self.position, len, self.remaining()))?;
        let slice = &self.bytes[self.position..end];
        self.position = end;
        Ok(slice)
    }

    pub fn read_u64_le(&mut self) -> SnapshotResult<u64> {
        let bytes = self.read_bytes(8)?;
        let mut raw = [0u8; 8];
        raw.copy_from_slice(bytes);
        Ok(u64::from_le_bytes(raw))
    }

    pub fn read_uvarint(&mut self) -> SnapshotResult<u64> {
        let (value, used) = read_uvarint(self.bytes, self.position)?;
        self.position += used;
        Ok(value)
    }

    pub fn read_ivarint(&mut self) -> SnapshotResult<i64> {
        self.read_uvarint().map(zigzag_decode)
    }

    /// Read a container length and check it against `limit`
    pub fn read_length(&mut self, limit: usize, context: &'static str) -> SnapshotResult<usize> {
        let length = self.read_uvarint()?;
        match usize::try_from(length) {
            Ok(length) if length <= limit => Ok(length),
            _ => Err(SnapshotError::too_large(length, limit, context)),
        }
    }
}
