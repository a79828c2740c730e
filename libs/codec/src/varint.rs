//! Variable-length integers
//!
//! Unsigned values are little-endian base-128: seven payload bits per byte,
//! high bit set on every byte except the last. Signed values are zigzag-mapped
//! first so small magnitudes of either sign stay short.

use crate::buffers::ByteSink;
use crate::error::{SnapshotError, SnapshotResult};

/// Longest encoding of a `u64`
pub const MAX_VARINT_BYTES: usize = 10;

pub fn zigzag_encode(value: i64) -> u64 {
    ((value << 1) ^ (value >> 63)) as u64
}

pub fn zigzag_decode(value: u64) -> i64 {
    ((value >> 1) as i64) ^ -((value & 1) as i64)
}

/// Encoded length of `value` in bytes
pub fn uvarint_len(mut value: u64) -> usize {
    let mut len = 1;
    while value >= 0x80 {
        value >>= 7;
        len += 1;
    }
    len
}

pub fn write_uvarint<S: ByteSink + ?Sized>(sink: &mut S, mut value: u64) -> SnapshotResult<()> {
    let mut scratch = [0u8; MAX_VARINT_BYTES];
    let mut len = 0;
    loop {
        let low = (value & 0x7F) as u8;
        value >>= 7;
        if value == 0 {
            scratch[len] = low;
            len += 1;
            break;
        }
        scratch[len] = low | 0x80;
        len += 1;
    }
    sink.put_slice(&scratch[..len])
}

pub fn write_ivarint<S: ByteSink + ?Sized>(sink: &mut S, value: i64) -> SnapshotResult<()> {
    write_uvarint(sink, zigzag_encode(value))
}

/// Decode an unsigned varint starting at `offset`.
///
/// Returns the value and the number of bytes consumed.
pub fn read_uvarint(bytes: &[u8], offset: usize) -> SnapshotResult<(u64, usize)> {
    let mut value: u64 = 0;
    for i in 0..MAX_VARINT_BYTES {
        let Some(&byte) = bytes.get(offset + i) else {
            return Err(SnapshotError::truncated(
                offset + i,
                1,
                bytes.len().saturating_sub(offset + i),
            ));
        };
        let payload = u64::from(byte & 0x7F);
        // Tenth byte may only contribute the final bit
        if i == MAX_VARINT_BYTES - 1 && payload > 1 {
            return Err(SnapshotError::VarintOverflow { offset });
        }
        value |= payload << (7 * i);
        if byte & 0x80 == 0 {
            return Ok((value, i + 1));
        }
    }
    Err(SnapshotError::VarintOverflow { offset })
}
