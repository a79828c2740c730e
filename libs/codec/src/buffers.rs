//! Output buffers for snapshot encoding
//!
//! ## Purpose
//!
//! [`WriteBuffer`] is the growable byte sink a writer appends records to. It
//! owns no policy: growth is requested from its [`Reallocator`], and a
//! finished buffer becomes a [`Payload`] that releases its bytes through that
//! same reallocator when dropped.
//!
//! ## Architecture Role
//!
//! ```text
//! Writer → [WriteBuffer] → Payload → Message → Queue → Reader
//!              ↓              ↓
//!        Reallocator     release on drop
//! ```
//!
//! ## Buffer Categories
//!
//! - **Message buffers**: one [`WriteBuffer`] per encode, moved into the message
//! - **Scratch buffer**: one thread-local `Vec<u8>` reused for transient
//!   encodings (map key ordering) that never leave the writer
//!
//! Both implement [`ByteSink`], which is all the record encoder needs.

use std::cell::RefCell;
use std::fmt;
use std::sync::Arc;

use crate::alloc::{AllocError, AllocatorKind, HostAllocator, Reallocator};
use crate::error::{SnapshotError, SnapshotResult};

/// First capacity requested from the reallocator
const MIN_CAPACITY: usize = 64;

/// Initial capacity of the thread-local scratch buffer
const SCRATCH_CAPACITY: usize = 256;

/// Append-only byte destination
pub trait ByteSink {
    /// Bytes written so far
    fn position(&self) -> usize;

    fn put_u8(&mut self, byte: u8) -> SnapshotResult<()>;

    fn put_slice(&mut self, bytes: &[u8]) -> SnapshotResult<()>;
}

impl ByteSink for Vec<u8> {
    fn position(&self) -> usize {
        self.len()
    }

    fn put_u8(&mut self, byte: u8) -> SnapshotResult<()> {
        self.push(byte);
        Ok(())
    }

    fn put_slice(&mut self, bytes: &[u8]) -> SnapshotResult<()> {
        self.extend_from_slice(bytes);
        Ok(())
    }
}

impl<T: ByteSink + ?Sized> ByteSink for &mut T {
    fn position(&self) -> usize {
        (**self).position()
    }

    fn put_u8(&mut self, byte: u8) -> SnapshotResult<()> {
        (**self).put_u8(byte)
    }

    fn put_slice(&mut self, bytes: &[u8]) -> SnapshotResult<()> {
        (**self).put_slice(bytes)
    }
}

/// Growable output buffer whose growth is delegated to a [`Reallocator`]
pub struct WriteBuffer {
    bytes: Vec<u8>,
    granted: usize,
    allocator: Arc<dyn Reallocator>,
}

impl WriteBuffer {
    pub fn new(allocator: Arc<dyn Reallocator>) -> Self {
        Self {
            bytes: Vec::new(),
            granted: 0,
            allocator,
        }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Bytes currently granted by the reallocator
    pub fn granted(&self) -> usize {
        self.granted
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.bytes
    }

    fn reserve(&mut self, additional: usize) -> SnapshotResult<()> {
        let needed = self
            .bytes
            .len()
            .checked_add(additional)
            .ok_or_else(|| SnapshotError::OutOfSpace {
                old_size: self.granted,
                new_size: usize::MAX,
                cause: AllocError::HostRefused {
                    requested: usize::MAX,
                },
            })?;
        if needed <= self.granted {
            return Ok(());
        }

        let doubled = needed
            .max(self.granted.saturating_mul(2))
            .max(MIN_CAPACITY);
        let attempt = self
            .allocator
            .reallocate(&mut self.bytes, self.granted, doubled);
        let new_size = match attempt {
            Ok(()) => doubled,
            // A refused doubling may still leave room for exactly what is needed
            Err(_) if doubled > needed => self
                .allocator
                .reallocate(&mut self.bytes, self.granted, needed)
                .map(|()| needed)
                .map_err(|cause| SnapshotError::OutOfSpace {
                    old_size: self.granted,
                    new_size: needed,
                    cause,
                })?,
            Err(cause) => {
                return Err(SnapshotError::OutOfSpace {
                    old_size: self.granted,
                    new_size: doubled,
                    cause,
                })
            }
        };
        self.granted = new_size;
        Ok(())
    }

    /// Finish the buffer, transferring its bytes to the caller
    pub fn into_payload(mut self) -> Payload {
        let bytes = std::mem::take(&mut self.bytes);
        let granted = std::mem::replace(&mut self.granted, 0);
        Payload {
            bytes,
            granted,
            allocator: Some(Arc::clone(&self.allocator)),
        }
    }
}

impl ByteSink for WriteBuffer {
    fn position(&self) -> usize {
        self.bytes.len()
    }

    fn put_u8(&mut self, byte: u8) -> SnapshotResult<()> {
        self.reserve(1)?;
        self.bytes.push(byte);
        Ok(())
    }

    fn put_slice(&mut self, bytes: &[u8]) -> SnapshotResult<()> {
        self.reserve(bytes.len())?;
        self.bytes.extend_from_slice(bytes);
        Ok(())
    }
}

impl Drop for WriteBuffer {
    fn drop(&mut self) {
        // Aborted encode: hand the partial buffer back
        if self.granted > 0 {
            self.allocator.release(self.granted);
        }
    }
}

impl fmt::Debug for WriteBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WriteBuffer")
            .field("len", &self.bytes.len())
            .field("granted", &self.granted)
            .field("allocator", &self.allocator.kind())
            .finish()
    }
}

/// Encoded snapshot bytes owned by exactly one holder.
///
/// Dropping a payload releases its bytes through the allocator that produced
/// them.
pub struct Payload {
    bytes: Vec<u8>,
    granted: usize,
    allocator: Option<Arc<dyn Reallocator>>,
}

impl Payload {
    /// Wrap bytes allocated by the host outside any reallocator
    pub fn from_vec(bytes: Vec<u8>) -> Self {
        Self {
            bytes,
            granted: 0,
            allocator: None,
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn allocator_kind(&self) -> AllocatorKind {
        self.allocator
            .as_ref()
            .map_or(AllocatorKind::Host, |alloc| alloc.kind())
    }
}

impl AsRef<[u8]> for Payload {
    fn as_ref(&self) -> &[u8] {
        &self.bytes
    }
}

impl Drop for Payload {
    fn drop(&mut self) {
        if let Some(allocator) = &self.allocator {
            if self.granted > 0 {
                allocator.release(self.granted);
            }
        }
    }
}

impl fmt::Debug for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Payload")
            .field("len", &self.bytes.len())
            .field("allocator", &self.allocator_kind())
            .finish()
    }
}

impl Default for WriteBuffer {
    fn default() -> Self {
        Self::new(HostAllocator::shared())
    }
}

thread_local! {
    static SCRATCH_BUFFER: RefCell<Vec<u8>> = RefCell::new(Vec::with_capacity(SCRATCH_CAPACITY));
}

/// Run `f` with this thread's cleared scratch buffer.
///
/// Nested calls (a map key that itself contains a map) get a fresh vector
/// instead of the busy thread-local one.
pub fn with_scratch_buffer<F, R>(f: F) -> R
where
    F: FnOnce(&mut Vec<u8>) -> R,
{
    SCRATCH_BUFFER.with(|cell| match cell.try_borrow_mut() {
        Ok(mut buffer) => {
            buffer.clear();
            f(&mut buffer)
        }
        Err(_) => {
            let mut fresh = Vec::new();
            f(&mut fresh)
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alloc::{BoundedAllocator, TrackingAllocator};

    #[test]
    fn test_buffer_grows_through_allocator() {
        let tracker = Arc::new(TrackingAllocator::new());
        let mut buffer = WriteBuffer::new(tracker.clone());
        buffer.put_slice(&[7u8; 100]).unwrap();
        assert_eq!(buffer.len(), 100);
        assert!(buffer.granted() >= 100);
        assert_eq!(tracker.outstanding(), buffer.granted());
    }

    #[test]
    fn test_payload_releases_on_drop() {
        let tracker = Arc::new(TrackingAllocator::new());
        let mut buffer = WriteBuffer::new(tracker.clone());
        buffer.put_u8(1).unwrap();
        let payload = buffer.into_payload();
        assert_eq!(payload.as_bytes(), &[1]);
        assert_eq!(payload.allocator_kind(), AllocatorKind::Tracking);
        assert!(tracker.outstanding() > 0);
        drop(payload);
        assert_eq!(tracker.outstanding(), 0);
    }

    #[test]
    fn test_aborted_buffer_releases_on_drop() {
        let tracker = Arc::new(TrackingAllocator::new());
        {
            let mut buffer = WriteBuffer::new(tracker.clone());
            buffer.put_slice(&[0u8; 500]).unwrap();
        }
        assert_eq!(tracker.outstanding(), 0);
        assert_eq!(tracker.releases(), 1);
    }

    #[test]
    fn test_bounded_buffer_fills_exactly_to_quota() {
        let mut buffer = WriteBuffer::new(Arc::new(BoundedAllocator::new(100)));
        buffer.put_slice(&[0u8; 64]).unwrap();
        // Doubling to 128 is refused, the exact 100 is granted
        buffer.put_slice(&[0u8; 36]).unwrap();
        assert_eq!(buffer.granted(), 100);
        let err = buffer.put_u8(0).unwrap_err();
        assert!(matches!(err, SnapshotError::OutOfSpace { .. }));
    }

    #[test]
    fn test_scratch_buffer_nests() {
        let outer = with_scratch_buffer(|outer| {
            outer.push(1);
            let inner = with_scratch_buffer(|inner| {
                inner.push(2);
                inner.clone()
            });
            assert_eq!(inner, vec![2]);
            outer.clone()
        });
        assert_eq!(outer, vec![1]);
    }

    #[test]
    fn test_scratch_buffer_cleared_between_uses() {
        with_scratch_buffer(|buffer| buffer.extend_from_slice(b"stale"));
        with_scratch_buffer(|buffer| assert!(buffer.is_empty()));
    }
}
