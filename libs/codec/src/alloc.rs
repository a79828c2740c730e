//! Reallocators backing snapshot output buffers
//!
//! ## Purpose
//!
//! A writer never grows its buffer on its own. Every growth step goes through
//! a caller-supplied [`Reallocator`], which may refuse. A refusal aborts the
//! encode with `OutOfSpace` and the partial buffer is handed back to the same
//! reallocator through [`Reallocator::release`].
//!
//! ## Provided Allocators
//!
//! - [`HostAllocator`]: the process heap; refuses only when reservation fails
//! - [`BoundedAllocator`]: refuses any buffer larger than a byte quota
//! - [`TrackingAllocator`]: counts outstanding bytes, for leak accounting
//!
//! The allocator kind travels with every payload so the owner of a message can
//! tell where its bytes came from.

use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use thiserror::Error;

/// Which allocator produced a buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AllocatorKind {
    Host,
    Bounded,
    Tracking,
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum AllocError {
    #[error("quota exceeded: {requested} bytes requested, limit {limit}")]
    QuotaExceeded { requested: usize, limit: usize },

    #[error("host refused to reserve {requested} bytes")]
    HostRefused { requested: usize },
}

/// Growth policy for a snapshot output buffer.
///
/// `reallocate` must leave `buffer` able to hold `new_size` bytes without
/// further reallocation, keeping its current contents, or refuse and leave it
/// untouched.
pub trait Reallocator: Send + Sync + fmt::Debug {
    fn kind(&self) -> AllocatorKind;

    fn reallocate(
        &self,
        buffer: &mut Vec<u8>,
        old_size: usize,
        new_size: usize,
    ) -> Result<(), AllocError>;

    /// Give back `size` bytes previously granted by `reallocate`
    fn release(&self, _size: usize) {}
}

fn reserve_total(buffer: &mut Vec<u8>, new_size: usize) -> Result<(), AllocError> {
    let additional = new_size.saturating_sub(buffer.len());
    buffer
        .try_reserve_exact(additional)
        .map_err(|_| AllocError::HostRefused {
            requested: new_size,
        })
}

/// Process heap allocator
#[derive(Debug, Default, Clone, Copy)]
pub struct HostAllocator;

impl HostAllocator {
    pub fn shared() -> Arc<dyn Reallocator> {
        Arc::new(HostAllocator)
    }
}

impl Reallocator for HostAllocator {
    fn kind(&self) -> AllocatorKind {
        AllocatorKind::Host
    }

    fn reallocate(
        &self,
        buffer: &mut Vec<u8>,
        _old_size: usize,
        new_size: usize,
    ) -> Result<(), AllocError> {
        reserve_total(buffer, new_size)
    }
}

/// Host allocator with a per-buffer byte quota
#[derive(Debug, Clone, Copy)]
pub struct BoundedAllocator {
    limit: usize,
}

impl BoundedAllocator {
    pub fn new(limit: usize) -> Self {
        Self { limit }
    }

    pub fn limit(&self) -> usize {
        self.limit
    }
}

impl Reallocator for BoundedAllocator {
    fn kind(&self) -> AllocatorKind {
        AllocatorKind::Bounded
    }

    fn reallocate(
        &self,
        buffer: &mut Vec<u8>,
        _old_size: usize,
        new_size: usize,
    ) -> Result<(), AllocError> {
        if new_size > self.limit {
            return Err(AllocError::QuotaExceeded {
                requested: new_size,
                limit: self.limit,
            });
        }
        reserve_total(buffer, new_size)
    }
}

/// Allocator that accounts for every byte it grants
#[derive(Debug, Default)]
pub struct TrackingAllocator {
    outstanding: AtomicUsize,
    peak: AtomicUsize,
    grants: AtomicU64,
    releases: AtomicU64,
    limit: Option<usize>,
}

impl TrackingAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Tracking allocator that refuses once `limit` bytes are outstanding
    pub fn with_limit(limit: usize) -> Self {
        Self {
            limit: Some(limit),
            ..Self::default()
        }
    }

    /// Bytes granted and not yet released
    pub fn outstanding(&self) -> usize {
        self.outstanding.load(Ordering::Acquire)
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::Acquire)
    }

    pub fn grants(&self) -> u64 {
        self.grants.load(Ordering::Relaxed)
    }

    pub fn releases(&self) -> u64 {
        self.releases.load(Ordering::Relaxed)
    }
}

impl Reallocator for TrackingAllocator {
    fn kind(&self) -> AllocatorKind {
        AllocatorKind::Tracking
    }

    fn reallocate(
        &self,
        buffer: &mut Vec<u8>,
        old_size: usize,
        new_size: usize,
    ) -> Result<(), AllocError> {
        let growth = new_size.saturating_sub(old_size);
        if let Some(limit) = self.limit {
            let after = self.outstanding().saturating_add(growth);
            if after > limit {
                return Err(AllocError::QuotaExceeded {
                    requested: after,
                    limit,
                });
            }
        }
        reserve_total(buffer, new_size)?;
        let now = self.outstanding.fetch_add(growth, Ordering::AcqRel) + growth;
        self.peak.fetch_max(now, Ordering::AcqRel);
        self.grants.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn release(&self, size: usize) {
        self.outstanding.fetch_sub(size, Ordering::AcqRel);
        self.releases.fetch_add(1, Ordering::Relaxed);
    }
}
