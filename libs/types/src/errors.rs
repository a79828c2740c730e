//! Errors raised by the isolate heap

use thiserror::Error;

/// Heap allocation and mutation errors
#[derive(Debug, Error, Clone, PartialEq)]
pub enum HeapError {
    /// The heap refused to grow past its object limit
    #[error("Heap exhausted: object limit {limit} reached")]
    ObjectLimit { limit: usize },

    /// Handle does not name an object in this heap
    #[error("Invalid object handle #{index} (heap has {len} objects)")]
    InvalidHandle { index: usize, len: usize },

    /// Operation needs a different kind of object
    #[error("Object #{index} is a {found}, expected {expected}")]
    WrongKind {
        index: usize,
        expected: &'static str,
        found: &'static str,
    },

    /// Container index outside the container
    #[error("Index {index} out of range for length {length}")]
    IndexOutOfRange { index: usize, length: usize },

    /// Typed data byte length is not a whole number of elements
    #[error("{kind} needs a multiple of {element_size} bytes, got {byte_len}")]
    PartialElement {
        kind: &'static str,
        element_size: usize,
        byte_len: usize,
    },

    /// View window does not fit inside its backing store
    #[error("View [{offset_in_bytes}, +{byte_len}) exceeds backing store of {backing_len} bytes")]
    ViewOutOfRange {
        offset_in_bytes: usize,
        byte_len: usize,
        backing_len: usize,
    },
}

pub type HeapResult<T> = std::result::Result<T, HeapError>;
