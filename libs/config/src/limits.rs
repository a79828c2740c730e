//! Codec limits
//!
//! The container ceiling is compiled in; configuration may only lower it.
//! Writers and readers consult the same [`CodecLimits`] so that anything a
//! writer accepts, a reader with the same flags accepts too.

use serde::{Deserialize, Serialize};

/// Hard ceiling on elements in any one container (array, map, string code
/// units, typed data elements, bigint digits)
pub const MAX_CONTAINER_LENGTH: usize = 1 << 28;

/// Default ceiling on nested containers along one path
pub const DEFAULT_MAX_NESTING_DEPTH: usize = 4096;

/// Default ceiling on one encoded message
pub const DEFAULT_MAX_MESSAGE_BYTES: usize = 256 * 1024 * 1024; // 256MB

/// Limits shared by snapshot writers and readers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CodecLimits {
    /// Largest declared container length accepted (default: MAX_CONTAINER_LENGTH)
    pub max_container_length: usize,
    /// Deepest container nesting accepted (default: 4096)
    pub max_nesting_depth: usize,
    /// Largest payload the embedder post path will produce (default: 256MB)
    pub max_message_bytes: usize,
}

impl Default for CodecLimits {
    fn default() -> Self {
        Self {
            max_container_length: MAX_CONTAINER_LENGTH,
            max_nesting_depth: DEFAULT_MAX_NESTING_DEPTH,
            max_message_bytes: DEFAULT_MAX_MESSAGE_BYTES,
        }
    }
}

impl CodecLimits {
    /// Limits with a lower container ceiling, for tests and constrained hosts
    pub fn with_max_container_length(mut self, max: usize) -> Self {
        self.max_container_length = max.min(MAX_CONTAINER_LENGTH);
        self
    }

    pub fn with_max_nesting_depth(mut self, depth: usize) -> Self {
        self.max_nesting_depth = depth;
        self
    }

    pub fn with_max_message_bytes(mut self, bytes: usize) -> Self {
        self.max_message_bytes = bytes;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_container_ceiling_cannot_be_raised() {
        let limits = CodecLimits::default().with_max_container_length(usize::MAX);
        assert_eq!(limits.max_container_length, MAX_CONTAINER_LENGTH);
        let limits = CodecLimits::default().with_max_container_length(10);
        assert_eq!(limits.max_container_length, 10);
    }
}
