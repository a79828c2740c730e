//! Port layer errors

use isolate_types::{HeapError, PortId};
use snapshot_codec::SnapshotError;
use thiserror::Error;

use crate::handler::HandlerId;

/// Failures raised by the port layer
///
/// Snapshot failures keep their full codec context so a single log line
/// still points at the offending offset or kind.
#[derive(Debug, Error)]
pub enum PortError {
    #[error("No handler registered for {port}")]
    InvalidPort { port: PortId },

    #[error("Handler {handler} has stopped")]
    HandlerStopped { handler: HandlerId },

    #[error("Failed to encode message for {port}: {source}")]
    Encode {
        port: PortId,
        #[source]
        source: SnapshotError,
    },

    #[error("Failed to decode message: {0}")]
    Decode(#[from] SnapshotError),

    #[error("Heap allocation failed: {0}")]
    Heap(#[from] HeapError),

    #[error("Failed to spawn consumer thread {name}: {source}")]
    Spawn {
        name: String,
        #[source]
        source: std::io::Error,
    },
}

impl PortError {
    pub fn encode(port: PortId, source: SnapshotError) -> Self {
        Self::Encode { port, source }
    }

    /// True when the failure came from the message content rather than the
    /// port or thread machinery
    pub fn is_payload_error(&self) -> bool {
        matches!(self, Self::Encode { .. } | Self::Decode(_))
    }
}

/// Result alias for port operations
pub type PortResult<T> = std::result::Result<T, PortError>;
