//! Message envelope
//!
//! A message owns its encoded snapshot. The bytes go back to the allocator
//! that produced them when the message is dropped, whether it was delivered,
//! cleared from a queue or refused by the registry.

use isolate_types::{PortId, Priority, ILLEGAL_PORT};
use snapshot_codec::Payload;

/// One encoded value in flight between ports
#[derive(Debug)]
pub struct Message {
    dest: PortId,
    reply: PortId,
    payload: Payload,
    priority: Priority,
}

impl Message {
    pub fn new(dest: PortId, reply: PortId, payload: Payload, priority: Priority) -> Self {
        Self {
            dest,
            reply,
            payload,
            priority,
        }
    }

    /// Normal priority message with no reply port
    pub fn to(dest: PortId, payload: Payload) -> Self {
        Self::new(dest, ILLEGAL_PORT, payload, Priority::Normal)
    }

    pub fn dest(&self) -> PortId {
        self.dest
    }

    pub fn reply(&self) -> PortId {
        self.reply
    }

    pub fn priority(&self) -> Priority {
        self.priority
    }

    pub fn bytes(&self) -> &[u8] {
        self.payload.as_bytes()
    }

    pub fn len(&self) -> usize {
        self.payload.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }

    pub fn into_payload(self) -> Payload {
        self.payload
    }
}
