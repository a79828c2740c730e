//! Port identifiers and message priorities

use std::fmt;

/// Process-unique name of a port.
///
/// Zero is reserved as the illegal port; every id handed out by the port
/// registry is nonzero and never reused while the process lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct PortId(i64);

/// The reserved "no port" value, used for messages without a reply port
pub const ILLEGAL_PORT: PortId = PortId(0);

impl PortId {
    /// Wrap a raw id. Zero yields [`ILLEGAL_PORT`].
    pub const fn new(raw: i64) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> i64 {
        self.0
    }

    pub const fn is_illegal(self) -> bool {
        self.0 == 0
    }
}

impl From<i64> for PortId {
    fn from(raw: i64) -> Self {
        Self(raw)
    }
}

impl fmt::Display for PortId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_illegal() {
            write!(f, "port:<illegal>")
        } else {
            write!(f, "port:{}", self.0)
        }
    }
}

/// Delivery priority of a message.
///
/// Priority never reorders a queue. An out-of-band message only asks the
/// receiving handler to wake eagerly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Priority {
    #[default]
    Normal,
    Oob,
}

impl Priority {
    pub fn is_oob(self) -> bool {
        matches!(self, Priority::Oob)
    }
}
