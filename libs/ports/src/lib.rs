//! # Message Ports - Cross-Isolate Message Transport
//!
//! ## Purpose
//!
//! Route encoded snapshots between isolates and native embedder code. Every
//! receiving endpoint is a port; every port belongs to one handler; every
//! handler owns one FIFO queue drained by its consumer.
//!
//! ## Architecture Role
//!
//! ```text
//! sender ──encode──► Message ──post──► PortMap ──enqueue──► MessageQueue
//!   (snapshot-codec)                (global registry)          │
//!                                                   notify ◄───┘
//!                                                      │
//!                                   HandlerRunner ◄────┘
//!                                        │
//!                         handle_message ─► decode ─► Isolate heap / native callback
//! ```
//!
//! ## Threading
//!
//! Posting is allowed from any thread. A handler's messages are consumed by
//! its own runner thread(s), or on the calling thread through
//! [`Isolate::handle_next_message`] and [`Isolate::run_loop`]. The registry
//! lock is always taken before a queue lock.
//!
//! ## What This Crate Does NOT Contain
//! - Wire format or graph traversal (belongs in libs/codec)
//! - Heap or native tree storage (belongs in libs/types)
//! - Garbage collection of unreachable isolate objects

pub mod api;
pub mod error;
pub mod handler;
pub mod isolate;
pub mod message;
pub mod native_port;
pub mod port_map;
pub mod queue;
pub mod runner;

pub use api::{
    close_native_port, get_receive_port, has_live_ports, new_native_port, new_send_port,
    post_int_array, post_native, post_value, try_post_native,
};
pub use error::{PortError, PortResult};
pub use handler::{
    HandlerCore, HandlerId, HandlerStats, HandlerStatsSnapshot, MessageHandler, NotifyCallback,
};
pub use isolate::{Isolate, IsolateCallback};
pub use message::Message;
pub use native_port::{NativeCallback, NativePortHandler, DEFAULT_NATIVE_PORT_NAME};
pub use port_map::{PortMap, PortMapStats, PortMapStatsSnapshot};
pub use queue::MessageQueue;
pub use runner::{HandlerRunner, TerminationPolicy};

pub use isolate_types::{PortId, Priority, ILLEGAL_PORT};
