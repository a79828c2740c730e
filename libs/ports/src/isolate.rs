//! Isolate handle
//!
//! ## Purpose
//!
//! An isolate owns a managed heap and a main port. Messages posted to any of
//! its ports are decoded into that heap and handed to the isolate's message
//! callback, one at a time, in arrival order.
//!
//! ## Running
//!
//! ```text
//! handle_next_message   one message on the calling thread, never blocks
//! run_loop              drain on the calling thread until no live port is left
//! spawn_loop            the same loop on a dedicated consumer thread
//! ```
//!
//! The callback runs with the heap lock held. To answer a message from inside
//! the callback, post with [`crate::api::post_value`] using the heap it was
//! given rather than [`Isolate::send`].

use std::sync::Arc;

use isolate_types::{Heap, PortId, Value};
use parking_lot::Mutex;
use snapshot_codec::{SnapshotReader, SnapshotResult};
use tracing::{debug, warn};
use transport_config::CodecLimits;

use crate::api;
use crate::error::{PortError, PortResult};
use crate::handler::{HandlerCore, MessageHandler};
use crate::message::Message;
use crate::port_map::PortMap;
use crate::runner::{self, HandlerRunner, TerminationPolicy};

/// Isolate message callback
///
/// Receives the isolate heap, the message envelope and the decoded root, or
/// the decode error for a malformed payload. Returning false stops the
/// isolate's handler. A decode error stops it whatever the callback returns.
pub type IsolateCallback = dyn FnMut(&mut Heap, &Message, SnapshotResult<Value>) -> bool + Send;

struct IsolateState {
    heap: Heap,
    on_message: Box<IsolateCallback>,
}

/// Handler decoding messages into an isolate heap
pub(crate) struct IsolateHandler {
    core: HandlerCore,
    state: Mutex<IsolateState>,
    limits: CodecLimits,
}

impl MessageHandler for IsolateHandler {
    fn core(&self) -> &HandlerCore {
        &self.core
    }

    fn handle_message(&self, message: Message) -> bool {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        let decoded = SnapshotReader::new(message.bytes())
            .with_limits(self.limits)
            .read_value(&mut state.heap);
        match &decoded {
            Ok(_) => self.core.stats().record_handled(),
            Err(error) => {
                self.core.stats().record_decode_failure();
                warn!(
                    port = %message.dest(),
                    isolate = self.core.name(),
                    %error,
                    "Isolate failed to decode message, stopping"
                );
            }
        }
        let failed = decoded.is_err();
        let keep_going = (state.on_message)(&mut state.heap, &message, decoded);
        keep_going && !failed
    }
}

/// A heap plus the ports that feed it
pub struct Isolate {
    handler: Arc<IsolateHandler>,
    main_port: PortId,
}

impl Isolate {
    /// Create an isolate with an empty heap and a live main port
    pub fn new<F>(name: &str, on_message: F) -> Self
    where
        F: FnMut(&mut Heap, &Message, SnapshotResult<Value>) -> bool + Send + 'static,
    {
        Self::with_heap(name, Heap::new(), on_message)
    }

    pub fn with_heap<F>(name: &str, heap: Heap, on_message: F) -> Self
    where
        F: FnMut(&mut Heap, &Message, SnapshotResult<Value>) -> bool + Send + 'static,
    {
        let handler = Arc::new(IsolateHandler {
            core: HandlerCore::new(name),
            state: Mutex::new(IsolateState {
                heap,
                on_message: Box::new(on_message),
            }),
            limits: transport_config::global().limits,
        });
        let map = PortMap::global();
        let main_port = map.create_port(handler.clone());
        map.set_live(main_port);
        debug!(isolate = name, port = %main_port, "Isolate started");
        Self { handler, main_port }
    }

    pub fn name(&self) -> &str {
        self.handler.core.name()
    }

    pub fn main_port(&self) -> PortId {
        self.main_port
    }

    pub fn core(&self) -> &HandlerCore {
        &self.handler.core
    }

    /// Open another port on this isolate, live unless `live` is false
    pub fn open_port(&self, live: bool) -> PortId {
        let map = PortMap::global();
        let port = map.create_port(self.handler.clone());
        if live {
            map.set_live(port);
        }
        port
    }

    /// Close one of this isolate's ports. Ports owned by anyone else are
    /// left alone.
    pub fn close_port(&self, port: PortId) -> bool {
        let map = PortMap::global();
        let owned = map
            .lookup(port)
            .is_some_and(|owner| owner.core().id() == self.handler.core.id());
        owned && map.close_port(port)
    }

    pub fn has_live_ports(&self) -> bool {
        self.handler.core.has_live_ports()
    }

    /// Run `f` against the isolate heap
    pub fn with_heap_mut<R>(&self, f: impl FnOnce(&mut Heap) -> R) -> R {
        f(&mut self.handler.state.lock().heap)
    }

    /// Encode `value` from this isolate's heap and post it to `dest`
    pub fn send(&self, dest: PortId, reply: PortId, value: Value) -> PortResult<()> {
        let state = self.handler.state.lock();
        api::post_value(dest, reply, &state.heap, value)
    }

    /// Handle at most one queued message on the calling thread
    ///
    /// Returns `Ok(true)` after handling a message, `Ok(false)` when the
    /// queue is empty, and [`PortError::HandlerStopped`] once the handler
    /// has stopped.
    pub fn handle_next_message(&self) -> PortResult<bool> {
        let core = &self.handler.core;
        if core.is_stopped() {
            return Err(PortError::HandlerStopped { handler: core.id() });
        }
        let Some(message) = core.queue().dequeue() else {
            return Ok(false);
        };
        if runner::deliver(self.handler.as_ref(), message) {
            Ok(true)
        } else {
            core.stop();
            Err(PortError::HandlerStopped { handler: core.id() })
        }
    }

    /// Drain messages on the calling thread until no live port remains or
    /// the handler stops
    pub fn run_loop(&self) {
        runner::drain(self.handler.as_ref(), TerminationPolicy::NoLivePorts);
    }

    /// Run the message loop on a dedicated consumer thread
    pub fn spawn_loop(&self) -> PortResult<HandlerRunner> {
        let core = &self.handler.core;
        if core.is_stopped() {
            return Err(PortError::HandlerStopped { handler: core.id() });
        }
        let prefix = &transport_config::global().ports.thread_name_prefix;
        HandlerRunner::spawn(
            self.handler.clone(),
            TerminationPolicy::NoLivePorts,
            1,
            prefix,
        )
    }

    /// Close every port and drop anything still queued
    pub fn shutdown(&self) -> usize {
        let core = &self.handler.core;
        let closed = PortMap::global().close_all(core.id());
        let dropped = core.queue().clear();
        core.stats().record_dropped(dropped as u64);
        core.stop();
        debug!(isolate = core.name(), closed, dropped, "Isolate shut down");
        closed
    }
}

impl Drop for Isolate {
    fn drop(&mut self) {
        if self.handler.core.port_count() > 0 || !self.handler.core.queue().is_empty() {
            self.shutdown();
        }
    }
}

impl std::fmt::Debug for Isolate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Isolate")
            .field("main_port", &self.main_port)
            .field("core", &self.handler.core)
            .finish()
    }
}
