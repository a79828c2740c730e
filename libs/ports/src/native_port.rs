//! Native ports
//!
//! A native port delivers messages to an embedder callback instead of an
//! isolate. Each message is decoded into a fresh [`NativeArena`] and the
//! callback borrows the tree for the duration of the call.
//!
//! The port is live from creation and its consumers run until the port is
//! closed. A payload that fails to decode stops the port's handler; later
//! posts are accepted and dropped until the owner closes the port.

use std::collections::HashMap;
use std::sync::Arc;

use isolate_types::{NativeArena, NativeRef, PortId};
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use snapshot_codec::SnapshotReader;
use tracing::{debug, warn};
use transport_config::CodecLimits;

use crate::error::PortResult;
use crate::handler::{HandlerCore, MessageHandler};
use crate::message::Message;
use crate::port_map::PortMap;
use crate::runner::{HandlerRunner, TerminationPolicy};

/// Name used when the embedder does not supply one
pub const DEFAULT_NATIVE_PORT_NAME: &str = "<UnnamedNativePort>";

/// Embedder callback: `(dest, reply, arena, root)`
pub type NativeCallback = dyn Fn(PortId, PortId, &NativeArena, NativeRef) + Send + Sync;

static NATIVE_PORTS: Lazy<Mutex<HashMap<PortId, HandlerRunner>>> =
    Lazy::new(|| Mutex::new(HashMap::new()));

/// Handler decoding every message into a native tree
pub struct NativePortHandler {
    core: HandlerCore,
    callback: Box<NativeCallback>,
    limits: CodecLimits,
}

impl NativePortHandler {
    pub fn new(
        name: Option<&str>,
        callback: Box<NativeCallback>,
        limits: CodecLimits,
    ) -> Self {
        Self {
            core: HandlerCore::new(name.unwrap_or(DEFAULT_NATIVE_PORT_NAME)),
            callback,
            limits,
        }
    }
}

impl MessageHandler for NativePortHandler {
    fn core(&self) -> &HandlerCore {
        &self.core
    }

    fn handle_message(&self, message: Message) -> bool {
        let mut arena = NativeArena::new();
        let decoded = SnapshotReader::new(message.bytes())
            .with_limits(self.limits)
            .read_native(&mut arena);
        match decoded {
            Ok(root) => {
                (self.callback)(message.dest(), message.reply(), &arena, root);
                self.core.stats().record_handled();
                true
            }
            Err(error) => {
                self.core.stats().record_decode_failure();
                warn!(
                    port = %message.dest(),
                    name = self.core.name(),
                    %error,
                    "Native port failed to decode message"
                );
                false
            }
        }
    }
}

/// Register a live native port and start its consumers
///
/// A concurrent port is drained by `native_port_workers` threads, so the
/// callback may run in parallel with itself.
pub fn open(
    name: Option<&str>,
    callback: Box<NativeCallback>,
    concurrent: bool,
) -> PortResult<PortId> {
    let config = transport_config::global();
    let handler = Arc::new(NativePortHandler::new(name, callback, config.limits));
    let map = PortMap::global();
    let port = map.create_port(handler.clone());
    map.set_live(port);

    let workers = if concurrent {
        config.ports.native_port_workers
    } else {
        1
    };
    let runner = match HandlerRunner::spawn(
        handler.clone(),
        TerminationPolicy::PortsClosed,
        workers,
        &config.ports.thread_name_prefix,
    ) {
        Ok(runner) => runner,
        Err(error) => {
            map.close_port(port);
            return Err(error);
        }
    };
    debug!(%port, name = handler.name(), workers, "Opened native port");
    NATIVE_PORTS.lock().insert(port, runner);
    Ok(port)
}

/// Close a native port opened by [`open`]
///
/// Waits for the port's consumers to finish unless called from one of them.
/// Returns false if `port` is not an open native port.
pub fn close(port: PortId) -> bool {
    let Some(runner) = NATIVE_PORTS.lock().remove(&port) else {
        return false;
    };
    PortMap::global().close_port(port);
    if runner.is_worker_thread() {
        debug!(%port, "Closed native port from its own callback");
    } else {
        runner.join();
        debug!(%port, "Closed native port");
    }
    true
}
