//! Process-global port registry
//!
//! ## Purpose
//!
//! Maps every open [`PortId`] to the handler that owns it and routes posted
//! messages into that handler's queue.
//!
//! ## Lock Ordering
//!
//! `PortMap.ports` is taken before any handler's queue lock. Consumers never
//! touch the registry while holding their queue lock, and the notify hook
//! runs after the registry lock is released.
//!
//! ## Guarantees
//!
//! - Ids come from one process-wide counter starting at 1 and are never
//!   reused, so a stale id can only miss.
//! - `post` enqueues while holding the registry lock. Once `close_port`
//!   returns, no further message can land under that id.
//! - Messages already queued when a port closes stay with the handler until
//!   it drains or clears its queue.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;

use isolate_types::PortId;
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use tracing::{debug, trace, warn};

use crate::handler::{HandlerId, MessageHandler};
use crate::message::Message;

static NEXT_PORT_ID: AtomicI64 = AtomicI64::new(1);

static GLOBAL_PORT_MAP: Lazy<PortMap> = Lazy::new(PortMap::new);

struct PortEntry {
    handler: Arc<dyn MessageHandler>,
    live: bool,
}

/// Registry traffic counters
#[derive(Debug, Default)]
pub struct PortMapStats {
    pub ports_created: AtomicU64,
    pub ports_closed: AtomicU64,
    pub messages_posted: AtomicU64,
    pub unknown_port_posts: AtomicU64,
    pub stopped_handler_drops: AtomicU64,
}

/// Point-in-time copy of [`PortMapStats`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PortMapStatsSnapshot {
    pub ports_created: u64,
    pub ports_closed: u64,
    pub messages_posted: u64,
    pub unknown_port_posts: u64,
    pub stopped_handler_drops: u64,
}

impl PortMapStats {
    fn bump(counter: &AtomicU64, by: u64) {
        counter.fetch_add(by, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> PortMapStatsSnapshot {
        PortMapStatsSnapshot {
            ports_created: self.ports_created.load(Ordering::Relaxed),
            ports_closed: self.ports_closed.load(Ordering::Relaxed),
            messages_posted: self.messages_posted.load(Ordering::Relaxed),
            unknown_port_posts: self.unknown_port_posts.load(Ordering::Relaxed),
            stopped_handler_drops: self.stopped_handler_drops.load(Ordering::Relaxed),
        }
    }
}

/// Port id to handler routing table
pub struct PortMap {
    ports: Mutex<HashMap<PortId, PortEntry>>,
    stats: PortMapStats,
}

impl PortMap {
    /// A standalone registry. Ids still come from the process-wide counter.
    pub fn new() -> Self {
        Self {
            ports: Mutex::new(HashMap::new()),
            stats: PortMapStats::default(),
        }
    }

    /// The registry shared by every isolate and native port in the process
    pub fn global() -> &'static PortMap {
        &GLOBAL_PORT_MAP
    }

    /// Register a new, not yet live, port owned by `handler`
    pub fn create_port(&self, handler: Arc<dyn MessageHandler>) -> PortId {
        let port = PortId::new(NEXT_PORT_ID.fetch_add(1, Ordering::Relaxed));
        let mut ports = self.ports.lock();
        handler.core().port_added();
        debug!(%port, handler = %handler.core().id(), name = handler.name(), "Registering port");
        ports.insert(
            port,
            PortEntry {
                handler,
                live: false,
            },
        );
        PortMapStats::bump(&self.stats.ports_created, 1);
        port
    }

    /// Mark an existing port live. Returns false for unknown ports.
    pub fn set_live(&self, port: PortId) -> bool {
        let mut ports = self.ports.lock();
        let Some(entry) = ports.get_mut(&port) else {
            warn!(%port, "set_live on unknown port");
            return false;
        };
        if !entry.live {
            entry.live = true;
            entry.handler.core().port_made_live();
        }
        true
    }

    /// Remove one port. Returns false if it was not registered.
    pub fn close_port(&self, port: PortId) -> bool {
        let removed = {
            let mut ports = self.ports.lock();
            let removed = ports.remove(&port);
            if let Some(entry) = &removed {
                entry.handler.core().port_removed(entry.live);
            }
            removed
        };
        let Some(entry) = removed else {
            debug!(%port, "close_port on unknown port");
            return false;
        };
        let core = entry.handler.core();
        PortMapStats::bump(&self.stats.ports_closed, 1);
        debug!(%port, handler = %core.id(), live = entry.live, "Closed port");
        // consumers re-check their termination policy
        core.queue().wake_all();
        true
    }

    /// Remove every port owned by `handler`, returning how many were closed
    pub fn close_all(&self, handler: HandlerId) -> usize {
        let mut closed = Vec::new();
        {
            let mut ports = self.ports.lock();
            ports.retain(|port, entry| {
                if entry.handler.core().id() == handler {
                    entry.handler.core().port_removed(entry.live);
                    closed.push((*port, Arc::clone(&entry.handler)));
                    false
                } else {
                    true
                }
            });
        }
        PortMapStats::bump(&self.stats.ports_closed, closed.len() as u64);
        if let Some((_, owner)) = closed.first() {
            owner.core().queue().wake_all();
        }
        debug!(%handler, count = closed.len(), "Closed all ports of handler");
        closed.len()
    }

    /// Route a message to the owner of its destination port.
    ///
    /// Returns false, dropping the message, when no such port exists. A
    /// message for a stopped handler is dropped but counts as delivered.
    pub fn post(&self, message: Message) -> bool {
        let dest = message.dest();
        let priority = message.priority();
        let (handler, refused) = {
            let ports = self.ports.lock();
            let Some(entry) = ports.get(&dest) else {
                PortMapStats::bump(&self.stats.unknown_port_posts, 1);
                warn!(port = %dest, bytes = message.len(), "Post to unknown port");
                return false;
            };
            let handler = Arc::clone(&entry.handler);
            if handler.core().is_stopped() {
                (handler, Some(message))
            } else {
                handler.core().queue().enqueue(message);
                (handler, None)
            }
        };

        if let Some(message) = refused {
            PortMapStats::bump(&self.stats.stopped_handler_drops, 1);
            handler.core().stats().record_dropped(1);
            trace!(port = %dest, handler = %handler.core().id(), "dropped message for stopped handler");
            drop(message);
            return true;
        }

        PortMapStats::bump(&self.stats.messages_posted, 1);
        handler.message_notify(priority);
        true
    }

    /// Owner of `port`, for diagnostics
    pub fn lookup(&self, port: PortId) -> Option<Arc<dyn MessageHandler>> {
        self.ports
            .lock()
            .get(&port)
            .map(|entry| Arc::clone(&entry.handler))
    }

    /// True while `port` is registered
    pub fn is_active(&self, port: PortId) -> bool {
        self.ports.lock().contains_key(&port)
    }

    pub fn is_live(&self, port: PortId) -> bool {
        self.ports
            .lock()
            .get(&port)
            .is_some_and(|entry| entry.live)
    }

    pub fn port_count(&self) -> usize {
        self.ports.lock().len()
    }

    pub fn stats(&self) -> PortMapStatsSnapshot {
        self.stats.snapshot()
    }
}

impl Default for PortMap {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for PortMap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PortMap")
            .field("ports", &self.port_count())
            .field("stats", &self.stats)
            .finish()
    }
}
