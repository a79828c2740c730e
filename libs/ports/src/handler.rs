//! Message handlers
//!
//! ## Purpose
//!
//! A handler owns one queue and any number of ports. The registry moves
//! posted messages into the owner's queue and then calls
//! [`MessageHandler::message_notify`]; a consumer drains the queue through
//! [`MessageHandler::handle_message`].
//!
//! ## Port Accounting
//!
//! ```text
//! create_port ──► port_count += 1
//! set_live    ──► live_count += 1
//! close_port  ──► port_count -= 1, live_count -= 1 if it was live
//! ```
//!
//! Counters are maintained by the registry while it holds its lock. A handler
//! whose live count reaches zero with an empty queue may terminate.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};

use isolate_types::Priority;
use tracing::debug;

use crate::message::Message;
use crate::queue::MessageQueue;

static NEXT_HANDLER_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique handler identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandlerId(u64);

impl HandlerId {
    fn next() -> Self {
        Self(NEXT_HANDLER_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for HandlerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "handler-{}", self.0)
    }
}

/// Hook run after a message is linked into the queue
pub type NotifyCallback = Box<dyn Fn(Priority) + Send + Sync>;

/// Delivery counters for one handler
#[derive(Debug, Default)]
pub struct HandlerStats {
    pub handled: AtomicU64,
    pub dropped: AtomicU64,
    pub decode_failures: AtomicU64,
    pub oob_notifications: AtomicU64,
}

impl HandlerStats {
    pub fn record_handled(&self) {
        self.handled.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dropped(&self, count: u64) {
        self.dropped.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_decode_failure(&self) {
        self.decode_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> HandlerStatsSnapshot {
        HandlerStatsSnapshot {
            handled: self.handled.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            decode_failures: self.decode_failures.load(Ordering::Relaxed),
            oob_notifications: self.oob_notifications.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`HandlerStats`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HandlerStatsSnapshot {
    pub handled: u64,
    pub dropped: u64,
    pub decode_failures: u64,
    pub oob_notifications: u64,
}

/// State every handler embeds: queue, port counters, stop flag and stats
pub struct HandlerCore {
    id: HandlerId,
    name: String,
    queue: MessageQueue,
    port_count: AtomicUsize,
    live_count: AtomicUsize,
    stopped: AtomicBool,
    notify: Option<NotifyCallback>,
    stats: HandlerStats,
}

impl HandlerCore {
    pub fn new(name: impl Into<String>) -> Self {
        let core = Self {
            id: HandlerId::next(),
            name: name.into(),
            queue: MessageQueue::new(),
            port_count: AtomicUsize::new(0),
            live_count: AtomicUsize::new(0),
            stopped: AtomicBool::new(false),
            notify: None,
            stats: HandlerStats::default(),
        };
        debug!(handler = %core.id, name = %core.name, "created message handler");
        core
    }

    /// Attach an external wake-up callback run after every enqueue
    pub fn with_notify(mut self, notify: impl Fn(Priority) + Send + Sync + 'static) -> Self {
        self.notify = Some(Box::new(notify));
        self
    }

    pub fn id(&self) -> HandlerId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn queue(&self) -> &MessageQueue {
        &self.queue
    }

    pub fn stats(&self) -> &HandlerStats {
        &self.stats
    }

    pub fn port_count(&self) -> usize {
        self.port_count.load(Ordering::Acquire)
    }

    pub fn live_port_count(&self) -> usize {
        self.live_count.load(Ordering::Acquire)
    }

    pub fn has_live_ports(&self) -> bool {
        self.live_port_count() > 0
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    /// Mark the handler stopped and release blocked consumers
    pub fn stop(&self) {
        if !self.stopped.swap(true, Ordering::AcqRel) {
            debug!(handler = %self.id, name = %self.name, "message handler stopped");
        }
        self.queue.shutdown();
    }

    pub(crate) fn port_added(&self) {
        self.port_count.fetch_add(1, Ordering::AcqRel);
    }

    pub(crate) fn port_made_live(&self) {
        self.live_count.fetch_add(1, Ordering::AcqRel);
    }

    pub(crate) fn port_removed(&self, was_live: bool) {
        self.port_count.fetch_sub(1, Ordering::AcqRel);
        if was_live {
            self.live_count.fetch_sub(1, Ordering::AcqRel);
        }
    }

    fn run_notify(&self, priority: Priority) {
        if priority.is_oob() {
            self.stats.oob_notifications.fetch_add(1, Ordering::Relaxed);
        }
        if let Some(notify) = &self.notify {
            notify(priority);
        }
    }
}

impl fmt::Debug for HandlerCore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerCore")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("queued", &self.queue.len())
            .field("ports", &self.port_count())
            .field("live", &self.live_port_count())
            .field("stopped", &self.is_stopped())
            .finish()
    }
}

/// Consumer side of a set of ports
///
/// Implementations are shared between the registry and their consumer
/// threads, so they must be `Send + Sync`. A handler run by a single
/// consumer never sees `handle_message` re-entered.
pub trait MessageHandler: Send + Sync + 'static {
    fn core(&self) -> &HandlerCore;

    /// Process one dequeued message. Returning `false` stops the handler.
    fn handle_message(&self, message: Message) -> bool;

    /// Called by the registry after a message is linked into the queue
    fn message_notify(&self, priority: Priority) {
        self.core().run_notify(priority);
    }

    fn name(&self) -> &str {
        self.core().name()
    }
}
