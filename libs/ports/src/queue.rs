//! Per-handler FIFO message queue
//!
//! ## Ordering
//!
//! Messages leave in exactly the order they arrived. Priority is carried on
//! each message for the notify hook only; an out-of-band message never jumps
//! ahead of earlier traffic.
//!
//! ## Ownership
//!
//! `enqueue` takes the message by value and `dequeue` hands it back by value,
//! so a message is held by one queue or by one caller and never both.

use std::collections::VecDeque;

use parking_lot::{Condvar, Mutex};
use tracing::trace;

use crate::message::Message;

#[derive(Debug, Default)]
struct QueueState {
    messages: VecDeque<Message>,
    shut_down: bool,
}

/// Mutex-guarded FIFO with a condition variable for blocking consumers
#[derive(Debug, Default)]
pub struct MessageQueue {
    state: Mutex<QueueState>,
    ready: Condvar,
}

impl MessageQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a message at the tail and wake one waiting consumer
    pub fn enqueue(&self, message: Message) {
        let mut state = self.state.lock();
        trace!(
            dest = %message.dest(),
            bytes = message.len(),
            depth = state.messages.len() + 1,
            "enqueue"
        );
        state.messages.push_back(message);
        drop(state);
        self.ready.notify_one();
    }

    /// Pop the head message, if any
    pub fn dequeue(&self) -> Option<Message> {
        let message = self.state.lock().messages.pop_front();
        if let Some(message) = &message {
            trace!(dest = %message.dest(), "dequeue");
        }
        message
    }

    /// Block until a message arrives, the queue shuts down, or `should_exit`
    /// reports true while the queue is empty.
    ///
    /// `should_exit` is evaluated under the queue lock. Whoever flips the
    /// state it reads must call [`MessageQueue::wake_all`] afterwards.
    pub fn wait_dequeue(&self, should_exit: impl Fn() -> bool) -> Option<Message> {
        let mut state = self.state.lock();
        loop {
            if let Some(message) = state.messages.pop_front() {
                trace!(dest = %message.dest(), "dequeue");
                return Some(message);
            }
            if state.shut_down || should_exit() {
                return None;
            }
            self.ready.wait(&mut state);
        }
    }

    /// Wake every blocked consumer so it re-checks its exit condition
    pub fn wake_all(&self) {
        let _guard = self.state.lock();
        self.ready.notify_all();
    }

    /// Stop blocking consumers. Messages already queued are still returned
    /// by `dequeue` and `wait_dequeue`.
    pub fn shutdown(&self) {
        self.state.lock().shut_down = true;
        self.ready.notify_all();
    }

    pub fn is_shut_down(&self) -> bool {
        self.state.lock().shut_down
    }

    /// Drop every queued message, returning how many were released
    pub fn clear(&self) -> usize {
        let drained: Vec<Message> = self.state.lock().messages.drain(..).collect();
        let count = drained.len();
        // payloads are released outside the lock
        drop(drained);
        if count > 0 {
            trace!(count, "cleared queued messages");
        }
        count
    }

    pub fn len(&self) -> usize {
        self.state.lock().messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().messages.is_empty()
    }
}
