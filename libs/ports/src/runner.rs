//! Consumer threads for message handlers
//!
//! ## Lifecycle
//!
//! ```text
//! spawn ──► wait_dequeue ──► handle_message ──► (true) loop
//!                 │                  │
//!                 │                  └──► (false / panic) stop
//!                 └──► policy satisfied, queue empty ──► exit, clear queue
//! ```
//!
//! A serial handler gets one consumer thread. A concurrent native port gets
//! a small pool draining the same queue, so its callback may run on several
//! threads at once.

use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle, ThreadId};

use tracing::{debug, error};

use crate::error::{PortError, PortResult};
use crate::handler::{HandlerCore, MessageHandler};
use crate::message::Message;

/// When a consumer may exit once its queue is empty
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationPolicy {
    /// Exit when the handler has no live ports left
    NoLivePorts,
    /// Exit when every port of the handler has been closed
    PortsClosed,
}

impl TerminationPolicy {
    pub fn is_satisfied(self, core: &HandlerCore) -> bool {
        match self {
            TerminationPolicy::NoLivePorts => !core.has_live_ports(),
            TerminationPolicy::PortsClosed => core.port_count() == 0,
        }
    }
}

/// Hand one message to the handler, turning a panic into a stop request
pub fn deliver(handler: &dyn MessageHandler, message: Message) -> bool {
    let dest = message.dest();
    match catch_unwind(AssertUnwindSafe(|| handler.handle_message(message))) {
        Ok(keep_going) => keep_going,
        Err(panic) => {
            error!(
                handler = %handler.core().id(),
                name = handler.name(),
                port = %dest,
                panic = panic_message(panic.as_ref()),
                "message handler panicked"
            );
            false
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(text) = panic.downcast_ref::<&str>() {
        text
    } else if let Some(text) = panic.downcast_ref::<String>() {
        text.as_str()
    } else {
        "non-string panic payload"
    }
}

/// Drain the handler's queue on the calling thread until the policy is
/// satisfied or the handler stops
pub fn drain(handler: &dyn MessageHandler, policy: TerminationPolicy) {
    let core = handler.core();
    while !core.is_stopped() {
        let next = core
            .queue()
            .wait_dequeue(|| core.is_stopped() || policy.is_satisfied(core));
        let Some(message) = next else {
            break;
        };
        if !deliver(handler, message) {
            core.stop();
        }
    }
    let dropped = core.queue().clear();
    if dropped > 0 {
        core.stats().record_dropped(dropped as u64);
    }
}

/// Consumer threads attached to one handler
#[derive(Debug)]
pub struct HandlerRunner {
    threads: Vec<JoinHandle<()>>,
}

impl HandlerRunner {
    /// Start `workers` consumer threads (at least one) for `handler`
    pub fn spawn(
        handler: Arc<dyn MessageHandler>,
        policy: TerminationPolicy,
        workers: usize,
        thread_name_prefix: &str,
    ) -> PortResult<Self> {
        let workers = workers.max(1);
        let mut threads = Vec::with_capacity(workers);
        for index in 0..workers {
            let name = format!("{thread_name_prefix}-{}-{index}", handler.core().id().raw());
            let worker = Arc::clone(&handler);
            let spawned = thread::Builder::new()
                .name(name.clone())
                .spawn(move || {
                    debug!(handler = %worker.core().id(), name = worker.name(), "consumer started");
                    drain(worker.as_ref(), policy);
                    debug!(handler = %worker.core().id(), name = worker.name(), "consumer exited");
                });
            match spawned {
                Ok(thread) => threads.push(thread),
                Err(source) => {
                    // release the workers that did start
                    handler.core().stop();
                    return Err(PortError::Spawn { name, source });
                }
            }
        }
        Ok(Self { threads })
    }

    pub fn worker_count(&self) -> usize {
        self.threads.len()
    }

    /// True when called from one of this runner's own threads
    pub fn is_worker_thread(&self) -> bool {
        let current: ThreadId = thread::current().id();
        self.threads.iter().any(|t| t.thread().id() == current)
    }

    pub fn is_finished(&self) -> bool {
        self.threads.iter().all(|t| t.is_finished())
    }

    /// Wait for every consumer thread to exit
    pub fn join(self) {
        for thread in self.threads {
            // panics are caught inside `drain`
            let _ = thread.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use isolate_types::PortId;
    use parking_lot::Mutex;
    use snapshot_codec::Payload;

    struct Recorder {
        core: HandlerCore,
        seen: Mutex<Vec<u8>>,
        stop_on: Option<u8>,
        panic_on: Option<u8>,
    }

    impl Recorder {
        fn new(stop_on: Option<u8>, panic_on: Option<u8>) -> Self {
            Self {
                core: HandlerCore::new("recorder"),
                seen: Mutex::new(Vec::new()),
                stop_on,
                panic_on,
            }
        }
    }

    impl MessageHandler for Recorder {
        fn core(&self) -> &HandlerCore {
            &self.core
        }

        fn handle_message(&self, message: Message) -> bool {
            let byte = message.bytes()[0];
            if self.panic_on == Some(byte) {
                panic!("refusing byte {byte}");
            }
            self.seen.lock().push(byte);
            self.stop_on != Some(byte)
        }
    }

    fn push(handler: &Recorder, byte: u8) {
        handler
            .core
            .queue()
            .enqueue(Message::to(PortId::new(1), Payload::from_vec(vec![byte])));
    }

    #[test]
    fn test_drain_exits_when_policy_already_satisfied() {
        let handler = Recorder::new(None, None);
        for byte in 0..4 {
            push(&handler, byte);
        }
        drain(&handler, TerminationPolicy::NoLivePorts);
        assert_eq!(*handler.seen.lock(), vec![0, 1, 2, 3]);
        assert!(handler.core.queue().is_empty());
    }

    #[test]
    fn test_false_stops_and_clears_remaining() {
        let handler = Recorder::new(Some(1), None);
        for byte in 0..4 {
            push(&handler, byte);
        }
        drain(&handler, TerminationPolicy::NoLivePorts);
        assert_eq!(*handler.seen.lock(), vec![0, 1]);
        assert!(handler.core.is_stopped());
        assert_eq!(handler.core.stats().snapshot().dropped, 2);
    }

    #[test]
    fn test_panic_becomes_stop() {
        let handler = Recorder::new(None, Some(2));
        for byte in 0..4 {
            push(&handler, byte);
        }
        drain(&handler, TerminationPolicy::PortsClosed);
        assert_eq!(*handler.seen.lock(), vec![0, 1]);
        assert!(handler.core.is_stopped());
    }

    #[test]
    fn test_spawned_runner_exits_on_stop() {
        let handler = Arc::new(Recorder::new(None, None));
        handler.core.port_added();
        let runner = HandlerRunner::spawn(
            handler.clone(),
            TerminationPolicy::PortsClosed,
            3,
            "test-runner",
        )
        .unwrap();
        assert_eq!(runner.worker_count(), 3);
        assert!(!runner.is_worker_thread());

        push(&handler, 9);
        handler.core.stop();
        runner.join();
        assert!(handler.core.queue().is_empty());
    }
}
