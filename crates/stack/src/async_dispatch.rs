// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Unbounded FIFO queue delivered by a single worker task.
//!
//! ```text
//! dispatch() ─┐                                    ┌─► handler.dispatch()
//! dispatch() ─┼─► queue ─► worker task (one) ──────┤
//! dispatch() ─┘                                    └─► failures.on_failure()
//! ```
//!
//! Messages queue up until a handler is attached with `dispatch_to()`.
//! Delivery order is `dispatch()` call order and deliveries never overlap.

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use plexus_core::{
    AsyncConnection, DiscardingFailureHandler, Dispatch, Executor, FailureHandler, MessagingError,
    Stoppable,
};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Status {
    Running,
    Stopping,
}

struct State<T> {
    queue: VecDeque<T>,
    handler: Option<Arc<dyn Dispatch<T>>>,
    status: Status,
}

struct Shared<T> {
    name: Arc<str>,
    state: Mutex<State<T>>,
    /// One permit per state change; the worker is the only waiter
    wake: Notify,
    failures: Arc<dyn FailureHandler>,
}

/// An asynchronous [`Dispatch`]: `dispatch()` enqueues and returns.
pub struct AsyncDispatch<T> {
    shared: Arc<Shared<T>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl<T: Send + 'static> AsyncDispatch<T> {
    /// Queue with the default failure handler (log and continue).
    pub fn new(executor: &Executor, name: impl Into<Arc<str>>) -> Self {
        let name = name.into();
        let failures = DiscardingFailureHandler::shared(name.to_string());
        Self::with_failure_handler(executor, name, failures)
    }

    pub fn with_failure_handler(
        executor: &Executor,
        name: impl Into<Arc<str>>,
        failures: Arc<dyn FailureHandler>,
    ) -> Self {
        let shared = Arc::new(Shared {
            name: name.into(),
            state: Mutex::new(State { queue: VecDeque::new(), handler: None, status: Status::Running }),
            wake: Notify::new(),
            failures,
        });
        let worker = executor.spawn(deliver(Arc::clone(&shared)));
        Self { shared, worker: Mutex::new(Some(worker)) }
    }

    /// Number of queued, undelivered messages.
    pub fn pending(&self) -> usize {
        self.shared.state.lock().queue.len()
    }
}

async fn deliver<T: Send + 'static>(shared: Arc<Shared<T>>) {
    loop {
        let next = {
            let mut state = shared.state.lock();
            match state.handler.clone() {
                Some(handler) if !state.queue.is_empty() => state.queue.pop_front().map(|m| (handler, m)),
                _ if state.status == Status::Stopping => {
                    if !state.queue.is_empty() {
                        warn!(
                            queue = %shared.name,
                            discarded = state.queue.len(),
                            "stopping with no handler attached, discarding queued messages",
                        );
                        state.queue.clear();
                    }
                    break;
                }
                _ => None,
            }
        };
        match next {
            Some((handler, message)) => {
                if let Err(e) = handler.dispatch(message) {
                    shared.failures.on_failure(e);
                }
            }
            None => shared.wake.notified().await,
        }
    }
    debug!(queue = %shared.name, "delivery worker exited");
}

impl<T> Shared<T> {
    fn request_stop(&self) {
        let mut state = self.state.lock();
        if state.status == Status::Running {
            state.status = Status::Stopping;
            drop(state);
            self.wake.notify_one();
        }
    }
}

impl<T: Send + 'static> Dispatch<T> for AsyncDispatch<T> {
    fn dispatch(&self, message: T) -> Result<(), MessagingError> {
        let mut state = self.shared.state.lock();
        if state.status != Status::Running {
            return Err(MessagingError::stopped(self.shared.name.to_string()));
        }
        state.queue.push_back(message);
        drop(state);
        self.shared.wake.notify_one();
        Ok(())
    }
}

impl<T: Send + 'static> AsyncConnection<T> for AsyncDispatch<T> {
    fn dispatch_to(&self, handler: Arc<dyn Dispatch<T>>) {
        self.shared.state.lock().handler = Some(handler);
        self.shared.wake.notify_one();
    }
}

#[async_trait]
impl<T: Send + 'static> Stoppable for AsyncDispatch<T> {
    fn request_stop(&self) {
        self.shared.request_stop();
    }

    /// Waits until every queued message has been delivered, or discarded if
    /// no handler was ever attached.
    async fn stop(&self) -> Result<(), MessagingError> {
        self.request_stop();
        let worker = self.worker.lock().take();
        if let Some(worker) = worker {
            if let Err(e) = worker.await {
                warn!(queue = %self.shared.name, "delivery worker failed: {}", e);
            }
        }
        Ok(())
    }
}

impl<T> Drop for AsyncDispatch<T> {
    fn drop(&mut self) {
        self.shared.request_stop();
    }
}

#[cfg(test)]
#[path = "async_dispatch_tests.rs"]
mod tests;
