// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Bounded buffer that eagerly pulls from its sources.
//!
//! One worker per source moves messages into a shared queue. A worker
//! holding a message while the queue is full waits for space without
//! holding the lock. `receive()` returns `None` only after every source is
//! exhausted and the queue is empty.
//!
//! Stopping discards any message a worker pulled but could not queue yet.
//! Messages already in the queue remain receivable.

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use plexus_core::{Executor, MessagingError, Receive, Stoppable};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Default queue capacity.
pub const DEFAULT_BUFFER_SIZE: usize = 200;

/// Lifecycle of an [`EagerReceiveBuffer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferState {
    Init,
    Started,
    Stopping,
    Stopped,
}

type ExhaustedHook = Box<dyn FnOnce() + Send>;

struct Inner<T> {
    queue: VecDeque<T>,
    state: BufferState,
    active_workers: usize,
    /// Set after the exhaustion hook ran; `receive()` may return `None`
    exhausted: bool,
}

struct Shared<T> {
    inner: Mutex<Inner<T>>,
    capacity: usize,
    /// Signalled when a message is queued or the buffer becomes exhausted
    available: Notify,
    /// Signalled when queue space frees up or stop is requested
    space: Notify,
    cancel: CancellationToken,
    on_exhausted: Mutex<Option<ExhaustedHook>>,
}

pub struct EagerReceiveBuffer<T> {
    executor: Executor,
    shared: Arc<Shared<T>>,
    sources: Mutex<Vec<Arc<dyn Receive<T>>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl<T: Send + 'static> EagerReceiveBuffer<T> {
    pub fn new(executor: &Executor, sources: Vec<Arc<dyn Receive<T>>>) -> Result<Self, MessagingError> {
        Self::with_capacity(executor, sources, DEFAULT_BUFFER_SIZE)
    }

    pub fn with_capacity(
        executor: &Executor,
        sources: Vec<Arc<dyn Receive<T>>>,
        capacity: usize,
    ) -> Result<Self, MessagingError> {
        if sources.is_empty() {
            return Err(MessagingError::InvalidArgument("at least one source is required".into()));
        }
        if capacity < 1 {
            return Err(MessagingError::InvalidArgument(format!("buffer size {} < 1", capacity)));
        }
        Ok(Self {
            executor: executor.clone(),
            shared: Arc::new(Shared {
                inner: Mutex::new(Inner {
                    queue: VecDeque::with_capacity(capacity),
                    state: BufferState::Init,
                    active_workers: 0,
                    exhausted: false,
                }),
                capacity,
                available: Notify::new(),
                space: Notify::new(),
                cancel: CancellationToken::new(),
                on_exhausted: Mutex::new(None),
            }),
            sources: Mutex::new(sources),
            workers: Mutex::new(Vec::new()),
        })
    }

    /// Run `hook` once, on the last worker to finish, strictly before
    /// `receive()` first returns `None`. Must be set before `start()`.
    pub fn on_receivers_exhausted(self, hook: impl FnOnce() + Send + 'static) -> Self {
        *self.shared.on_exhausted.lock() = Some(Box::new(hook));
        self
    }

    pub fn state(&self) -> BufferState {
        self.shared.inner.lock().state
    }

    /// Spawn one worker per source. Valid exactly once.
    pub fn start(&self) -> Result<(), MessagingError> {
        let sources = {
            let mut inner = self.shared.inner.lock();
            if inner.state != BufferState::Init {
                return Err(MessagingError::IllegalState(format!("buffer already {:?}", inner.state)));
            }
            let sources = std::mem::take(&mut *self.sources.lock());
            inner.state = BufferState::Started;
            inner.active_workers = sources.len();
            sources
        };
        let mut workers = self.workers.lock();
        for source in sources {
            workers.push(self.executor.spawn(fill(Arc::clone(&self.shared), source)));
        }
        Ok(())
    }
}

async fn fill<T: Send + 'static>(shared: Arc<Shared<T>>, source: Arc<dyn Receive<T>>) {
    loop {
        let next = tokio::select! {
            _ = shared.cancel.cancelled() => break,
            next = source.receive() => next,
        };
        let message = match next {
            Ok(Some(message)) => message,
            Ok(None) => break,
            Err(e) => {
                warn!("buffer source failed: {}", e);
                break;
            }
        };
        if !shared.enqueue(message).await {
            break;
        }
    }
    shared.worker_finished();
}

impl<T> Shared<T> {
    /// Queue `message`, waiting for space. `false` if the buffer stopped
    /// first, in which case the message is dropped.
    async fn enqueue(&self, message: T) -> bool {
        let mut message = Some(message);
        loop {
            let space = self.space.notified();
            tokio::pin!(space);
            space.as_mut().enable();
            {
                let mut inner = self.inner.lock();
                match inner.state {
                    BufferState::Started if inner.queue.len() >= self.capacity => {}
                    BufferState::Init | BufferState::Started => {
                        inner.queue.extend(message.take());
                        drop(inner);
                        self.available.notify_waiters();
                        return true;
                    }
                    BufferState::Stopping | BufferState::Stopped => {
                        debug!("buffer stopping, discarding message held by worker");
                        return false;
                    }
                }
            }
            space.await;
        }
    }

    fn worker_finished(&self) {
        let last = {
            let mut inner = self.inner.lock();
            inner.active_workers = inner.active_workers.saturating_sub(1);
            let last = inner.active_workers == 0;
            if last && inner.state == BufferState::Stopping {
                inner.state = BufferState::Stopped;
            }
            last
        };
        if !last {
            return;
        }
        let hook = self.on_exhausted.lock().take();
        if let Some(hook) = hook {
            hook();
        }
        self.inner.lock().exhausted = true;
        self.available.notify_waiters();
    }
}

#[async_trait]
impl<T: Send + 'static> Receive<T> for EagerReceiveBuffer<T> {
    async fn receive(&self) -> Result<Option<T>, MessagingError> {
        loop {
            let available = self.shared.available.notified();
            tokio::pin!(available);
            available.as_mut().enable();
            {
                let mut inner = self.shared.inner.lock();
                if let Some(message) = inner.queue.pop_front() {
                    drop(inner);
                    self.shared.space.notify_waiters();
                    return Ok(Some(message));
                }
                if inner.exhausted {
                    return Ok(None);
                }
                if inner.state == BufferState::Init {
                    return Err(MessagingError::IllegalState("buffer not started".into()));
                }
            }
            available.await;
        }
    }
}

#[async_trait]
impl<T: Send + 'static> Stoppable for EagerReceiveBuffer<T> {
    fn request_stop(&self) {
        {
            let mut inner = self.shared.inner.lock();
            match inner.state {
                BufferState::Init => {
                    inner.state = BufferState::Stopped;
                    inner.exhausted = true;
                }
                BufferState::Started if inner.active_workers > 0 => inner.state = BufferState::Stopping,
                BufferState::Started => inner.state = BufferState::Stopped,
                BufferState::Stopping | BufferState::Stopped => return,
            }
        }
        self.shared.cancel.cancel();
        self.shared.space.notify_waiters();
        self.shared.available.notify_waiters();
    }

    async fn stop(&self) -> Result<(), MessagingError> {
        self.request_stop();
        let workers = std::mem::take(&mut *self.workers.lock());
        for worker in workers {
            if let Err(e) = worker.await {
                warn!("buffer worker failed: {}", e);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "eager_buffer_tests.rs"]
mod tests;
