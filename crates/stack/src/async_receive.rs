// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Pumps messages from blocking sources into a dispatcher.
//!
//! One worker task per source. Order is preserved per source; messages
//! from different sources interleave arbitrarily.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use plexus_core::{
    DiscardingFailureHandler, Dispatch, Executor, FailureHandler, MessagingError, Receive, Stoppable,
};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Receives from any number of sources and dispatches into one sink.
pub struct AsyncReceive<T> {
    name: Arc<str>,
    executor: Executor,
    sink: Arc<dyn Dispatch<T>>,
    end_of_stream: Option<T>,
    failures: Arc<dyn FailureHandler>,
    cancel: CancellationToken,
    stop_requested: AtomicBool,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl<T: Clone + Send + Sync + 'static> AsyncReceive<T> {
    pub fn new(executor: &Executor, name: impl Into<Arc<str>>, sink: Arc<dyn Dispatch<T>>) -> Self {
        let name = name.into();
        Self {
            failures: DiscardingFailureHandler::shared(name.to_string()),
            name,
            executor: executor.clone(),
            sink,
            end_of_stream: None,
            cancel: CancellationToken::new(),
            stop_requested: AtomicBool::new(false),
            workers: Mutex::new(Vec::new()),
        }
    }

    /// Dispatch `marker` once for each source that reaches its end or fails.
    /// Not dispatched for sources abandoned by `request_stop()`.
    pub fn with_end_of_stream(mut self, marker: T) -> Self {
        self.end_of_stream = Some(marker);
        self
    }

    /// Route sink failures somewhere other than the log.
    pub fn with_failure_handler(mut self, failures: Arc<dyn FailureHandler>) -> Self {
        self.failures = failures;
        self
    }

    /// Start pulling from `source`.
    pub fn receive_from(&self, source: Arc<dyn Receive<T>>) -> Result<(), MessagingError> {
        if self.stop_requested.load(Ordering::SeqCst) {
            return Err(MessagingError::stopped(self.name.to_string()));
        }
        let worker = self.executor.spawn(pump(
            Arc::clone(&self.name),
            source,
            Arc::clone(&self.sink),
            self.end_of_stream.clone(),
            Arc::clone(&self.failures),
            self.cancel.clone(),
        ));
        self.workers.lock().push(worker);
        Ok(())
    }
}

async fn pump<T: Send + 'static>(
    name: Arc<str>,
    source: Arc<dyn Receive<T>>,
    sink: Arc<dyn Dispatch<T>>,
    end_of_stream: Option<T>,
    failures: Arc<dyn FailureHandler>,
    cancel: CancellationToken,
) {
    loop {
        let next = tokio::select! {
            _ = cancel.cancelled() => {
                debug!(receiver = %name, "receive abandoned");
                return;
            }
            next = source.receive() => next,
        };
        match next {
            Ok(Some(message)) => {
                if let Err(e) = sink.dispatch(message) {
                    failures.on_failure(e);
                }
            }
            Ok(None) => {
                debug!(receiver = %name, "source exhausted");
                break;
            }
            Err(e) => {
                warn!(receiver = %name, "source failed: {}", e);
                break;
            }
        }
    }
    if let Some(marker) = end_of_stream {
        if let Err(e) = sink.dispatch(marker) {
            failures.on_failure(e);
        }
    }
}

#[async_trait]
impl<T: Clone + Send + Sync + 'static> Stoppable for AsyncReceive<T> {
    fn request_stop(&self) {
        if !self.stop_requested.swap(true, Ordering::SeqCst) {
            self.cancel.cancel();
        }
    }

    async fn stop(&self) -> Result<(), MessagingError> {
        self.request_stop();
        let workers = std::mem::take(&mut *self.workers.lock());
        for worker in workers {
            if let Err(e) = worker.await {
                warn!(receiver = %self.name, "receive worker failed: {}", e);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "async_receive_tests.rs"]
mod tests;
