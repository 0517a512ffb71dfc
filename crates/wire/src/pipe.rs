// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-process connected connection pairs.

use async_trait::async_trait;
use parking_lot::Mutex;
use plexus_core::{Dispatch, MessagingError, Receive, Stoppable};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// One end of an in-process pipe. Messages are moved, not serialized.
pub struct PipeConnection<T> {
    name: String,
    tx: Mutex<Option<mpsc::UnboundedSender<T>>>,
    rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<T>>,
    closed: CancellationToken,
}

/// Create two connected ends. What one end dispatches the other receives;
/// stopping one end ends the other's stream once pending messages are read.
pub fn pipe<T: Send + 'static>(name: &str) -> (PipeConnection<T>, PipeConnection<T>) {
    let (a_tx, b_rx) = mpsc::unbounded_channel();
    let (b_tx, a_rx) = mpsc::unbounded_channel();
    (PipeConnection::new(format!("{}:a", name), a_tx, a_rx), PipeConnection::new(format!("{}:b", name), b_tx, b_rx))
}

impl<T> PipeConnection<T> {
    fn new(name: String, tx: mpsc::UnboundedSender<T>, rx: mpsc::UnboundedReceiver<T>) -> Self {
        Self {
            name,
            tx: Mutex::new(Some(tx)),
            rx: tokio::sync::Mutex::new(rx),
            closed: CancellationToken::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl<T: Send> Dispatch<T> for PipeConnection<T> {
    fn dispatch(&self, message: T) -> Result<(), MessagingError> {
        match self.tx.lock().as_ref() {
            Some(tx) => tx
                .send(message)
                .map_err(|_| MessagingError::Transport(format!("{}: peer has closed", self.name))),
            None => Err(MessagingError::stopped(&self.name)),
        }
    }
}

#[async_trait]
impl<T: Send> Receive<T> for PipeConnection<T> {
    async fn receive(&self) -> Result<Option<T>, MessagingError> {
        let mut rx = tokio::select! {
            _ = self.closed.cancelled() => return Ok(None),
            rx = self.rx.lock() => rx,
        };
        tokio::select! {
            _ = self.closed.cancelled() => Ok(None),
            message = rx.recv() => Ok(message),
        }
    }
}

#[async_trait]
impl<T: Send> Stoppable for PipeConnection<T> {
    fn request_stop(&self) {
        self.tx.lock().take();
    }

    async fn stop(&self) -> Result<(), MessagingError> {
        self.request_stop();
        self.closed.cancel();
        Ok(())
    }
}

#[cfg(test)]
#[path = "pipe_tests.rs"]
mod tests;
