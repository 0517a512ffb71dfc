// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Connection wrapper that reports an unrequested disconnect.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use plexus_core::{Connection, Dispatch, Executor, MessagingError, Receive, Stoppable};
use tracing::debug;

use crate::eager_buffer::EagerReceiveBuffer;

/// Runs a disconnect action when the peer goes away on its own.
///
/// The action completes before `receive()` first returns `None`, runs at
/// most once, and is suppressed if stop was requested locally first.
pub struct DisconnectAwareConnection<C, T> {
    connection: Arc<C>,
    buffer: EagerReceiveBuffer<T>,
    stop_requested: Arc<AtomicBool>,
}

impl<C, T> DisconnectAwareConnection<C, T>
where
    C: Connection<T> + 'static,
    T: Send + 'static,
{
    pub fn new(
        executor: &Executor,
        connection: Arc<C>,
        on_disconnect: impl FnOnce() + Send + 'static,
    ) -> Result<Self, MessagingError> {
        let stop_requested = Arc::new(AtomicBool::new(false));
        let suppressed = Arc::clone(&stop_requested);
        let source: Arc<dyn Receive<T>> = connection.clone();
        let buffer = EagerReceiveBuffer::with_capacity(executor, vec![source], 1)?.on_receivers_exhausted(
            move || {
                if suppressed.load(Ordering::SeqCst) {
                    debug!("connection closed after local stop, disconnect action suppressed");
                } else {
                    on_disconnect();
                }
            },
        );
        buffer.start()?;
        Ok(Self { connection, buffer, stop_requested })
    }

    pub fn inner(&self) -> &C {
        &self.connection
    }
}

impl<C: Connection<T> + 'static, T: Send + 'static> Dispatch<T> for DisconnectAwareConnection<C, T> {
    fn dispatch(&self, message: T) -> Result<(), MessagingError> {
        self.connection.dispatch(message)
    }
}

#[async_trait]
impl<C: Connection<T> + 'static, T: Send + 'static> Receive<T> for DisconnectAwareConnection<C, T> {
    async fn receive(&self) -> Result<Option<T>, MessagingError> {
        self.buffer.receive().await
    }
}

#[async_trait]
impl<C: Connection<T> + 'static, T: Send + 'static> Stoppable for DisconnectAwareConnection<C, T> {
    /// Suppresses the disconnect action and closes the outgoing side.
    /// Incoming messages already in flight can still be received.
    fn request_stop(&self) {
        self.stop_requested.store(true, Ordering::SeqCst);
        self.connection.request_stop();
    }

    async fn stop(&self) -> Result<(), MessagingError> {
        self.stop_requested.store(true, Ordering::SeqCst);
        let result = self.connection.stop().await;
        self.buffer.stop().await?;
        result
    }
}

#[cfg(test)]
#[path = "disconnect_tests.rs"]
mod tests;
