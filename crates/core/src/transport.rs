// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Dispatch/receive primitives and the connection contract.
//!
//! Everything above the physical transport is built from three small
//! capabilities:
//!
//! - [`Dispatch`]: hand one message to a target without waiting for it
//!   to be processed
//! - [`Receive`]: wait for the next message; `Ok(None)` means end of stream
//! - [`Stoppable`]: two-phase shutdown, `request_stop()` then `stop()`

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{error, warn};

use crate::error::MessagingError;

/// Push one message to a target.
pub trait Dispatch<T>: Send + Sync {
    fn dispatch(&self, message: T) -> Result<(), MessagingError>;
}

impl<T, D: Dispatch<T> + ?Sized> Dispatch<T> for Arc<D> {
    fn dispatch(&self, message: T) -> Result<(), MessagingError> {
        (**self).dispatch(message)
    }
}

/// Pull one message from a source.
#[async_trait]
pub trait Receive<T: Send>: Send + Sync {
    /// Wait for the next message. `Ok(None)` marks a clean end of stream.
    async fn receive(&self) -> Result<Option<T>, MessagingError>;
}

#[async_trait]
impl<T: Send, R: Receive<T> + ?Sized> Receive<T> for Arc<R> {
    async fn receive(&self) -> Result<Option<T>, MessagingError> {
        (**self).receive().await
    }
}

/// Two-phase shutdown.
#[async_trait]
pub trait Stoppable: Send + Sync {
    /// Stop accepting new work. Never waits.
    fn request_stop(&self);

    /// Request stop and wait until all owned work has drained.
    async fn stop(&self) -> Result<(), MessagingError>;
}

#[async_trait]
impl<S: Stoppable + ?Sized> Stoppable for Arc<S> {
    fn request_stop(&self) {
        (**self).request_stop()
    }

    async fn stop(&self) -> Result<(), MessagingError> {
        (**self).stop().await
    }
}

/// A bidirectional physical transport.
pub trait Connection<T: Send>: Dispatch<T> + Receive<T> + Stoppable {}

impl<T: Send, C: Dispatch<T> + Receive<T> + Stoppable + ?Sized> Connection<T> for C {}

/// A connection whose incoming side is pushed to a registered handler.
pub trait AsyncConnection<T>: Dispatch<T> {
    /// Attach the handler for incoming messages. Messages that arrived
    /// before a handler was attached are delivered first, in order.
    fn dispatch_to(&self, handler: Arc<dyn Dispatch<T>>);
}

/// Adapts a closure into a [`Dispatch`].
pub struct FnDispatch<F>(F);

impl<T, F> Dispatch<T> for FnDispatch<F>
where
    F: Fn(T) -> Result<(), MessagingError> + Send + Sync,
{
    fn dispatch(&self, message: T) -> Result<(), MessagingError> {
        (self.0)(message)
    }
}

/// Wrap a closure as a shareable dispatcher.
pub fn dispatch_fn<T, F>(f: F) -> Arc<dyn Dispatch<T>>
where
    T: 'static,
    F: Fn(T) -> Result<(), MessagingError> + Send + Sync + 'static,
{
    Arc::new(FnDispatch(f))
}

/// Receives per-message failures that must not interrupt a pipeline.
pub trait FailureHandler: Send + Sync {
    fn on_failure(&self, error: MessagingError);
}

/// Logs and discards failures.
#[derive(Debug, Clone)]
pub struct DiscardingFailureHandler {
    context: String,
}

impl DiscardingFailureHandler {
    pub fn new(context: impl Into<String>) -> Self {
        Self { context: context.into() }
    }

    pub fn shared(context: impl Into<String>) -> Arc<dyn FailureHandler> {
        Arc::new(Self::new(context))
    }
}

impl FailureHandler for DiscardingFailureHandler {
    fn on_failure(&self, e: MessagingError) {
        if e.is_structural() {
            error!(context = %self.context, "discarding failed message: {}", e);
        } else {
            warn!(context = %self.context, "discarding failed message: {}", e);
        }
    }
}

/// Forwards to an inner dispatcher, routing its failures to a handler
/// instead of the caller.
pub struct DiscardFailures<D> {
    inner: D,
    handler: Arc<dyn FailureHandler>,
}

impl<D> DiscardFailures<D> {
    pub fn new(inner: D, handler: Arc<dyn FailureHandler>) -> Self {
        Self { inner, handler }
    }
}

impl<T, D: Dispatch<T>> Dispatch<T> for DiscardFailures<D> {
    fn dispatch(&self, message: T) -> Result<(), MessagingError> {
        if let Err(e) = self.inner.dispatch(message) {
            self.handler.on_failure(e);
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "transport_tests.rs"]
mod tests;
