// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Protocol stages and the context they act through.
//!
//! A protocol never touches the stack directly. Each callback receives a
//! [`ProtocolContext`] that records effects; the stack applies them in
//! order once the callback returns.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use plexus_core::MessagingError;

/// One stage of a [`crate::ProtocolStack`].
///
/// All callbacks run on the stack's task, one at a time, so implementations
/// need no locking.
pub trait Protocol<T>: Send {
    /// Called once, before any message is delivered.
    fn start(&mut self, ctx: &mut ProtocolContext<T>);

    /// A message travelling from the top of the stack towards the bottom.
    fn handle_outgoing(&mut self, message: T, ctx: &mut ProtocolContext<T>) -> Result<(), MessagingError>;

    /// A message travelling from the bottom of the stack towards the top.
    fn handle_incoming(&mut self, message: T, ctx: &mut ProtocolContext<T>) -> Result<(), MessagingError>;

    /// The stage above has stopped. Call `ctx.stopped()` now, or
    /// `ctx.stop_later()` and `ctx.stopped()` from a later callback.
    /// Calling neither stops the stage immediately.
    fn stop_requested(&mut self, ctx: &mut ProtocolContext<T>);

    /// A callback scheduled with `ctx.callback_later()` is due.
    fn handle_callback(&mut self, handle: CallbackHandle, ctx: &mut ProtocolContext<T>) -> Result<(), MessagingError> {
        let _ = (handle, ctx);
        Ok(())
    }
}

static NEXT_CALLBACK: AtomicU64 = AtomicU64::new(1);

/// Identifies a scheduled callback; cancelling it prevents delivery.
#[derive(Debug, Clone)]
pub struct CallbackHandle {
    id: u64,
    cancelled: Arc<AtomicBool>,
}

impl CallbackHandle {
    fn next() -> Self {
        Self { id: NEXT_CALLBACK.fetch_add(1, Ordering::Relaxed), cancelled: Arc::new(AtomicBool::new(false)) }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Idempotent. A cancelled callback is silently dropped when due.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

impl PartialEq for CallbackHandle {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for CallbackHandle {}

/// Effects requested by a protocol callback.
#[derive(Debug)]
pub(crate) enum Effect<T> {
    Incoming(T),
    Outgoing(T),
    Callback { handle: CallbackHandle, delay: Duration },
    StopLater,
    Stopped,
}

/// What a protocol can ask of its stack.
pub struct ProtocolContext<T> {
    effects: Vec<Effect<T>>,
}

impl<T> ProtocolContext<T> {
    pub(crate) fn new() -> Self {
        Self { effects: Vec::new() }
    }

    pub(crate) fn into_effects(self) -> Vec<Effect<T>> {
        self.effects
    }

    /// Send a message to the stage above.
    pub fn dispatch_incoming(&mut self, message: T) {
        self.effects.push(Effect::Incoming(message));
    }

    /// Send a message to the stage below.
    pub fn dispatch_outgoing(&mut self, message: T) {
        self.effects.push(Effect::Outgoing(message));
    }

    /// Schedule `handle_callback` after `delay`.
    pub fn callback_later(&mut self, delay: Duration) -> CallbackHandle {
        let handle = CallbackHandle::next();
        self.effects.push(Effect::Callback { handle: handle.clone(), delay });
        handle
    }

    /// Keep running after `stop_requested` returns; `stopped()` comes later.
    pub fn stop_later(&mut self) {
        self.effects.push(Effect::StopLater);
    }

    /// This stage is done. It receives nothing further.
    pub fn stopped(&mut self) {
        self.effects.push(Effect::Stopped);
    }
}

#[cfg(test)]
#[path = "protocol_tests.rs"]
mod tests;
