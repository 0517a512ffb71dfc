// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared test helpers for use across crates.
//!
//! Gated behind `#[cfg(any(test, feature = "test-support"))]`.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::{mpsc, Notify};

use crate::error::MessagingError;
use crate::transport::{Dispatch, FailureHandler, Receive};

/// Default wait used by helpers that poll for asynchronous delivery.
pub const WAIT: Duration = Duration::from_secs(5);

/// Dispatcher that records every message it receives.
pub struct RecordingDispatch<T> {
    received: Mutex<Vec<T>>,
    notify: Notify,
}

impl<T: Clone + Send + 'static> RecordingDispatch<T> {
    pub fn new() -> Arc<Self> {
        Arc::new(Self { received: Mutex::new(Vec::new()), notify: Notify::new() })
    }

    pub fn received(&self) -> Vec<T> {
        self.received.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.received.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Wait until at least `count` messages arrived, or [`WAIT`] elapsed.
    pub async fn wait_for(&self, count: usize) -> Vec<T> {
        let deadline = tokio::time::Instant::now() + WAIT;
        loop {
            let notified = self.notify.notified();
            if self.len() >= count {
                return self.received();
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return self.received();
            }
        }
    }
}

impl<T: Send> Dispatch<T> for RecordingDispatch<T> {
    fn dispatch(&self, message: T) -> Result<(), MessagingError> {
        self.received.lock().push(message);
        self.notify.notify_waiters();
        Ok(())
    }
}

/// Failure handler that records failures.
#[derive(Default)]
pub struct RecordingFailures(Mutex<Vec<MessagingError>>);

impl RecordingFailures {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn failures(&self) -> Vec<MessagingError> {
        self.0.lock().clone()
    }
}

impl FailureHandler for RecordingFailures {
    fn on_failure(&self, error: MessagingError) {
        self.0.lock().push(error);
    }
}

/// Receive source fed from a channel; counts how many messages were pulled.
pub struct ChannelSource<T> {
    rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<T>>,
    pulled: AtomicUsize,
}

impl<T: Send + 'static> ChannelSource<T> {
    /// Create a source and the sender that feeds it. Dropping the sender
    /// ends the stream.
    pub fn new() -> (mpsc::UnboundedSender<T>, Arc<Self>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (tx, Arc::new(Self { rx: tokio::sync::Mutex::new(rx), pulled: AtomicUsize::new(0) }))
    }

    /// Source that yields the given messages then ends.
    pub fn of(messages: impl IntoIterator<Item = T>) -> Arc<Self> {
        let (tx, source) = Self::new();
        for message in messages {
            let _ = tx.send(message);
        }
        source
    }

    pub fn pulled(&self) -> usize {
        self.pulled.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl<T: Send + 'static> Receive<T> for ChannelSource<T> {
    async fn receive(&self) -> Result<Option<T>, MessagingError> {
        let next = self.rx.lock().await.recv().await;
        if next.is_some() {
            self.pulled.fetch_add(1, Ordering::SeqCst);
        }
        Ok(next)
    }
}

/// Wait until `condition` holds, or [`WAIT`] elapsed. Returns the final result.
pub async fn eventually(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + WAIT;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    condition()
}

// ── Proptest strategies ─────────────────────────────────────────────────

/// Proptest strategies for message types.
pub mod strategies {
    use crate::message::Message;
    use proptest::prelude::*;
    use serde_json::Value;

    pub fn arb_payload() -> impl Strategy<Value = Message> {
        prop_oneof![
            any::<i64>().prop_map(|n| Message::Payload(Value::from(n))),
            "[a-z]{0,12}".prop_map(|s| Message::Payload(Value::from(s))),
            any::<bool>().prop_map(|b| Message::Payload(Value::from(b))),
        ]
    }

    pub fn arb_payloads(max: usize) -> impl Strategy<Value = Vec<Message>> {
        proptest::collection::vec(arb_payload(), 0..max)
    }
}
