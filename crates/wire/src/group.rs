// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-process datagram group.
//!
//! Every message dispatched by one member is received by every other
//! member that joined before it was sent. Behaves like a multicast group
//! on loopback, without sockets.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use plexus_core::{Dispatch, MessagingError, Receive, Stoppable};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::warn;

const GROUP_CAPACITY: usize = 1024;

/// A named group members can join.
#[derive(Clone)]
pub struct LocalBroadcastGroup<T> {
    tx: broadcast::Sender<(u64, T)>,
    next_member: Arc<AtomicU64>,
}

impl<T: Clone + Send + 'static> LocalBroadcastGroup<T> {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(GROUP_CAPACITY);
        Self { tx, next_member: Arc::new(AtomicU64::new(0)) }
    }

    pub fn join(&self) -> GroupMember<T> {
        GroupMember {
            id: self.next_member.fetch_add(1, Ordering::SeqCst),
            tx: self.tx.clone(),
            rx: tokio::sync::Mutex::new(self.tx.subscribe()),
            closed: CancellationToken::new(),
        }
    }
}

impl<T: Clone + Send + 'static> Default for LocalBroadcastGroup<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Membership in a [`LocalBroadcastGroup`]; a connection to all other members.
pub struct GroupMember<T> {
    id: u64,
    tx: broadcast::Sender<(u64, T)>,
    rx: tokio::sync::Mutex<broadcast::Receiver<(u64, T)>>,
    closed: CancellationToken,
}

impl<T: Clone + Send + 'static> Dispatch<T> for GroupMember<T> {
    fn dispatch(&self, message: T) -> Result<(), MessagingError> {
        if self.closed.is_cancelled() {
            return Err(MessagingError::stopped(format!("group member {}", self.id)));
        }
        // No other receivers is not an error for a datagram group
        let _ = self.tx.send((self.id, message));
        Ok(())
    }
}

#[async_trait]
impl<T: Clone + Send + 'static> Receive<T> for GroupMember<T> {
    async fn receive(&self) -> Result<Option<T>, MessagingError> {
        let mut rx = tokio::select! {
            _ = self.closed.cancelled() => return Ok(None),
            rx = self.rx.lock() => rx,
        };
        loop {
            let next = tokio::select! {
                _ = self.closed.cancelled() => return Ok(None),
                next = rx.recv() => next,
            };
            match next {
                Ok((sender, _)) if sender == self.id => continue,
                Ok((_, message)) => return Ok(Some(message)),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(member = self.id, skipped, "group member lagged, datagrams dropped");
                }
                Err(broadcast::error::RecvError::Closed) => return Ok(None),
            }
        }
    }
}

#[async_trait]
impl<T: Clone + Send + 'static> Stoppable for GroupMember<T> {
    fn request_stop(&self) {
        self.closed.cancel();
    }

    async fn stop(&self) -> Result<(), MessagingError> {
        self.request_stop();
        Ok(())
    }
}

#[cfg(test)]
#[path = "group_tests.rs"]
mod tests;
