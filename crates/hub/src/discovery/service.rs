// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use plexus_core::{
    dispatch_fn, AsyncConnection, ChannelKey, Connection, DiscoveryMessage, Dispatch, Executor, MessagingError,
    SocketAddress, Stoppable,
};
use plexus_stack::ProtocolStack;
use tokio::sync::Notify;
use tracing::{debug, info};

use super::{Attached, ChannelLookupProtocol, ChannelRegistrationProtocol};

/// Makes channels served at an address discoverable in a group.
pub struct DiscoveryRegistrar {
    attached: Attached,
}

impl DiscoveryRegistrar {
    pub fn new<C>(executor: &Executor, group: &str, connection: C) -> Result<Self, MessagingError>
    where
        C: Connection<DiscoveryMessage> + 'static,
    {
        let stack = ProtocolStack::new(
            executor,
            format!("discovery registrar {}", group),
            vec![Box::new(ChannelRegistrationProtocol::new(group))],
        );
        Ok(Self { attached: Attached::new(executor, stack, connection)? })
    }

    pub fn register(&self, channel: impl Into<ChannelKey>, address: SocketAddress) -> Result<(), MessagingError> {
        self.attached.stack.top().dispatch(DiscoveryMessage::ChannelAvailable {
            // Replaced by the registrar's own group
            group: String::new(),
            channel: channel.into(),
            address,
        })
    }
}

#[async_trait]
impl Stoppable for DiscoveryRegistrar {
    fn request_stop(&self) {
        self.attached.stack.request_stop();
    }

    /// Withdraws every registration, then closes the connection.
    async fn stop(&self) -> Result<(), MessagingError> {
        self.attached.stop().await
    }
}

#[derive(Default)]
struct Found {
    addresses: Mutex<HashMap<ChannelKey, SocketAddress>>,
    changed: Notify,
}

/// Resolves channels to addresses within a group.
pub struct DiscoveryLookup {
    group: String,
    attached: Attached,
    found: Arc<Found>,
}

impl DiscoveryLookup {
    pub fn new<C>(executor: &Executor, group: &str, connection: C) -> Result<Self, MessagingError>
    where
        C: Connection<DiscoveryMessage> + 'static,
    {
        Self::with_protocol(executor, group, connection, ChannelLookupProtocol::new(group))
    }

    /// Lookup repeating its requests every `interval`.
    pub fn with_interval<C>(executor: &Executor, group: &str, connection: C, interval: Duration) -> Result<Self, MessagingError>
    where
        C: Connection<DiscoveryMessage> + 'static,
    {
        Self::with_protocol(executor, group, connection, ChannelLookupProtocol::with_interval(group, interval))
    }

    fn with_protocol<C>(
        executor: &Executor,
        group: &str,
        connection: C,
        protocol: ChannelLookupProtocol,
    ) -> Result<Self, MessagingError>
    where
        C: Connection<DiscoveryMessage> + 'static,
    {
        let stack = ProtocolStack::new(executor, format!("discovery lookup {}", group), vec![Box::new(protocol)]);
        let found = Arc::new(Found::default());
        let record = Arc::clone(&found);
        stack.top().dispatch_to(dispatch_fn(move |message: DiscoveryMessage| {
            match message {
                DiscoveryMessage::ChannelAvailable { channel, address, .. } => {
                    record.addresses.lock().insert(channel, address);
                }
                DiscoveryMessage::ChannelUnavailable { channel, address, .. } => {
                    let mut addresses = record.addresses.lock();
                    if addresses.get(&channel) == Some(&address) {
                        addresses.remove(&channel);
                    }
                }
                DiscoveryMessage::LookupRequest { .. } | DiscoveryMessage::LookupCancelled { .. } => {}
            }
            record.changed.notify_waiters();
            Ok(())
        }));
        Ok(Self { group: group.to_string(), attached: Attached::new(executor, stack, connection)?, found })
    }

    /// Address of some provider of `channel`, waiting up to `timeout` for
    /// one to answer.
    pub async fn lookup(&self, channel: impl Into<ChannelKey>, timeout: Duration) -> Result<SocketAddress, MessagingError> {
        let channel = channel.into();
        let deadline = tokio::time::Instant::now() + timeout;
        let mut requested = false;
        loop {
            let changed = self.found.changed.notified();
            let cached = self.found.addresses.lock().get(&channel).cloned();
            if let Some(address) = cached {
                info!(group = %self.group, %channel, %address, "channel found");
                return Ok(address);
            }
            if !requested {
                self.attached.stack.top().dispatch(DiscoveryMessage::LookupRequest {
                    group: self.group.clone(),
                    channel: channel.clone(),
                })?;
                requested = true;
            }
            if tokio::time::timeout_at(deadline, changed).await.is_err() {
                let cancel = DiscoveryMessage::LookupCancelled { group: self.group.clone(), channel: channel.clone() };
                if let Err(e) = self.attached.stack.top().dispatch(cancel) {
                    debug!(group = %self.group, %channel, "could not cancel lookup: {}", e);
                }
                return Err(MessagingError::LookupTimeout { channel: channel.to_string(), timeout });
            }
        }
    }
}

#[async_trait]
impl Stoppable for DiscoveryLookup {
    fn request_stop(&self) {
        self.attached.stack.request_stop();
    }

    async fn stop(&self) -> Result<(), MessagingError> {
        self.attached.stop().await
    }
}

#[cfg(test)]
#[path = "service_tests.rs"]
mod tests;
