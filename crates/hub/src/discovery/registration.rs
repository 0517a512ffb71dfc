// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::collections::HashMap;

use plexus_core::{ChannelKey, DiscoveryMessage, MessagingError, SocketAddress};
use plexus_stack::{Protocol, ProtocolContext};
use tracing::{debug, info};

/// Announces registered channels to a discovery group.
///
/// Registrations arrive from the top as `ChannelAvailable`; each is
/// broadcast immediately and again in answer to any matching
/// `LookupRequest`. On stop every registration is withdrawn.
pub struct ChannelRegistrationProtocol {
    group: String,
    channels: HashMap<ChannelKey, SocketAddress>,
}

impl ChannelRegistrationProtocol {
    pub fn new(group: impl Into<String>) -> Self {
        Self { group: group.into(), channels: HashMap::new() }
    }

    fn available(&self, channel: &ChannelKey, address: &SocketAddress) -> DiscoveryMessage {
        DiscoveryMessage::ChannelAvailable {
            group: self.group.clone(),
            channel: channel.clone(),
            address: address.clone(),
        }
    }
}

impl Protocol<DiscoveryMessage> for ChannelRegistrationProtocol {
    fn start(&mut self, _ctx: &mut ProtocolContext<DiscoveryMessage>) {}

    fn handle_outgoing(
        &mut self,
        message: DiscoveryMessage,
        ctx: &mut ProtocolContext<DiscoveryMessage>,
    ) -> Result<(), MessagingError> {
        let DiscoveryMessage::ChannelAvailable { channel, address, .. } = message else {
            return Err(MessagingError::InvalidArgument(format!("cannot register with {}", message)));
        };
        info!(group = %self.group, %channel, %address, "channel registered");
        ctx.dispatch_outgoing(self.available(&channel, &address));
        self.channels.insert(channel, address);
        Ok(())
    }

    fn handle_incoming(
        &mut self,
        message: DiscoveryMessage,
        ctx: &mut ProtocolContext<DiscoveryMessage>,
    ) -> Result<(), MessagingError> {
        if let DiscoveryMessage::LookupRequest { group, channel } = &message {
            if *group != self.group {
                return Ok(());
            }
            if let Some(address) = self.channels.get(channel) {
                debug!(group = %self.group, %channel, "answering lookup");
                ctx.dispatch_outgoing(self.available(channel, address));
            }
        }
        Ok(())
    }

    fn stop_requested(&mut self, ctx: &mut ProtocolContext<DiscoveryMessage>) {
        for (channel, address) in self.channels.drain() {
            ctx.dispatch_outgoing(DiscoveryMessage::ChannelUnavailable {
                group: self.group.clone(),
                channel,
                address,
            });
        }
        ctx.stopped();
    }
}

#[cfg(test)]
#[path = "registration_tests.rs"]
mod tests;
