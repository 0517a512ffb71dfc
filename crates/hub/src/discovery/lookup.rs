// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::collections::HashMap;
use std::time::Duration;

use plexus_core::{ChannelKey, DiscoveryMessage, MessagingError};
use plexus_stack::{CallbackHandle, Protocol, ProtocolContext};
use tracing::debug;

use crate::env::lookup_interval;

/// Finds channels in a discovery group.
///
/// A `LookupRequest` from the top is sent at once and repeated every
/// interval until a matching `ChannelAvailable` arrives or every request
/// for that channel is withdrawn with `LookupCancelled`. Availability
/// changes for the group are passed up.
pub struct ChannelLookupProtocol {
    group: String,
    interval: Duration,
    /// Outstanding requests per channel
    pending: HashMap<ChannelKey, usize>,
    retry: Option<CallbackHandle>,
}

impl ChannelLookupProtocol {
    pub fn new(group: impl Into<String>) -> Self {
        Self::with_interval(group, lookup_interval())
    }

    pub fn with_interval(group: impl Into<String>, interval: Duration) -> Self {
        Self { group: group.into(), interval, pending: HashMap::new(), retry: None }
    }

    fn request(&self, channel: &ChannelKey) -> DiscoveryMessage {
        DiscoveryMessage::LookupRequest { group: self.group.clone(), channel: channel.clone() }
    }
}

impl Protocol<DiscoveryMessage> for ChannelLookupProtocol {
    fn start(&mut self, _ctx: &mut ProtocolContext<DiscoveryMessage>) {}

    fn handle_outgoing(
        &mut self,
        message: DiscoveryMessage,
        ctx: &mut ProtocolContext<DiscoveryMessage>,
    ) -> Result<(), MessagingError> {
        match message {
            DiscoveryMessage::LookupRequest { channel, .. } => {
                ctx.dispatch_outgoing(self.request(&channel));
                *self.pending.entry(channel).or_default() += 1;
                if self.retry.is_none() {
                    self.retry = Some(ctx.callback_later(self.interval));
                }
                Ok(())
            }
            DiscoveryMessage::LookupCancelled { channel, .. } => {
                if let Some(requests) = self.pending.get_mut(&channel) {
                    *requests -= 1;
                    if *requests == 0 {
                        debug!(group = %self.group, %channel, "lookup abandoned");
                        self.pending.remove(&channel);
                    }
                }
                if self.pending.is_empty() {
                    if let Some(retry) = self.retry.take() {
                        retry.cancel();
                    }
                }
                Ok(())
            }
            other => Err(MessagingError::InvalidArgument(format!("cannot look up with {}", other))),
        }
    }

    fn handle_incoming(
        &mut self,
        message: DiscoveryMessage,
        ctx: &mut ProtocolContext<DiscoveryMessage>,
    ) -> Result<(), MessagingError> {
        if message.group() != self.group
            || matches!(message, DiscoveryMessage::LookupRequest { .. } | DiscoveryMessage::LookupCancelled { .. })
        {
            return Ok(());
        }
        if let DiscoveryMessage::ChannelAvailable { channel, address, .. } = &message {
            if self.pending.remove(channel).is_some() {
                debug!(group = %self.group, %channel, %address, "lookup answered");
            }
        }
        ctx.dispatch_incoming(message);
        Ok(())
    }

    fn stop_requested(&mut self, ctx: &mut ProtocolContext<DiscoveryMessage>) {
        if let Some(retry) = self.retry.take() {
            retry.cancel();
        }
        ctx.stopped();
    }

    fn handle_callback(
        &mut self,
        _handle: CallbackHandle,
        ctx: &mut ProtocolContext<DiscoveryMessage>,
    ) -> Result<(), MessagingError> {
        self.retry = None;
        if self.pending.is_empty() {
            return Ok(());
        }
        for channel in self.pending.keys() {
            debug!(group = %self.group, %channel, "repeating lookup");
            ctx.dispatch_outgoing(self.request(channel));
        }
        self.retry = Some(ctx.callback_later(self.interval));
        Ok(())
    }
}

#[cfg(test)]
#[path = "lookup_tests.rs"]
mod tests;
