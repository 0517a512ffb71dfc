// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Group-scoped service discovery messages.

use std::net::SocketAddr;

use serde::{Deserialize, Serialize};

use crate::channel::ChannelKey;
use crate::id::ListenerId;

/// Address of a logical listener: the physical acceptor plus the listener
/// id presented in the connect handshake.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SocketAddress {
    pub addr: SocketAddr,
    pub listener: ListenerId,
}

impl SocketAddress {
    pub fn new(addr: SocketAddr, listener: ListenerId) -> Self {
        Self { addr, listener }
    }
}

impl std::fmt::Display for SocketAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "tcp://{}/{}", self.addr, self.listener)
    }
}

/// Announcements and lookups exchanged by discovery participants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum DiscoveryMessage {
    ChannelAvailable { group: String, channel: ChannelKey, address: SocketAddress },
    ChannelUnavailable { group: String, channel: ChannelKey, address: SocketAddress },
    LookupRequest { group: String, channel: ChannelKey },
    /// Withdraws one earlier `LookupRequest`. Handled locally, never sent.
    LookupCancelled { group: String, channel: ChannelKey },
}

crate::simple_display! {
    DiscoveryMessage {
        ChannelAvailable { .. } => "channel-available",
        ChannelUnavailable { .. } => "channel-unavailable",
        LookupRequest { .. } => "lookup-request",
        LookupCancelled { .. } => "lookup-cancelled",
    }
}

impl DiscoveryMessage {
    pub fn group(&self) -> &str {
        match self {
            DiscoveryMessage::ChannelAvailable { group, .. }
            | DiscoveryMessage::ChannelUnavailable { group, .. }
            | DiscoveryMessage::LookupRequest { group, .. }
            | DiscoveryMessage::LookupCancelled { group, .. } => group,
        }
    }

    pub fn channel(&self) -> &ChannelKey {
        match self {
            DiscoveryMessage::ChannelAvailable { channel, .. }
            | DiscoveryMessage::ChannelUnavailable { channel, .. }
            | DiscoveryMessage::LookupRequest { channel, .. }
            | DiscoveryMessage::LookupCancelled { channel, .. } => channel,
        }
    }
}
