// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Centralized environment variable access for the wire crate.

use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::time::Duration;

/// Default multicast group for discovery
pub const DEFAULT_MULTICAST_GROUP: SocketAddrV4 = SocketAddrV4::new(Ipv4Addr::new(239, 255, 7, 7), 7777);

/// Address incoming connectors bind: `PLEXUS_BIND_ADDR`, default an
/// ephemeral loopback port.
pub fn bind_addr() -> SocketAddr {
    std::env::var("PLEXUS_BIND_ADDR")
        .ok()
        .and_then(|s| s.parse::<SocketAddr>().ok())
        .unwrap_or_else(|| SocketAddr::from((Ipv4Addr::LOCALHOST, 0)))
}

/// How long an accepted connection may take to send its `ConnectRequest`
/// (default 5s, configurable via `PLEXUS_HANDSHAKE_TIMEOUT_MS`).
pub fn handshake_timeout() -> Duration {
    std::env::var("PLEXUS_HANDSHAKE_TIMEOUT_MS")
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .map(Duration::from_millis)
        .unwrap_or(Duration::from_secs(5))
}

/// Multicast group for discovery: `PLEXUS_MULTICAST_ADDR`.
pub fn multicast_group() -> SocketAddrV4 {
    std::env::var("PLEXUS_MULTICAST_ADDR")
        .ok()
        .and_then(|s| s.parse::<SocketAddrV4>().ok())
        .unwrap_or(DEFAULT_MULTICAST_GROUP)
}

#[cfg(test)]
#[path = "env_tests.rs"]
mod tests;
