// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Centralized environment variable access for the hub crate.

use std::time::Duration;

/// Default discovery group name
pub const DEFAULT_DISCOVERY_GROUP: &str = "plexus";

fn millis(var: &str, default: Duration) -> Duration {
    std::env::var(var)
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .map(Duration::from_millis)
        .unwrap_or(default)
}

/// Deadline for a multi-channel connection's end-of-stream handshake
/// (default 120s, configurable via `PLEXUS_STOP_TIMEOUT_MS`).
pub fn stop_timeout() -> Duration {
    millis("PLEXUS_STOP_TIMEOUT_MS", Duration::from_secs(120))
}

/// How long a broadcast channel keeps undelivered messages once stop was
/// requested (default 5s, configurable via `PLEXUS_BROADCAST_STOP_TIMEOUT_MS`).
pub fn broadcast_stop_timeout() -> Duration {
    millis("PLEXUS_BROADCAST_STOP_TIMEOUT_MS", Duration::from_secs(5))
}

/// Interval between repeated discovery lookups (default 1s, configurable
/// via `PLEXUS_LOOKUP_INTERVAL_MS`).
pub fn lookup_interval() -> Duration {
    millis("PLEXUS_LOOKUP_INTERVAL_MS", Duration::from_secs(1))
}

/// Discovery group: `PLEXUS_DISCOVERY_GROUP`.
pub fn discovery_group() -> String {
    std::env::var("PLEXUS_DISCOVERY_GROUP")
        .ok()
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| DEFAULT_DISCOVERY_GROUP.to_string())
}

#[cfg(test)]
#[path = "env_tests.rs"]
mod tests;
