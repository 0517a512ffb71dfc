// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Centralized environment variable access for the daemon crate.

use std::path::PathBuf;

/// Name this node announces itself with: `PLEXUS_NODE_NAME` > `HOSTNAME` > "plexusd"
pub fn node_name() -> String {
    non_empty("PLEXUS_NODE_NAME")
        .or_else(|| non_empty("HOSTNAME"))
        .unwrap_or_else(|| "plexusd".to_string())
}

/// Log filter directives (default "info")
pub fn log_filter() -> String {
    non_empty("PLEXUS_LOG").unwrap_or_else(|| "info".to_string())
}

/// Directory for rolling log files. Logs go to stderr when unset.
pub fn log_dir() -> Option<PathBuf> {
    non_empty("PLEXUS_LOG_DIR").map(PathBuf::from)
}

fn non_empty(var: &str) -> Option<String> {
    std::env::var(var).ok().filter(|s| !s.is_empty())
}

#[cfg(test)]
#[path = "env_tests.rs"]
mod tests;
