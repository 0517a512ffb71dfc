// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! plexus-daemon: a standalone hub reachable over TCP and discoverable by multicast

pub mod env;
mod lifecycle;
pub mod logging;

pub use lifecycle::{Config, Daemon, DaemonError, LOG_CHANNEL};
