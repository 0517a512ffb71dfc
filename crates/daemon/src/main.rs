// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! plexusd: runs a message hub until interrupted.

use anyhow::Context;
use plexus_core::Executor;
use plexus_daemon::{logging, Config, Daemon, DaemonError};
use plexus_wire::MulticastConnection;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::load();
    let _log_guard = logging::init(&config)?;

    let executor = Executor::current(config.node_name.clone());
    let discovery = MulticastConnection::join(&executor, config.multicast_group)
        .await
        .map_err(|e| DaemonError::Discovery(config.multicast_group.to_string(), e))?;
    let daemon = Daemon::start(config, discovery).await?;

    tokio::signal::ctrl_c().await.context("waiting for ctrl-c")?;
    info!("received shutdown signal");
    daemon.shutdown().await?;
    Ok(())
}
