// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon lifecycle: configuration, startup and graceful shutdown.

use std::net::{SocketAddr, SocketAddrV4};
use std::path::PathBuf;
use std::sync::Arc;

use plexus_core::{dispatch_fn, Connection, DiscoveryMessage, Executor, Message, MessagingError, SocketAddress, Stoppable};
use plexus_hub::{DiscoveryRegistrar, MessageHub, HUB_CHANNEL};
use plexus_wire::{HandshakeIncomingConnector, SocketConnection};
use serde_json::Value;
use thiserror::Error;
use tracing::{info, warn};

use crate::env::{log_dir, log_filter, node_name};

/// Worker channel whose payloads the daemon writes to its own log.
pub const LOG_CHANNEL: &str = "plexus.log";

/// Daemon configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Name of the hub, used in logs and channel display names
    pub node_name: String,
    /// Address the hub accepts peer connections on
    pub bind_addr: SocketAddr,
    /// Discovery group the hub registers in
    pub discovery_group: String,
    /// UDP multicast group carrying discovery traffic
    pub multicast_group: SocketAddrV4,
    /// Log filter directives
    pub log_filter: String,
    /// Directory for rolling log files; stderr when unset
    pub log_dir: Option<PathBuf>,
}

impl Config {
    /// Load configuration from `PLEXUS_*` environment variables.
    pub fn load() -> Self {
        Self {
            node_name: node_name(),
            bind_addr: plexus_wire::env::bind_addr(),
            discovery_group: plexus_hub::env::discovery_group(),
            multicast_group: plexus_wire::env::multicast_group(),
            log_filter: log_filter(),
            log_dir: log_dir(),
        }
    }
}

#[derive(Debug, Error)]
pub enum DaemonError {
    #[error("Failed to accept peers on {0}: {1}")]
    Listen(SocketAddr, #[source] MessagingError),

    #[error("Failed to join discovery group {0}: {1}")]
    Discovery(String, #[source] MessagingError),

    #[error("Failed to create log directory {0}: {1}")]
    LogDir(PathBuf, #[source] std::io::Error),

    #[error("Failed to install logging: {0}")]
    Logging(String),

    #[error(transparent)]
    Messaging(#[from] MessagingError),
}

/// A running hub, reachable over TCP and registered for discovery.
pub struct Daemon {
    config: Config,
    hub: Arc<MessageHub>,
    connector: HandshakeIncomingConnector<Message>,
    registrar: DiscoveryRegistrar,
    address: SocketAddress,
}

impl Daemon {
    /// Start the hub, accept peers on `config.bind_addr` and register the
    /// hub's address in `config.discovery_group` over `discovery`.
    pub async fn start<C>(config: Config, discovery: C) -> Result<Self, DaemonError>
    where
        C: Connection<DiscoveryMessage> + 'static,
    {
        let executor = Executor::current(config.node_name.clone());
        let hub = Arc::new(MessageHub::new(&executor, config.node_name.clone()));

        let node = config.node_name.clone();
        hub.add_worker(
            LOG_CHANNEL,
            dispatch_fn(move |payload: Value| {
                info!(node = %node, "{}", log_line(&payload));
                Ok(())
            }),
        )?;

        let connector = HandshakeIncomingConnector::new(executor.clone(), config.bind_addr);
        let accepting = Arc::clone(&hub);
        let address = connector
            .accept(move |connection: SocketConnection<Message>| {
                let peer = connection.peer().to_string();
                match accepting.add_connection(connection) {
                    Ok(()) => info!(%peer, "peer hub connected"),
                    Err(e) => warn!(%peer, "refused peer hub: {}", e),
                }
            })
            .await
            .map_err(|e| DaemonError::Listen(config.bind_addr, e))?;

        let registrar = DiscoveryRegistrar::new(&executor, &config.discovery_group, discovery)
            .map_err(|e| DaemonError::Discovery(config.discovery_group.clone(), e))?;
        registrar.register(HUB_CHANNEL, address.clone())?;

        info!(node = %config.node_name, %address, group = %config.discovery_group, "daemon ready");
        Ok(Self { config, hub, connector, registrar, address })
    }

    /// Where peers connect to reach this hub.
    pub fn address(&self) -> &SocketAddress {
        &self.address
    }

    pub fn hub(&self) -> &MessageHub {
        &self.hub
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Withdraw the registration, stop accepting peers, then stop the hub.
    pub async fn shutdown(self) -> Result<(), DaemonError> {
        info!(node = %self.config.node_name, "shutting down daemon");
        let registration = self.registrar.stop().await;
        self.connector.stop();
        let hub = self.hub.stop().await;
        registration?;
        hub?;
        info!(node = %self.config.node_name, "daemon stopped");
        Ok(())
    }
}

/// Text logged for a payload on [`LOG_CHANNEL`]: strings as-is, anything
/// else as JSON.
pub(crate) fn log_line(payload: &Value) -> String {
    match payload {
        Value::String(line) => line.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
#[path = "lifecycle_tests.rs"]
mod tests;
