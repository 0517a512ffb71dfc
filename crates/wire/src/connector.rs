// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! TCP connectors.
//!
//! The plain connectors hand out raw streams. The handshake connectors
//! share one physical acceptor between many logical listeners: every
//! outgoing connection starts with a [`ConnectRequest`] frame naming the
//! listener it wants, and the acceptor routes it accordingly.

use std::collections::HashMap;
use std::marker::PhantomData;
use std::net::SocketAddr;
use std::sync::Arc;

use parking_lot::Mutex;
use plexus_core::{Executor, ListenerId, MessagingError, SocketAddress};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::env::handshake_timeout;
use crate::socket::SocketConnection;
use crate::wire::{self, ProtocolError};

/// First frame on every handshake connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectRequest {
    pub destination: ListenerId,
}

type StreamAction = Arc<dyn Fn(TcpStream, SocketAddr) + Send + Sync>;

/// Accepts TCP connections on one bound address.
pub struct TcpIncomingConnector {
    executor: Executor,
    bind: SocketAddr,
    shutdown: CancellationToken,
}

impl TcpIncomingConnector {
    pub fn new(executor: Executor, bind: SocketAddr) -> Self {
        Self { executor, bind, shutdown: CancellationToken::new() }
    }

    /// Bind and start accepting. `action` runs once per accepted connection,
    /// on the accept loop, so it should hand the stream off rather than do
    /// I/O itself. Returns the bound address.
    pub async fn accept<F>(&self, action: F) -> Result<SocketAddr, MessagingError>
    where
        F: Fn(TcpStream, SocketAddr) + Send + Sync + 'static,
    {
        let listener = TcpListener::bind(self.bind).await?;
        let local = listener.local_addr()?;
        let action: StreamAction = Arc::new(action);
        let shutdown = self.shutdown.clone();
        info!(%local, "accepting connections");

        self.executor.spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    result = listener.accept() => match result {
                        Ok((stream, peer)) => {
                            debug!(%peer, "accepted connection");
                            action(stream, peer);
                        }
                        Err(e) => error!(%local, "accept error: {}", e),
                    },
                }
            }
            debug!(%local, "accept loop exited");
        });
        Ok(local)
    }

    /// Stop accepting. Connections already handed off are unaffected.
    pub fn stop(&self) {
        self.shutdown.cancel();
    }
}

/// Opens TCP connections.
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpOutgoingConnector;

impl TcpOutgoingConnector {
    pub async fn connect(&self, addr: SocketAddr) -> Result<TcpStream, MessagingError> {
        let stream = TcpStream::connect(addr).await?;
        stream.set_nodelay(true)?;
        Ok(stream)
    }
}

type ConnectionAction<T> = Arc<dyn Fn(SocketConnection<T>) + Send + Sync>;

struct Listeners<T> {
    by_id: HashMap<ListenerId, ConnectionAction<T>>,
    /// Bound address, once the physical acceptor is running
    local: Option<SocketAddr>,
}

/// Many logical listeners behind one TCP acceptor.
pub struct HandshakeIncomingConnector<T> {
    tcp: TcpIncomingConnector,
    executor: Executor,
    listeners: Arc<Mutex<Listeners<T>>>,
    startup: tokio::sync::Mutex<()>,
}

impl<T> HandshakeIncomingConnector<T>
where
    T: Serialize + DeserializeOwned + Send + 'static,
{
    pub fn new(executor: Executor, bind: SocketAddr) -> Self {
        Self {
            tcp: TcpIncomingConnector::new(executor.clone(), bind),
            executor,
            listeners: Arc::new(Mutex::new(Listeners { by_id: HashMap::new(), local: None })),
            startup: tokio::sync::Mutex::new(()),
        }
    }

    /// Register a logical listener. `action` receives each connection whose
    /// `ConnectRequest` names the returned address.
    pub async fn accept<F>(&self, action: F) -> Result<SocketAddress, MessagingError>
    where
        F: Fn(SocketConnection<T>) + Send + Sync + 'static,
    {
        let local = self.ensure_started().await?;
        let listener = ListenerId::new();
        self.listeners.lock().by_id.insert(listener.clone(), Arc::new(action));
        debug!(%listener, %local, "registered listener");
        Ok(SocketAddress { addr: local, listener })
    }

    /// Unregister a logical listener. Later connections to it are refused.
    pub fn remove(&self, listener: &ListenerId) -> bool {
        self.listeners.lock().by_id.remove(listener).is_some()
    }

    pub fn stop(&self) {
        self.tcp.stop();
    }

    async fn ensure_started(&self) -> Result<SocketAddr, MessagingError> {
        let _guard = self.startup.lock().await;
        if let Some(local) = self.listeners.lock().local {
            return Ok(local);
        }
        let listeners = Arc::clone(&self.listeners);
        let executor = self.executor.clone();
        let local = self
            .tcp
            .accept(move |stream, peer| {
                let listeners = Arc::clone(&listeners);
                let connections = executor.clone();
                executor.spawn(async move {
                    if let Err(e) = route_connection(stream, peer, listeners, &connections).await {
                        log_handshake_error(peer, e);
                    }
                });
            })
            .await?;
        self.listeners.lock().local = Some(local);
        Ok(local)
    }
}

async fn route_connection<T>(
    mut stream: TcpStream,
    peer: SocketAddr,
    listeners: Arc<Mutex<Listeners<T>>>,
    executor: &Executor,
) -> Result<(), ProtocolError>
where
    T: Serialize + DeserializeOwned + Send + 'static,
{
    let request: ConnectRequest = wire::read_frame_timeout(&mut stream, handshake_timeout()).await?;
    let action = listeners.lock().by_id.get(&request.destination).cloned();
    match action {
        Some(action) => {
            debug!(%peer, listener = %request.destination, "connection routed");
            stream.set_nodelay(true)?;
            action(SocketConnection::from_tcp(executor, stream));
        }
        // Dropping the stream closes it
        None => warn!(%peer, listener = %request.destination, "no such listener, closing connection"),
    }
    Ok(())
}

fn log_handshake_error(peer: SocketAddr, e: ProtocolError) {
    match e {
        ProtocolError::ConnectionClosed => debug!(%peer, "peer closed before handshake"),
        ProtocolError::Timeout => warn!(%peer, "handshake timed out"),
        _ => error!(%peer, "handshake failed: {}", e),
    }
}

/// Opens connections to logical listeners.
pub struct HandshakeOutgoingConnector<T> {
    tcp: TcpOutgoingConnector,
    executor: Executor,
    _marker: PhantomData<fn(T) -> T>,
}

impl<T> HandshakeOutgoingConnector<T>
where
    T: Serialize + DeserializeOwned + Send + 'static,
{
    /// Writers of the opened connections run on `executor`.
    pub fn new(executor: Executor) -> Self {
        Self { tcp: TcpOutgoingConnector, executor, _marker: PhantomData }
    }

    /// Connect and send the `ConnectRequest` before any application traffic.
    pub async fn connect(&self, address: &SocketAddress) -> Result<SocketConnection<T>, MessagingError> {
        let mut stream = self.tcp.connect(address.addr).await?;
        let request = ConnectRequest { destination: address.listener.clone() };
        wire::write_frame(&mut stream, &request).await?;
        debug!(%address, "connected");
        Ok(SocketConnection::from_tcp(&self.executor, stream))
    }
}

#[cfg(test)]
#[path = "connector_tests.rs"]
mod tests;
