// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! UDP multicast transport for discovery messages.
//!
//! Each datagram carries exactly one JSON-encoded message (no length
//! prefix). Malformed datagrams are logged and skipped: a multicast group
//! is shared with whoever else joins it.

use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};

use async_trait::async_trait;
use parking_lot::Mutex;
use plexus_core::{DiscoveryMessage, Dispatch, Executor, MessagingError, Receive, Stoppable};
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::wire;

/// Largest datagram accepted.
const MAX_DATAGRAM: usize = 64 * 1024;

/// A [`plexus_core::Connection`] to an IPv4 multicast group.
pub struct MulticastConnection {
    group: SocketAddrV4,
    socket: std::sync::Arc<UdpSocket>,
    outgoing: Mutex<Option<mpsc::UnboundedSender<Vec<u8>>>>,
    closed: CancellationToken,
}

impl MulticastConnection {
    /// Bind the group port on all interfaces and join the group with
    /// loopback enabled, so peers on the same host see each other.
    pub async fn join(executor: &Executor, group: SocketAddrV4) -> Result<Self, MessagingError> {
        if !group.ip().is_multicast() {
            return Err(MessagingError::InvalidArgument(format!("{} is not a multicast address", group)));
        }
        let socket = UdpSocket::bind(SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, group.port()))).await?;
        socket.join_multicast_v4(*group.ip(), Ipv4Addr::UNSPECIFIED)?;
        socket.set_multicast_loop_v4(true)?;
        let socket = std::sync::Arc::new(socket);

        // Sends go through one task so dispatch() never waits on the socket
        let (tx, mut rx) = mpsc::unbounded_channel::<Vec<u8>>();
        let sender = std::sync::Arc::clone(&socket);
        executor.spawn(async move {
            while let Some(datagram) = rx.recv().await {
                if let Err(e) = sender.send_to(&datagram, SocketAddr::V4(group)).await {
                    warn!(%group, "multicast send failed: {}", e);
                }
            }
        });

        debug!(%group, "joined multicast group");
        Ok(Self { group, socket, outgoing: Mutex::new(Some(tx)), closed: CancellationToken::new() })
    }

    pub fn group(&self) -> SocketAddrV4 {
        self.group
    }
}

impl Dispatch<DiscoveryMessage> for MulticastConnection {
    fn dispatch(&self, message: DiscoveryMessage) -> Result<(), MessagingError> {
        let datagram = wire::encode(&message)?;
        if datagram.len() > MAX_DATAGRAM {
            return Err(MessagingError::InvalidArgument(format!("{} byte datagram", datagram.len())));
        }
        match self.outgoing.lock().as_ref() {
            Some(tx) => tx
                .send(datagram)
                .map_err(|_| MessagingError::Transport("multicast sender has exited".to_string())),
            None => Err(MessagingError::stopped(format!("multicast {}", self.group))),
        }
    }
}

#[async_trait]
impl Receive<DiscoveryMessage> for MulticastConnection {
    async fn receive(&self) -> Result<Option<DiscoveryMessage>, MessagingError> {
        let mut buf = vec![0u8; MAX_DATAGRAM];
        loop {
            let (len, from) = tokio::select! {
                _ = self.closed.cancelled() => return Ok(None),
                received = self.socket.recv_from(&mut buf) => received?,
            };
            match wire::decode::<DiscoveryMessage>(&buf[..len]) {
                Ok(message) => return Ok(Some(message)),
                Err(e) => debug!(%from, "skipping malformed datagram: {}", e),
            }
        }
    }
}

#[async_trait]
impl Stoppable for MulticastConnection {
    fn request_stop(&self) {
        self.outgoing.lock().take();
    }

    async fn stop(&self) -> Result<(), MessagingError> {
        self.request_stop();
        self.closed.cancel();
        if let Err(e) = self.socket.leave_multicast_v4(*self.group.ip(), Ipv4Addr::UNSPECIFIED) {
            debug!(group = %self.group, "leave failed: {}", e);
        }
        Ok(())
    }
}
