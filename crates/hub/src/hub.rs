// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Local channels and peer connections around one router.
//!
//! ```text
//!  add_unicast_outgoing ─► [UnicastSend│Send│Disconnect] ─┐
//!  add_broadcast_outgoing ► [BroadcastSend│Send│Disconnect]┤ local      ┌── peer 1 (MultiChannelConnection)
//!  add_incoming ◄───────── [Receive│Disconnect] ◄─────────┼─ endpoints ─ Router ─ remote endpoints ─┤
//!  add_worker ◄─────────── [Worker│Disconnect] ◄──────────┘            └── peer n
//! ```
//!
//! Producers and consumers only meet across the router: a local producer
//! rendezvous with consumers on peers, and the other way round.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use plexus_core::{
    dispatch_fn, AsyncConnection, ChannelKey, Connection, Dispatch, Executor, Message, MessagingError,
    RouteId, RoutingMessage, Stoppable,
};
use plexus_stack::{DisconnectAwareConnection, Protocol, ProtocolStack, StackTop};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::multi_channel::MultiChannelConnection;
use crate::protocols::{
    BroadcastSendProtocol, DisconnectProtocol, ReceiveProtocol, SendProtocol, UnicastSendProtocol,
    WorkerProtocol,
};
use crate::router::Router;

/// Reserved channel carrying router traffic between hubs.
pub const HUB_CHANNEL: &str = "plexus.hub";

/// A request delivered to an incoming channel.
#[derive(Debug, Clone, PartialEq)]
pub struct IncomingMessage {
    pub channel: ChannelKey,
    pub producer: RouteId,
    pub payload: Value,
}

impl IncomingMessage {
    /// Deserialize the payload.
    pub fn payload_as<T: DeserializeOwned>(&self) -> Result<T, MessagingError> {
        Ok(serde_json::from_value(self.payload.clone())?)
    }
}

/// Sending side of a unicast or broadcast channel.
#[derive(Clone)]
pub struct OutgoingChannel {
    channel: ChannelKey,
    top: StackTop<Message>,
}

impl OutgoingChannel {
    pub fn channel(&self) -> &ChannelKey {
        &self.channel
    }
}

impl Dispatch<Value> for OutgoingChannel {
    fn dispatch(&self, payload: Value) -> Result<(), MessagingError> {
        self.top.dispatch(Message::Payload(payload))
    }
}

/// Multiplexes local channels over any number of peer connections.
pub struct MessageHub {
    name: Arc<str>,
    executor: Executor,
    router: Router,
    stacks: Mutex<Vec<Arc<ProtocolStack<Message>>>>,
    peers: Mutex<Vec<Arc<dyn Stoppable>>>,
    next_peer: AtomicU64,
    stop_requested: AtomicBool,
}

impl MessageHub {
    pub fn new(executor: &Executor, name: impl Into<Arc<str>>) -> Self {
        let name: Arc<str> = name.into();
        info!(hub = %name, "message hub started");
        Self {
            router: Router::new(executor, Arc::clone(&name)),
            name,
            executor: executor.clone(),
            stacks: Mutex::new(Vec::new()),
            peers: Mutex::new(Vec::new()),
            next_peer: AtomicU64::new(1),
            stop_requested: AtomicBool::new(false),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn ensure_running(&self) -> Result<(), MessagingError> {
        if self.stop_requested.load(Ordering::SeqCst) {
            return Err(MessagingError::stopped(format!("hub {}", self.name)));
        }
        Ok(())
    }

    fn display_name(&self, channel: &ChannelKey) -> String {
        format!("{} {}", self.name, channel)
    }

    /// Build a local stack and bind its bottom to a new router endpoint.
    fn add_stack(
        &self,
        kind: &str,
        channel: &ChannelKey,
        protocols: Vec<Box<dyn Protocol<Message>>>,
    ) -> Result<Arc<ProtocolStack<Message>>, MessagingError> {
        self.ensure_running()?;
        let endpoint = Arc::new(self.router.create_local_connection()?);
        let mut all = protocols;
        all.push(Box::new(DisconnectProtocol::new()));
        let stack = Arc::new(ProtocolStack::new(&self.executor, format!("{} {} {}", self.name, kind, channel), all));
        let bottom = stack.bottom();
        bottom.dispatch_to(endpoint.clone());
        endpoint.dispatch_to(Arc::new(bottom));
        self.stacks.lock().push(Arc::clone(&stack));
        debug!(hub = %self.name, %channel, kind, "local channel added");
        Ok(stack)
    }

    /// Payloads dispatched to the returned channel go to exactly one
    /// consumer of `channel`, queueing until one is available.
    pub fn add_unicast_outgoing(&self, channel: impl Into<ChannelKey>) -> Result<OutgoingChannel, MessagingError> {
        let channel = channel.into();
        let producer = RouteId::new();
        let stack = self.add_stack(
            "unicast",
            &channel,
            vec![
                Box::new(UnicastSendProtocol::new(producer.clone())),
                Box::new(SendProtocol::new(producer, self.display_name(&channel), channel.clone())),
            ],
        )?;
        Ok(OutgoingChannel { channel, top: stack.top() })
    }

    /// Payloads dispatched to the returned channel go to every consumer of
    /// `channel` known at that moment.
    pub fn add_broadcast_outgoing(&self, channel: impl Into<ChannelKey>) -> Result<OutgoingChannel, MessagingError> {
        let channel = channel.into();
        let producer = RouteId::new();
        let stack = self.add_stack(
            "broadcast",
            &channel,
            vec![
                Box::new(BroadcastSendProtocol::new(producer.clone())),
                Box::new(SendProtocol::new(producer, self.display_name(&channel), channel.clone())),
            ],
        )?;
        Ok(OutgoingChannel { channel, top: stack.top() })
    }

    /// Consume `channel`, passing each request with its producer to `handler`.
    pub fn add_incoming(
        &self,
        channel: impl Into<ChannelKey>,
        handler: Arc<dyn Dispatch<IncomingMessage>>,
    ) -> Result<(), MessagingError> {
        let channel = channel.into();
        let stack = self.add_stack(
            "incoming",
            &channel,
            vec![Box::new(ReceiveProtocol::new(RouteId::new(), self.display_name(&channel), channel.clone()))],
        )?;
        let key = channel.clone();
        stack.top().dispatch_to(dispatch_fn(move |message: Message| match message {
            Message::Routing(RoutingMessage::Request { producer, payload, .. }) => {
                handler.dispatch(IncomingMessage { channel: key.clone(), producer, payload })
            }
            other => Err(MessagingError::Handler(format!("unexpected {} on incoming channel {}", other, key))),
        }));
        Ok(())
    }

    /// Consume `channel`, passing each bare payload to `handler`.
    pub fn add_worker(&self, channel: impl Into<ChannelKey>, handler: Arc<dyn Dispatch<Value>>) -> Result<(), MessagingError> {
        let channel = channel.into();
        let stack = self.add_stack(
            "worker",
            &channel,
            vec![Box::new(WorkerProtocol::new(RouteId::new(), self.display_name(&channel), channel.clone()))],
        )?;
        let key = channel.clone();
        stack.top().dispatch_to(dispatch_fn(move |message: Message| match message {
            Message::Payload(payload) => handler.dispatch(payload),
            other => Err(MessagingError::Handler(format!("unexpected {} on worker channel {}", other, key))),
        }));
        Ok(())
    }

    /// Attach a peer. Its routes become visible to local channels and the
    /// other way round; when the peer goes away, its routes are retracted.
    pub fn add_connection<C>(&self, connection: C) -> Result<(), MessagingError>
    where
        C: Connection<Message> + 'static,
    {
        self.ensure_running()?;
        let peer = self.next_peer.fetch_add(1, Ordering::Relaxed);
        let remote = Arc::new(self.router.create_remote_connection()?);

        let hub = Arc::clone(&self.name);
        let aware = DisconnectAwareConnection::new(&self.executor, Arc::new(connection), move || {
            info!(hub = %hub, peer, "peer disconnected");
        })?;
        let connection = Arc::new(MultiChannelConnection::new(
            &self.executor,
            format!("{} peer {}", self.name, peer),
            Arc::new(aware),
        )?);

        let to_peer = connection.add_outgoing_channel(HUB_CHANNEL);
        // The router's end-of-stream echo stays local
        remote.dispatch_to(dispatch_fn(move |message: Message| {
            if message.is_end_of_stream() {
                Ok(())
            } else {
                to_peer.dispatch(message)
            }
        }));
        connection.add_incoming_channel(HUB_CHANNEL, remote);
        // Routes are retracted behind the last message the peer delivered,
        // whether it ended its stream or just went away
        connection.end_incoming_channel_on_close(HUB_CHANNEL)?;

        self.peers.lock().push(connection);
        info!(hub = %self.name, peer, "peer connected");
        Ok(())
    }
}

#[async_trait]
impl Stoppable for MessageHub {
    /// Starts stopping every local channel. Peers stay connected so the
    /// channels can finish their handshakes.
    fn request_stop(&self) {
        if self.stop_requested.swap(true, Ordering::SeqCst) {
            return;
        }
        info!(hub = %self.name, "stop requested");
        for stack in self.stacks.lock().iter() {
            stack.request_stop();
        }
    }

    /// Stops local channels, then peers, then the router. Returns the first
    /// failure.
    async fn stop(&self) -> Result<(), MessagingError> {
        self.request_stop();
        let mut result = Ok(());
        let stacks = std::mem::take(&mut *self.stacks.lock());
        for stack in stacks {
            if let Err(e) = stack.stop().await {
                warn!(hub = %self.name, stack = stack.name(), "channel stopped with failure: {}", e);
                result = result.and(Err(e));
            }
        }
        let peers = std::mem::take(&mut *self.peers.lock());
        for peer in peers {
            if let Err(e) = peer.stop().await {
                warn!(hub = %self.name, "peer stopped with failure: {}", e);
                result = result.and(Err(e));
            }
        }
        if let Err(e) = self.router.stop().await {
            result = result.and(Err(e));
        }
        info!(hub = %self.name, "message hub stopped");
        result
    }
}

#[cfg(test)]
#[path = "hub_tests.rs"]
mod tests;
