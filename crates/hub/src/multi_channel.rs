// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Many logical channels over one physical connection.
//!
//! ```text
//! outgoing:  ChannelSender ─► end-of-stream gate ─► queue ─► multiplexer ─► connection
//!                                                       (assigns ids, sends ChannelMetaInfo)
//!
//! incoming:  connection ─► receiver ─► end-of-stream filter ─► demultiplexer ─► per-channel queue ─► handler
//! ```
//!
//! Channel ids are assigned by the sending side on first use and announced
//! with a `ChannelMetaInfo` before the first message on that channel. Each
//! side keeps its own numbering.
//!
//! Shutdown is a handshake: each side sends `EndOfStream` exactly once and
//! a side that receives the peer's `EndOfStream` answers with its own.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use plexus_core::{
    AsyncConnection, ChannelId, ChannelKey, ChannelMessage, ChannelMetaInfo, Connection,
    DiscardFailures, DiscardingFailureHandler, Dispatch, Executor, Message, MessagingError, Receive,
    Stoppable,
};
use plexus_stack::{AsyncDispatch, AsyncReceive};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::env::stop_timeout;

enum Outgoing {
    Channel(ChannelKey, Message),
    EndOfStream,
}

/// Serializes channel traffic against the local end of stream: nothing is
/// queued after it.
struct Gate {
    closed: Mutex<bool>,
    queue: Arc<AsyncDispatch<Outgoing>>,
    name: Arc<str>,
}

impl Gate {
    fn send(&self, key: &ChannelKey, message: Message) -> Result<(), MessagingError> {
        let closed = self.closed.lock();
        if *closed {
            return Err(MessagingError::stopped(format!("{} channel {}", self.name, key)));
        }
        self.queue.dispatch(Outgoing::Channel(key.clone(), message))
    }

    /// Queue the local end of stream. Returns false if already sent.
    fn close(&self) -> bool {
        let mut closed = self.closed.lock();
        if *closed {
            return false;
        }
        *closed = true;
        if let Err(e) = self.queue.dispatch(Outgoing::EndOfStream) {
            warn!(connection = %self.name, "could not queue end of stream: {}", e);
        }
        debug!(connection = %self.name, "end of stream sent");
        true
    }
}

/// Assigns channel ids and writes to the physical connection.
struct Multiplexer<C> {
    connection: Arc<C>,
    ids: Mutex<HashMap<ChannelKey, ChannelId>>,
}

impl<C: Connection<Message>> Dispatch<Outgoing> for Multiplexer<C> {
    fn dispatch(&self, message: Outgoing) -> Result<(), MessagingError> {
        match message {
            Outgoing::EndOfStream => self.connection.dispatch(Message::EndOfStream),
            Outgoing::Channel(key, payload) => {
                let id = {
                    let mut ids = self.ids.lock();
                    match ids.get(&key) {
                        Some(id) => *id,
                        None => {
                            let next = u32::try_from(ids.len() + 1)
                                .map(ChannelId)
                                .map_err(|_| MessagingError::IllegalState(format!("channel ids exhausted at {}", key)))?;
                            // Only an announced channel is bound
                            self.connection
                                .dispatch(Message::ChannelMetaInfo(ChannelMetaInfo { key: key.clone(), id: next }))?;
                            ids.insert(key, next);
                            next
                        }
                    }
                };
                self.connection
                    .dispatch(Message::Channel(ChannelMessage { channel: id, payload: Box::new(payload) }))
            }
        }
    }
}

/// Sends on one outgoing channel of a [`MultiChannelConnection`].
#[derive(Clone)]
pub struct ChannelSender {
    key: ChannelKey,
    gate: Arc<Gate>,
}

impl ChannelSender {
    pub fn key(&self) -> &ChannelKey {
        &self.key
    }
}

impl Dispatch<Message> for ChannelSender {
    fn dispatch(&self, message: Message) -> Result<(), MessagingError> {
        self.gate.send(&self.key, message)
    }
}

/// Lazily created per-channel incoming queues.
struct Demultiplexer {
    name: Arc<str>,
    executor: Executor,
    keys: Mutex<HashMap<ChannelId, ChannelKey>>,
    queues: Mutex<HashMap<ChannelKey, Arc<AsyncDispatch<Message>>>>,
    /// Channels told about the end of the incoming stream; `None` once it
    /// ended
    ending: Mutex<Option<Vec<ChannelKey>>>,
}

impl Demultiplexer {
    fn queue(&self, key: &ChannelKey) -> Arc<AsyncDispatch<Message>> {
        let mut queues = self.queues.lock();
        let queue = queues
            .entry(key.clone())
            .or_insert_with(|| Arc::new(AsyncDispatch::new(&self.executor, format!("{} {}", self.name, key))));
        Arc::clone(queue)
    }

    fn drain(&self) -> Vec<Arc<AsyncDispatch<Message>>> {
        self.queues.lock().values().cloned().collect()
    }

    fn end_on_close(&self, key: ChannelKey) -> Result<(), MessagingError> {
        let mut ending = self.ending.lock();
        match ending.as_mut() {
            Some(keys) => {
                keys.push(key);
                Ok(())
            }
            None => self.queue(&key).dispatch(Message::EndOfStream),
        }
    }

    /// Queue an end of stream behind everything already received on the
    /// channels that asked for one.
    fn end_of_stream(&self) {
        let Some(keys) = self.ending.lock().take() else {
            return;
        };
        for key in keys {
            if let Err(e) = self.queue(&key).dispatch(Message::EndOfStream) {
                warn!(connection = %self.name, channel = %key, "could not end incoming channel: {}", e);
            }
        }
    }
}

/// Handles what the receiver pulls off the connection.
struct IncomingFilter {
    name: Arc<str>,
    gate: Arc<Gate>,
    peer_end_of_stream: CancellationToken,
    demux: Arc<Demultiplexer>,
}

impl Dispatch<Message> for IncomingFilter {
    fn dispatch(&self, message: Message) -> Result<(), MessagingError> {
        match message {
            Message::EndOfStream => {
                if !self.peer_end_of_stream.is_cancelled() {
                    debug!(connection = %self.name, "peer end of stream");
                    self.gate.close();
                    self.demux.end_of_stream();
                    self.peer_end_of_stream.cancel();
                }
                Ok(())
            }
            Message::ChannelMetaInfo(info) => {
                debug!(connection = %self.name, channel = %info.key, id = %info.id, "incoming channel bound");
                self.demux.keys.lock().insert(info.id, info.key);
                Ok(())
            }
            Message::Channel(channel) => {
                let key = self.demux.keys.lock().get(&channel.channel).cloned();
                let Some(key) = key else {
                    return Err(MessagingError::contract(format!(
                        "{}: message on unbound channel {}",
                        self.name, channel.channel
                    )));
                };
                self.demux.queue(&key).dispatch(*channel.payload)
            }
            other => Err(MessagingError::Handler(format!("{}: unexpected {} outside a channel", self.name, other))),
        }
    }
}

/// Multiplexes keyed channels over a single `Connection<Message>`.
pub struct MultiChannelConnection<C> {
    name: Arc<str>,
    connection: Arc<C>,
    gate: Arc<Gate>,
    outgoing: Arc<AsyncDispatch<Outgoing>>,
    receiver: AsyncReceive<Message>,
    demux: Arc<Demultiplexer>,
    peer_end_of_stream: CancellationToken,
    stop_timeout: Duration,
}

impl<C: Connection<Message> + 'static> MultiChannelConnection<C> {
    /// Start sending and receiving over `connection`. The stop handshake
    /// is bounded by `PLEXUS_STOP_TIMEOUT_MS`.
    pub fn new(executor: &Executor, name: impl Into<Arc<str>>, connection: Arc<C>) -> Result<Self, MessagingError> {
        Self::with_stop_timeout(executor, name, connection, stop_timeout())
    }

    pub fn with_stop_timeout(
        executor: &Executor,
        name: impl Into<Arc<str>>,
        connection: Arc<C>,
        stop_timeout: Duration,
    ) -> Result<Self, MessagingError> {
        let name: Arc<str> = name.into();
        let failures = DiscardingFailureHandler::shared(name.to_string());

        let outgoing = Arc::new(AsyncDispatch::new(executor, format!("{} outgoing", name)));
        outgoing.dispatch_to(Arc::new(DiscardFailures::new(
            Multiplexer { connection: Arc::clone(&connection), ids: Mutex::new(HashMap::new()) },
            Arc::clone(&failures),
        )));
        let gate = Arc::new(Gate { closed: Mutex::new(false), queue: Arc::clone(&outgoing), name: Arc::clone(&name) });

        let demux = Arc::new(Demultiplexer {
            name: Arc::clone(&name),
            executor: executor.clone(),
            keys: Mutex::new(HashMap::new()),
            queues: Mutex::new(HashMap::new()),
            ending: Mutex::new(Some(Vec::new())),
        });
        let peer_end_of_stream = CancellationToken::new();
        let filter = IncomingFilter {
            name: Arc::clone(&name),
            gate: Arc::clone(&gate),
            peer_end_of_stream: peer_end_of_stream.clone(),
            demux: Arc::clone(&demux),
        };
        let receiver = AsyncReceive::new(
            executor,
            format!("{} incoming", name),
            Arc::new(DiscardFailures::new(filter, Arc::clone(&failures))),
        )
        .with_end_of_stream(Message::EndOfStream);
        let source: Arc<dyn Receive<Message>> = connection.clone();
        receiver.receive_from(source)?;
        info!(connection = %name, "multi-channel connection started");

        Ok(Self { name, connection, gate, outgoing, receiver, demux, peer_end_of_stream, stop_timeout })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Sender for channel `key`. The channel id is assigned on first send.
    pub fn add_outgoing_channel(&self, key: impl Into<ChannelKey>) -> ChannelSender {
        ChannelSender { key: key.into(), gate: Arc::clone(&self.gate) }
    }

    /// Deliver messages arriving on channel `key` to `handler`, including
    /// any that arrived before the handler was attached.
    pub fn add_incoming_channel(&self, key: impl Into<ChannelKey>, handler: Arc<dyn Dispatch<Message>>) {
        let key = key.into();
        debug!(connection = %self.name, channel = %key, "incoming channel handler attached");
        self.demux.queue(&key).dispatch_to(handler);
    }

    /// Deliver an `EndOfStream` on incoming channel `key` once the peer ends
    /// its stream or the connection closes, after every message received
    /// before that.
    pub fn end_incoming_channel_on_close(&self, key: impl Into<ChannelKey>) -> Result<(), MessagingError> {
        self.demux.end_on_close(key.into())
    }

    /// True once the peer sent its end of stream or the connection ended.
    pub fn peer_stopped(&self) -> bool {
        self.peer_end_of_stream.is_cancelled()
    }
}

#[async_trait]
impl<C: Connection<Message> + 'static> Stoppable for MultiChannelConnection<C> {
    /// Sends the local end of stream. Never waits.
    fn request_stop(&self) {
        self.gate.close();
    }

    /// Completes the end-of-stream handshake, then flushes and stops every
    /// queue and the connection. The handshake and the teardown are each
    /// bounded by the stop timeout; overrunning either is a
    /// [`MessagingError::StopTimeout`].
    async fn stop(&self) -> Result<(), MessagingError> {
        self.gate.close();
        let timed_out =
            || MessagingError::StopTimeout { component: format!("connection {}", self.name), timeout: self.stop_timeout };

        let mut result = Ok(());
        if tokio::time::timeout(self.stop_timeout, self.peer_end_of_stream.cancelled()).await.is_err() {
            warn!(connection = %self.name, timeout = ?self.stop_timeout, "peer did not end its stream");
            result = Err(timed_out());
        }
        match tokio::time::timeout(self.stop_timeout, self.tear_down()).await {
            Ok(torn_down) => result = result.and(torn_down),
            Err(_) => {
                warn!(connection = %self.name, timeout = ?self.stop_timeout, "connection did not stop in time");
                self.abandon();
                result = result.and(Err(timed_out()));
            }
        }
        info!(connection = %self.name, "multi-channel connection stopped");
        result
    }
}

impl<C: Connection<Message> + 'static> MultiChannelConnection<C> {
    /// Stops every component in order and reports the first failure.
    async fn tear_down(&self) -> Result<(), MessagingError> {
        let mut result = self.outgoing.stop().await;
        let stopped = self.connection.stop().await;
        result = result.and(stopped);
        let stopped = self.receiver.stop().await;
        result = result.and(stopped);
        for queue in self.demux.drain() {
            let stopped = queue.stop().await;
            result = result.and(stopped);
        }
        result
    }

    fn abandon(&self) {
        self.outgoing.request_stop();
        self.connection.request_stop();
        self.receiver.request_stop();
        for queue in self.demux.drain() {
            queue.request_stop();
        }
    }
}

#[cfg(test)]
#[path = "multi_channel_tests.rs"]
mod tests;
