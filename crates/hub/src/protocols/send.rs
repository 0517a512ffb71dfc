// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Producer side of the rendezvous handshake.

use std::collections::HashMap;

use plexus_core::{ChannelKey, Message, MessagingError, RouteId, RoutingMessage};
use plexus_stack::{Protocol, ProtocolContext};
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
enum Consumer {
    /// `ProducerReady` sent, waiting for `ConsumerReady`
    Pending { display_name: String },
    Connected { display_name: String },
    /// `ProducerStopped` sent, waiting for `ConsumerStopped`
    Stopping,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Running,
    Stopping,
    Stopped,
}

/// Announces a producer and tracks the consumers it is connected to.
///
/// Only consumers that completed the handshake are passed up as
/// `ConsumerAvailable`, and only they receive requests.
pub struct SendProtocol {
    id: RouteId,
    display_name: String,
    channel: ChannelKey,
    consumers: HashMap<RouteId, Consumer>,
    phase: Phase,
}

impl SendProtocol {
    pub fn new(id: RouteId, display_name: impl Into<String>, channel: ChannelKey) -> Self {
        Self { id, display_name: display_name.into(), channel, consumers: HashMap::new(), phase: Phase::Running }
    }

    fn producer_stopped(&self, consumer: &RouteId) -> Message {
        Message::Routing(RoutingMessage::ProducerStopped { producer: self.id.clone(), consumer: consumer.clone() })
    }

    fn forget(&mut self, consumer: &RouteId, ctx: &mut ProtocolContext<Message>) {
        if let Some(Consumer::Connected { .. }) = self.consumers.remove(consumer) {
            ctx.dispatch_incoming(Message::Routing(RoutingMessage::ConsumerUnavailable { id: consumer.clone() }));
        }
        self.maybe_finish(ctx);
    }

    fn maybe_finish(&mut self, ctx: &mut ProtocolContext<Message>) {
        if self.phase == Phase::Stopping && self.consumers.is_empty() {
            debug!(producer = %self.id, channel = %self.channel, "producer unavailable");
            ctx.dispatch_outgoing(Message::Routing(RoutingMessage::ProducerUnavailable { id: self.id.clone() }));
            ctx.stopped();
            self.phase = Phase::Stopped;
        }
    }
}

impl Protocol<Message> for SendProtocol {
    fn start(&mut self, ctx: &mut ProtocolContext<Message>) {
        ctx.dispatch_outgoing(Message::Routing(RoutingMessage::ProducerAvailable {
            id: self.id.clone(),
            display_name: self.display_name.clone(),
            channel: self.channel.clone(),
        }));
    }

    fn handle_outgoing(&mut self, message: Message, ctx: &mut ProtocolContext<Message>) -> Result<(), MessagingError> {
        if let Some(RoutingMessage::Request { consumer, .. }) = message.routing() {
            if !matches!(self.consumers.get(consumer), Some(Consumer::Connected { .. })) {
                warn!(producer = %self.id, %consumer, "dropping request for a consumer that is not connected");
                return Ok(());
            }
        }
        ctx.dispatch_outgoing(message);
        Ok(())
    }

    fn handle_incoming(&mut self, message: Message, ctx: &mut ProtocolContext<Message>) -> Result<(), MessagingError> {
        let Some(routing) = message.routing() else {
            return Ok(());
        };
        match routing {
            RoutingMessage::ConsumerAvailable { id, display_name, channel } => {
                if *channel != self.channel || self.phase != Phase::Running || self.consumers.contains_key(id) {
                    return Ok(());
                }
                self.consumers.insert(id.clone(), Consumer::Pending { display_name: display_name.clone() });
                ctx.dispatch_outgoing(Message::Routing(RoutingMessage::ProducerReady {
                    producer: self.id.clone(),
                    consumer: id.clone(),
                }));
            }
            RoutingMessage::ConsumerReady { consumer, producer } if *producer == self.id => {
                let Some(state) = self.consumers.get_mut(consumer) else {
                    return Err(MessagingError::contract(format!("{} ready without an offer from {}", consumer, self.id)));
                };
                if let Consumer::Pending { display_name } = state {
                    let display_name = std::mem::take(display_name);
                    debug!(producer = %self.id, %consumer, "consumer connected");
                    ctx.dispatch_incoming(Message::Routing(RoutingMessage::ConsumerAvailable {
                        id: consumer.clone(),
                        display_name: display_name.clone(),
                        channel: self.channel.clone(),
                    }));
                    *state = Consumer::Connected { display_name };
                }
            }
            RoutingMessage::ConsumerStopping { consumer, producer } if *producer == self.id => {
                match self.consumers.insert(consumer.clone(), Consumer::Stopping) {
                    Some(Consumer::Connected { .. }) => {
                        ctx.dispatch_incoming(Message::Routing(RoutingMessage::ConsumerUnavailable {
                            id: consumer.clone(),
                        }));
                        ctx.dispatch_outgoing(self.producer_stopped(consumer));
                    }
                    Some(Consumer::Pending { .. }) => ctx.dispatch_outgoing(self.producer_stopped(consumer)),
                    // ProducerStopped already on its way
                    Some(Consumer::Stopping) => {}
                    None => {
                        self.consumers.remove(consumer);
                        ctx.dispatch_outgoing(self.producer_stopped(consumer));
                    }
                }
            }
            RoutingMessage::ConsumerStopped { consumer, producer } if *producer == self.id => {
                self.forget(consumer, ctx);
            }
            RoutingMessage::ConsumerUnavailable { id } => self.forget(id, ctx),
            _ => {}
        }
        Ok(())
    }

    /// Tells every consumer this producer is done and waits for each to
    /// confirm before announcing the producer unavailable.
    fn stop_requested(&mut self, ctx: &mut ProtocolContext<Message>) {
        self.phase = Phase::Stopping;
        let consumers: Vec<RouteId> = self.consumers.keys().cloned().collect();
        for consumer in consumers {
            // Stage above has already stopped
            let previous = self.consumers.insert(consumer.clone(), Consumer::Stopping);
            if previous != Some(Consumer::Stopping) {
                ctx.dispatch_outgoing(self.producer_stopped(&consumer));
            }
        }
        if self.consumers.is_empty() {
            self.maybe_finish(ctx);
        } else {
            ctx.stop_later();
        }
    }
}

#[cfg(test)]
#[path = "send_tests.rs"]
mod tests;
