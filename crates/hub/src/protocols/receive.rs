// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Consumer side of the rendezvous handshake.

use std::collections::HashSet;

use plexus_core::{ChannelKey, Message, MessagingError, RouteId, RoutingMessage};
use plexus_stack::{Protocol, ProtocolContext};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Running,
    /// `ConsumerStopping` sent to every producer
    Stopping,
    Stopped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Delivery {
    Requests,
    Payloads,
}

/// Announces a consumer, accepts producers that offer to it and passes
/// their requests up.
pub struct ReceiveProtocol {
    id: RouteId,
    display_name: String,
    channel: ChannelKey,
    producers: HashSet<RouteId>,
    phase: Phase,
    delivery: Delivery,
}

impl ReceiveProtocol {
    pub fn new(id: RouteId, display_name: impl Into<String>, channel: ChannelKey) -> Self {
        Self {
            id,
            display_name: display_name.into(),
            channel,
            producers: HashSet::new(),
            phase: Phase::Running,
            delivery: Delivery::Requests,
        }
    }

    pub(crate) fn delivering(mut self, delivery: Delivery) -> Self {
        self.delivery = delivery;
        self
    }

    fn consumer_stopping(&self, producer: &RouteId) -> Message {
        Message::Routing(RoutingMessage::ConsumerStopping { consumer: self.id.clone(), producer: producer.clone() })
    }

    fn maybe_finish(&mut self, ctx: &mut ProtocolContext<Message>) {
        if self.phase == Phase::Stopping && self.producers.is_empty() {
            debug!(consumer = %self.id, channel = %self.channel, "consumer unavailable");
            ctx.dispatch_outgoing(Message::Routing(RoutingMessage::ConsumerUnavailable { id: self.id.clone() }));
            ctx.stopped();
            self.phase = Phase::Stopped;
        }
    }
}

impl Protocol<Message> for ReceiveProtocol {
    fn start(&mut self, ctx: &mut ProtocolContext<Message>) {
        ctx.dispatch_outgoing(Message::Routing(RoutingMessage::ConsumerAvailable {
            id: self.id.clone(),
            display_name: self.display_name.clone(),
            channel: self.channel.clone(),
        }));
    }

    fn handle_outgoing(&mut self, message: Message, ctx: &mut ProtocolContext<Message>) -> Result<(), MessagingError> {
        ctx.dispatch_outgoing(message);
        Ok(())
    }

    fn handle_incoming(&mut self, message: Message, ctx: &mut ProtocolContext<Message>) -> Result<(), MessagingError> {
        let Some(routing) = message.routing() else {
            return Ok(());
        };
        match routing {
            RoutingMessage::ProducerReady { producer, consumer } if *consumer == self.id => {
                self.producers.insert(producer.clone());
                if self.phase == Phase::Running {
                    debug!(consumer = %self.id, %producer, "producer connected");
                    ctx.dispatch_outgoing(Message::Routing(RoutingMessage::ConsumerReady {
                        consumer: self.id.clone(),
                        producer: producer.clone(),
                    }));
                } else {
                    ctx.dispatch_outgoing(self.consumer_stopping(producer));
                }
            }
            RoutingMessage::ProducerStopped { producer, consumer } if *consumer == self.id => {
                ctx.dispatch_outgoing(Message::Routing(RoutingMessage::ConsumerStopped {
                    consumer: self.id.clone(),
                    producer: producer.clone(),
                }));
                self.producers.remove(producer);
                self.maybe_finish(ctx);
            }
            RoutingMessage::ProducerUnavailable { id } => {
                self.producers.remove(id);
                self.maybe_finish(ctx);
            }
            RoutingMessage::Request { consumer, producer, payload } if *consumer == self.id => {
                if !self.producers.contains(producer) {
                    return Err(MessagingError::contract(format!(
                        "request from {} which never offered to {}",
                        producer, self.id
                    )));
                }
                match self.delivery {
                    Delivery::Payloads => ctx.dispatch_incoming(Message::Payload(payload.clone())),
                    Delivery::Requests => ctx.dispatch_incoming(message.clone()),
                }
            }
            _ => {}
        }
        Ok(())
    }

    /// Asks every producer to stop sending and waits for each to confirm
    /// before announcing the consumer unavailable.
    fn stop_requested(&mut self, ctx: &mut ProtocolContext<Message>) {
        self.phase = Phase::Stopping;
        if self.producers.is_empty() {
            self.maybe_finish(ctx);
            return;
        }
        for producer in &self.producers {
            ctx.dispatch_outgoing(self.consumer_stopping(producer));
        }
        ctx.stop_later();
    }
}

#[cfg(test)]
#[path = "receive_tests.rs"]
mod tests;
