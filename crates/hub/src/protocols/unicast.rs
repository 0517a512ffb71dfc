// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Sends every payload to exactly one consumer.

use std::collections::VecDeque;

use plexus_core::{Message, MessagingError, RouteId, RoutingMessage};
use plexus_stack::{Protocol, ProtocolContext};
use serde_json::Value;
use tracing::debug;

use super::request;

#[derive(Debug, Clone, PartialEq, Eq)]
enum State {
    /// No consumer yet; payloads are queued
    Queueing,
    Connected(RouteId),
}

/// Top stage of a unicast outgoing channel.
///
/// Payloads queue until a consumer is available. The first consumer gets
/// the queue and every later payload; consumers arriving after it wait as
/// standbys and take over, in arrival order, if it goes away.
pub struct UnicastSendProtocol {
    producer: RouteId,
    state: State,
    standbys: VecDeque<RouteId>,
    queue: VecDeque<Value>,
    stopping: bool,
}

impl UnicastSendProtocol {
    pub fn new(producer: RouteId) -> Self {
        Self { producer, state: State::Queueing, standbys: VecDeque::new(), queue: VecDeque::new(), stopping: false }
    }

    fn connect(&mut self, consumer: RouteId, ctx: &mut ProtocolContext<Message>) {
        debug!(producer = %self.producer, %consumer, queued = self.queue.len(), "unicast consumer connected");
        for payload in self.queue.drain(..) {
            ctx.dispatch_outgoing(request(&self.producer, &consumer, payload));
        }
        self.state = State::Connected(consumer);
        if self.stopping {
            ctx.stopped();
        }
    }
}

impl Protocol<Message> for UnicastSendProtocol {
    fn start(&mut self, _ctx: &mut ProtocolContext<Message>) {}

    fn handle_outgoing(&mut self, message: Message, ctx: &mut ProtocolContext<Message>) -> Result<(), MessagingError> {
        match (message, &self.state) {
            (Message::Payload(payload), State::Queueing) => self.queue.push_back(payload),
            (Message::Payload(payload), State::Connected(consumer)) => {
                ctx.dispatch_outgoing(request(&self.producer, consumer, payload));
            }
            (other, _) => ctx.dispatch_outgoing(other),
        }
        Ok(())
    }

    fn handle_incoming(&mut self, message: Message, ctx: &mut ProtocolContext<Message>) -> Result<(), MessagingError> {
        match message.routing() {
            Some(RoutingMessage::ConsumerAvailable { id, .. }) => match &self.state {
                State::Queueing => self.connect(id.clone(), ctx),
                State::Connected(_) => self.standbys.push_back(id.clone()),
            },
            Some(RoutingMessage::ConsumerUnavailable { id }) => {
                if self.state == State::Connected(id.clone()) {
                    match self.standbys.pop_front() {
                        Some(next) => self.connect(next, ctx),
                        None => {
                            debug!(producer = %self.producer, consumer = %id, "unicast consumer gone, queueing");
                            self.state = State::Queueing;
                        }
                    }
                } else {
                    self.standbys.retain(|s| s != id);
                }
            }
            _ => {}
        }
        Ok(())
    }

    /// Stops once every queued payload was handed to a consumer.
    fn stop_requested(&mut self, ctx: &mut ProtocolContext<Message>) {
        if self.queue.is_empty() {
            ctx.stopped();
        } else {
            debug!(producer = %self.producer, queued = self.queue.len(), "waiting for a consumer before stopping");
            self.stopping = true;
            ctx.stop_later();
        }
    }
}

#[cfg(test)]
#[path = "unicast_tests.rs"]
mod tests;
