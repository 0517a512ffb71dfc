// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Sends every payload to all current consumers.

use std::collections::VecDeque;
use std::time::Duration;

use plexus_core::{Message, MessagingError, RouteId, RoutingMessage};
use plexus_stack::{CallbackHandle, Protocol, ProtocolContext};
use serde_json::Value;
use tracing::{debug, warn};

use super::request;
use crate::env::broadcast_stop_timeout;

/// Top stage of a broadcast outgoing channel.
///
/// With no consumers, payloads queue and the first consumer to appear
/// receives them. With at least one consumer, each payload fans out to the
/// consumers known at that moment; later consumers do not see earlier
/// payloads.
pub struct BroadcastSendProtocol {
    producer: RouteId,
    consumers: Vec<RouteId>,
    queue: VecDeque<Value>,
    stop_timeout: Duration,
    stop_deadline: Option<CallbackHandle>,
}

impl BroadcastSendProtocol {
    pub fn new(producer: RouteId) -> Self {
        Self::with_stop_timeout(producer, broadcast_stop_timeout())
    }

    /// `stop_timeout` bounds how long queued payloads wait for a first
    /// consumer once stop was requested.
    pub fn with_stop_timeout(producer: RouteId, stop_timeout: Duration) -> Self {
        Self { producer, consumers: Vec::new(), queue: VecDeque::new(), stop_timeout, stop_deadline: None }
    }
}

impl Protocol<Message> for BroadcastSendProtocol {
    fn start(&mut self, _ctx: &mut ProtocolContext<Message>) {}

    fn handle_outgoing(&mut self, message: Message, ctx: &mut ProtocolContext<Message>) -> Result<(), MessagingError> {
        match message {
            Message::Payload(payload) if self.consumers.is_empty() => self.queue.push_back(payload),
            Message::Payload(payload) => {
                for consumer in &self.consumers {
                    ctx.dispatch_outgoing(request(&self.producer, consumer, payload.clone()));
                }
            }
            other => ctx.dispatch_outgoing(other),
        }
        Ok(())
    }

    fn handle_incoming(&mut self, message: Message, ctx: &mut ProtocolContext<Message>) -> Result<(), MessagingError> {
        match message.routing() {
            Some(RoutingMessage::ConsumerAvailable { id, .. }) => {
                if self.consumers.contains(id) {
                    return Ok(());
                }
                self.consumers.push(id.clone());
                for payload in self.queue.drain(..) {
                    ctx.dispatch_outgoing(request(&self.producer, id, payload));
                }
                if let Some(deadline) = self.stop_deadline.take() {
                    deadline.cancel();
                    ctx.stopped();
                }
            }
            Some(RoutingMessage::ConsumerUnavailable { id }) => {
                self.consumers.retain(|c| c != id);
                debug!(producer = %self.producer, consumer = %id, remaining = self.consumers.len(), "broadcast consumer gone");
            }
            _ => {}
        }
        Ok(())
    }

    fn stop_requested(&mut self, ctx: &mut ProtocolContext<Message>) {
        if self.queue.is_empty() {
            ctx.stopped();
        } else {
            ctx.stop_later();
            self.stop_deadline = Some(ctx.callback_later(self.stop_timeout));
        }
    }

    fn handle_callback(&mut self, _handle: CallbackHandle, ctx: &mut ProtocolContext<Message>) -> Result<(), MessagingError> {
        if self.stop_deadline.take().is_some() {
            warn!(
                producer = %self.producer,
                discarded = self.queue.len(),
                "no consumer appeared before stop deadline, discarding broadcast messages",
            );
            self.queue.clear();
            ctx.stopped();
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "broadcast_tests.rs"]
mod tests;
