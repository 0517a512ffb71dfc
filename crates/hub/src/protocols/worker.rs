// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use plexus_core::{ChannelKey, Message, MessagingError, RouteId};
use plexus_stack::{Protocol, ProtocolContext};

use super::receive::{Delivery, ReceiveProtocol};

/// A consumer that passes up bare payloads instead of requests.
pub struct WorkerProtocol {
    inner: ReceiveProtocol,
}

impl WorkerProtocol {
    pub fn new(id: RouteId, display_name: impl Into<String>, channel: ChannelKey) -> Self {
        Self { inner: ReceiveProtocol::new(id, display_name, channel).delivering(Delivery::Payloads) }
    }
}

impl Protocol<Message> for WorkerProtocol {
    fn start(&mut self, ctx: &mut ProtocolContext<Message>) {
        self.inner.start(ctx);
    }

    fn handle_outgoing(&mut self, message: Message, ctx: &mut ProtocolContext<Message>) -> Result<(), MessagingError> {
        self.inner.handle_outgoing(message, ctx)
    }

    fn handle_incoming(&mut self, message: Message, ctx: &mut ProtocolContext<Message>) -> Result<(), MessagingError> {
        self.inner.handle_incoming(message, ctx)
    }

    fn stop_requested(&mut self, ctx: &mut ProtocolContext<Message>) {
        self.inner.stop_requested(ctx);
    }
}

#[cfg(test)]
#[path = "worker_tests.rs"]
mod tests;
