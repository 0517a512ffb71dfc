// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use plexus_core::{Message, MessagingError};
use plexus_stack::{Protocol, ProtocolContext};
use tracing::debug;

/// Bottom stage of every local stack.
///
/// On stop it sends `EndOfStream` to the router and stops once the router
/// echoes it back, at which point the router has retracted every route the
/// stack announced.
#[derive(Debug, Default)]
pub struct DisconnectProtocol {
    disconnecting: bool,
}

impl DisconnectProtocol {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Protocol<Message> for DisconnectProtocol {
    fn start(&mut self, _ctx: &mut ProtocolContext<Message>) {}

    fn handle_outgoing(&mut self, message: Message, ctx: &mut ProtocolContext<Message>) -> Result<(), MessagingError> {
        ctx.dispatch_outgoing(message);
        Ok(())
    }

    fn handle_incoming(&mut self, message: Message, ctx: &mut ProtocolContext<Message>) -> Result<(), MessagingError> {
        if !message.is_end_of_stream() {
            ctx.dispatch_incoming(message);
        } else if self.disconnecting {
            debug!("router confirmed disconnect");
            ctx.stopped();
        } else {
            return Err(MessagingError::contract("end of stream from router before disconnect"));
        }
        Ok(())
    }

    fn stop_requested(&mut self, ctx: &mut ProtocolContext<Message>) {
        self.disconnecting = true;
        ctx.dispatch_outgoing(Message::EndOfStream);
        ctx.stop_later();
    }
}

#[cfg(test)]
#[path = "disconnect_tests.rs"]
mod tests;
