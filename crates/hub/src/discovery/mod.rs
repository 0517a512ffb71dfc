// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Group-scoped channel discovery over a datagram connection.
//!
//! Registrars announce `ChannelAvailable` for what they serve and answer
//! `LookupRequest`s; lookups repeat their request until an answer arrives.
//! Both run as protocol stacks whose bottom is the discovery connection.

mod lookup;
mod registration;
mod service;

pub use lookup::ChannelLookupProtocol;
pub use registration::ChannelRegistrationProtocol;
pub use service::{DiscoveryLookup, DiscoveryRegistrar};

use std::sync::Arc;

use plexus_core::{
    AsyncConnection, Connection, DiscoveryMessage, Dispatch, Executor, MessagingError, Receive, Stoppable,
};
use plexus_stack::{AsyncReceive, ProtocolStack};

/// A discovery stack bound to its connection.
struct Attached {
    stack: ProtocolStack<DiscoveryMessage>,
    receiver: AsyncReceive<DiscoveryMessage>,
    connection: Arc<dyn Stoppable>,
}

impl Attached {
    fn new<C>(executor: &Executor, stack: ProtocolStack<DiscoveryMessage>, connection: C) -> Result<Self, MessagingError>
    where
        C: Connection<DiscoveryMessage> + 'static,
    {
        let connection = Arc::new(connection);
        let outgoing: Arc<dyn Dispatch<DiscoveryMessage>> = connection.clone();
        stack.bottom().dispatch_to(outgoing);
        let receiver = AsyncReceive::new(executor, format!("{} receiver", stack.name()), Arc::new(stack.bottom()));
        let source: Arc<dyn Receive<DiscoveryMessage>> = connection.clone();
        receiver.receive_from(source)?;
        Ok(Self { stack, receiver, connection })
    }

    async fn stop(&self) -> Result<(), MessagingError> {
        // Discovery stacks need no incoming traffic to stop
        self.receiver.stop().await?;
        let result = self.stack.stop().await;
        self.connection.stop().await?;
        result
    }
}
