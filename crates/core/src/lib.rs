// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! plexus-core: message model and transport primitives for Plexus

pub mod macros;

pub mod channel;
pub mod discovery;
pub mod error;
pub mod executor;
pub mod id;
pub mod message;
pub mod transport;

#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

pub use channel::{ChannelId, ChannelKey};
pub use discovery::{DiscoveryMessage, SocketAddress};
pub use error::MessagingError;
pub use executor::Executor;
pub use id::{ListenerId, RouteId};
pub use message::{ChannelMessage, ChannelMetaInfo, Message, RoutingMessage};
pub use transport::{
    dispatch_fn, AsyncConnection, Connection, DiscardFailures, DiscardingFailureHandler, Dispatch,
    FailureHandler, FnDispatch, Receive, Stoppable,
};
