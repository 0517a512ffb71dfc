// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! plexus-hub: channel routing, multiplexed peer connections and discovery

pub mod discovery;
pub mod env;
mod hub;
mod multi_channel;
pub mod protocols;
mod router;
mod typed;

pub use discovery::{ChannelLookupProtocol, ChannelRegistrationProtocol, DiscoveryLookup, DiscoveryRegistrar};
pub use hub::{IncomingMessage, MessageHub, OutgoingChannel, HUB_CHANNEL};
pub use multi_channel::{ChannelSender, MultiChannelConnection};
pub use router::{Endpoint, Router, Side};
pub use typed::{typed_handler, TypedDispatch};
