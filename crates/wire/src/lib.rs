// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Physical transports for Plexus.
//!
//! Wire format: 4-byte length prefix (big-endian) + JSON payload

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

mod connector;
pub mod env;
mod group;
mod multicast;
mod pipe;
mod socket;
mod wire;

pub use connector::{
    ConnectRequest, HandshakeIncomingConnector, HandshakeOutgoingConnector, TcpIncomingConnector,
    TcpOutgoingConnector,
};
pub use group::{GroupMember, LocalBroadcastGroup};
pub use multicast::MulticastConnection;
pub use pipe::{pipe, PipeConnection};
pub use socket::SocketConnection;
pub use wire::{
    decode, encode, read_frame, read_frame_timeout, read_message, write_frame, write_message,
    ProtocolError, MAX_FRAME_LEN,
};
