// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! plexus-stack: asynchronous queues, buffers and the protocol stack

mod async_dispatch;
mod async_receive;
mod disconnect;
mod eager_buffer;
mod protocol;
mod stack;

pub use async_dispatch::AsyncDispatch;
pub use async_receive::AsyncReceive;
pub use disconnect::DisconnectAwareConnection;
pub use eager_buffer::{BufferState, EagerReceiveBuffer, DEFAULT_BUFFER_SIZE};
pub use protocol::{CallbackHandle, Protocol, ProtocolContext};
pub use stack::{ProtocolStack, StackBottom, StackTop};
