// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Producer/consumer rendezvous protocols.
//!
//! Local channels are protocol stacks whose bottom is bound to a router
//! endpoint:
//!
//! | Channel            | Stages (top to bottom)                          |
//! |--------------------|-------------------------------------------------|
//! | unicast outgoing   | `UnicastSend`, `Send`, `Disconnect`             |
//! | broadcast outgoing | `BroadcastSend`, `Send`, `Disconnect`           |
//! | incoming           | `Receive`, `Disconnect`                         |
//! | worker             | `Worker`, `Disconnect`                          |
//!
//! Handshake between one producer and one consumer:
//!
//! ```text
//! producer                                consumer
//!    ── ProducerAvailable ──►  ◄── ConsumerAvailable ──
//!    ── ProducerReady ──────────────────────────────►
//!    ◄───────────────────────────────── ConsumerReady ──
//!    ── Request ... ────────────────────────────────►
//!
//! producer stops first:                 consumer stops first:
//!    ── ProducerStopped ───────────►       ◄── ConsumerStopping ──
//!    ◄──────────── ConsumerStopped ──      ── ProducerStopped ──►
//!    ── ProducerUnavailable ──►            ◄── ConsumerStopped ──
//! ```

mod broadcast;
mod disconnect;
mod receive;
mod send;
mod unicast;
mod worker;

pub use broadcast::BroadcastSendProtocol;
pub use disconnect::DisconnectProtocol;
pub use receive::ReceiveProtocol;
pub use send::SendProtocol;
pub use unicast::UnicastSendProtocol;
pub use worker::WorkerProtocol;

use plexus_core::{Message, RouteId, RoutingMessage};
use serde_json::Value;

fn request(producer: &RouteId, consumer: &RouteId, payload: Value) -> Message {
    Message::Routing(RoutingMessage::Request { producer: producer.clone(), consumer: consumer.clone(), payload })
}

#[cfg(test)]
pub(crate) mod test_harness;
