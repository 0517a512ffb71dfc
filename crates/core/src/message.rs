// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Messages carried by multiplexed connections and the router.
//!
//! Routing behavior is expressed as classification methods on
//! [`RoutingMessage`] rather than a type hierarchy:
//!
//! | Method                      | Meaning                                         |
//! |-----------------------------|-------------------------------------------------|
//! | `route_available()`         | announces a route to the returned id            |
//! | `route_unavailable()`       | retracts the route to the returned id           |
//! | `destination()`             | `None` broadcasts, `Some(id)` routes directly   |
//! | `reply_source()`            | sender id, for implicit reverse routes          |
//! | `unavailable_counterpart()` | retraction synthesized when a route disappears  |

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::channel::{ChannelId, ChannelKey};
use crate::id::RouteId;

/// A unit of traffic between protocol stages, the router and connections.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "body")]
pub enum Message {
    /// Opaque application payload
    Payload(Value),

    /// The sender will send nothing further
    EndOfStream,

    /// Binds a channel key to a per-connection channel id
    ChannelMetaInfo(ChannelMetaInfo),

    /// Payload tagged with the channel that carries it
    Channel(ChannelMessage),

    /// Producer/consumer rendezvous and request traffic
    Routing(RoutingMessage),
}

crate::simple_display! {
    Message {
        Payload(..) => "payload",
        EndOfStream => "end-of-stream",
        ChannelMetaInfo(..) => "channel-meta-info",
        Channel(..) => "channel-message",
        Routing(..) => "routing",
    }
}

impl Message {
    pub fn payload(value: impl Into<Value>) -> Self {
        Message::Payload(value.into())
    }

    pub fn is_end_of_stream(&self) -> bool {
        matches!(self, Message::EndOfStream)
    }

    /// The routing message carried by this message, looking through one
    /// level of channel wrapping.
    pub fn routing(&self) -> Option<&RoutingMessage> {
        match self {
            Message::Routing(routing) => Some(routing),
            Message::Channel(channel) => match channel.payload.as_ref() {
                Message::Routing(routing) => Some(routing),
                _ => None,
            },
            _ => None,
        }
    }

    /// Rebuild this message around a different routing message, keeping any
    /// channel wrapping.
    pub fn with_routing(&self, routing: RoutingMessage) -> Message {
        match self {
            Message::Channel(channel) => Message::Channel(ChannelMessage {
                channel: channel.channel,
                payload: Box::new(Message::Routing(routing)),
            }),
            _ => Message::Routing(routing),
        }
    }
}

impl From<RoutingMessage> for Message {
    fn from(routing: RoutingMessage) -> Self {
        Message::Routing(routing)
    }
}

/// Binding of a channel key to the id used for it on one connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelMetaInfo {
    pub key: ChannelKey,
    pub id: ChannelId,
}

/// A message tagged with the per-connection id of its channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelMessage {
    pub channel: ChannelId,
    pub payload: Box<Message>,
}

/// Producer/consumer rendezvous messages.
///
/// Availability announcements are broadcast; everything else is addressed
/// to a single party and replies along the route of its sender.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum RoutingMessage {
    ConsumerAvailable { id: RouteId, display_name: String, channel: ChannelKey },
    ConsumerUnavailable { id: RouteId },
    ProducerAvailable { id: RouteId, display_name: String, channel: ChannelKey },
    ProducerUnavailable { id: RouteId },
    ConsumerReady { consumer: RouteId, producer: RouteId },
    ConsumerStopping { consumer: RouteId, producer: RouteId },
    ConsumerStopped { consumer: RouteId, producer: RouteId },
    ProducerReady { producer: RouteId, consumer: RouteId },
    ProducerStopped { producer: RouteId, consumer: RouteId },
    Request { producer: RouteId, consumer: RouteId, payload: Value },
}

crate::simple_display! {
    RoutingMessage {
        ConsumerAvailable { .. } => "consumer-available",
        ConsumerUnavailable { .. } => "consumer-unavailable",
        ProducerAvailable { .. } => "producer-available",
        ProducerUnavailable { .. } => "producer-unavailable",
        ConsumerReady { .. } => "consumer-ready",
        ConsumerStopping { .. } => "consumer-stopping",
        ConsumerStopped { .. } => "consumer-stopped",
        ProducerReady { .. } => "producer-ready",
        ProducerStopped { .. } => "producer-stopped",
        Request { .. } => "request",
    }
}

impl RoutingMessage {
    /// Id of the route this message announces.
    pub fn route_available(&self) -> Option<&RouteId> {
        match self {
            RoutingMessage::ConsumerAvailable { id, .. }
            | RoutingMessage::ProducerAvailable { id, .. } => Some(id),
            _ => None,
        }
    }

    /// Id of the route this message retracts.
    pub fn route_unavailable(&self) -> Option<&RouteId> {
        match self {
            RoutingMessage::ConsumerUnavailable { id }
            | RoutingMessage::ProducerUnavailable { id } => Some(id),
            _ => None,
        }
    }

    /// The retraction matching an announcement.
    pub fn unavailable_counterpart(&self) -> Option<RoutingMessage> {
        match self {
            RoutingMessage::ConsumerAvailable { id, .. } => {
                Some(RoutingMessage::ConsumerUnavailable { id: id.clone() })
            }
            RoutingMessage::ProducerAvailable { id, .. } => {
                Some(RoutingMessage::ProducerUnavailable { id: id.clone() })
            }
            _ => None,
        }
    }

    /// Addressee of this message; `None` means broadcast.
    pub fn destination(&self) -> Option<&RouteId> {
        match self {
            RoutingMessage::ConsumerAvailable { .. }
            | RoutingMessage::ConsumerUnavailable { .. }
            | RoutingMessage::ProducerAvailable { .. }
            | RoutingMessage::ProducerUnavailable { .. } => None,
            RoutingMessage::ConsumerReady { producer, .. }
            | RoutingMessage::ConsumerStopping { producer, .. }
            | RoutingMessage::ConsumerStopped { producer, .. } => Some(producer),
            RoutingMessage::ProducerReady { consumer, .. }
            | RoutingMessage::ProducerStopped { consumer, .. }
            | RoutingMessage::Request { consumer, .. } => Some(consumer),
        }
    }

    /// Sender of an addressed message, used to route replies back to it.
    pub fn reply_source(&self) -> Option<&RouteId> {
        match self {
            RoutingMessage::ConsumerReady { consumer, .. }
            | RoutingMessage::ConsumerStopping { consumer, .. }
            | RoutingMessage::ConsumerStopped { consumer, .. } => Some(consumer),
            RoutingMessage::ProducerReady { producer, .. }
            | RoutingMessage::ProducerStopped { producer, .. }
            | RoutingMessage::Request { producer, .. } => Some(producer),
            _ => None,
        }
    }
}

#[cfg(test)]
#[path = "message_tests.rs"]
mod tests;
