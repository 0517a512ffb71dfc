// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Single-protocol stacks for protocol tests.

use std::sync::Arc;

use plexus_core::test_support::RecordingDispatch;
use plexus_core::{AsyncConnection, ChannelKey, Dispatch, Executor, Message, RouteId, RoutingMessage};
use plexus_stack::{Protocol, ProtocolStack};

pub(crate) struct Harness {
    pub stack: ProtocolStack<Message>,
    /// What came out of the top
    pub up: Arc<RecordingDispatch<Message>>,
    /// What came out of the bottom
    pub down: Arc<RecordingDispatch<Message>>,
}

impl Harness {
    pub fn new(protocol: impl Protocol<Message> + 'static) -> Self {
        let stack = ProtocolStack::new(&Executor::current("test"), "test", vec![Box::new(protocol)]);
        let up = RecordingDispatch::<Message>::new();
        let down = RecordingDispatch::<Message>::new();
        stack.top().dispatch_to(up.clone());
        stack.bottom().dispatch_to(down.clone());
        Self { stack, up, down }
    }

    /// Dispatch from above.
    pub fn send(&self, message: impl Into<Message>) {
        self.stack.top().dispatch(message.into()).unwrap();
    }

    /// Dispatch from below.
    pub fn deliver(&self, message: impl Into<Message>) {
        self.stack.bottom().dispatch(message.into()).unwrap();
    }
}

pub(crate) fn channel() -> ChannelKey {
    ChannelKey::new("jobs")
}

pub(crate) fn consumer_available(id: &RouteId) -> RoutingMessage {
    RoutingMessage::ConsumerAvailable { id: id.clone(), display_name: "consumer".into(), channel: channel() }
}

pub(crate) fn consumer_unavailable(id: &RouteId) -> RoutingMessage {
    RoutingMessage::ConsumerUnavailable { id: id.clone() }
}

pub(crate) fn producer_available(id: &RouteId) -> RoutingMessage {
    RoutingMessage::ProducerAvailable { id: id.clone(), display_name: "producer".into(), channel: channel() }
}

pub(crate) fn request(producer: &RouteId, consumer: &RouteId, payload: impl Into<serde_json::Value>) -> Message {
    super::request(producer, consumer, payload.into())
}
