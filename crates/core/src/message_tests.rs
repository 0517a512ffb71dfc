// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use serde_json::json;

fn consumer_available(id: &str) -> RoutingMessage {
    RoutingMessage::ConsumerAvailable {
        id: RouteId::from(id),
        display_name: "consumer".to_string(),
        channel: ChannelKey::new("jobs"),
    }
}

#[test]
fn announcements_are_broadcast_route_available() {
    let msg = consumer_available("rte-c");
    assert_eq!(msg.route_available().map(|id| id.as_str()), Some("rte-c"));
    assert_eq!(msg.destination(), None);
    assert_eq!(msg.reply_source(), None);
}

#[test]
fn announcement_counterpart_is_retraction() {
    let msg = consumer_available("rte-c");
    assert_eq!(
        msg.unavailable_counterpart(),
        Some(RoutingMessage::ConsumerUnavailable { id: RouteId::from("rte-c") })
    );

    let producer = RoutingMessage::ProducerAvailable {
        id: RouteId::from("rte-p"),
        display_name: "producer".to_string(),
        channel: ChannelKey::new("jobs"),
    };
    assert_eq!(
        producer.unavailable_counterpart(),
        Some(RoutingMessage::ProducerUnavailable { id: RouteId::from("rte-p") })
    );
}

#[test]
fn retraction_has_no_counterpart() {
    let msg = RoutingMessage::ConsumerUnavailable { id: RouteId::from("rte-c") };
    assert_eq!(msg.unavailable_counterpart(), None);
    assert_eq!(msg.route_unavailable().map(|id| id.as_str()), Some("rte-c"));
}

#[yare::parameterized(
    consumer_ready    = { RoutingMessage::ConsumerReady { consumer: "c".into(), producer: "p".into() }, "p", "c" },
    consumer_stopping = { RoutingMessage::ConsumerStopping { consumer: "c".into(), producer: "p".into() }, "p", "c" },
    consumer_stopped  = { RoutingMessage::ConsumerStopped { consumer: "c".into(), producer: "p".into() }, "p", "c" },
    producer_ready    = { RoutingMessage::ProducerReady { producer: "p".into(), consumer: "c".into() }, "c", "p" },
    producer_stopped  = { RoutingMessage::ProducerStopped { producer: "p".into(), consumer: "c".into() }, "c", "p" },
    request           = { RoutingMessage::Request { producer: "p".into(), consumer: "c".into(), payload: json!(1) }, "c", "p" },
)]
fn addressed_messages_reply_to_sender(msg: RoutingMessage, destination: &str, source: &str) {
    assert_eq!(msg.destination().map(|id| id.as_str()), Some(destination));
    assert_eq!(msg.reply_source().map(|id| id.as_str()), Some(source));
    assert_eq!(msg.route_available(), None);
}

#[test]
fn routing_looks_through_one_channel_level() {
    let inner = Message::Routing(consumer_available("rte-c"));
    let wrapped = Message::Channel(ChannelMessage { channel: ChannelId(3), payload: Box::new(inner) });
    assert!(wrapped.routing().is_some());

    let twice = Message::Channel(ChannelMessage { channel: ChannelId(4), payload: Box::new(wrapped) });
    assert!(twice.routing().is_none());
}

#[test]
fn with_routing_keeps_channel_wrapping() {
    let wrapped = Message::Channel(ChannelMessage {
        channel: ChannelId(7),
        payload: Box::new(Message::Routing(consumer_available("rte-c"))),
    });
    let retraction = RoutingMessage::ConsumerUnavailable { id: RouteId::from("rte-c") };
    match wrapped.with_routing(retraction.clone()) {
        Message::Channel(channel) => {
            assert_eq!(channel.channel, ChannelId(7));
            assert_eq!(*channel.payload, Message::Routing(retraction));
        }
        other => panic!("expected channel message, got {:?}", other),
    }
}

#[test]
fn message_json_roundtrip_preserves_payload() {
    let msg = Message::Routing(RoutingMessage::Request {
        producer: "p".into(),
        consumer: "c".into(),
        payload: json!({"n": [1, 2, 3]}),
    });
    let json = serde_json::to_string(&msg).unwrap();
    let back: Message = serde_json::from_str(&json).unwrap();
    assert_eq!(back, msg);
}

#[test]
fn display_names_kind() {
    assert_eq!(Message::EndOfStream.to_string(), "end-of-stream");
    assert_eq!(consumer_available("x").to_string(), "consumer-available");
}
