// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::typed::{typed_handler, TypedDispatch};
use plexus_core::test_support::{eventually, RecordingDispatch};
use plexus_core::{ChannelId, ChannelMessage, ChannelMetaInfo, Receive};
use plexus_wire::pipe;
use serde_json::json;

fn hub(name: &str) -> MessageHub {
    MessageHub::new(&Executor::current(name.to_string()), name.to_string())
}

fn connect(a: &MessageHub, b: &MessageHub) {
    let (x, y) = pipe::<Message>("peers");
    a.add_connection(x).unwrap();
    b.add_connection(y).unwrap();
}

#[tokio::test]
async fn unicast_messages_queue_until_a_worker_connects() {
    let (a, b) = (hub("a"), hub("b"));
    let jobs = a.add_unicast_outgoing("jobs").unwrap();
    for n in 1..=3 {
        jobs.dispatch(json!(n)).unwrap();
    }
    let worker = RecordingDispatch::<Value>::new();
    b.add_worker("jobs", worker.clone()).unwrap();

    connect(&a, &b);

    assert_eq!(worker.wait_for(3).await, vec![json!(1), json!(2), json!(3)]);
    let (ra, rb) = tokio::join!(a.stop(), b.stop());
    ra.unwrap();
    rb.unwrap();
}

#[tokio::test]
async fn broadcast_reaches_every_connected_consumer() {
    let (a, b, c) = (hub("a"), hub("b"), hub("c"));
    let news = a.add_broadcast_outgoing("news").unwrap();
    let (to_b, to_c) = (RecordingDispatch::<IncomingMessage>::new(), RecordingDispatch::<IncomingMessage>::new());
    b.add_incoming("news", to_b.clone()).unwrap();
    c.add_incoming("news", to_c.clone()).unwrap();
    connect(&a, &b);
    connect(&a, &c);

    // Once both consumers have seen something, both are connected
    assert!(
        eventually(|| {
            news.dispatch(json!("warmup")).unwrap();
            !to_b.is_empty() && !to_c.is_empty()
        })
        .await
    );
    news.dispatch(json!("final")).unwrap();

    for seen in [&to_b, &to_c] {
        assert!(eventually(|| seen.received().last().map(|m| m.payload.clone()) == Some(json!("final"))).await);
        assert!(seen.received().iter().all(|m| m.channel == "news"));
    }
    let (ra, rb, rc) = tokio::join!(a.stop(), b.stop(), c.stop());
    ra.unwrap();
    rb.unwrap();
    rc.unwrap();
}

#[tokio::test]
async fn departing_consumer_hands_over_to_standby() {
    let (a, b, c) = (hub("a"), hub("b"), hub("c"));
    let jobs = a.add_unicast_outgoing("jobs").unwrap();
    let (on_b, on_c) = (RecordingDispatch::<Value>::new(), RecordingDispatch::<Value>::new());
    b.add_worker("jobs", on_b.clone()).unwrap();
    c.add_worker("jobs", on_c.clone()).unwrap();

    connect(&a, &b);
    jobs.dispatch(json!(1)).unwrap();
    assert_eq!(on_b.wait_for(1).await, vec![json!(1)]);

    connect(&a, &c);
    b.stop().await.unwrap();
    jobs.dispatch(json!(2)).unwrap();

    assert_eq!(on_c.wait_for(1).await, vec![json!(2)]);
    assert_eq!(on_b.received(), vec![json!(1)]);
    let (ra, rc) = tokio::join!(a.stop(), c.stop());
    ra.unwrap();
    rc.unwrap();
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
struct Job {
    id: u32,
}

#[tokio::test]
async fn channels_added_after_connecting_still_meet() {
    let (a, b) = (hub("a"), hub("b"));
    connect(&a, &b);

    let jobs = Arc::new(parking_lot::Mutex::new(Vec::new()));
    let sink = Arc::clone(&jobs);
    b.add_worker(
        "typed",
        typed_handler(move |job: Job| {
            sink.lock().push(job);
            Ok(())
        }),
    )
    .unwrap();
    let out = TypedDispatch::<Job, _>::new(a.add_unicast_outgoing("typed").unwrap());
    out.dispatch(Job { id: 9 }).unwrap();

    assert!(eventually(|| jobs.lock().len() == 1).await);
    assert_eq!(jobs.lock()[0], Job { id: 9 });
    let (ra, rb) = tokio::join!(a.stop(), b.stop());
    ra.unwrap();
    rb.unwrap();
}

#[tokio::test]
async fn stopped_hub_refuses_new_channels() {
    let a = hub("a");
    a.stop().await.unwrap();

    assert!(matches!(a.add_unicast_outgoing("late"), Err(MessagingError::Stopped(_))));
    assert!(a.add_worker("late", RecordingDispatch::<Value>::new()).is_err());
    let (x, _y) = pipe::<Message>("late");
    assert!(a.add_connection(x).is_err());
}

#[tokio::test]
async fn incoming_message_payload_deserializes() {
    let message = IncomingMessage { channel: "c".into(), producer: RouteId::new(), payload: json!({ "id": 4 }) };
    assert_eq!(message.payload_as::<Job>().unwrap(), Job { id: 4 });
    assert!(message.payload_as::<String>().is_err());
}

fn on_hub_channel(message: RoutingMessage) -> Message {
    Message::Channel(ChannelMessage { channel: ChannelId(1), payload: Box::new(Message::Routing(message)) })
}

#[tokio::test]
async fn requests_delivered_before_an_abrupt_disconnect_are_kept() {
    for _ in 0..10 {
        let hub = hub("h");
        let seen = RecordingDispatch::<IncomingMessage>::new();
        hub.add_incoming("jobs", seen.clone()).unwrap();
        let (x, peer) = pipe::<Message>("peer");
        hub.add_connection(x).unwrap();

        let consumer = loop {
            let message = peer.receive().await.unwrap().unwrap();
            if let Some(RoutingMessage::ConsumerAvailable { id, .. }) = message.routing() {
                break id.clone();
            }
        };
        let producer = RouteId::new();
        peer.dispatch(Message::ChannelMetaInfo(ChannelMetaInfo { key: HUB_CHANNEL.into(), id: ChannelId(1) }))
            .unwrap();
        peer.dispatch(on_hub_channel(RoutingMessage::ProducerAvailable {
            id: producer.clone(),
            display_name: "peer".into(),
            channel: "jobs".into(),
        }))
        .unwrap();
        peer.dispatch(on_hub_channel(RoutingMessage::ProducerReady { producer: producer.clone(), consumer: consumer.clone() }))
            .unwrap();
        for n in 0..5 {
            peer.dispatch(on_hub_channel(RoutingMessage::Request {
                producer: producer.clone(),
                consumer: consumer.clone(),
                payload: json!(n),
            }))
            .unwrap();
        }
        // Gone without an end of stream
        peer.stop().await.unwrap();

        let payloads: Vec<Value> = seen.wait_for(5).await.into_iter().map(|m| m.payload).collect();
        assert_eq!(payloads, (0..5).map(|n| json!(n)).collect::<Vec<_>>());
        hub.stop().await.unwrap();
        assert_eq!(seen.len(), 5);
    }
}
