// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Broadcast channel specs.

use crate::prelude::*;
use crate::prelude::assert_eq;

/// Dispatch warmups until every recorder has seen one, so all consumers
/// are known to the producer.
async fn warm_up(channel: &plexus_hub::OutgoingChannel, seen: &[&Arc<RecordingDispatch<IncomingMessage>>]) {
    assert!(
        eventually(|| {
            channel.dispatch(json!("warmup")).unwrap();
            seen.iter().all(|s| !s.is_empty())
        })
        .await
    );
}

fn last_payload(seen: &RecordingDispatch<IncomingMessage>) -> Option<Value> {
    seen.received().last().map(|m| m.payload.clone())
}

#[tokio::test]
async fn fan_out_follows_consumers_coming_and_going() {
    let producer = hub("producer");
    let (left, right) = (hub("left"), hub("right"));
    let (on_left, on_right) =
        (RecordingDispatch::<IncomingMessage>::new(), RecordingDispatch::<IncomingMessage>::new());
    left.add_incoming("news", on_left.clone()).unwrap();
    right.add_incoming("news", on_right.clone()).unwrap();
    let _left_acceptor = connect_tcp(&producer, &left).await;
    let _right_acceptor = connect_tcp(&producer, &right).await;

    let news = producer.add_broadcast_outgoing("news").unwrap();
    warm_up(&news, &[&on_left, &on_right]).await;
    news.dispatch(json!("m1")).unwrap();
    assert!(eventually(|| last_payload(&on_left) == Some(json!("m1"))).await);
    assert!(eventually(|| last_payload(&on_right) == Some(json!("m1"))).await);

    right.stop().await.unwrap();
    let right_count = on_right.len();
    news.dispatch(json!("m2")).unwrap();

    assert!(eventually(|| last_payload(&on_left) == Some(json!("m2"))).await);
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(on_right.len(), right_count);
    stop_all(&[&producer, &left]).await;
}

#[tokio::test]
async fn every_consumer_sees_the_same_order() {
    let producer = hub("producer");
    let consumers = [hub("c1"), hub("c2"), hub("c3")];
    let seen: Vec<_> = consumers
        .iter()
        .map(|c| {
            let recording = RecordingDispatch::<IncomingMessage>::new();
            c.add_incoming("ticks", recording.clone()).unwrap();
            connect_pipe(&producer, c);
            recording
        })
        .collect();

    let ticks = producer.add_broadcast_outgoing("ticks").unwrap();
    warm_up(&ticks, &seen.iter().collect::<Vec<_>>()).await;
    for n in 0..50 {
        ticks.dispatch(json!(n)).unwrap();
    }

    let expected: Vec<Value> = (0..50).map(|n| json!(n)).collect();
    for recording in &seen {
        assert!(eventually(|| last_payload(recording) == Some(json!(49))).await);
        let numbers: Vec<Value> = payloads(&recording.received()).into_iter().filter(|v| v.is_number()).collect();
        assert_eq!(numbers, expected);
    }
    let mut all = vec![&producer];
    all.extend(consumers.iter());
    stop_all(&all).await;
}
