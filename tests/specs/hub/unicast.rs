// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Unicast channel specs.
//!
//! Payloads sent before any consumer exists are held, then delivered in
//! order to exactly one consumer.

use crate::prelude::*;
use crate::prelude::assert_eq;

#[tokio::test]
async fn payloads_sent_before_any_consumer_arrive_in_order() {
    let (producer, consumer) = (hub("producer"), hub("consumer"));
    let jobs = producer.add_unicast_outgoing("jobs").unwrap();
    for n in 0..3 {
        jobs.dispatch(json!(n)).unwrap();
    }
    let seen = RecordingDispatch::<IncomingMessage>::new();
    consumer.add_incoming("jobs", seen.clone()).unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(seen.is_empty(), "nothing is delivered before the hubs are connected");

    connect_pipe(&producer, &consumer);

    assert_eq!(payloads(&seen.wait_for(3).await), vec![json!(0), json!(1), json!(2)]);
    stop_all(&[&producer, &consumer]).await;
}

#[tokio::test]
async fn long_sequences_keep_their_order_over_tcp() {
    let (producer, consumer) = (hub("producer"), hub("consumer"));
    let _acceptor = connect_tcp(&consumer, &producer).await;
    let seen = RecordingDispatch::<Value>::new();
    consumer.add_worker("ordered", seen.clone()).unwrap();
    let out = producer.add_unicast_outgoing("ordered").unwrap();

    let expected: Vec<Value> = (0..200).map(|n| json!({ "seq": n })).collect();
    for payload in &expected {
        out.dispatch(payload.clone()).unwrap();
    }

    assert_eq!(seen.wait_for(expected.len()).await, expected);
    stop_all(&[&producer, &consumer]).await;
}

#[tokio::test]
async fn each_payload_goes_to_one_consumer_only() {
    let producer = hub("producer");
    let (first, second) = (hub("first"), hub("second"));
    let (on_first, on_second) = (RecordingDispatch::<Value>::new(), RecordingDispatch::<Value>::new());
    first.add_worker("jobs", on_first.clone()).unwrap();
    second.add_worker("jobs", on_second.clone()).unwrap();
    connect_pipe(&producer, &first);
    connect_pipe(&producer, &second);

    let jobs = producer.add_unicast_outgoing("jobs").unwrap();
    for n in 0..20 {
        jobs.dispatch(json!(n)).unwrap();
    }

    assert!(eventually(|| on_first.len() + on_second.len() == 20).await);
    tokio::time::sleep(Duration::from_millis(20)).await;
    let mut all = on_first.received();
    all.extend(on_second.received());
    all.sort_by_key(|v| v.as_i64());
    assert_eq!(all, (0..20).map(|n| json!(n)).collect::<Vec<_>>());
    stop_all(&[&producer, &first, &second]).await;
}
