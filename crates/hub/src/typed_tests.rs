// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use parking_lot::Mutex;
use plexus_core::test_support::RecordingDispatch;
use serde::Deserialize;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Build {
    target: String,
    attempt: u32,
}

#[test]
fn typed_dispatch_serializes_to_payloads() {
    let payloads = RecordingDispatch::<Value>::new();
    let builds = TypedDispatch::<Build, _>::new(payloads.clone());

    builds.dispatch(Build { target: "lib".into(), attempt: 2 }).unwrap();

    assert_eq!(payloads.received(), vec![serde_json::json!({ "target": "lib", "attempt": 2 })]);
}

#[test]
fn typed_handler_deserializes_or_fails() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let handler = typed_handler(move |build: Build| {
        sink.lock().push(build);
        Ok(())
    });

    handler.dispatch(serde_json::json!({ "target": "app", "attempt": 1 })).unwrap();
    let rejected = handler.dispatch(serde_json::json!("not a build"));

    assert_eq!(*seen.lock(), vec![Build { target: "app".into(), attempt: 1 }]);
    assert!(matches!(rejected, Err(MessagingError::Handler(_))));
}
