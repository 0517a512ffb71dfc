// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared setup for specs.

pub use std::sync::Arc;
pub use std::time::Duration;

pub use plexus_core::test_support::{eventually, RecordingDispatch};
pub use plexus_core::{Dispatch, Executor, Message, Stoppable};
pub use plexus_hub::{IncomingMessage, MessageHub};
pub use serde_json::{json, Value};
pub use similar_asserts::assert_eq;

use plexus_wire::{pipe, HandshakeIncomingConnector, HandshakeOutgoingConnector};

pub fn hub(name: &str) -> Arc<MessageHub> {
    Arc::new(MessageHub::new(&Executor::current(name.to_string()), name.to_string()))
}

/// Connect two hubs in-process.
pub fn connect_pipe(a: &MessageHub, b: &MessageHub) {
    let (x, y) = pipe::<Message>(&format!("{}-{}", a.name(), b.name()));
    a.add_connection(x).unwrap();
    b.add_connection(y).unwrap();
}

/// Connect `client` to `server` over loopback TCP with the listener
/// handshake. The returned connector must outlive the test.
pub async fn connect_tcp(server: &Arc<MessageHub>, client: &MessageHub) -> HandshakeIncomingConnector<Message> {
    let connector = HandshakeIncomingConnector::<Message>::new(Executor::current("acceptor"), plexus_wire::env::bind_addr());
    let accepting = Arc::clone(server);
    let address = connector
        .accept(move |connection| accepting.add_connection(connection).unwrap())
        .await
        .unwrap();
    let connection = HandshakeOutgoingConnector::<Message>::new(Executor::current("client")).connect(&address).await.unwrap();
    client.add_connection(connection).unwrap();
    connector
}

/// Stop all hubs concurrently so every end-of-stream handshake can complete.
pub async fn stop_all(hubs: &[&Arc<MessageHub>]) {
    let stops = hubs.iter().map(|h| {
        let h = Arc::clone(h);
        tokio::spawn(async move { h.stop().await })
    });
    for stop in stops.collect::<Vec<_>>() {
        stop.await.unwrap().unwrap();
    }
}

pub fn payloads(received: &[IncomingMessage]) -> Vec<Value> {
    received.iter().map(|m| m.payload.clone()).collect()
}
