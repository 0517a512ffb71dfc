// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Multi-channel connection specs over a real socket.

use crate::prelude::*;
use crate::prelude::assert_eq;

use plexus_hub::MultiChannelConnection;
use plexus_wire::{HandshakeIncomingConnector, HandshakeOutgoingConnector, SocketConnection};

type Mc = MultiChannelConnection<SocketConnection<Message>>;

async fn socket_pair() -> (Mc, Mc, HandshakeIncomingConnector<Message>) {
    let executor = Executor::current("mc");
    let connector = HandshakeIncomingConnector::<Message>::new(executor.clone(), plexus_wire::env::bind_addr());
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    let address = connector
        .accept(move |connection| {
            let _ = tx.send(connection);
        })
        .await
        .unwrap();
    let client = HandshakeOutgoingConnector::<Message>::new(Executor::current("client")).connect(&address).await.unwrap();
    let server = rx.recv().await.unwrap();
    (
        MultiChannelConnection::new(&executor, "client", Arc::new(client)).unwrap(),
        MultiChannelConnection::new(&executor, "server", Arc::new(server)).unwrap(),
        connector,
    )
}

#[tokio::test]
async fn interleaved_channels_do_not_cross_talk() {
    let (client, server, _connector) = socket_pair().await;
    let (a, b) = (client.add_outgoing_channel("A"), client.add_outgoing_channel("B"));
    let (on_a, on_b) = (RecordingDispatch::<Message>::new(), RecordingDispatch::<Message>::new());
    server.add_incoming_channel("A", on_a.clone());
    server.add_incoming_channel("B", on_b.clone());

    a.dispatch(Message::payload("a1")).unwrap();
    b.dispatch(Message::payload("b1")).unwrap();
    a.dispatch(Message::payload("a2")).unwrap();
    b.dispatch(Message::payload("b2")).unwrap();
    a.dispatch(Message::payload("a3")).unwrap();

    assert_eq!(
        on_a.wait_for(3).await,
        vec![Message::payload("a1"), Message::payload("a2"), Message::payload("a3")]
    );
    assert_eq!(on_b.wait_for(2).await, vec![Message::payload("b1"), Message::payload("b2")]);

    let (c, s) = tokio::join!(client.stop(), server.stop());
    c.unwrap();
    s.unwrap();
    assert_eq!(on_a.len() + on_b.len(), 5);
}

#[tokio::test]
async fn both_directions_share_one_socket() {
    let (client, server, _connector) = socket_pair().await;
    let (to_client, to_server) = (RecordingDispatch::<Message>::new(), RecordingDispatch::<Message>::new());
    client.add_incoming_channel("replies", to_client.clone());
    server.add_incoming_channel("requests", to_server.clone());

    client.add_outgoing_channel("requests").dispatch(Message::payload(1)).unwrap();
    assert_eq!(to_server.wait_for(1).await, vec![Message::payload(1)]);
    server.add_outgoing_channel("replies").dispatch(Message::payload(2)).unwrap();
    assert_eq!(to_client.wait_for(1).await, vec![Message::payload(2)]);

    let (c, s) = tokio::join!(client.stop(), server.stop());
    c.unwrap();
    s.unwrap();
}
