// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Discovery specs: find a hub by channel, then talk to it.

use crate::prelude::*;
use crate::prelude::assert_eq;

use plexus_core::DiscoveryMessage;
use plexus_hub::{DiscoveryLookup, DiscoveryRegistrar};
use plexus_wire::{HandshakeIncomingConnector, HandshakeOutgoingConnector, LocalBroadcastGroup};

#[tokio::test]
async fn lookup_then_connect() {
    let executor = Executor::current("discovery");
    let group = LocalBroadcastGroup::<DiscoveryMessage>::new();

    let server = hub("server");
    let seen = RecordingDispatch::<Value>::new();
    server.add_worker("reports", seen.clone()).unwrap();
    let connector = HandshakeIncomingConnector::<Message>::new(executor.clone(), plexus_wire::env::bind_addr());
    let accepting = Arc::clone(&server);
    let address = connector
        .accept(move |connection| accepting.add_connection(connection).unwrap())
        .await
        .unwrap();
    let registrar = DiscoveryRegistrar::new(&executor, "office", group.join()).unwrap();
    registrar.register("reports", address.clone()).unwrap();

    let lookup = DiscoveryLookup::with_interval(&executor, "office", group.join(), Duration::from_millis(20)).unwrap();
    let found = lookup.lookup("reports", Duration::from_secs(5)).await.unwrap();
    assert_eq!(found, address);

    let client = hub("client");
    client
        .add_connection(HandshakeOutgoingConnector::<Message>::new(Executor::current("client")).connect(&found).await.unwrap())
        .unwrap();
    client.add_unicast_outgoing("reports").unwrap().dispatch(json!("q3")).unwrap();
    assert_eq!(seen.wait_for(1).await, vec![json!("q3")]);

    stop_all(&[&client, &server]).await;
    registrar.stop().await.unwrap();
    lookup.stop().await.unwrap();
    connector.stop();
}
