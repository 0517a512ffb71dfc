// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use plexus_core::Message;

#[test]
fn encoded_body_is_tagged_json() {
    let body = encode(&Message::payload("x")).unwrap();
    let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(value, serde_json::json!({ "type": "Payload", "body": "x" }));
}

#[tokio::test]
async fn frame_is_big_endian_length_then_body() {
    let mut framed = Vec::new();
    write_message(&mut framed, b"plexus").await.unwrap();
    assert_eq!(framed[..4], [0, 0, 0, 6]);
    assert_eq!(&framed[4..], b"plexus");

    let body = read_message(&mut std::io::Cursor::new(framed)).await.unwrap();
    assert_eq!(body, b"plexus");
}

#[tokio::test]
async fn read_frame_at_boundary_is_end_of_stream() {
    let mut buffer = Vec::new();
    write_frame(&mut buffer, &Message::payload(1)).await.unwrap();

    let mut cursor = std::io::Cursor::new(buffer);
    let first: Option<Message> = read_frame(&mut cursor).await.unwrap();
    assert_eq!(first, Some(Message::payload(1)));
    let second: Option<Message> = read_frame(&mut cursor).await.unwrap();
    assert_eq!(second, None);
}

#[tokio::test]
async fn truncated_frame_is_end_of_stream_not_partial_message() {
    let mut buffer = Vec::new();
    write_frame(&mut buffer, &Message::payload("a fairly long payload")).await.unwrap();
    buffer.truncate(buffer.len() - 5);

    let mut cursor = std::io::Cursor::new(buffer);
    let result: Option<Message> = read_frame(&mut cursor).await.unwrap();
    assert_eq!(result, None);
}

#[tokio::test]
async fn oversized_length_prefix_is_rejected() {
    let mut buffer = ((MAX_FRAME_LEN as u32) + 1).to_be_bytes().to_vec();
    buffer.extend_from_slice(b"{}");

    let mut cursor = std::io::Cursor::new(buffer);
    let result = read_message(&mut cursor).await;
    assert!(matches!(result, Err(ProtocolError::TooLarge { .. })));
}

#[tokio::test]
async fn malformed_body_is_json_error() {
    let mut buffer = Vec::new();
    write_message(&mut buffer, b"not json").await.unwrap();

    let mut cursor = std::io::Cursor::new(buffer);
    let result: Result<Option<Message>, _> = read_frame(&mut cursor).await;
    assert!(matches!(result, Err(ProtocolError::Json(_))));
}

#[tokio::test]
async fn read_frame_timeout_expires() {
    let (mut client, _server) = tokio::io::duplex(64);
    let result: Result<Message, _> =
        read_frame_timeout(&mut client, Duration::from_millis(20)).await;
    assert!(matches!(result, Err(ProtocolError::Timeout)));
}

#[test]
fn protocol_error_converts_to_transport_failure() {
    let e: MessagingError = ProtocolError::ConnectionClosed.into();
    assert!(matches!(e, MessagingError::Transport(_)));
}

#[yare::parameterized(
    closed = { ProtocolError::ConnectionClosed, "Connection closed" },
    timeout = { ProtocolError::Timeout, "Timeout" },
    too_large = { ProtocolError::TooLarge { len: MAX_FRAME_LEN + 1 }, "exceeds limit" },
)]
fn transport_failure_keeps_the_cause(error: ProtocolError, cause: &str) {
    let MessagingError::Transport(detail) = MessagingError::from(error) else {
        panic!("expected a transport failure");
    };
    assert!(detail.contains(cause), "{}", detail);
}

mod frames {
    use super::*;
    use plexus_core::test_support::strategies::arb_payloads;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn frames_on_one_stream_read_back_in_order(messages in arb_payloads(32)) {
            let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
            let read = runtime.block_on(async {
                let mut buffer = Vec::new();
                for message in &messages {
                    write_frame(&mut buffer, message).await.unwrap();
                }
                let mut cursor = std::io::Cursor::new(buffer);
                let mut read = Vec::new();
                while let Some(message) = read_frame::<Message, _>(&mut cursor).await.unwrap() {
                    read.push(message);
                }
                read
            });
            prop_assert_eq!(read, messages);
        }

        #[test]
        fn garbage_never_yields_a_message(body in proptest::collection::vec(any::<u8>(), 0..64)) {
            prop_assume!(serde_json::from_slice::<Message>(&body).is_err());
            let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
            let result = runtime.block_on(async {
                let mut buffer = Vec::new();
                write_message(&mut buffer, &body).await.unwrap();
                read_frame::<Message, _>(&mut std::io::Cursor::new(buffer)).await
            });
            prop_assert!(result.is_err());
        }
    }
}
