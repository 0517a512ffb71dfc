// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Length-prefixed JSON framing.
//!
//! Each frame is a 4-byte big-endian length followed by that many bytes of
//! JSON. A stream that ends on a frame boundary is a clean end of stream; a
//! stream that ends inside a frame, or is reset by the peer, is reported as
//! [`ProtocolError::ConnectionClosed`] and never as a partial message.

use std::io::ErrorKind;
use std::time::Duration;

use plexus_core::MessagingError;
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Largest frame body accepted in either direction.
pub const MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

/// Errors from framing and codec operations.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Timeout")]
    Timeout,

    #[error("Frame of {len} bytes exceeds limit of {MAX_FRAME_LEN}")]
    TooLarge { len: usize },
}

impl From<ProtocolError> for MessagingError {
    fn from(e: ProtocolError) -> Self {
        MessagingError::Transport(e.to_string())
    }
}

/// Serialize a message to a JSON frame body (no length prefix).
pub fn encode<T: Serialize>(message: &T) -> Result<Vec<u8>, ProtocolError> {
    let body = serde_json::to_vec(message)?;
    if body.len() > MAX_FRAME_LEN {
        return Err(ProtocolError::TooLarge { len: body.len() });
    }
    Ok(body)
}

/// Deserialize a JSON frame body.
pub fn decode<T: DeserializeOwned>(body: &[u8]) -> Result<T, ProtocolError> {
    Ok(serde_json::from_slice(body)?)
}

fn closed_or_io(e: std::io::Error) -> ProtocolError {
    match e.kind() {
        ErrorKind::UnexpectedEof
        | ErrorKind::ConnectionReset
        | ErrorKind::ConnectionAborted
        | ErrorKind::BrokenPipe => ProtocolError::ConnectionClosed,
        _ => ProtocolError::Io(e),
    }
}

/// Read one length-prefixed frame body.
pub async fn read_message<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Vec<u8>, ProtocolError> {
    let mut len_buf = [0u8; 4];
    reader.read_exact(&mut len_buf).await.map_err(closed_or_io)?;
    let len = u32::from_be_bytes(len_buf) as usize;
    if len > MAX_FRAME_LEN {
        return Err(ProtocolError::TooLarge { len });
    }

    let mut body = vec![0u8; len];
    reader.read_exact(&mut body).await.map_err(closed_or_io)?;
    Ok(body)
}

/// Write one length-prefixed frame and flush.
pub async fn write_message<W: AsyncWrite + Unpin>(
    writer: &mut W,
    body: &[u8],
) -> Result<(), ProtocolError> {
    if body.len() > MAX_FRAME_LEN {
        return Err(ProtocolError::TooLarge { len: body.len() });
    }
    let len = body.len() as u32;
    writer.write_all(&len.to_be_bytes()).await.map_err(closed_or_io)?;
    writer.write_all(body).await.map_err(closed_or_io)?;
    writer.flush().await.map_err(closed_or_io)?;
    Ok(())
}

/// Read and decode one frame. `Ok(None)` at end of stream.
pub async fn read_frame<T, R>(reader: &mut R) -> Result<Option<T>, ProtocolError>
where
    T: DeserializeOwned,
    R: AsyncRead + Unpin,
{
    match read_message(reader).await {
        Ok(body) => Ok(Some(decode(&body)?)),
        Err(ProtocolError::ConnectionClosed) => Ok(None),
        Err(e) => Err(e),
    }
}

/// Encode and write one frame.
pub async fn write_frame<T, W>(writer: &mut W, message: &T) -> Result<(), ProtocolError>
where
    T: Serialize,
    W: AsyncWrite + Unpin,
{
    let body = encode(message)?;
    write_message(writer, &body).await
}

/// Read one frame, failing with [`ProtocolError::Timeout`] if none arrives in time.
///
/// End of stream before the frame is [`ProtocolError::ConnectionClosed`].
pub async fn read_frame_timeout<T, R>(reader: &mut R, timeout: Duration) -> Result<T, ProtocolError>
where
    T: DeserializeOwned,
    R: AsyncRead + Unpin,
{
    match tokio::time::timeout(timeout, read_frame(reader)).await {
        Ok(Ok(Some(message))) => Ok(message),
        Ok(Ok(None)) => Err(ProtocolError::ConnectionClosed),
        Ok(Err(e)) => Err(e),
        Err(_) => Err(ProtocolError::Timeout),
    }
}

#[cfg(test)]
#[path = "wire_tests.rs"]
mod tests;
