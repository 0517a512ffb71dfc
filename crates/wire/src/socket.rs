// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Stream-backed connection with a dedicated writer task.
//!
//! ```text
//! dispatch() ─┐
//! dispatch() ─┼─► mpsc::UnboundedSender<WriterCommand> ─► writer task ─► socket
//! dispatch() ─┘
//! ```
//!
//! `dispatch()` only encodes and enqueues; I/O errors are recorded by the
//! writer task and reported by every later `dispatch()`.

use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use plexus_core::{Dispatch, Executor, MessagingError, Receive, Stoppable};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpStream, UnixStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::wire::{self, ProtocolError};

type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;

enum WriterCommand {
    Frame(Vec<u8>),
    Close,
}

/// A [`plexus_core::Connection`] over a byte stream.
pub struct SocketConnection<T> {
    peer: String,
    reader: tokio::sync::Mutex<BoxedReader>,
    writer: mpsc::UnboundedSender<WriterCommand>,
    writer_task: Mutex<Option<JoinHandle<()>>>,
    /// Reason the writer stopped, once it has
    broken: Arc<Mutex<Option<String>>>,
    stop_requested: AtomicBool,
    closed: CancellationToken,
    _marker: PhantomData<fn(T) -> T>,
}

impl<T> SocketConnection<T>
where
    T: Serialize + DeserializeOwned + Send + 'static,
{
    /// Build a connection from split stream halves. The writer task is
    /// spawned on `executor` immediately.
    pub fn new<R, W>(executor: &Executor, reader: R, writer: W, peer: impl Into<String>) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let peer = peer.into();
        let (tx, rx) = mpsc::unbounded_channel();
        let broken = Arc::new(Mutex::new(None));
        let task = executor.spawn(writer_loop(writer, rx, Arc::clone(&broken), peer.clone()));

        Self {
            peer,
            reader: tokio::sync::Mutex::new(Box::new(reader)),
            writer: tx,
            writer_task: Mutex::new(Some(task)),
            broken,
            stop_requested: AtomicBool::new(false),
            closed: CancellationToken::new(),
            _marker: PhantomData,
        }
    }

    pub fn from_tcp(executor: &Executor, stream: TcpStream) -> Self {
        let peer = stream
            .peer_addr()
            .map(|addr| addr.to_string())
            .unwrap_or_else(|_| "tcp:unknown".to_string());
        let (reader, writer) = stream.into_split();
        Self::new(executor, reader, writer, peer)
    }

    pub fn from_unix(executor: &Executor, stream: UnixStream) -> Self {
        let (reader, writer) = stream.into_split();
        Self::new(executor, reader, writer, "unix")
    }

    pub fn peer(&self) -> &str {
        &self.peer
    }
}

async fn writer_loop<W>(
    mut writer: W,
    mut rx: mpsc::UnboundedReceiver<WriterCommand>,
    broken: Arc<Mutex<Option<String>>>,
    peer: String,
) where
    W: AsyncWrite + Send + Unpin,
{
    while let Some(command) = rx.recv().await {
        match command {
            WriterCommand::Frame(body) => {
                if let Err(e) = wire::write_message(&mut writer, &body).await {
                    warn!(%peer, "write failed: {}", e);
                    *broken.lock() = Some(e.to_string());
                    return;
                }
            }
            WriterCommand::Close => break,
        }
    }
    if let Err(e) = writer.shutdown().await {
        debug!(%peer, "shutdown of write half failed: {}", e);
    }
    broken.lock().get_or_insert_with(|| "connection closed".to_string());
}

impl<T> Dispatch<T> for SocketConnection<T>
where
    T: Serialize + DeserializeOwned + Send + 'static,
{
    fn dispatch(&self, message: T) -> Result<(), MessagingError> {
        if self.stop_requested.load(Ordering::SeqCst) {
            return Err(MessagingError::stopped(format!("connection to {}", self.peer)));
        }
        if let Some(reason) = self.broken.lock().clone() {
            return Err(MessagingError::Transport(reason));
        }
        let body = wire::encode(&message)?;
        self.writer
            .send(WriterCommand::Frame(body))
            .map_err(|_| MessagingError::Transport(format!("writer for {} has exited", self.peer)))
    }
}

#[async_trait]
impl<T> Receive<T> for SocketConnection<T>
where
    T: Serialize + DeserializeOwned + Send + 'static,
{
    async fn receive(&self) -> Result<Option<T>, MessagingError> {
        let mut reader = tokio::select! {
            _ = self.closed.cancelled() => return Ok(None),
            reader = self.reader.lock() => reader,
        };
        tokio::select! {
            _ = self.closed.cancelled() => Ok(None),
            frame = wire::read_frame(&mut *reader) => match frame {
                Ok(frame) => Ok(frame),
                Err(ProtocolError::ConnectionClosed) => Ok(None),
                Err(e) => Err(e.into()),
            },
        }
    }
}

#[async_trait]
impl<T> Stoppable for SocketConnection<T>
where
    T: Serialize + DeserializeOwned + Send + 'static,
{
    fn request_stop(&self) {
        if !self.stop_requested.swap(true, Ordering::SeqCst) {
            debug!(peer = %self.peer, "closing write half");
            let _ = self.writer.send(WriterCommand::Close);
        }
    }

    async fn stop(&self) -> Result<(), MessagingError> {
        self.request_stop();
        let task = self.writer_task.lock().take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                warn!(peer = %self.peer, "writer task failed: {}", e);
            }
        }
        self.closed.cancel();
        Ok(())
    }
}

#[cfg(test)]
#[path = "socket_tests.rs"]
mod tests;
