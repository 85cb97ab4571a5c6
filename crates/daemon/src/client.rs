// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Async client for the `wardend` socket.
//!
//! A background reader routes response frames to the request that is
//! waiting on them by id and queues stream events for [`DaemonClient::next_event`].
//! At most [`EVENT_BUFFER`] events wait in the queue; later ones are dropped
//! until the caller catches up.

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use thiserror::Error;
use tokio::io::BufReader;
use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::UnixStream;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::protocol::{
    self, ClientFrame, ErrorBody, FrameReader, ProtocolError, ServerFrame, AUTH_METHOD,
    CLIENT_TIMEOUT,
};

/// Unread stream events held per client.
pub const EVENT_BUFFER: usize = 1024;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("connection closed")]
    ConnectionClosed,

    #[error("daemon error {code}: {message}")]
    Remote { code: u16, message: String },
}

impl ClientError {
    /// Error code sent by the daemon, if this is a remote error.
    pub fn code(&self) -> Option<u16> {
        match self {
            ClientError::Remote { code, .. } => Some(*code),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for ClientError {
    fn from(e: serde_json::Error) -> Self {
        ClientError::Protocol(ProtocolError::Json(e))
    }
}

/// Event pushed by the daemon.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamEvent {
    pub id: String,
    pub event: String,
    pub data: Value,
}

type Reply = Result<Value, ErrorBody>;
type Pending = Arc<Mutex<HashMap<String, oneshot::Sender<Reply>>>>;

pub struct DaemonClient {
    writer: tokio::sync::Mutex<OwnedWriteHalf>,
    pending: Pending,
    events: tokio::sync::Mutex<mpsc::Receiver<StreamEvent>>,
    next_id: AtomicU64,
    timeout: Duration,
    reader: JoinHandle<()>,
}

impl DaemonClient {
    /// Connect without authenticating.
    pub async fn connect(socket_path: &Path) -> Result<Self, ClientError> {
        let stream = UnixStream::connect(socket_path).await?;
        Ok(Self::from_stream(stream))
    }

    /// Connect and send the `auth` frame.
    pub async fn connect_with_token(socket_path: &Path, token: &str) -> Result<Self, ClientError> {
        let client = Self::connect(socket_path).await?;
        client.authenticate(token).await?;
        Ok(client)
    }

    pub fn from_stream(stream: UnixStream) -> Self {
        let (reader, writer) = stream.into_split();
        let pending: Pending = Arc::default();
        let (events_tx, events_rx) = mpsc::channel(EVENT_BUFFER);
        let reader = tokio::spawn(read_loop(reader, Arc::clone(&pending), events_tx));
        Self {
            writer: tokio::sync::Mutex::new(writer),
            pending,
            events: tokio::sync::Mutex::new(events_rx),
            next_id: AtomicU64::new(1),
            timeout: CLIENT_TIMEOUT,
            reader,
        }
    }

    /// Override how long a request waits for its response.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub async fn authenticate(&self, token: &str) -> Result<(), ClientError> {
        self.request(AUTH_METHOD, json!({ "token": token })).await?;
        Ok(())
    }

    /// Send a request and wait for the matching response.
    pub async fn request(&self, method: &str, params: Value) -> Result<Value, ClientError> {
        let id = format!("req-{}", self.next_id.fetch_add(1, Ordering::Relaxed));
        let (tx, rx) = oneshot::channel();
        self.pending.lock().insert(id.clone(), tx);

        let frame = ClientFrame::new(id.clone(), method, params);
        let sent = {
            let mut writer = self.writer.lock().await;
            protocol::write_frame(&mut *writer, &frame).await
        };
        if let Err(e) = sent {
            self.pending.lock().remove(&id);
            return Err(e.into());
        }

        match tokio::time::timeout(self.timeout, rx).await {
            Ok(Ok(Ok(result))) => Ok(result),
            Ok(Ok(Err(ErrorBody { code, message }))) => Err(ClientError::Remote { code, message }),
            Ok(Err(_)) => Err(ClientError::ConnectionClosed),
            Err(_) => {
                self.pending.lock().remove(&id);
                Err(ClientError::Timeout(self.timeout))
            }
        }
    }

    /// Send a request and decode its result.
    pub async fn request_as<T: DeserializeOwned>(
        &self,
        method: &str,
        params: Value,
    ) -> Result<T, ClientError> {
        let value = self.request(method, params).await?;
        Ok(serde_json::from_value(value)?)
    }

    /// Wait for the next stream event.
    pub async fn next_event(&self, wait: Duration) -> Result<StreamEvent, ClientError> {
        let mut events = self.events.lock().await;
        match tokio::time::timeout(wait, events.recv()).await {
            Ok(Some(event)) => Ok(event),
            Ok(None) => Err(ClientError::ConnectionClosed),
            Err(_) => Err(ClientError::Timeout(wait)),
        }
    }

    /// Wait for the next event with the given name, skipping others.
    pub async fn wait_for_event(
        &self,
        name: &str,
        wait: Duration,
    ) -> Result<StreamEvent, ClientError> {
        let deadline = tokio::time::Instant::now() + wait;
        loop {
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            let event = self.next_event(remaining).await.map_err(|e| match e {
                ClientError::Timeout(_) => ClientError::Timeout(wait),
                other => other,
            })?;
            if event.event == name {
                return Ok(event);
            }
        }
    }
}

impl Drop for DaemonClient {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

async fn read_loop(
    reader: OwnedReadHalf,
    pending: Pending,
    events: mpsc::Sender<StreamEvent>,
) {
    let mut frames = FrameReader::new(BufReader::new(reader));
    let mut dropped: u64 = 0;
    loop {
        let line = match frames.read_frame().await {
            Ok(line) => line,
            Err(ProtocolError::ConnectionClosed) => break,
            Err(e) => {
                tracing::debug!(error = %e, "daemon stream failed");
                break;
            }
        };
        let frame: ServerFrame = match protocol::decode(&line) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::warn!(error = %e, "ignoring undecodable frame from daemon");
                continue;
            }
        };
        let (id, reply) = match frame {
            ServerFrame::Event { id, event, data } => {
                match events.try_send(StreamEvent { id, event, data }) {
                    Ok(()) => dropped = 0,
                    Err(TrySendError::Full(event)) => {
                        dropped += 1;
                        if dropped == 1 {
                            tracing::warn!(event = %event.event, "event queue full, dropping events");
                        }
                    }
                    // Nobody reading events is fine.
                    Err(TrySendError::Closed(_)) => {}
                }
                continue;
            }
            ServerFrame::Response { id, result } => (id, Ok(result)),
            ServerFrame::Error { id, error } => (id, Err(error)),
        };
        match pending.lock().remove(&id) {
            Some(tx) => {
                let _ = tx.send(reply);
            }
            None => tracing::debug!(request_id = %id, "response for unknown request"),
        }
    }
    // Dropping the senders fails every waiting request with ConnectionClosed.
    pending.lock().clear();
}

#[cfg(test)]
#[path = "client_tests.rs"]
mod tests;
