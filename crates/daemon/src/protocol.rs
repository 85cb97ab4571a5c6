// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! IPC protocol between `wardend` and its front-ends.
//!
//! Wire format: newline-delimited JSON over a Unix socket. Clients send
//! `{id, method, params?}`; the daemon answers `{id, result}` or
//! `{id, error: {code, message}}` and pushes bus events as `{id, event, data}`.

use std::time::Duration;

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use wd_core::Event;

/// Protocol errors
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Frame too large: {size} bytes (max {max})")]
    FrameTooLarge { size: usize, max: usize },

    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Timeout")]
    Timeout,
}

/// Maximum frame size (8 MB)
pub const MAX_FRAME_SIZE: usize = 8 * 1024 * 1024;

/// How long a new connection has to send its `auth` frame.
pub const AUTH_TIMEOUT: Duration = Duration::from_secs(5);

/// Upper bound on a single handler invocation.
pub const HANDLER_TIMEOUT: Duration = Duration::from_secs(300);

/// Default client-side wait for a response.
pub const CLIENT_TIMEOUT: Duration = Duration::from_secs(30);

/// Method name of the mandatory first frame.
pub const AUTH_METHOD: &str = "auth";

/// Error codes carried in `{error: {code}}`.
pub mod codes {
    pub const BAD_REQUEST: u16 = 400;
    pub const UNAUTHORIZED: u16 = 401;
    pub const NOT_FOUND: u16 = 404;
    pub const TIMEOUT: u16 = 408;
    pub const TOO_MANY_REQUESTS: u16 = 429;
    pub const INTERNAL: u16 = 500;
}

/// Request sent by a client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientFrame {
    pub id: String,
    pub method: String,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub params: Value,
}

impl ClientFrame {
    pub fn new(id: impl Into<String>, method: impl Into<String>, params: Value) -> Self {
        Self {
            id: id.into(),
            method: method.into(),
            params,
        }
    }

    pub fn auth(id: impl Into<String>, token: &str) -> Self {
        Self::new(id, AUTH_METHOD, serde_json::json!({ "token": token }))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: u16,
    pub message: String,
}

/// Frame written by the daemon.
///
/// Variant order matters for decoding: the shapes are told apart by which
/// keys are present.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ServerFrame {
    Event {
        id: String,
        event: String,
        data: Value,
    },
    Error {
        id: String,
        error: ErrorBody,
    },
    Response {
        id: String,
        result: Value,
    },
}

impl ServerFrame {
    pub fn ok(id: impl Into<String>, result: Value) -> Self {
        ServerFrame::Response {
            id: id.into(),
            result,
        }
    }

    pub fn error(id: impl Into<String>, code: u16, message: impl Into<String>) -> Self {
        ServerFrame::Error {
            id: id.into(),
            error: ErrorBody {
                code,
                message: message.into(),
            },
        }
    }

    /// Stream frame for a bus event, under a fresh id.
    pub fn event(event: &Event) -> Self {
        ServerFrame::Event {
            id: uuid::Uuid::new_v4().to_string(),
            event: event.name.clone(),
            data: event.payload.clone(),
        }
    }

    pub fn id(&self) -> &str {
        match self {
            ServerFrame::Event { id, .. }
            | ServerFrame::Error { id, .. }
            | ServerFrame::Response { id, .. } => id,
        }
    }
}

/// Encode a frame as one JSON line, newline included.
pub fn encode<T: Serialize>(frame: &T) -> Result<Vec<u8>, ProtocolError> {
    let mut bytes = serde_json::to_vec(frame)?;
    if bytes.len() > MAX_FRAME_SIZE {
        return Err(ProtocolError::FrameTooLarge {
            size: bytes.len(),
            max: MAX_FRAME_SIZE,
        });
    }
    bytes.push(b'\n');
    Ok(bytes)
}

pub fn decode<T: DeserializeOwned>(line: &str) -> Result<T, ProtocolError> {
    Ok(serde_json::from_str(line)?)
}

/// Best-effort request id of a line that failed to decode as a frame.
pub fn salvage_id(line: &str) -> String {
    serde_json::from_str::<Value>(line)
        .ok()
        .and_then(|v| v.get("id").and_then(Value::as_str).map(str::to_string))
        .unwrap_or_default()
}

/// Line reader that holds at most `MAX_FRAME_SIZE + 1` bytes of one frame.
///
/// A partly read line stays buffered between calls, so [`FrameReader::read_frame`]
/// is safe to race in `select!`.
pub struct FrameReader<R> {
    reader: R,
    buf: Vec<u8>,
}

impl<R: AsyncBufRead + Unpin> FrameReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            buf: Vec::new(),
        }
    }

    /// Read the next non-blank line, without its line ending.
    ///
    /// Fails with [`ProtocolError::FrameTooLarge`] as soon as a line passes
    /// [`MAX_FRAME_SIZE`], before the rest of it is read.
    pub async fn read_frame(&mut self) -> Result<String, ProtocolError> {
        loop {
            let budget = (MAX_FRAME_SIZE + 1).saturating_sub(self.buf.len()) as u64;
            let read = (&mut self.reader)
                .take(budget)
                .read_until(b'\n', &mut self.buf)
                .await?;

            let line = if self.buf.last() == Some(&b'\n') {
                let mut line = std::mem::take(&mut self.buf);
                line.pop();
                if line.last() == Some(&b'\r') {
                    line.pop();
                }
                line
            } else if self.buf.len() > MAX_FRAME_SIZE {
                let size = self.buf.len();
                self.buf = Vec::new();
                return Err(ProtocolError::FrameTooLarge {
                    size,
                    max: MAX_FRAME_SIZE,
                });
            } else if read == 0 && self.buf.is_empty() {
                return Err(ProtocolError::ConnectionClosed);
            } else {
                // EOF after an unterminated last line
                std::mem::take(&mut self.buf)
            };

            let text = String::from_utf8(line)
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
            if !text.trim().is_empty() {
                return Ok(text);
            }
        }
    }
}

/// Write one frame and flush.
pub async fn write_frame<W, T>(writer: &mut W, frame: &T) -> Result<(), ProtocolError>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let bytes = encode(frame)?;
    writer.write_all(&bytes).await?;
    writer.flush().await?;
    Ok(())
}

#[cfg(test)]
#[path = "protocol_tests.rs"]
mod tests;
