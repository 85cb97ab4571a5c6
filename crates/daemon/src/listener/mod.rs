// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Listener task for handling socket I/O.
//!
//! The Listener accepts connections and serves each in its own task. A
//! connection must authenticate with its first frame; afterwards requests are
//! dispatched concurrently and every bus event is streamed back to it.

mod auth;
mod dispatch;
mod jobs;
mod messages;
mod policy;

pub use auth::{tokens_match, AuthLimiter, PeerKey, FAILURE_WINDOW, MAX_FAILURES};
pub use dispatch::{dispatch, run_with_timeout, HandlerError};

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde_json::{json, Value};
use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncWrite, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, mpsc, Notify};
use tracing::{debug, error, warn};
use wd_core::{Event, WILDCARD};
use wd_engine::{Orchestrator, SubscriptionId};

use crate::protocol::{
    self, codes, ClientFrame, FrameReader, ProtocolError, ServerFrame, AUTH_METHOD,
    AUTH_TIMEOUT, HANDLER_TIMEOUT,
};

/// Events buffered per connection before a slow client starts missing them.
const EVENT_BUFFER: usize = 1024;

/// Everything a handler can reach.
pub struct DaemonCtx {
    pub orchestrator: Arc<Orchestrator>,
    pub start_time: Instant,
    pub shutdown: Arc<Notify>,
}

/// Connection policy for a listener.
#[derive(Debug, Clone)]
pub struct ListenerConfig {
    pub token: String,
    pub auth_timeout: Duration,
    pub handler_timeout: Duration,
}

impl ListenerConfig {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            auth_timeout: AUTH_TIMEOUT,
            handler_timeout: HANDLER_TIMEOUT,
        }
    }

    pub fn handler_timeout(mut self, timeout: Duration) -> Self {
        self.handler_timeout = timeout;
        self
    }
}

/// Errors from connection handling.
#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("Authentication failed for {peer}: {reason}")]
    AuthFailed { peer: PeerKey, reason: &'static str },

    #[error("Too many failed authentication attempts from {0}")]
    RateLimited(PeerKey),

    #[error("Malformed frame: {0}")]
    Malformed(String),
}

struct Shared {
    ctx: Arc<DaemonCtx>,
    config: ListenerConfig,
    limiter: Mutex<AuthLimiter>,
    events: broadcast::Sender<Event>,
    subscription: SubscriptionId,
}

impl Drop for Shared {
    fn drop(&mut self) {
        self.ctx.orchestrator.bus().off(self.subscription);
    }
}

/// Listener task for accepting socket connections.
pub struct Listener {
    socket: UnixListener,
    shared: Arc<Shared>,
}

impl Listener {
    /// Create a listener and start forwarding bus events to its connections.
    pub fn new(socket: UnixListener, ctx: Arc<DaemonCtx>, config: ListenerConfig) -> Self {
        let (events, _) = broadcast::channel(EVENT_BUFFER);
        let forward = events.clone();
        let subscription = ctx.orchestrator.bus().on(WILDCARD, move |event| {
            // No receivers just means nobody is connected.
            let _ = forward.send(event.clone());
            Ok(())
        });
        Self {
            socket,
            shared: Arc::new(Shared {
                ctx,
                config,
                limiter: Mutex::new(AuthLimiter::default()),
                events,
                subscription,
            }),
        }
    }

    /// Run the accept loop, spawning a task for each connection.
    pub async fn run(self) {
        loop {
            match self.socket.accept().await {
                Ok((stream, _)) => {
                    let shared = Arc::clone(&self.shared);
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(stream, shared).await {
                            match e {
                                ConnectionError::Protocol(ProtocolError::ConnectionClosed) => {
                                    debug!("Client disconnected")
                                }
                                ConnectionError::Protocol(ProtocolError::Timeout) => {
                                    warn!("Connection timeout")
                                }
                                ConnectionError::AuthFailed { .. }
                                | ConnectionError::RateLimited(_) => warn!("{}", e),
                                ConnectionError::Malformed(_) => debug!("{}", e),
                                _ => error!("Connection error: {}", e),
                            }
                        }
                    });
                }
                Err(e) => {
                    error!("Accept error: {}", e);
                }
            }
        }
    }
}

/// Serve a single client connection until it closes.
async fn handle_connection(stream: UnixStream, shared: Arc<Shared>) -> Result<(), ConnectionError> {
    let peer = PeerKey::of(&stream);
    let (reader, mut writer) = stream.into_split();
    let mut frames = FrameReader::new(BufReader::new(reader));

    authenticate(&shared, &peer, &mut frames, &mut writer).await?;
    debug!(%peer, "client authenticated");

    let mut events = shared.events.subscribe();
    let (done_tx, mut done_rx) = mpsc::unbounded_channel::<ServerFrame>();

    loop {
        tokio::select! {
            biased;

            event = events.recv() => match event {
                Ok(event) => protocol::write_frame(&mut writer, &ServerFrame::event(&event)).await?,
                Err(RecvError::Lagged(skipped)) => {
                    warn!(%peer, skipped, "client fell behind the event stream");
                }
                Err(RecvError::Closed) => return Ok(()),
            },

            Some(reply) = done_rx.recv() => protocol::write_frame(&mut writer, &reply).await?,

            line = frames.read_frame() => {
                let line = match line {
                    Ok(line) => line,
                    Err(ProtocolError::ConnectionClosed) => return Ok(()),
                    Err(e @ ProtocolError::FrameTooLarge { .. }) => {
                        return Err(reject_oversized(&mut writer, e).await);
                    }
                    Err(e) => return Err(e.into()),
                };
                match protocol::decode::<ClientFrame>(&line) {
                    Ok(frame) => spawn_request(&shared, frame, done_tx.clone()),
                    Err(e) => {
                        let message = format!("malformed frame: {e}");
                        reject(&mut writer, &protocol::salvage_id(&line), codes::BAD_REQUEST, &message)
                            .await;
                        return Err(ConnectionError::Malformed(message));
                    }
                }
            }
        }
    }
}

/// Require a valid `auth` frame before anything else.
async fn authenticate<R, W>(
    shared: &Shared,
    peer: &PeerKey,
    frames: &mut FrameReader<R>,
    writer: &mut W,
) -> Result<(), ConnectionError>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let line = match tokio::time::timeout(shared.config.auth_timeout, frames.read_frame()).await {
        Ok(Err(e @ ProtocolError::FrameTooLarge { .. })) => {
            return Err(reject_oversized(writer, e).await);
        }
        Ok(line) => line?,
        Err(_) => {
            reject(writer, "", codes::TIMEOUT, "authentication timed out").await;
            return Err(ProtocolError::Timeout.into());
        }
    };

    let frame: ClientFrame = match protocol::decode(&line) {
        Ok(frame) => frame,
        Err(e) => {
            let message = format!("malformed frame: {e}");
            reject(writer, &protocol::salvage_id(&line), codes::BAD_REQUEST, &message).await;
            return Err(ConnectionError::Malformed(message));
        }
    };

    let now = Instant::now();
    let limited = shared.limiter.lock().is_limited(peer, now);
    if limited {
        reject(
            writer,
            &frame.id,
            codes::TOO_MANY_REQUESTS,
            "too many failed authentication attempts; try again later",
        )
        .await;
        return Err(ConnectionError::RateLimited(peer.clone()));
    }

    let failure = if frame.method != AUTH_METHOD {
        Some("authentication required")
    } else {
        let token = frame
            .params
            .get("token")
            .and_then(Value::as_str)
            .unwrap_or_default();
        (!tokens_match(token, &shared.config.token)).then_some("invalid token")
    };
    if let Some(reason) = failure {
        shared.limiter.lock().record_failure(peer, now);
        reject(writer, &frame.id, codes::UNAUTHORIZED, reason).await;
        return Err(ConnectionError::AuthFailed {
            peer: peer.clone(),
            reason,
        });
    }

    protocol::write_frame(
        writer,
        &ServerFrame::ok(frame.id, json!({ "authenticated": true })),
    )
    .await?;
    Ok(())
}

/// Run one request in its own task so slow handlers don't stall the stream.
fn spawn_request(shared: &Arc<Shared>, frame: ClientFrame, done: mpsc::UnboundedSender<ServerFrame>) {
    let shared = Arc::clone(shared);
    tokio::spawn(async move {
        let ClientFrame { id, method, params } = frame;
        debug!(request_id = %id, %method, "received request");
        let result = run_with_timeout(
            shared.config.handler_timeout,
            dispatch(&shared.ctx, &method, params),
        )
        .await;
        let reply = match result {
            Ok(value) => ServerFrame::ok(id, value),
            Err(e) => {
                let code = e.code();
                if code >= codes::INTERNAL {
                    error!(request_id = %id, %method, error = %e, "request failed");
                } else {
                    debug!(request_id = %id, %method, code, error = %e, "request rejected");
                }
                ServerFrame::error(id, code, e.to_string())
            }
        };
        // The client may have gone away; its replies are dropped with it.
        let _ = done.send(reply);
    });
}

/// Best-effort error frame before closing.
async fn reject<W: AsyncWrite + Unpin>(writer: &mut W, id: &str, code: u16, message: &str) {
    if let Err(e) = protocol::write_frame(writer, &ServerFrame::error(id, code, message)).await {
        debug!(error = %e, "failed to send rejection");
    }
}

async fn reject_oversized<W: AsyncWrite + Unpin>(
    writer: &mut W,
    e: ProtocolError,
) -> ConnectionError {
    let message = e.to_string();
    reject(writer, "", codes::BAD_REQUEST, &message).await;
    ConnectionError::Malformed(message)
}
