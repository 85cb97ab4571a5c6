// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Warden daemon library
//!
//! Exposes the IPC protocol, the socket listener and the client used by
//! front-ends, plus the lifecycle pieces `wardend` is assembled from.

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod client;
pub mod env;
pub mod lifecycle;
pub mod listener;
pub mod protocol;

#[cfg(test)]
mod test_helpers;

pub use client::{ClientError, DaemonClient, StreamEvent, EVENT_BUFFER};
pub use lifecycle::{Config, DaemonState, LifecycleError, StartupResult};
pub use listener::{DaemonCtx, Listener, ListenerConfig};
pub use protocol::{
    ClientFrame, ErrorBody, FrameReader, ProtocolError, ServerFrame, AUTH_METHOD, CLIENT_TIMEOUT,
    MAX_FRAME_SIZE,
};
