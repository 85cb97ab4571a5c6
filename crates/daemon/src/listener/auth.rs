// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Token check and failed-auth rate limiting.

use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

/// Failed attempts allowed per peer inside one window.
pub const MAX_FAILURES: usize = 5;

/// Rolling window for [`MAX_FAILURES`].
pub const FAILURE_WINDOW: Duration = Duration::from_secs(60);

/// Identity a connection's failures are counted against.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PeerKey {
    Uid(u32),
    Unknown,
}

impl PeerKey {
    pub fn of(stream: &tokio::net::UnixStream) -> Self {
        match stream.peer_cred() {
            Ok(cred) => PeerKey::Uid(cred.uid()),
            Err(_) => PeerKey::Unknown,
        }
    }
}

impl std::fmt::Display for PeerKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PeerKey::Uid(uid) => write!(f, "uid:{uid}"),
            PeerKey::Unknown => f.write_str("unknown"),
        }
    }
}

/// Sliding-window counter of failed authentications.
#[derive(Debug)]
pub struct AuthLimiter {
    max_failures: usize,
    window: Duration,
    failures: HashMap<PeerKey, VecDeque<Instant>>,
}

impl Default for AuthLimiter {
    fn default() -> Self {
        Self::new(MAX_FAILURES, FAILURE_WINDOW)
    }
}

impl AuthLimiter {
    pub fn new(max_failures: usize, window: Duration) -> Self {
        Self {
            max_failures,
            window,
            failures: HashMap::new(),
        }
    }

    /// Whether `peer` has used up its failures in the current window.
    pub fn is_limited(&mut self, peer: &PeerKey, now: Instant) -> bool {
        self.prune(peer, now);
        self.failures
            .get(peer)
            .is_some_and(|f| f.len() >= self.max_failures)
    }

    pub fn record_failure(&mut self, peer: &PeerKey, now: Instant) {
        self.prune(peer, now);
        self.failures.entry(peer.clone()).or_default().push_back(now);
    }

    fn prune(&mut self, peer: &PeerKey, now: Instant) {
        let window = self.window;
        let emptied = match self.failures.get_mut(peer) {
            Some(times) => {
                while times
                    .front()
                    .is_some_and(|t| now.saturating_duration_since(*t) >= window)
                {
                    times.pop_front();
                }
                times.is_empty()
            }
            None => false,
        };
        if emptied {
            self.failures.remove(peer);
        }
    }
}

/// Compare tokens without short-circuiting on the first differing byte.
pub fn tokens_match(presented: &str, expected: &str) -> bool {
    let a = presented.as_bytes();
    let b = expected.as_bytes();
    let mut diff = a.len() ^ b.len();
    for i in 0..a.len().max(b.len()) {
        let x = a.get(i).copied().unwrap_or(0);
        let y = b.get(i).copied().unwrap_or(0);
        diff |= usize::from(x ^ y);
    }
    diff == 0
}

#[cfg(test)]
#[path = "auth_tests.rs"]
mod tests;
