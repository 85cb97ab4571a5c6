// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Clock abstraction so timestamps are deterministic under test.

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// Source of wall-clock and monotonic time.
pub trait Clock: Send + Sync {
    /// Monotonic now, used for uptime and deadlines.
    fn now(&self) -> Instant;

    /// Wall-clock milliseconds since the Unix epoch.
    fn epoch_ms(&self) -> u64;
}

/// Real system clock
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn epoch_ms(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0)
    }
}

struct FakeClockState {
    base: Instant,
    offset: Duration,
    epoch_base_ms: u64,
}

/// Manually advanced clock for tests.
#[derive(Clone)]
pub struct FakeClock {
    inner: Arc<Mutex<FakeClockState>>,
}

/// Epoch the fake clock starts at (2023-11-14T22:13:20Z).
const FAKE_EPOCH_START_MS: u64 = 1_700_000_000_000;

impl FakeClock {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(FakeClockState {
                base: Instant::now(),
                offset: Duration::ZERO,
                epoch_base_ms: FAKE_EPOCH_START_MS,
            })),
        }
    }

    /// Move time forward.
    pub fn advance(&self, by: Duration) {
        self.inner.lock().offset += by;
    }

    /// Pin the wall clock to a specific epoch value without moving `now()`.
    pub fn set_epoch_ms(&self, ms: u64) {
        let mut state = self.inner.lock();
        state.epoch_base_ms = ms.saturating_sub(state.offset.as_millis() as u64);
    }
}

impl Default for FakeClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for FakeClock {
    fn now(&self) -> Instant {
        let state = self.inner.lock();
        state.base + state.offset
    }

    fn epoch_ms(&self) -> u64 {
        let state = self.inner.lock();
        state.epoch_base_ms + state.offset.as_millis() as u64
    }
}

#[cfg(test)]
#[path = "clock_tests.rs"]
mod tests;
