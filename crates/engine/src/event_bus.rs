// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-process publish/subscribe bus.
//!
//! Delivery is synchronous: `emit` calls every matching listener (exact name
//! or [`WILDCARD`]) in registration order before returning, then records the
//! event in a bounded history. Nothing is buffered or replayed. A listener
//! that returns an error or panics is logged and skipped; later listeners
//! still run.

use parking_lot::Mutex;
use serde_json::Value;
use std::collections::VecDeque;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use wd_core::{Clock, Event, SystemClock, WILDCARD};

/// Default number of events kept in history.
pub const HISTORY_CAPACITY: usize = 1000;

/// Error a listener may report; logged by the bus, never propagated.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

type Handler = Arc<dyn Fn(&Event) -> Result<(), HandlerError> + Send + Sync>;

/// Handle returned by [`EventBus::on`] / [`EventBus::once`], used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

struct Listener {
    id: SubscriptionId,
    name: String,
    once: bool,
    handler: Handler,
}

impl Listener {
    fn accepts(&self, event: &str) -> bool {
        self.name == event || self.name == WILDCARD
    }
}

struct BusState {
    listeners: Vec<Listener>,
    history: VecDeque<Event>,
    next_id: u64,
}

/// Explicitly constructed event bus, cloned into every component.
#[derive(Clone)]
pub struct EventBus {
    inner: Arc<Mutex<BusState>>,
    clock: Arc<dyn Clock>,
    capacity: usize,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(Arc::new(SystemClock))
    }
}

impl EventBus {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self::with_capacity(clock, HISTORY_CAPACITY)
    }

    pub fn with_capacity(clock: Arc<dyn Clock>, capacity: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(BusState {
                listeners: Vec::new(),
                history: VecDeque::with_capacity(capacity.min(HISTORY_CAPACITY)),
                next_id: 1,
            })),
            clock,
            capacity,
        }
    }

    /// Subscribe to `name` (or `*` for every event).
    pub fn on<F>(&self, name: &str, handler: F) -> SubscriptionId
    where
        F: Fn(&Event) -> Result<(), HandlerError> + Send + Sync + 'static,
    {
        self.subscribe(name, false, Arc::new(handler))
    }

    /// Subscribe for a single delivery.
    pub fn once<F>(&self, name: &str, handler: F) -> SubscriptionId
    where
        F: Fn(&Event) -> Result<(), HandlerError> + Send + Sync + 'static,
    {
        self.subscribe(name, true, Arc::new(handler))
    }

    /// Remove a subscription. Returns whether it was still registered.
    pub fn off(&self, id: SubscriptionId) -> bool {
        let mut state = self.inner.lock();
        let before = state.listeners.len();
        state.listeners.retain(|l| l.id != id);
        state.listeners.len() != before
    }

    /// Number of listeners registered for exactly `name`.
    pub fn listener_count(&self, name: &str) -> usize {
        self.inner
            .lock()
            .listeners
            .iter()
            .filter(|l| l.name == name)
            .count()
    }

    /// Deliver an event to current listeners, then record it.
    pub fn emit(&self, name: &str, payload: Value) -> Event {
        let event = Event::new(name, payload, self.clock.epoch_ms());

        // Snapshot matching handlers so listeners may re-enter the bus.
        let handlers: Vec<(SubscriptionId, Handler)> = {
            let mut state = self.inner.lock();
            let matched: Vec<_> = state
                .listeners
                .iter()
                .filter(|l| l.accepts(name))
                .map(|l| (l.id, Arc::clone(&l.handler)))
                .collect();
            state.listeners.retain(|l| !(l.once && l.accepts(name)));
            matched
        };

        for (id, handler) in handlers {
            match catch_unwind(AssertUnwindSafe(|| handler(&event))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    tracing::warn!(event = name, subscription = %id, error = %e, "event handler failed")
                }
                Err(_) => {
                    tracing::error!(event = name, subscription = %id, "event handler panicked")
                }
            }
        }

        let mut state = self.inner.lock();
        state.history.push_back(event.clone());
        while state.history.len() > self.capacity {
            state.history.pop_front();
        }
        event
    }

    /// Most recent events (optionally only `name`), oldest first.
    pub fn history(&self, name: Option<&str>, limit: Option<usize>) -> Vec<Event> {
        let state = self.inner.lock();
        let mut matched: Vec<Event> = state
            .history
            .iter()
            .rev()
            .filter(|e| name.map_or(true, |n| n == WILDCARD || e.name == n))
            .take(limit.unwrap_or(usize::MAX))
            .cloned()
            .collect();
        matched.reverse();
        matched
    }

    fn subscribe(&self, name: &str, once: bool, handler: Handler) -> SubscriptionId {
        let mut state = self.inner.lock();
        let id = SubscriptionId(state.next_id);
        state.next_id += 1;
        state.listeners.push(Listener {
            id,
            name: name.to_string(),
            once,
            handler,
        });
        id
    }
}

#[cfg(test)]
#[path = "event_bus_tests.rs"]
mod tests;
