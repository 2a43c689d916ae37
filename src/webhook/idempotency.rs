//! Webhook event de-duplication
//!
//! The processor redelivers an event (same `evt_` id) until it gets a 2xx.
//! Remembering processed ids lets redeliveries short-circuit. Correctness does
//! not depend on this cache: `confirm` is idempotent on its own, so an evicted
//! or forgotten id only costs one extra no-op transition.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::debug;

use crate::error::Result;

/// Result of claiming an event id
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventClaim {
    /// First sighting; the caller should process the event
    New,
    /// Already processed or being processed
    Duplicate,
}

/// Event id registry
#[async_trait]
pub trait IdempotencyStore: Send + Sync + 'static {
    /// Atomically claim an event id
    async fn check_and_record(&self, event_id: &str) -> Result<EventClaim>;

    /// Mark a claimed event as fully processed
    async fn mark_completed(&self, event_id: &str) -> Result<()>;

    /// Drop a claim so a redelivery is processed again
    async fn forget(&self, event_id: &str) -> Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EventState {
    InFlight,
    Completed,
}

#[derive(Debug, Clone, Copy)]
struct Entry {
    recorded_at: Instant,
    state: EventState,
}

/// Bounded, TTL-based event registry for a single process
#[derive(Debug)]
pub struct InMemoryIdempotencyStore {
    entries: Mutex<HashMap<String, Entry>>,
    ttl: Duration,
    max_entries: usize,
}

impl InMemoryIdempotencyStore {
    /// Create a store remembering at most `max_entries` ids for `ttl`
    pub fn new(ttl: Duration, max_entries: usize) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl,
            max_entries: max_entries.max(1),
        }
    }

    /// Number of remembered ids
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// True when nothing is remembered
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Whether an id has been marked completed
    pub fn is_completed(&self, event_id: &str) -> bool {
        self.entries
            .lock()
            .get(event_id)
            .is_some_and(|e| e.state == EventState::Completed)
    }

    fn purge_expired(&self, entries: &mut HashMap<String, Entry>, now: Instant) {
        let ttl = self.ttl;
        entries.retain(|_, e| now.duration_since(e.recorded_at) < ttl);
    }
}

#[async_trait]
impl IdempotencyStore for InMemoryIdempotencyStore {
    async fn check_and_record(&self, event_id: &str) -> Result<EventClaim> {
        let now = Instant::now();
        let mut entries = self.entries.lock();
        self.purge_expired(&mut entries, now);

        if entries.contains_key(event_id) {
            return Ok(EventClaim::Duplicate);
        }

        if entries.len() >= self.max_entries {
            let oldest = entries
                .iter()
                .min_by_key(|(_, e)| e.recorded_at)
                .map(|(id, _)| id.clone());
            if let Some(oldest) = oldest {
                debug!(evicted = %oldest, "Event cache full, evicting oldest id");
                entries.remove(&oldest);
            }
        }

        entries.insert(
            event_id.to_string(),
            Entry {
                recorded_at: now,
                state: EventState::InFlight,
            },
        );
        Ok(EventClaim::New)
    }

    async fn mark_completed(&self, event_id: &str) -> Result<()> {
        if let Some(entry) = self.entries.lock().get_mut(event_id) {
            entry.state = EventState::Completed;
        }
        Ok(())
    }

    async fn forget(&self, event_id: &str) -> Result<()> {
        self.entries.lock().remove(event_id);
        Ok(())
    }
}
