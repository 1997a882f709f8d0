//! Snapshot and history storage.

use std::collections::{BTreeMap, VecDeque};

use parking_lot::RwLock;
use telemhub_types::{now_ms, Event, Fields, SchemaVersion, Snapshot};

/// Default number of events kept in history.
pub const DEFAULT_HISTORY_CAPACITY: usize = 2000;

/// Latest fields per category plus a bounded, arrival-ordered event history.
///
/// All mutation goes through [`apply`](Self::apply), which holds the write
/// lock for the whole update. Readers copy out under the read lock and do
/// their I/O after releasing it.
#[derive(Debug)]
pub struct SnapshotStore {
    inner: RwLock<StoreInner>,
    capacity: usize,
}

#[derive(Debug)]
struct StoreInner {
    categories: BTreeMap<String, Fields>,
    history: VecDeque<Event>,
    updated_ms: u64,
    applied: u64,
}

impl SnapshotStore {
    /// Create an empty store keeping at most `capacity` events of history.
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: RwLock::new(StoreInner {
                categories: BTreeMap::new(),
                history: VecDeque::with_capacity(capacity.min(DEFAULT_HISTORY_CAPACITY)),
                updated_ms: now_ms(),
                applied: 0,
            }),
            capacity,
        }
    }

    /// Record an event.
    ///
    /// Replaces the fields of the event's category, appends the event to
    /// history (evicting the oldest entry once full) and moves the snapshot
    /// timestamp to now.
    pub fn apply(&self, event: Event) {
        let now = now_ms();
        let mut inner = self.inner.write();

        inner
            .categories
            .insert(event.category().to_string(), event.fields().clone());

        inner.history.push_back(event);
        while inner.history.len() > self.capacity {
            inner.history.pop_front();
        }

        inner.updated_ms = now;
        inner.applied += 1;
    }

    /// Copy the current snapshot.
    pub fn read_snapshot(&self) -> Snapshot {
        let inner = self.inner.read();
        Snapshot {
            version: SchemaVersion::current(),
            timestamp_ms: inner.updated_ms,
            categories: inner.categories.clone(),
        }
    }

    /// Copy the most recent `limit` events, oldest first.
    pub fn read_history(&self, limit: usize) -> Vec<Event> {
        let inner = self.inner.read();
        let skip = inner.history.len().saturating_sub(limit);
        inner.history.iter().skip(skip).cloned().collect()
    }

    /// Number of events currently held in history.
    pub fn len(&self) -> usize {
        self.inner.read().history.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().history.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Total number of events applied since creation.
    pub fn applied_count(&self) -> u64 {
        self.inner.read().applied
    }

    /// Names of the categories present in the snapshot.
    pub fn categories(&self) -> Vec<String> {
        self.inner.read().categories.keys().cloned().collect()
    }
}

impl Default for SnapshotStore {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAPACITY)
    }
}
