//! Throttled snapshot fan-out.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, warn};

use crate::registry::ListenerRegistry;
use crate::store::SnapshotStore;
use crate::throttle::Throttle;

/// Default minimum time between two broadcasts.
pub const DEFAULT_BROADCAST_INTERVAL: Duration = Duration::from_millis(500);

/// Result of a broadcast attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BroadcastOutcome {
    /// Inside the current window; nothing was sent.
    Throttled,
    /// A snapshot went out. `dropped` listeners failed and were unregistered.
    Delivered { delivered: usize, dropped: usize },
}

/// Cumulative broadcaster counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastStats {
    pub broadcasts: u64,
    pub throttled: u64,
    pub deliveries: u64,
    pub dropped_listeners: u64,
}

#[derive(Debug, Default)]
struct Counters {
    broadcasts: AtomicU64,
    throttled: AtomicU64,
    deliveries: AtomicU64,
    dropped_listeners: AtomicU64,
}

/// Pushes the current snapshot to every listener, at most once per interval.
///
/// Updates that arrive inside a window are coalesced: the store still
/// records them, and whatever is current at the next admitted tick is what
/// gets sent. A throttled attempt marks the broadcaster as pending so the
/// driver can flush the final state once the window closes.
#[derive(Debug)]
pub struct Broadcaster {
    throttle: Throttle,
    pending: AtomicBool,
    counters: Counters,
}

impl Broadcaster {
    pub fn new(interval: Duration) -> Self {
        Self {
            throttle: Throttle::new(interval),
            pending: AtomicBool::new(false),
            counters: Counters::default(),
        }
    }

    pub fn interval(&self) -> Duration {
        self.throttle.interval()
    }

    /// Broadcast if the interval has elapsed since the last broadcast.
    pub fn maybe_broadcast(
        &self,
        store: &SnapshotStore,
        registry: &ListenerRegistry,
    ) -> BroadcastOutcome {
        self.maybe_broadcast_at(Instant::now(), store, registry)
    }

    /// [`maybe_broadcast`](Self::maybe_broadcast) with an explicit clock reading.
    pub fn maybe_broadcast_at(
        &self,
        now: Instant,
        store: &SnapshotStore,
        registry: &ListenerRegistry,
    ) -> BroadcastOutcome {
        // The tick is claimed before any delivery starts.
        if !self.throttle.try_acquire(now) {
            self.pending.store(true, Ordering::Release);
            self.counters.throttled.fetch_add(1, Ordering::Relaxed);
            return BroadcastOutcome::Throttled;
        }
        self.pending.store(false, Ordering::Release);
        self.deliver(store, registry)
    }

    /// Send the coalesced update left behind by throttled attempts, if any.
    ///
    /// Returns `None` when nothing is pending.
    pub fn flush_pending(
        &self,
        store: &SnapshotStore,
        registry: &ListenerRegistry,
    ) -> Option<BroadcastOutcome> {
        if !self.is_pending() {
            return None;
        }
        Some(self.maybe_broadcast(store, registry))
    }

    pub fn is_pending(&self) -> bool {
        self.pending.load(Ordering::Acquire)
    }

    /// When the pending update may go out, if there is one.
    pub fn pending_deadline(&self) -> Option<Instant> {
        if self.is_pending() {
            self.throttle.next_allowed()
        } else {
            None
        }
    }

    pub fn stats(&self) -> BroadcastStats {
        BroadcastStats {
            broadcasts: self.counters.broadcasts.load(Ordering::Relaxed),
            throttled: self.counters.throttled.load(Ordering::Relaxed),
            deliveries: self.counters.deliveries.load(Ordering::Relaxed),
            dropped_listeners: self.counters.dropped_listeners.load(Ordering::Relaxed),
        }
    }

    fn deliver(&self, store: &SnapshotStore, registry: &ListenerRegistry) -> BroadcastOutcome {
        let snapshot = Arc::new(store.read_snapshot());
        let listeners = registry.list_active();

        let mut delivered = 0;
        let mut dropped = 0;
        for listener in &listeners {
            match listener.send(&snapshot) {
                Ok(()) => delivered += 1,
                Err(e) => {
                    warn!(listener = %listener.id(), error = %e, "dropping listener");
                    registry.unregister(listener.id());
                    dropped += 1;
                }
            }
        }

        debug!(
            categories = snapshot.len(),
            delivered, dropped, "broadcast snapshot"
        );

        self.counters.broadcasts.fetch_add(1, Ordering::Relaxed);
        self.counters
            .deliveries
            .fetch_add(delivered as u64, Ordering::Relaxed);
        self.counters
            .dropped_listeners
            .fetch_add(dropped as u64, Ordering::Relaxed);

        BroadcastOutcome::Delivered { delivered, dropped }
    }
}

impl Default for Broadcaster {
    fn default() -> Self {
        Self::new(DEFAULT_BROADCAST_INTERVAL)
    }
}
