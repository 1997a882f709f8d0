//! Registry of live snapshot subscribers.

use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use telemhub_types::Snapshot;
use tokio::sync::mpsc;

use crate::error::DeliveryError;

static NEXT_LISTENER_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of a listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

impl ListenerId {
    fn next() -> Self {
        Self(NEXT_LISTENER_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "listener-{}", self.0)
    }
}

/// A delivery target for snapshots.
///
/// `send` is called from the broadcaster's fan-out loop and must not block:
/// hand the snapshot off (e.g. into a bounded queue) and report failure if
/// that is not possible.
pub trait Listener: Send + Sync {
    fn send(&self, snapshot: &Arc<Snapshot>) -> Result<(), DeliveryError>;
}

/// Channel-backed listener; the transport drains the receiving end.
struct ChannelListener {
    tx: mpsc::Sender<Arc<Snapshot>>,
}

impl Listener for ChannelListener {
    fn send(&self, snapshot: &Arc<Snapshot>) -> Result<(), DeliveryError> {
        self.tx.try_send(snapshot.clone()).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => DeliveryError::Lagging,
            mpsc::error::TrySendError::Closed(_) => DeliveryError::Closed,
        })
    }
}

/// Opaque handle to a registered delivery target.
///
/// Handles compare and hash by [`ListenerId`]; clones refer to the same
/// target.
///
/// # Example
///
/// ```rust
/// use telemhub_core::ListenerHandle;
///
/// let (handle, rx) = ListenerHandle::channel(8);
///
/// // Register `handle` with the hub, then drain snapshots from `rx`:
/// // while let Some(snapshot) = rx.recv().await { ... }
/// # let _ = (handle, rx);
/// ```
#[derive(Clone)]
pub struct ListenerHandle {
    id: ListenerId,
    target: Arc<dyn Listener>,
}

impl ListenerHandle {
    /// Wrap a custom delivery target.
    pub fn new(target: impl Listener + 'static) -> Self {
        Self {
            id: ListenerId::next(),
            target: Arc::new(target),
        }
    }

    /// Create a channel-backed handle and the receiver its snapshots arrive on.
    ///
    /// A full buffer counts as a failed delivery, so `buffer` bounds how far
    /// a slow consumer may fall behind before it is dropped.
    pub fn channel(buffer: usize) -> (Self, mpsc::Receiver<Arc<Snapshot>>) {
        let (tx, rx) = mpsc::channel(buffer);
        (Self::new(ChannelListener { tx }), rx)
    }

    pub fn id(&self) -> ListenerId {
        self.id
    }

    /// Push a snapshot to the target.
    pub fn send(&self, snapshot: &Arc<Snapshot>) -> Result<(), DeliveryError> {
        self.target.send(snapshot)
    }
}

impl PartialEq for ListenerHandle {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for ListenerHandle {}

impl Hash for ListenerHandle {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for ListenerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListenerHandle").field("id", &self.id).finish()
    }
}

/// The set of currently subscribed listeners.
///
/// Safe to modify concurrently with broadcasts: the broadcaster iterates
/// over a copy from [`list_active`](Self::list_active), never under the lock.
#[derive(Debug, Default)]
pub struct ListenerRegistry {
    active: Mutex<HashMap<ListenerId, ListenerHandle>>,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a listener. Returns `false` if it was already registered.
    pub fn register(&self, handle: ListenerHandle) -> bool {
        let mut active = self.active.lock();
        if active.contains_key(&handle.id) {
            return false;
        }
        active.insert(handle.id, handle);
        true
    }

    /// Remove a listener. Returns `false` if it was not registered.
    pub fn unregister(&self, id: ListenerId) -> bool {
        self.active.lock().remove(&id).is_some()
    }

    /// Copy of the active set, for iteration outside the lock.
    pub fn list_active(&self) -> Vec<ListenerHandle> {
        self.active.lock().values().cloned().collect()
    }

    pub fn contains(&self, id: ListenerId) -> bool {
        self.active.lock().contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.active.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.active.lock().is_empty()
    }

    /// Remove and return every listener.
    pub fn drain(&self) -> Vec<ListenerHandle> {
        self.active.lock().drain().map(|(_, handle)| handle).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_is_idempotent() {
        let registry = ListenerRegistry::new();
        let (handle, _rx) = ListenerHandle::channel(1);

        assert!(registry.register(handle.clone()));
        assert!(!registry.register(handle.clone()));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn unregister_twice_is_safe() {
        let registry = ListenerRegistry::new();
        let (handle, _rx) = ListenerHandle::channel(1);
        registry.register(handle.clone());

        assert!(registry.unregister(handle.id()));
        assert!(!registry.unregister(handle.id()));
        assert!(registry.is_empty());
    }

    #[test]
    fn list_active_is_a_copy() {
        let registry = ListenerRegistry::new();
        let (a, _rx_a) = ListenerHandle::channel(1);
        let (b, _rx_b) = ListenerHandle::channel(1);
        registry.register(a.clone());
        registry.register(b.clone());

        let listed = registry.list_active();
        registry.unregister(a.id());

        assert_eq!(listed.len(), 2);
        assert_eq!(registry.len(), 1);
        assert!(registry.contains(b.id()));
    }

    #[test]
    fn handles_have_distinct_ids() {
        let (a, _rx_a) = ListenerHandle::channel(1);
        let (b, _rx_b) = ListenerHandle::channel(1);

        assert_ne!(a.id(), b.id());
        assert_ne!(a, b);
        assert_eq!(a, a.clone());
    }

    #[test]
    fn channel_listener_reports_lagging_and_closed() {
        let snapshot = Arc::new(Snapshot::with_timestamp(0));

        let (handle, rx) = ListenerHandle::channel(1);
        assert_eq!(handle.send(&snapshot), Ok(()));
        assert_eq!(handle.send(&snapshot), Err(DeliveryError::Lagging));

        drop(rx);
        assert_eq!(handle.send(&snapshot), Err(DeliveryError::Closed));
    }

    #[test]
    fn drain_empties_registry() {
        let registry = ListenerRegistry::new();
        for _ in 0..3 {
            let (handle, _rx) = ListenerHandle::channel(1);
            registry.register(handle);
        }

        let drained = registry.drain();
        assert_eq!(drained.len(), 3);
        assert!(registry.is_empty());
    }

    #[test]
    fn concurrent_register_unregister() {
        use std::thread;

        let registry = Arc::new(ListenerRegistry::new());
        let mut handles = vec![];
        for _ in 0..8 {
            let registry = registry.clone();
            handles.push(thread::spawn(move || {
                for _ in 0..100 {
                    let (handle, _rx) = ListenerHandle::channel(1);
                    registry.register(handle.clone());
                    let _ = registry.list_active();
                    assert!(registry.unregister(handle.id()));
                }
            }));
        }

        for h in handles {
            h.join().unwrap();
        }
        assert!(registry.is_empty());
    }
}
