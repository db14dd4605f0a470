//! Listener registry.
//!
//! Maps active listeners to the kinds they want. All mutation happens under
//! one `parking_lot` mutex and no critical section awaits: a broadcast takes
//! a snapshot of the matching senders under the lock, releases it, and only
//! then delivers. A listener that registers or leaves during delivery is
//! therefore either in the snapshot or not, never half-visited.
//!
//! Two delivery modes exist. `Once` listeners (blocking waits) are claimed
//! out of the map inside the snapshot, so each receives at most one event and
//! needs no removal afterwards. `Stream` listeners (subscriptions) stay until
//! their [`ListenerGuard`] drops or their receiver goes away.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::SendTimeoutError;
use tracing::{trace, warn};

use crate::inbound::InboundEvent;

/// Opaque listener handle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

/// Which kinds a listener wants.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum KindFilter {
    /// Exactly this kind.
    Exact(String),
    /// Every kind.
    Any,
}

impl KindFilter {
    /// Filter for `kind`; the empty string matches every kind.
    pub fn kind(kind: impl Into<String>) -> Self {
        let kind = kind.into();
        if kind.is_empty() { Self::Any } else { Self::Exact(kind) }
    }

    /// Whether an event of `kind` passes.
    pub fn matches(&self, kind: &str) -> bool {
        match self {
            Self::Exact(want) => want == kind,
            Self::Any => true,
        }
    }
}

impl std::fmt::Display for KindFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Exact(kind) => f.write_str(kind),
            Self::Any => f.write_str("*"),
        }
    }
}

/// Delivery mode of a listener.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Delivery {
    /// Removed after the first delivered event.
    Once,
    /// Receives every matching event until removed.
    Stream,
}

struct Listener {
    filter: KindFilter,
    delivery: Delivery,
    tx: mpsc::Sender<InboundEvent>,
}

#[derive(Default)]
struct Inner {
    next_id: u64,
    listeners: HashMap<ListenerId, Listener>,
    closed: bool,
}

/// Registry of the listeners attached to one session.
pub struct ListenerRegistry {
    inner: Mutex<Inner>,
    delivery_timeout: Duration,
}

impl ListenerRegistry {
    /// Empty registry bounding each delivery attempt by `delivery_timeout`.
    pub fn new(delivery_timeout: Duration) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            delivery_timeout,
        }
    }

    /// Register a listener with a private channel of `capacity` events.
    ///
    /// Returns `None` once the registry has been closed.
    pub fn register(
        self: &Arc<Self>,
        filter: KindFilter,
        delivery: Delivery,
        capacity: usize,
    ) -> Option<(ListenerGuard, mpsc::Receiver<InboundEvent>)> {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let id = {
            let mut inner = self.inner.lock();
            if inner.closed {
                return None;
            }
            let id = ListenerId(inner.next_id);
            inner.next_id += 1;
            let _ = inner.listeners.insert(
                id,
                Listener {
                    filter,
                    delivery,
                    tx,
                },
            );
            id
        };
        trace!(listener = id.0, ?delivery, "listener registered");
        let guard = ListenerGuard {
            id,
            registry: Arc::clone(self),
        };
        Some((guard, rx))
    }

    /// Remove a listener. Returns whether it was still registered.
    pub fn remove(&self, id: ListenerId) -> bool {
        self.inner.lock().listeners.remove(&id).is_some()
    }

    /// Number of registered listeners.
    pub fn len(&self) -> usize {
        self.inner.lock().listeners.len()
    }

    /// Whether no listeners are registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether [`close_all`](Self::close_all) has run.
    pub fn is_closed(&self) -> bool {
        self.inner.lock().closed
    }

    /// Drop every listener and refuse new ones. Returns how many were released.
    ///
    /// Dropping the senders wakes each blocked receiver with `None`.
    pub fn close_all(&self) -> usize {
        let mut inner = self.inner.lock();
        inner.closed = true;
        let released = inner.listeners.len();
        inner.listeners.clear();
        released
    }

    /// Deliver `event` to every matching listener. Returns the delivery count.
    ///
    /// Each attempt is bounded by the delivery timeout. An abandoned receiver
    /// is removed; a stream listener still full after the timeout misses this
    /// one event.
    pub async fn dispatch(&self, event: &InboundEvent) -> usize {
        let targets = self.snapshot(event.kind());

        let mut delivered = 0;
        for (id, delivery, tx) in targets {
            match tx.send_timeout(event.clone(), self.delivery_timeout).await {
                Ok(()) => delivered += 1,
                Err(SendTimeoutError::Closed(_)) => {
                    let _ = self.remove(id);
                    trace!(listener = id.0, "listener abandoned before delivery");
                }
                Err(SendTimeoutError::Timeout(_)) => {
                    warn!(
                        listener = id.0,
                        ?delivery,
                        kind = event.kind(),
                        "listener not keeping up, dropping event"
                    );
                }
            }
        }
        delivered
    }

    fn snapshot(&self, kind: &str) -> Vec<(ListenerId, Delivery, mpsc::Sender<InboundEvent>)> {
        let mut inner = self.inner.lock();
        let mut ids: Vec<ListenerId> = inner
            .listeners
            .iter()
            .filter(|(_, l)| l.filter.matches(kind))
            .map(|(id, _)| *id)
            .collect();
        ids.sort_unstable();

        let mut targets = Vec::with_capacity(ids.len());
        for id in ids {
            let Some(delivery) = inner.listeners.get(&id).map(|l| l.delivery) else {
                continue;
            };
            let tx = match delivery {
                Delivery::Stream => inner.listeners.get(&id).map(|l| l.tx.clone()),
                Delivery::Once => inner.listeners.remove(&id).map(|l| l.tx),
            };
            if let Some(tx) = tx {
                targets.push((id, delivery, tx));
            }
        }
        targets
    }
}

/// Removes its listener when dropped.
pub struct ListenerGuard {
    id: ListenerId,
    registry: Arc<ListenerRegistry>,
}

impl ListenerGuard {
    /// The guarded listener.
    pub fn id(&self) -> ListenerId {
        self.id
    }
}

impl Drop for ListenerGuard {
    fn drop(&mut self) {
        let _ = self.registry.remove(self.id);
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
