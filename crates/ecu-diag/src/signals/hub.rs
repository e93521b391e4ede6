//! Observer fan-out for decoded signals
//!
//! Producers (poll loop, broadcast listener) publish at bus frequency, so
//! delivery never blocks: every subscriber has a bounded channel and an
//! update that does not fit is dropped for that subscriber only.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::debug;

/// One value change delivered to observers
#[derive(Debug, Clone, PartialEq)]
pub struct SignalUpdate {
    pub name: String,
    pub value: f64,
    pub timestamp: DateTime<Utc>,
}

impl SignalUpdate {
    pub fn new(name: impl Into<String>, value: f64) -> Self {
        Self {
            name: name.into(),
            value,
            timestamp: Utc::now(),
        }
    }
}

struct Subscriber {
    id: u64,
    /// Empty means every signal
    names: HashSet<String>,
    tx: mpsc::Sender<SignalUpdate>,
}

impl Subscriber {
    fn wants(&self, name: &str) -> bool {
        self.names.is_empty() || self.names.contains(name)
    }
}

#[derive(Default)]
struct HubInner {
    /// Replaced wholesale on attach/detach; publishers iterate a snapshot
    subscribers: RwLock<Arc<Vec<Arc<Subscriber>>>>,
    next_id: AtomicU64,
    dropped: AtomicU64,
}

impl HubInner {
    fn detach(&self, id: u64) {
        let mut subscribers = self.subscribers.write();
        let remaining: Vec<Arc<Subscriber>> = subscribers
            .iter()
            .filter(|s| s.id != id)
            .cloned()
            .collect();
        *subscribers = Arc::new(remaining);
        debug!(subscription = id, "Observer detached");
    }
}

/// Registry of observers keyed by signal name
#[derive(Clone, Default)]
pub struct SignalHub {
    inner: Arc<HubInner>,
}

impl SignalHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to a set of signals (empty = all) with a bounded channel
    pub fn subscribe<I, S>(&self, names: I, capacity: usize) -> Subscription
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let subscriber = Arc::new(Subscriber {
            id,
            names: names.into_iter().map(Into::into).collect(),
            tx,
        });

        {
            let mut subscribers = self.inner.subscribers.write();
            let mut next: Vec<Arc<Subscriber>> = subscribers.iter().cloned().collect();
            next.push(subscriber);
            *subscribers = Arc::new(next);
        }
        debug!(subscription = id, "Observer attached");

        Subscription {
            id,
            rx,
            hub: Arc::downgrade(&self.inner),
        }
    }

    /// Deliver an update to every interested observer without blocking
    pub fn publish(&self, update: SignalUpdate) {
        let snapshot = self.inner.subscribers.read().clone();
        for subscriber in snapshot.iter().filter(|s| s.wants(&update.name)) {
            match subscriber.tx.try_send(update.clone()) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    self.inner.dropped.fetch_add(1, Ordering::Relaxed);
                }
                // Receiver gone; its Subscription drop detaches it
                Err(TrySendError::Closed(_)) => {}
            }
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.subscribers.read().len()
    }

    /// Updates dropped because an observer's channel was full
    pub fn dropped_count(&self) -> u64 {
        self.inner.dropped.load(Ordering::Relaxed)
    }
}

/// Receiving end of a hub subscription; detaches on drop
pub struct Subscription {
    id: u64,
    rx: mpsc::Receiver<SignalUpdate>,
    hub: Weak<HubInner>,
}

impl Subscription {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Wait for the next update; `None` once the hub is gone
    pub async fn recv(&mut self) -> Option<SignalUpdate> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<SignalUpdate> {
        self.rx.try_recv().ok()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(hub) = self.hub.upgrade() {
            hub.detach(self.id);
        }
    }
}
