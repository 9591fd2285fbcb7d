//! In-process publish/subscribe hub with namespace-prefix routing.
//!
//! Each subscriber owns a bounded queue. Publishing never blocks: when a
//! subscriber's queue is full the event is dropped for that subscriber only
//! and counted. Consumers must therefore treat an event as a hint to
//! re-read the store, never as the only copy of the data.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock, Weak};

use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, warn};

use crate::events::Event;

struct Subscriber {
    namespace: String,
    tx: mpsc::Sender<Event>,
}

#[derive(Default)]
struct Inner {
    subs: RwLock<HashMap<u64, Subscriber>>,
    next_id: AtomicU64,
    dropped: AtomicU64,
}

/// Cheaply cloneable handle to a shared bus.
#[derive(Clone, Default)]
pub struct Bus {
    inner: Arc<Inner>,
}

impl Bus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver `event` to every subscriber whose namespace is a prefix of
    /// the event kind. Subscribers whose receiver has been dropped are
    /// removed.
    pub fn publish(&self, event: impl Into<Event>) {
        let event = event.into();
        let kind = event.kind();
        let mut closed = Vec::new();
        {
            let subs = self
                .inner
                .subs
                .read()
                .unwrap_or_else(PoisonError::into_inner);

            for (id, sub) in subs.iter() {
                if !kind.starts_with(sub.namespace.as_str()) {
                    continue;
                }
                match sub.tx.try_send(event.clone()) {
                    Ok(()) => {}
                    Err(TrySendError::Full(_)) => {
                        self.inner.dropped.fetch_add(1, Ordering::Relaxed);
                        warn!(kind, subscriber_ns = %sub.namespace, "bus event dropped");
                    }
                    Err(TrySendError::Closed(_)) => closed.push(*id),
                }
            }
        }

        if !closed.is_empty() {
            let mut subs = self
                .inner
                .subs
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            for id in &closed {
                subs.remove(id);
            }
            debug!(kind, removed = closed.len(), "pruned closed subscribers");
        }
    }

    /// Register a queue for events whose kind starts with `namespace`.
    ///
    /// A `capacity` of zero is treated as one.
    pub fn subscribe(
        &self,
        namespace: impl Into<String>,
        capacity: usize,
    ) -> (mpsc::Receiver<Event>, Unsubscribe) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);

        self.inner
            .subs
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(
                id,
                Subscriber {
                    namespace: namespace.into(),
                    tx,
                },
            );

        let handle = Unsubscribe {
            id,
            bus: Arc::downgrade(&self.inner),
        };
        (rx, handle)
    }

    /// Total number of events dropped because a subscriber queue was full.
    pub fn dropped(&self) -> u64 {
        self.inner.dropped.load(Ordering::Relaxed)
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner
            .subs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

/// Removes one subscription from the bus. Calling it more than once, or
/// after the bus is gone, is a no-op.
pub struct Unsubscribe {
    id: u64,
    bus: Weak<Inner>,
}

impl Unsubscribe {
    pub fn unsubscribe(&self) {
        let Some(inner) = self.bus.upgrade() else {
            return;
        };
        inner
            .subs
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.id);
    }
}
