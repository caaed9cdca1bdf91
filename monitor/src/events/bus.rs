//! Event bus - central pub/sub fan-out for monitor events
//!
//! Each subscriber owns a bounded queue and a dedicated worker. `publish`
//! never blocks: when a subscriber's queue is full the event is dropped for
//! that subscriber only and its drop counter is incremented, so one slow
//! consumer cannot stall the producers or its peers. Per subscriber,
//! delivery order matches publish order.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use tokio::sync::mpsc;
use tracing::{debug, trace};

use super::types::{EventKind, MonitorEvent};

/// Default per-subscriber queue capacity (events)
pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;

/// Which event kinds a subscription receives
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum KindFilter {
    /// Every event
    All,
    /// Only the listed kinds
    Kinds(HashSet<EventKind>),
}

impl KindFilter {
    /// Build a kind-set filter
    pub fn kinds(kinds: impl IntoIterator<Item = EventKind>) -> Self {
        KindFilter::Kinds(kinds.into_iter().collect())
    }

    /// Whether an event of `kind` passes this filter
    pub fn matches(&self, kind: EventKind) -> bool {
        match self {
            KindFilter::All => true,
            KindFilter::Kinds(set) => set.contains(&kind),
        }
    }
}

/// Identifier handed out by `subscribe`, used to unsubscribe
pub type SubscriptionId = u64;

struct SubscriberSlot {
    filter: KindFilter,
    tx: mpsc::Sender<MonitorEvent>,
    dropped: Arc<AtomicU64>,
}

/// A channel-backed subscription for consumers that run their own loop
/// (the IPC viewer writer, the TUI forwarder)
pub struct EventStream {
    pub id: SubscriptionId,
    pub rx: mpsc::Receiver<MonitorEvent>,
    dropped: Arc<AtomicU64>,
}

impl EventStream {
    /// Events dropped for this subscription because its queue was full
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// Point-in-time bus statistics
#[derive(Clone, Debug, Default)]
pub struct BusStats {
    pub subscribers: usize,
    pub total_published: u64,
    pub total_dropped: u64,
    pub queues: Vec<QueueStats>,
}

/// Per-subscription queue statistics
#[derive(Clone, Debug)]
pub struct QueueStats {
    pub id: SubscriptionId,
    pub queued: usize,
    pub capacity: usize,
    pub dropped: u64,
}

/// Central event bus
///
/// The subscriber table sits behind a read/write lock: publishers take the
/// read side, subscribe/unsubscribe take the write side.
pub struct EventBus {
    subscribers: RwLock<HashMap<SubscriptionId, SubscriberSlot>>,
    next_id: AtomicU64,
    total_published: AtomicU64,
    total_dropped: AtomicU64,
}

impl EventBus {
    pub fn new() -> Self {
        debug!("EventBus::new: creating event bus");
        Self {
            subscribers: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            total_published: AtomicU64::new(0),
            total_dropped: AtomicU64::new(0),
        }
    }

    /// Publish an event to every matching subscriber
    ///
    /// Non-blocking. A full subscriber queue drops the event for that
    /// subscriber only; surviving subscribers still receive it in publish
    /// order. No subscribers at all is fine.
    pub fn publish(&self, event: &MonitorEvent) {
        trace!(kind = %event.kind(), task_id = %event.task_id, "EventBus::publish");
        self.total_published.fetch_add(1, Ordering::Relaxed);

        let mut closed: Vec<SubscriptionId> = Vec::new();
        {
            let subscribers = self.subscribers.read().expect("subscriber lock poisoned");
            for (id, slot) in subscribers.iter() {
                if !slot.filter.matches(event.kind()) {
                    continue;
                }
                match slot.tx.try_send(event.clone()) {
                    Ok(()) => {}
                    Err(mpsc::error::TrySendError::Full(_)) => {
                        slot.dropped.fetch_add(1, Ordering::Relaxed);
                        self.total_dropped.fetch_add(1, Ordering::Relaxed);
                        trace!(subscription = id, "EventBus::publish: queue full, dropped");
                    }
                    Err(mpsc::error::TrySendError::Closed(_)) => {
                        closed.push(*id);
                    }
                }
            }
        }

        // Receivers that went away without unsubscribing are reaped here
        if !closed.is_empty() {
            let mut subscribers = self.subscribers.write().expect("subscriber lock poisoned");
            for id in closed {
                if subscribers.remove(&id).is_some() {
                    debug!(subscription = id, "EventBus::publish: reaped closed subscriber");
                }
            }
        }
    }

    /// Subscribe with a bounded queue, receiving events on a channel
    pub fn subscribe_channel(&self, filter: KindFilter, capacity: usize) -> EventStream {
        let capacity = capacity.max(1);
        let (tx, rx) = mpsc::channel(capacity);
        let dropped = Arc::new(AtomicU64::new(0));
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);

        let slot = SubscriberSlot {
            filter,
            tx,
            dropped: Arc::clone(&dropped),
        };
        self.subscribers
            .write()
            .expect("subscriber lock poisoned")
            .insert(id, slot);

        debug!(subscription = id, capacity, "EventBus::subscribe_channel: new subscriber");
        EventStream { id, rx, dropped }
    }

    /// Subscribe with a callback running in a dedicated worker task
    ///
    /// The callback sees events in publish order. The worker exits after
    /// `unsubscribe` once it has drained the queue.
    pub fn subscribe<F>(&self, filter: KindFilter, capacity: usize, mut callback: F) -> SubscriptionId
    where
        F: FnMut(MonitorEvent) + Send + 'static,
    {
        let stream = self.subscribe_channel(filter, capacity);
        let id = stream.id;
        let mut rx = stream.rx;
        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                callback(event);
            }
            trace!(subscription = id, "EventBus: subscriber worker exited");
        });
        id
    }

    /// Sugar for `subscribe` with the `All` filter and default capacity
    pub fn subscribe_all<F>(&self, callback: F) -> SubscriptionId
    where
        F: FnMut(MonitorEvent) + Send + 'static,
    {
        self.subscribe(KindFilter::All, DEFAULT_QUEUE_CAPACITY, callback)
    }

    /// Remove a subscription
    ///
    /// No deliveries happen after this returns; the worker drains whatever
    /// is already queued and then exits. Safe to call from the worker
    /// itself, and idempotent.
    pub fn unsubscribe(&self, id: SubscriptionId) {
        let removed = self
            .subscribers
            .write()
            .expect("subscriber lock poisoned")
            .remove(&id)
            .is_some();
        debug!(subscription = id, removed, "EventBus::unsubscribe");
    }

    /// Drop every subscription (shutdown path)
    pub fn shutdown(&self) {
        let mut subscribers = self.subscribers.write().expect("subscriber lock poisoned");
        let count = subscribers.len();
        subscribers.clear();
        debug!(count, "EventBus::shutdown: cleared subscribers");
    }

    /// Current subscriber count, queue occupancy, and cumulative drops
    pub fn stats(&self) -> BusStats {
        let subscribers = self.subscribers.read().expect("subscriber lock poisoned");
        let queues: Vec<QueueStats> = subscribers
            .iter()
            .map(|(id, slot)| {
                let capacity = slot.tx.max_capacity();
                QueueStats {
                    id: *id,
                    queued: capacity.saturating_sub(slot.tx.capacity()),
                    capacity,
                    dropped: slot.dropped.load(Ordering::Relaxed),
                }
            })
            .collect();
        BusStats {
            subscribers: subscribers.len(),
            total_published: self.total_published.load(Ordering::Relaxed),
            total_dropped: self.total_dropped.load(Ordering::Relaxed),
            queues,
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Create an event bus wrapped in an Arc for shared ownership
pub fn create_event_bus() -> Arc<EventBus> {
    Arc::new(EventBus::new())
}
