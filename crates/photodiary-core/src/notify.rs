//! Change notification.
//!
//! Every successful mutation publishes exactly one [`ChangeEvent`] through a
//! [`ChangeNotifier`]. Subscribers either receive events on a bounded
//! `crossbeam-channel` queue or register a [`ChangeHandler`] that is called
//! synchronously on the publishing thread.
//!
//! Delivery order matches publish order. Late subscribers see no replay.

use crate::types::EntryId;
use crossbeam_channel::{Receiver, Sender, TrySendError};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// Default capacity of a subscriber queue
pub const DEFAULT_CHANNEL_CAPACITY: usize = 256;

/// Type of entry change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeKind {
    /// Entry was created
    Created,
    /// Entry was updated
    Updated,
    /// Entry was deleted
    Deleted,
}

impl std::fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ChangeKind::Created => "created",
            ChangeKind::Updated => "updated",
            ChangeKind::Deleted => "deleted",
        };
        f.write_str(name)
    }
}

/// A change to one diary entry and its photo references
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    /// Type of change
    pub kind: ChangeKind,

    /// Entry that changed
    pub entry_id: EntryId,

    /// Photo references gained by the change
    pub added_photo_ids: Vec<String>,

    /// Photo references lost by the change
    pub removed_photo_ids: Vec<String>,
}

impl ChangeEvent {
    /// Create a creation event
    pub fn created(entry_id: EntryId, photo_ids: Vec<String>) -> Self {
        ChangeEvent {
            kind: ChangeKind::Created,
            entry_id,
            added_photo_ids: photo_ids,
            removed_photo_ids: Vec::new(),
        }
    }

    /// Create an update event
    pub fn updated(entry_id: EntryId, added: Vec<String>, removed: Vec<String>) -> Self {
        ChangeEvent {
            kind: ChangeKind::Updated,
            entry_id,
            added_photo_ids: added,
            removed_photo_ids: removed,
        }
    }

    /// Create a deletion event
    pub fn deleted(entry_id: EntryId, photo_ids: Vec<String>) -> Self {
        ChangeEvent {
            kind: ChangeKind::Deleted,
            entry_id,
            added_photo_ids: Vec::new(),
            removed_photo_ids: photo_ids,
        }
    }
}

/// Callback subscriber.
///
/// Called on the publishing thread, so implementations should return quickly.
pub trait ChangeHandler: Send + Sync {
    fn on_change(&self, event: &ChangeEvent);
}

impl<F> ChangeHandler for F
where
    F: Fn(&ChangeEvent) + Send + Sync,
{
    fn on_change(&self, event: &ChangeEvent) {
        self(event)
    }
}

/// Handle identifying one subscription
pub type SubscriberId = u64;

/// A channel subscription returned by [`ChangeNotifier::subscribe`].
pub struct Subscription {
    pub id: SubscriberId,
    pub receiver: Receiver<ChangeEvent>,
}

#[derive(Clone)]
enum Subscriber {
    Channel(Sender<ChangeEvent>),
    Handler(Arc<dyn ChangeHandler>),
}

/// Publish-subscribe registry for change events.
///
/// Channel subscribers get each event at most once. Publishing never blocks:
/// when a subscriber's queue is full the event is dropped for that subscriber
/// and a warning is logged, so a slow reader can miss changes. Handler
/// subscribers run on the publishing thread and see every event.
pub struct ChangeNotifier {
    subscribers: Mutex<BTreeMap<SubscriberId, Subscriber>>,
    next_id: AtomicU64,
    capacity: usize,
    closed: AtomicBool,
}

impl Default for ChangeNotifier {
    fn default() -> Self {
        Self::new()
    }
}

impl ChangeNotifier {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    /// Create a notifier whose channel subscribers queue at most `capacity`
    /// undelivered events. A capacity of zero is raised to one.
    pub fn with_capacity(capacity: usize) -> Self {
        ChangeNotifier {
            subscribers: Mutex::new(BTreeMap::new()),
            next_id: AtomicU64::new(1),
            capacity: capacity.max(1),
            closed: AtomicBool::new(false),
        }
    }

    fn register(&self, subscriber: Subscriber) -> SubscriberId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.subscribers.lock().insert(id, subscriber);
        debug!(subscriber = id, "Subscriber added");
        id
    }

    /// Subscribe with a bounded channel.
    ///
    /// After `close`, the returned receiver is already disconnected.
    pub fn subscribe(&self) -> Subscription {
        let (sender, receiver) = crossbeam_channel::bounded(self.capacity);
        let id = if self.is_closed() {
            self.next_id.fetch_add(1, Ordering::Relaxed)
        } else {
            self.register(Subscriber::Channel(sender))
        };
        Subscription { id, receiver }
    }

    /// Subscribe with a callback.
    pub fn subscribe_with(&self, handler: Arc<dyn ChangeHandler>) -> SubscriberId {
        if self.is_closed() {
            return self.next_id.fetch_add(1, Ordering::Relaxed);
        }
        self.register(Subscriber::Handler(handler))
    }

    /// Remove a subscriber. Returns false if it was not registered.
    pub fn unsubscribe(&self, id: SubscriberId) -> bool {
        let removed = self.subscribers.lock().remove(&id).is_some();
        if removed {
            debug!(subscriber = id, "Subscriber removed");
        }
        removed
    }

    /// Deliver an event to every current subscriber.
    ///
    /// A full channel drops the event for that subscriber only. Channels whose
    /// receiver has been dropped are unregistered.
    pub fn publish(&self, event: ChangeEvent) {
        if self.is_closed() {
            return;
        }

        // Dispatch without holding the lock so handlers may (un)subscribe
        let snapshot: Vec<(SubscriberId, Subscriber)> = self
            .subscribers
            .lock()
            .iter()
            .map(|(id, s)| (*id, s.clone()))
            .collect();

        let mut disconnected = Vec::new();
        for (id, subscriber) in snapshot {
            match subscriber {
                Subscriber::Channel(sender) => match sender.try_send(event.clone()) {
                    Ok(()) => {}
                    Err(TrySendError::Full(_)) => {
                        warn!(subscriber = id, kind = %event.kind, entry = %event.entry_id, "Subscriber queue full, event dropped");
                    }
                    Err(TrySendError::Disconnected(_)) => disconnected.push(id),
                },
                Subscriber::Handler(handler) => handler.on_change(&event),
            }
        }

        if !disconnected.is_empty() {
            let mut subscribers = self.subscribers.lock();
            for id in disconnected {
                subscribers.remove(&id);
                debug!(subscriber = id, "Disconnected subscriber pruned");
            }
        }
    }

    /// Stop delivering events and drop all subscribers.
    ///
    /// Receivers drain what is already queued and then see a disconnect.
    /// Calling this more than once has no further effect.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        let count = {
            let mut subscribers = self.subscribers.lock();
            let count = subscribers.len();
            subscribers.clear();
            count
        };
        debug!(subscribers = count, "Change notifier closed");
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Number of registered subscribers
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }
}

impl std::fmt::Debug for ChangeNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChangeNotifier")
            .field("subscribers", &self.subscriber_count())
            .field("capacity", &self.capacity)
            .field("closed", &self.is_closed())
            .finish()
    }
}
