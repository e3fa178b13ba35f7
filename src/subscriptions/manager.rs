//! Subscription manager for re-delivering query results.

use crate::error::Result;
use crate::query::Query;
use crate::types::{Document, Sequence};
use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

use super::types::{
    DropReason, QuerySnapshot, StoreEvent, SubscriptionConfig, SubscriptionHandle, SubscriptionId,
};

/// Internal subscription state.
struct Subscription {
    query: Query,
    sender: Sender<StoreEvent>,
    /// Second receiver on the same queue, used to discard snapshots the
    /// consumer has not picked up yet.
    backlog: Receiver<StoreEvent>,
    /// Set when the consumer's handle is dropped.
    closed: Arc<AtomicBool>,
}

impl Subscription {
    /// Queue an event, discarding undelivered snapshots if the queue is
    /// full. Returns false once the consumer has gone away.
    fn deliver(&self, event: StoreEvent) -> bool {
        if self.closed.load(Ordering::SeqCst) {
            return false;
        }
        match self.sender.try_send(event) {
            Ok(()) => true,
            Err(TrySendError::Full(event)) => {
                while self.backlog.try_recv().is_ok() {}
                self.sender.try_send(event).is_ok()
            }
            Err(TrySendError::Disconnected(_)) => false,
        }
    }

    /// Queue the final drop notice. Pending snapshots are stale once the
    /// subscription ends, so they make room for it.
    fn finish(self, reason: DropReason) {
        let notice = StoreEvent::Dropped { reason };
        if let Err(TrySendError::Full(notice)) = self.sender.try_send(notice) {
            while self.backlog.try_recv().is_ok() {}
            let _ = self.sender.try_send(notice);
        }
    }
}

/// Tracks standing queries and pushes their result sets to subscribers.
pub struct SubscriptionManager {
    /// Active subscriptions by ID.
    subscriptions: RwLock<HashMap<SubscriptionId, Subscription>>,
    /// Counter for generating subscription IDs.
    next_id: AtomicU64,
}

impl SubscriptionManager {
    pub fn new() -> Self {
        Self {
            subscriptions: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Register a standing query.
    ///
    /// Nothing is delivered yet; the store sends the initial snapshot with
    /// [`send_to`](Self::send_to) before releasing its write lock.
    pub fn subscribe(&self, query: Query, config: SubscriptionConfig) -> SubscriptionHandle {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::SeqCst));
        let (sender, receiver) = bounded(config.buffer_size.max(1));
        let closed = Arc::new(AtomicBool::new(false));

        debug!(subscription = id.0, collection = %query.collection, "subscribed");
        self.subscriptions.write().insert(
            id,
            Subscription {
                query,
                sender,
                backlog: receiver.clone(),
                closed: Arc::clone(&closed),
            },
        );

        SubscriptionHandle {
            id,
            receiver,
            closed,
        }
    }

    /// Unsubscribe and clean up.
    pub fn unsubscribe(&self, id: SubscriptionId) {
        self.drop_subscription(id, DropReason::Unsubscribed);
    }

    /// Get subscription count.
    pub fn subscription_count(&self) -> usize {
        self.subscriptions.read().len()
    }

    /// Send an event directly to a subscription.
    /// Returns false if the subscription is gone.
    pub fn send_to(&self, id: SubscriptionId, event: StoreEvent) -> bool {
        let delivered = match self.subscriptions.read().get(&id) {
            Some(sub) => sub.deliver(event),
            None => return false,
        };
        if !delivered {
            self.drop_subscription(id, DropReason::Unsubscribed);
        }
        delivered
    }

    /// Re-evaluate every subscription over `collection` and deliver the
    /// fresh result sets.
    ///
    /// A slow consumer only ever misses intermediate snapshots. Subscribers
    /// whose query fails to evaluate are dropped.
    pub fn publish<F>(&self, collection: &str, sequence: Sequence, evaluate: F)
    where
        F: Fn(&Query) -> Result<Vec<Document>>,
    {
        let mut to_remove = Vec::new();

        {
            let subs = self.subscriptions.read();
            for (id, sub) in subs.iter() {
                if !sub.query.targets(collection) {
                    continue;
                }
                match evaluate(&sub.query) {
                    Ok(documents) => {
                        let event = StoreEvent::Snapshot(QuerySnapshot {
                            sequence,
                            documents,
                        });
                        if !sub.deliver(event) {
                            to_remove.push((*id, DropReason::Unsubscribed));
                        }
                    }
                    Err(e) => to_remove.push((*id, DropReason::Error(e.to_string()))),
                }
            }
        }

        for (id, reason) in to_remove {
            self.drop_subscription(id, reason);
        }
    }

    /// Drop every subscription (store shutting down).
    pub fn close_all(&self) {
        let drained: Vec<_> = self.subscriptions.write().drain().collect();
        for (_, sub) in drained {
            sub.finish(DropReason::StoreClosed);
        }
    }

    fn drop_subscription(&self, id: SubscriptionId, reason: DropReason) {
        let removed = self.subscriptions.write().remove(&id);
        if let Some(sub) = removed {
            if reason != DropReason::Unsubscribed {
                warn!(subscription = id.0, ?reason, "dropping subscription");
            }
            sub.finish(reason);
        }
    }
}

impl Default for SubscriptionManager {
    fn default() -> Self {
        Self::new()
    }
}
