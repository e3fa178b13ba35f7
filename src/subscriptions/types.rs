//! Subscription types for live query results.

use crate::error::TrackerError;
use crate::types::{Document, Sequence};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Configuration for a subscription.
#[derive(Clone, Debug)]
pub struct SubscriptionConfig {
    /// Max queued deliveries. When the queue is full the undelivered
    /// snapshots are discarded in favour of the newest one.
    /// Default: 64
    pub buffer_size: usize,
}

impl Default for SubscriptionConfig {
    fn default() -> Self {
        Self { buffer_size: 64 }
    }
}

/// The full, ordered result set of a query at one point in the store's
/// history. Each snapshot replaces any earlier one.
#[derive(Clone, Debug, PartialEq)]
pub struct QuerySnapshot {
    /// Store sequence the result set reflects.
    pub sequence: Sequence,
    pub documents: Vec<Document>,
}

/// Events emitted by subscriptions.
#[derive(Clone, Debug)]
pub enum StoreEvent {
    /// Current result set of the subscribed query.
    Snapshot(QuerySnapshot),

    /// Subscription ended; nothing follows.
    Dropped { reason: DropReason },
}

/// Why a subscription was dropped.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DropReason {
    /// Explicitly unsubscribed.
    Unsubscribed,
    /// The store was closed.
    StoreClosed,
    /// Evaluating the query or consuming a delivery failed.
    Error(String),
}

impl From<DropReason> for TrackerError {
    fn from(reason: DropReason) -> Self {
        match reason {
            DropReason::Error(msg) => TrackerError::SubscriptionFailed(msg),
            _ => TrackerError::SubscriptionDropped,
        }
    }
}

/// Unique identifier for a subscription.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SubscriptionId(pub u64);

/// Handle for pulling deliveries of one subscription.
///
/// Dropping the handle ends the subscription at the next delivery.
pub struct SubscriptionHandle {
    pub id: SubscriptionId,
    /// Channel to receive events.
    pub receiver: crossbeam_channel::Receiver<StoreEvent>,
    pub(super) closed: Arc<AtomicBool>,
}

impl SubscriptionHandle {
    /// Receive the next event (blocking).
    pub fn recv(&self) -> Result<StoreEvent, crossbeam_channel::RecvError> {
        self.receiver.recv()
    }

    /// Try to receive an event (non-blocking).
    pub fn try_recv(&self) -> Result<StoreEvent, crossbeam_channel::TryRecvError> {
        self.receiver.try_recv()
    }

    /// Receive with timeout.
    pub fn recv_timeout(
        &self,
        timeout: std::time::Duration,
    ) -> Result<StoreEvent, crossbeam_channel::RecvTimeoutError> {
        self.receiver.recv_timeout(timeout)
    }
}

impl Drop for SubscriptionHandle {
    fn drop(&mut self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}
