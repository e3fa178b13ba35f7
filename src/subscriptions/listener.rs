//! Callback-driven consumption of a subscription.

use crate::error::{Result, TrackerError};
use crossbeam_channel::Receiver;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, error};

use super::manager::SubscriptionManager;
use super::types::{DropReason, QuerySnapshot, StoreEvent, SubscriptionHandle, SubscriptionId};

/// A subscription drained by one dedicated thread.
///
/// Deliveries are handed to `on_data` strictly one at a time. If several
/// snapshots queue up while a callback runs, only the newest is delivered.
/// A terminal failure reaches `on_error` once and ends the feed; an explicit
/// cancel ends it silently. Dropping the listener cancels it.
pub struct Listener {
    id: SubscriptionId,
    manager: Arc<SubscriptionManager>,
    cancelled: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl Listener {
    pub(crate) fn spawn<D, E>(
        handle: SubscriptionHandle,
        manager: Arc<SubscriptionManager>,
        on_data: D,
        on_error: E,
    ) -> Result<Self>
    where
        D: FnMut(QuerySnapshot) -> Result<()> + Send + 'static,
        E: FnOnce(TrackerError) + Send + 'static,
    {
        let id = handle.id;
        let thread_manager = Arc::clone(&manager);
        let cancelled = Arc::new(AtomicBool::new(false));
        let thread_cancelled = Arc::clone(&cancelled);
        let thread = thread::Builder::new()
            .name(format!("listener-{}", id.0))
            .spawn(move || {
                if let Some(err) = drain(&handle.receiver, &thread_cancelled, on_data) {
                    error!(subscription = id.0, error = %err, "subscription feed failed");
                    thread_manager.unsubscribe(id);
                    on_error(err);
                } else {
                    debug!(subscription = id.0, "listener finished");
                }
            })?;

        Ok(Self {
            id,
            manager,
            cancelled,
            thread: Some(thread),
        })
    }

    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Stop the feed and wait for an in-progress delivery to finish.
    pub fn cancel(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        self.cancelled.store(true, Ordering::SeqCst);
        self.manager.unsubscribe(self.id);
        if let Some(thread) = self.thread.take() {
            // Cancelling from inside a callback must not join itself.
            if thread.thread().id() != thread::current().id() {
                let _ = thread.join();
            }
        }
    }
}

impl Drop for Listener {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Deliver snapshots until the feed ends. Returns the terminal error, or
/// `None` when the subscription was cancelled.
///
/// The cancel flag covers a cancel whose notice did not fit in a full
/// queue: nothing is delivered or reported once it is set.
fn drain<D>(
    receiver: &Receiver<StoreEvent>,
    cancelled: &AtomicBool,
    mut on_data: D,
) -> Option<TrackerError>
where
    D: FnMut(QuerySnapshot) -> Result<()>,
{
    loop {
        let event = receiver.recv();
        if cancelled.load(Ordering::SeqCst) {
            return None;
        }
        let mut latest = match event {
            Ok(event) => event,
            Err(_) => return Some(TrackerError::SubscriptionDropped),
        };
        // A drop notice is always the last event, so skipping stale
        // snapshots never skips it.
        while let Ok(next) = receiver.try_recv() {
            latest = next;
        }

        match latest {
            StoreEvent::Snapshot(snapshot) => {
                if let Err(e) = on_data(snapshot) {
                    return Some(e);
                }
            }
            StoreEvent::Dropped {
                reason: DropReason::Unsubscribed,
            } => return None,
            StoreEvent::Dropped { reason } => return Some(reason.into()),
        }
    }
}
