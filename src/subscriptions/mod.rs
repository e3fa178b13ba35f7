//! Live query subscriptions.
//!
//! A subscription is a standing [`Query`](crate::query::Query). It receives
//! the query's full, ordered result set once on subscribing and again after
//! every committed write to the queried collection. Deliveries are not
//! diffs: each one replaces the last.
//!
//! Subscriptions can be consumed by pulling from a [`SubscriptionHandle`]
//! or by handing callbacks to a [`Listener`].
//!
//! # Example
//!
//! ```ignore
//! let query = Query::collection("customers").order_by("updatedAt", Direction::Desc);
//! let listener = store.listen(
//!     query,
//!     |snapshot| { render(&snapshot.documents); Ok(()) },
//!     |err| eprintln!("feed ended: {err}"),
//! )?;
//! // ...
//! listener.cancel();
//! ```

mod listener;
mod manager;
mod types;

pub use listener::Listener;
pub use manager::SubscriptionManager;
pub use types::{
    DropReason, QuerySnapshot, StoreEvent, SubscriptionConfig, SubscriptionHandle, SubscriptionId,
};
