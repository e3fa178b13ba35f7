//! # LPG Tracker
//!
//! Customer, cylinder and balance tracking for an LPG gas-cylinder shop,
//! backed by an embedded document store with live query feeds.
//!
//! ## Core Concepts
//!
//! - **Documents**: Schema-less field maps in named collections, persisted
//!   to a checksummed append-only log
//! - **Customers**: Validated records with held cylinders and an exact
//!   outstanding balance
//! - **Reconciler**: Paired cylinder/balance adjustments applied atomically
//! - **Feeds**: Subscriptions that re-deliver a query's full result set
//!   after every relevant write
//!
//! ## Example
//!
//! ```ignore
//! use lpg_tracker::{NewCustomer, Tracker, TrackerConfig};
//!
//! let tracker = Tracker::open(TrackerConfig::default())?;
//!
//! let id = tracker.customers().create(&NewCustomer {
//!     name: "Jane Roe".into(),
//!     phone: "555".into(),
//!     address: "12 Market Road".into(),
//! })?;
//!
//! // Two cylinders delivered, billed at 900 each.
//! tracker.reconciler().adjust(&id, 2, "1800".parse()?)?;
//!
//! let _feed = tracker.customers().watch_recent(5, |recent| {
//!     println!("{} recent customers", recent.len());
//! }, |e| eprintln!("feed ended: {e}"))?;
//! ```

pub mod app;
pub mod auth;
pub mod config;
pub mod customers;
pub mod debounce;
pub mod documents;
pub mod error;
pub mod inventory;
pub mod query;
pub mod reconciler;
pub mod store;
pub mod subscriptions;
pub mod types;
pub mod validation;
pub mod views;

// Re-exports
pub use app::{Dashboard, Tracker};
pub use auth::{gate, AuthContext, Credential, Gate, Page, Role, Session, SessionStorage};
pub use config::TrackerConfig;
pub use customers::{Customer, CustomerClient, CustomerPatch, NewCustomer};
pub use debounce::Debouncer;
pub use error::{Result, TrackerError, ValidationError};
pub use inventory::{Inventory, InventoryClient};
pub use query::{Direction, Filter, FilterOp, Query};
pub use reconciler::Reconciler;
pub use store::{DocumentStore, StoreConfig, Transaction};
pub use subscriptions::{
    DropReason, Listener, QuerySnapshot, StoreEvent, SubscriptionConfig, SubscriptionHandle,
    SubscriptionId, SubscriptionManager,
};
pub use types::*;
pub use validation::validate_name;
