//! The tracker as a whole: one store, the clients over it, and the auth
//! context.

use crate::auth::AuthContext;
use crate::config::TrackerConfig;
use crate::customers::{Customer, CustomerClient};
use crate::debounce::Debouncer;
use crate::error::{Result, TrackerError};
use crate::inventory::{Inventory, InventoryClient};
use crate::reconciler::Reconciler;
use crate::store::DocumentStore;
use std::sync::Arc;
use tracing::info;

/// What the main page shows.
#[derive(Clone, Debug)]
pub struct Dashboard {
    pub inventory: Inventory,
    pub total_customers: usize,
    pub recent: Vec<Customer>,
}

pub struct Tracker {
    config: TrackerConfig,
    store: Arc<DocumentStore>,
    customers: CustomerClient,
    inventory: InventoryClient,
    reconciler: Reconciler,
    auth: AuthContext,
}

impl Tracker {
    /// Open (or create) the store and make sure the inventory singleton
    /// exists.
    pub fn open(config: TrackerConfig) -> Result<Self> {
        config.validate()?;
        let store = Arc::new(DocumentStore::open_or_create(config.store.clone())?);

        let tracker = Self {
            customers: CustomerClient::new(Arc::clone(&store)),
            inventory: InventoryClient::new(Arc::clone(&store)),
            reconciler: Reconciler::new(Arc::clone(&store)),
            auth: AuthContext::new(config.users.clone()),
            store,
            config,
        };

        let inventory = tracker.inventory.load_or_init()?;
        info!(
            customers = tracker.customers.count(),
            total_cylinders = inventory.total_cylinders,
            "tracker ready"
        );
        Ok(tracker)
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<DocumentStore> {
        &self.store
    }

    pub fn customers(&self) -> &CustomerClient {
        &self.customers
    }

    pub fn inventory(&self) -> &InventoryClient {
        &self.inventory
    }

    pub fn reconciler(&self) -> &Reconciler {
        &self.reconciler
    }

    pub fn auth(&self) -> &AuthContext {
        &self.auth
    }

    /// Customer search as the user types, with the configured quiet period.
    pub fn debounced_search<R, E>(&self, on_results: R, on_error: E) -> Result<Debouncer<String>>
    where
        R: FnMut(Vec<Customer>) + Send + 'static,
        E: FnMut(TrackerError) + Send + 'static,
    {
        self.customers
            .debounced_search(self.config.search_debounce(), on_results, on_error)
    }

    /// Point-in-time dashboard contents.
    pub fn dashboard(&self) -> Result<Dashboard> {
        Ok(Dashboard {
            inventory: self.inventory.load_or_init()?,
            total_customers: self.customers.count(),
            recent: self.customers.recent(self.config.recent_limit)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::customers::NewCustomer;
    use crate::store::StoreConfig;
    use rust_decimal::Decimal;
    use std::time::Duration;
    use tempfile::TempDir;

    fn open(dir: &TempDir) -> Tracker {
        Tracker::open(TrackerConfig {
            store: StoreConfig {
                path: dir.path().join("store"),
                ..Default::default()
            },
            recent_limit: 2,
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn test_open_initialises_inventory() {
        let dir = TempDir::new().unwrap();
        let tracker = open(&dir);
        let inventory = tracker.inventory().get().unwrap().unwrap();
        assert_eq!(inventory.total_cylinders, 0);
    }

    #[test]
    fn test_dashboard() {
        let dir = TempDir::new().unwrap();
        let tracker = open(&dir);

        let mut ids = Vec::new();
        for name in ["Asha", "Bilal", "Chen"] {
            ids.push(
                tracker
                    .customers()
                    .create(&NewCustomer {
                        name: name.into(),
                        ..Default::default()
                    })
                    .unwrap(),
            );
        }
        tracker
            .reconciler()
            .adjust(&ids[0], 1, Decimal::new(900, 0))
            .unwrap();

        let dashboard = tracker.dashboard().unwrap();
        assert_eq!(dashboard.total_customers, 3);
        let names: Vec<_> = dashboard.recent.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["Asha", "Chen"]);
    }

    #[test]
    fn test_debounced_search_uses_configured_delay() {
        let dir = TempDir::new().unwrap();
        let tracker = Tracker::open(TrackerConfig {
            store: StoreConfig {
                path: dir.path().join("store"),
                ..Default::default()
            },
            search_debounce_ms: 400,
            ..Default::default()
        })
        .unwrap();
        tracker
            .customers()
            .create(&NewCustomer {
                name: "Meena".into(),
                ..Default::default()
            })
            .unwrap();

        let (tx, rx) = crossbeam_channel::unbounded();
        let search = tracker
            .debounced_search(
                move |results| {
                    let _ = tx.send(results.len());
                },
                |e| panic!("search failed: {}", e),
            )
            .unwrap();
        search.push("mee".to_string());

        // Still inside the quiet period.
        assert!(rx.recv_timeout(Duration::from_millis(150)).is_err());
        assert_eq!(rx.recv_timeout(Duration::from_secs(2)).unwrap(), 1);
    }

    #[test]
    fn test_reopen_keeps_data() {
        let dir = TempDir::new().unwrap();
        let id = {
            let tracker = open(&dir);
            tracker
                .customers()
                .create(&NewCustomer {
                    name: "Dev".into(),
                    ..Default::default()
                })
                .unwrap()
        };

        let tracker = open(&dir);
        assert_eq!(tracker.customers().get_by_id(&id).unwrap().unwrap().name, "Dev");
    }
}
