//! The shop-wide cylinder inventory singleton.

use crate::customers::to_fields;
use crate::error::{Result, TrackerError};
use crate::query::Query;
use crate::store::DocumentStore;
use crate::subscriptions::Listener;
use crate::types::{DocumentId, Timestamp};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

/// Collection holding the inventory singleton.
pub const INVENTORY: &str = "inventory";

/// Key of the singleton document.
pub const CURRENT: &str = "current";

/// Cylinder totals for the whole shop.
///
/// `total_cylinders` is meant to equal `cylinders_in_shop +
/// cylinders_with_customers`, but nothing here enforces it; the counts are
/// maintained by whoever seeds the document.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Inventory {
    #[serde(default)]
    pub total_cylinders: i64,
    #[serde(default)]
    pub cylinders_in_shop: i64,
    #[serde(default)]
    pub cylinders_with_customers: i64,
    #[serde(default)]
    pub last_updated: Option<Timestamp>,
}

impl Inventory {
    /// All counts zero.
    pub fn empty(now: Timestamp) -> Self {
        Self {
            total_cylinders: 0,
            cylinders_in_shop: 0,
            cylinders_with_customers: 0,
            last_updated: Some(now),
        }
    }
}

#[derive(Clone)]
pub struct InventoryClient {
    store: Arc<DocumentStore>,
}

impl InventoryClient {
    pub fn new(store: Arc<DocumentStore>) -> Self {
        Self { store }
    }

    /// Read the singleton, creating it with zero counts if it is missing.
    pub fn load_or_init(&self) -> Result<Inventory> {
        let id = Self::key();
        self.store.transaction(|tx| {
            if let Some(doc) = tx.get(INVENTORY, &id)? {
                return doc.decode();
            }
            info!("initialising empty inventory");
            let inventory = Inventory::empty(Timestamp::now());
            tx.set(INVENTORY, &id, to_fields(&inventory)?);
            Ok(inventory)
        })
    }

    pub fn get(&self) -> Result<Option<Inventory>> {
        self.store
            .get(INVENTORY, &Self::key())?
            .map(|doc| doc.decode())
            .transpose()
    }

    /// Replace the inventory counts. Used by whatever process restocks the
    /// shop; `lastUpdated` is stamped here.
    pub fn set(&self, inventory: &Inventory) -> Result<()> {
        let stamped = Inventory {
            last_updated: Some(Timestamp::now()),
            ..inventory.clone()
        };
        self.store.set(INVENTORY, &Self::key(), to_fields(&stamped)?)
    }

    /// Live feed of the singleton. Deliveries while the document does not
    /// exist are skipped.
    pub fn watch<D, E>(&self, mut on_data: D, on_error: E) -> Result<Listener>
    where
        D: FnMut(Inventory) + Send + 'static,
        E: FnOnce(TrackerError) + Send + 'static,
    {
        self.store.listen(
            Query::document(INVENTORY, Self::key()),
            move |snapshot| {
                if let Some(doc) = snapshot.documents.first() {
                    on_data(doc.decode()?);
                }
                Ok(())
            },
            on_error,
        )
    }

    fn key() -> DocumentId {
        DocumentId::new(CURRENT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::StoreConfig;
    use crossbeam_channel::unbounded;
    use std::time::Duration;
    use tempfile::TempDir;

    fn client(dir: &TempDir) -> InventoryClient {
        let store = DocumentStore::create(StoreConfig {
            path: dir.path().join("store"),
            ..Default::default()
        })
        .unwrap();
        InventoryClient::new(Arc::new(store))
    }

    #[test]
    fn test_load_or_init_creates_once() {
        let dir = TempDir::new().unwrap();
        let inventory = client(&dir);
        assert!(inventory.get().unwrap().is_none());

        let first = inventory.load_or_init().unwrap();
        assert_eq!(first.total_cylinders, 0);
        assert!(first.last_updated.is_some());

        inventory
            .set(&Inventory {
                total_cylinders: 40,
                cylinders_in_shop: 30,
                cylinders_with_customers: 10,
                last_updated: None,
            })
            .unwrap();

        let second = inventory.load_or_init().unwrap();
        assert_eq!(second.total_cylinders, 40);
        assert_eq!(second.cylinders_in_shop, 30);
    }

    #[test]
    fn test_watch_skips_missing_then_delivers() {
        let dir = TempDir::new().unwrap();
        let inventory = client(&dir);

        let (tx, rx) = unbounded();
        let _listener = inventory
            .watch(
                move |inv| {
                    let _ = tx.send(inv.total_cylinders);
                },
                |_| {},
            )
            .unwrap();

        assert!(rx.recv_timeout(Duration::from_millis(50)).is_err());

        inventory.load_or_init().unwrap();
        assert_eq!(rx.recv_timeout(Duration::from_secs(1)).unwrap(), 0);

        inventory
            .set(&Inventory {
                total_cylinders: 12,
                cylinders_in_shop: 12,
                cylinders_with_customers: 0,
                last_updated: None,
            })
            .unwrap();
        assert_eq!(rx.recv_timeout(Duration::from_secs(1)).unwrap(), 12);
    }
}
