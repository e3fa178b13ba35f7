//! Typed access to the `customers` collection.

use crate::debounce::Debouncer;
use crate::error::{Result, TrackerError};
use crate::query::{Direction, FilterOp, Query};
use crate::store::DocumentStore;
use crate::subscriptions::Listener;
use crate::types::{Document, DocumentId, Fields, Timestamp};
use crate::validation::validate_name;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Collection holding customer documents.
pub const CUSTOMERS: &str = "customers";

/// Sort key for "recent" views.
pub const UPDATED_AT: &str = "updatedAt";

const CYLINDERS_HELD: &str = "cylindersHeld";

/// A customer as stored in the `customers` collection.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Customer {
    /// Store-assigned identifier; not a stored field.
    #[serde(skip_serializing)]
    pub id: DocumentId,
    pub name: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub cylinders_held: u32,
    #[serde(default)]
    pub total_balance: Decimal,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Customer {
    /// Case-insensitive substring match on name or phone.
    pub fn matches_term(&self, term: &str) -> bool {
        let term = term.to_lowercase();
        self.name.to_lowercase().contains(&term) || self.phone.to_lowercase().contains(&term)
    }

    fn from_document(doc: &Document) -> Result<Self> {
        doc.decode()
    }
}

/// Caller-supplied fields for a new customer.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct NewCustomer {
    pub name: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub address: String,
}

/// Direct field edits. Cylinder counts are not editable here; they only
/// change through [`Reconciler::adjust`](crate::reconciler::Reconciler::adjust).
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomerPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_balance: Option<Decimal>,
}

/// Serialise a record into document fields.
pub(crate) fn to_fields<T: Serialize>(value: &T) -> Result<Fields> {
    match serde_json::to_value(value)? {
        serde_json::Value::Object(map) => Ok(map),
        other => Err(TrackerError::Serialization(format!(
            "expected an object, got {}",
            other
        ))),
    }
}

/// CRUD, search and live feeds over customers.
#[derive(Clone)]
pub struct CustomerClient {
    store: Arc<DocumentStore>,
}

impl CustomerClient {
    pub fn new(store: Arc<DocumentStore>) -> Self {
        Self { store }
    }

    /// Validate and persist a new customer with zero balance and cylinders.
    pub fn create(&self, data: &NewCustomer) -> Result<DocumentId> {
        validate_name(&data.name)?;

        let now = Timestamp::now();
        let customer = Customer {
            id: DocumentId::default(),
            name: data.name.trim().to_string(),
            phone: data.phone.trim().to_string(),
            address: data.address.trim().to_string(),
            cylinders_held: 0,
            total_balance: Decimal::ZERO,
            created_at: now,
            updated_at: now,
        };

        let id = self.store.add(CUSTOMERS, to_fields(&customer)?)?;
        debug!(customer = %id, "created customer");
        Ok(id)
    }

    /// `None` if no such customer exists.
    pub fn get_by_id(&self, id: &DocumentId) -> Result<Option<Customer>> {
        self.store
            .get(CUSTOMERS, id)?
            .map(|doc| Customer::from_document(&doc))
            .transpose()
    }

    /// Merge `patch` into an existing customer and refresh `updatedAt`.
    ///
    /// Fails with `NotFound` if the customer does not exist.
    pub fn update(&self, id: &DocumentId, patch: &CustomerPatch) -> Result<Customer> {
        let mut patch = patch.clone();
        if let Some(ref name) = patch.name {
            validate_name(name)?;
            patch.name = Some(name.trim().to_string());
        }

        let mut fields = to_fields(&patch)?;
        fields.insert(UPDATED_AT.to_string(), serde_json::to_value(Timestamp::now())?);

        let doc = self.store.update(CUSTOMERS, id, fields)?;
        Customer::from_document(&doc)
    }

    /// Remove a customer. Returns false if it was already absent.
    pub fn delete(&self, id: &DocumentId) -> Result<bool> {
        self.store.delete(CUSTOMERS, id)
    }

    /// All customers, most recently updated first.
    pub fn list(&self) -> Result<Vec<Customer>> {
        self.fetch(&Self::by_recency())
    }

    /// The `limit` most recently updated customers.
    pub fn recent(&self, limit: usize) -> Result<Vec<Customer>> {
        self.fetch(&Self::by_recency().limit(limit))
    }

    /// Case-insensitive substring search over name and phone, most recently
    /// updated first. An empty term matches everyone.
    pub fn search(&self, term: &str) -> Result<Vec<Customer>> {
        let term = term.to_lowercase();
        Ok(self
            .list()?
            .into_iter()
            .filter(|c| c.matches_term(&term))
            .collect())
    }

    /// Customers who owe money, largest balance first.
    pub fn list_with_positive_balance(&self) -> Result<Vec<Customer>> {
        // Balances are stored as decimal strings, so filter and order after
        // decoding rather than in the query.
        let mut customers: Vec<_> = self
            .list()?
            .into_iter()
            .filter(|c| c.total_balance > Decimal::ZERO)
            .collect();
        customers.sort_by(|a, b| b.total_balance.cmp(&a.total_balance));
        Ok(customers)
    }

    /// Customers holding cylinders, most cylinders first.
    pub fn list_with_cylinders(&self) -> Result<Vec<Customer>> {
        let query = Query::collection(CUSTOMERS)
            .filter(CYLINDERS_HELD, FilterOp::Gt, 0)
            .order_by(CYLINDERS_HELD, Direction::Desc);
        self.fetch(&query)
    }

    pub fn count(&self) -> usize {
        self.store.count(CUSTOMERS)
    }

    /// Live feed of all customers, most recently updated first.
    pub fn watch_all<D, E>(&self, on_data: D, on_error: E) -> Result<Listener>
    where
        D: FnMut(Vec<Customer>) + Send + 'static,
        E: FnOnce(TrackerError) + Send + 'static,
    {
        self.watch(Self::by_recency(), on_data, on_error)
    }

    /// Live feed of the `limit` most recently updated customers.
    pub fn watch_recent<D, E>(&self, limit: usize, on_data: D, on_error: E) -> Result<Listener>
    where
        D: FnMut(Vec<Customer>) + Send + 'static,
        E: FnOnce(TrackerError) + Send + 'static,
    {
        self.watch(Self::by_recency().limit(limit), on_data, on_error)
    }

    /// Search as the user types: only the last term entered within `delay`
    /// is searched. Search failures are reported and the debouncer keeps
    /// accepting input.
    pub fn debounced_search<R, E>(
        &self,
        delay: Duration,
        mut on_results: R,
        mut on_error: E,
    ) -> Result<Debouncer<String>>
    where
        R: FnMut(Vec<Customer>) + Send + 'static,
        E: FnMut(TrackerError) + Send + 'static,
    {
        let client = self.clone();
        Debouncer::new(delay, move |term: String| match client.search(&term) {
            Ok(results) => on_results(results),
            Err(e) => {
                warn!(error = %e, "customer search failed");
                on_error(e);
            }
        })
    }

    fn watch<D, E>(&self, query: Query, mut on_data: D, on_error: E) -> Result<Listener>
    where
        D: FnMut(Vec<Customer>) + Send + 'static,
        E: FnOnce(TrackerError) + Send + 'static,
    {
        self.store.listen(
            query,
            move |snapshot| {
                let customers = snapshot
                    .documents
                    .iter()
                    .map(Customer::from_document)
                    .collect::<Result<Vec<_>>>()?;
                on_data(customers);
                Ok(())
            },
            on_error,
        )
    }

    fn fetch(&self, query: &Query) -> Result<Vec<Customer>> {
        self.store
            .query(query)?
            .iter()
            .map(Customer::from_document)
            .collect()
    }

    fn by_recency() -> Query {
        Query::collection(CUSTOMERS).order_by(UPDATED_AT, Direction::Desc)
    }
}
