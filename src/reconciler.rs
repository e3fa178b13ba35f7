//! Paired cylinder and balance adjustments.

use crate::customers::{Customer, CUSTOMERS, UPDATED_AT};
use crate::error::{Result, TrackerError};
use crate::store::DocumentStore;
use crate::types::{DocumentId, Fields, Timestamp};
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::debug;

/// Applies a signed cylinder delta and a signed balance delta to one
/// customer as a single write.
#[derive(Clone)]
pub struct Reconciler {
    store: Arc<DocumentStore>,
}

impl Reconciler {
    pub fn new(store: Arc<DocumentStore>) -> Self {
        Self { store }
    }

    /// Adjust a customer's held cylinders and outstanding balance.
    ///
    /// The read, the non-negative check and the write run in one store
    /// transaction, so concurrent adjustments to the same customer are
    /// applied one after the other. A rejected adjustment writes nothing.
    pub fn adjust(
        &self,
        customer_id: &DocumentId,
        cylinder_delta: i64,
        balance_delta: Decimal,
    ) -> Result<Customer> {
        let customer = self.store.transaction(|tx| {
            let doc = tx
                .get(CUSTOMERS, customer_id)?
                .ok_or_else(|| TrackerError::NotFound {
                    collection: CUSTOMERS.to_string(),
                    id: customer_id.clone(),
                })?;
            let current: Customer = doc.decode()?;

            let new_cylinders = i64::from(current.cylinders_held)
                .checked_add(cylinder_delta)
                .ok_or_else(|| {
                    TrackerError::InvalidOperation(format!(
                        "cylinder delta {} out of range",
                        cylinder_delta
                    ))
                })?;
            if new_cylinders < 0 {
                return Err(TrackerError::InvalidOperation(format!(
                    "cannot hold negative cylinders ({} held, delta {})",
                    current.cylinders_held, cylinder_delta
                )));
            }
            let new_cylinders = u32::try_from(new_cylinders).map_err(|_| {
                TrackerError::InvalidOperation(format!(
                    "cylinder count {} out of range",
                    new_cylinders
                ))
            })?;
            let new_balance = current
                .total_balance
                .checked_add(balance_delta)
                .ok_or_else(|| TrackerError::InvalidOperation("balance overflow".into()))?;

            let now = Timestamp::now();
            let mut patch = Fields::new();
            patch.insert("cylindersHeld".into(), serde_json::to_value(new_cylinders)?);
            patch.insert("totalBalance".into(), serde_json::to_value(new_balance)?);
            patch.insert(UPDATED_AT.into(), serde_json::to_value(now)?);
            tx.update(CUSTOMERS, customer_id, patch)?;

            Ok(Customer {
                cylinders_held: new_cylinders,
                total_balance: new_balance,
                updated_at: now,
                ..current
            })
        })?;

        debug!(
            customer = %customer_id,
            cylinder_delta,
            %balance_delta,
            cylinders = customer.cylinders_held,
            "adjusted customer"
        );
        Ok(customer)
    }
}
