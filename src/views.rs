//! HTML fragments and display formatting for the dashboard and customer
//! pages. Every user-supplied string passes through [`escape_html`].

use crate::customers::Customer;
use crate::inventory::Inventory;
use crate::types::Timestamp;
use chrono::{DateTime, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use std::fmt::Write;

const MICROS_PER_DAY: i64 = 24 * 60 * 60 * 1_000_000;

/// Escape the five HTML-significant characters.
pub fn escape_html(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#039;"),
            c => out.push(c),
        }
    }
    out
}

/// Rupee amount with two decimal places, e.g. `₹1234.50`. Halves round
/// away from zero.
pub fn format_balance(amount: Decimal) -> String {
    let rounded = amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
    format!("₹{:.2}", rounded)
}

/// How long ago `ts` was, in whole days relative to `now`.
///
/// Timestamps in the future read as `Today`. Anything a week or older is
/// shown as a UTC calendar date.
pub fn format_relative_date(ts: Option<Timestamp>, now: Timestamp) -> String {
    let Some(ts) = ts else {
        return "N/A".to_string();
    };

    let elapsed = now.as_micros().saturating_sub(ts.as_micros());
    let days = elapsed.div_euclid(MICROS_PER_DAY);
    match days {
        i64::MIN..=0 => "Today".to_string(),
        1 => "Yesterday".to_string(),
        2..=6 => format!("{} days ago", days),
        _ => match DateTime::<Utc>::from_timestamp_micros(ts.as_micros()) {
            Some(date) => date.format("%Y-%m-%d").to_string(),
            None => "Invalid Date".to_string(),
        },
    }
}

/// Cards for the customer page, or its empty state.
pub fn render_customer_list(customers: &[Customer]) -> String {
    if customers.is_empty() {
        return "<div class=\"empty-state\"><p>No customers found</p></div>".to_string();
    }

    let mut html = String::new();
    for customer in customers {
        let _ = write!(
            html,
            "<div class=\"customer-card\" data-customer-id=\"{id}\">\
             <div class=\"customer-info\">\
             <h3>{name}</h3><p>{phone}</p><p>{address}</p>\
             <p>Cylinders: {cylinders}</p>\
             </div>\
             <div class=\"customer-balance\">{balance}</div>\
             </div>",
            id = escape_html(customer.id.as_str()),
            name = escape_html(&customer.name),
            phone = escape_html(&customer.phone),
            address = escape_html(&customer.address),
            cylinders = customer.cylinders_held,
            balance = format_balance(customer.total_balance),
        );
    }
    html
}

/// The dashboard's "Recent Customers" card.
pub fn render_recent_customers(customers: &[Customer], now: Timestamp) -> String {
    let mut cards = String::new();
    for customer in customers {
        let name = if customer.name.is_empty() {
            "No Name".to_string()
        } else {
            escape_html(&customer.name)
        };
        let _ = write!(
            cards,
            "<div class=\"customer-card\" data-customer-id=\"{id}\">\
             <div class=\"customer-info\">\
             <h3>{name}</h3>\
             <p>{cylinders} Cylinders • Last updated: {updated}</p>\
             </div>\
             <div class=\"customer-balance\">{balance}</div>\
             </div>",
            id = escape_html(customer.id.as_str()),
            cylinders = customer.cylinders_held,
            updated = format_relative_date(Some(customer.updated_at), now),
            balance = format_balance(customer.total_balance),
        );
    }
    if cards.is_empty() {
        cards.push_str("<p>No recent customers</p>");
    }
    format!("<h2>Recent Customers</h2>{}", cards)
}

/// The three inventory counters on the dashboard.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct InventorySummary {
    pub total_cylinders: i64,
    pub cylinders_in_shop: i64,
    pub cylinders_with_customers: i64,
}

impl InventorySummary {
    pub fn render(&self) -> String {
        format!(
            "<div class=\"stat\" id=\"totalCylinders\">{}</div>\
             <div class=\"stat\" id=\"cylindersInShop\">{}</div>\
             <div class=\"stat\" id=\"cylindersWithCustomers\">{}</div>",
            self.total_cylinders, self.cylinders_in_shop, self.cylinders_with_customers
        )
    }
}

impl From<Option<&Inventory>> for InventorySummary {
    /// A missing inventory shows as zeros.
    fn from(inventory: Option<&Inventory>) -> Self {
        inventory.map_or_else(Self::default, |inv| Self {
            total_cylinders: inv.total_cylinders,
            cylinders_in_shop: inv.cylinders_in_shop,
            cylinders_with_customers: inv.cylinders_with_customers,
        })
    }
}
