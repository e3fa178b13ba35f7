//! Standing queries over a collection.
//!
//! A query selects documents from one collection by field filters, orders
//! them by at most one field and optionally caps the result size. The same
//! value is used for one-shot reads and for subscriptions.

use crate::types::{Document, DocumentId};
use serde_json::Value;
use std::cmp::Ordering;

/// Sort direction.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    Asc,
    Desc,
}

/// Comparison used by a field filter.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FilterOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

/// `field <op> value`.
#[derive(Clone, Debug, PartialEq)]
pub struct Filter {
    pub field: String,
    pub op: FilterOp,
    pub value: Value,
}

impl Filter {
    /// Documents without the field never match.
    /// Range operators only match values of the same kind.
    pub fn matches(&self, doc: &Document) -> bool {
        let Some(actual) = doc.field(&self.field) else {
            return false;
        };

        match self.op {
            FilterOp::Eq => compare_values(actual, &self.value) == Ordering::Equal,
            FilterOp::Ne => compare_values(actual, &self.value) != Ordering::Equal,
            op => {
                if type_rank(actual) != type_rank(&self.value) {
                    return false;
                }
                let ord = compare_values(actual, &self.value);
                match op {
                    FilterOp::Lt => ord == Ordering::Less,
                    FilterOp::Le => ord != Ordering::Greater,
                    FilterOp::Gt => ord == Ordering::Greater,
                    FilterOp::Ge => ord != Ordering::Less,
                    FilterOp::Eq | FilterOp::Ne => unreachable!(),
                }
            }
        }
    }
}

/// A query over one collection.
#[derive(Clone, Debug, PartialEq)]
pub struct Query {
    pub collection: String,

    /// Restrict to a single document key.
    pub document: Option<DocumentId>,

    pub filters: Vec<Filter>,

    pub order_by: Option<(String, Direction)>,

    pub limit: Option<usize>,
}

impl Query {
    /// Every document of a collection, in id order.
    pub fn collection(name: impl Into<String>) -> Self {
        Self {
            collection: name.into(),
            document: None,
            filters: Vec::new(),
            order_by: None,
            limit: None,
        }
    }

    /// A single document; the result set has zero or one element.
    pub fn document(collection: impl Into<String>, id: DocumentId) -> Self {
        Self {
            document: Some(id),
            ..Self::collection(collection)
        }
    }

    pub fn filter(mut self, field: impl Into<String>, op: FilterOp, value: impl Into<Value>) -> Self {
        self.filters.push(Filter {
            field: field.into(),
            op,
            value: value.into(),
        });
        self
    }

    pub fn order_by(mut self, field: impl Into<String>, direction: Direction) -> Self {
        self.order_by = Some((field.into(), direction));
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Whether a write to `collection` can change this query's result.
    pub fn targets(&self, collection: &str) -> bool {
        self.collection == collection
    }

    /// Whether a document belongs in the result set, ignoring limit.
    pub fn matches(&self, doc: &Document) -> bool {
        if doc.collection != self.collection {
            return false;
        }
        if let Some(ref id) = self.document {
            if &doc.id != id {
                return false;
            }
        }
        self.filters.iter().all(|f| f.matches(doc))
    }

    /// Filter, order and cap a candidate set.
    ///
    /// Ordering ties, and queries without an order, fall back to id
    /// ascending so results are deterministic.
    pub fn apply(&self, docs: Vec<Document>) -> Vec<Document> {
        let mut selected: Vec<Document> = docs.into_iter().filter(|d| self.matches(d)).collect();

        match self.order_by {
            Some((ref field, direction)) => selected.sort_by(|a, b| {
                let ord = compare_fields(a.field(field), b.field(field));
                let ord = match direction {
                    Direction::Asc => ord,
                    Direction::Desc => ord.reverse(),
                };
                ord.then_with(|| a.id.cmp(&b.id))
            }),
            None => selected.sort_by(|a, b| a.id.cmp(&b.id)),
        }

        if let Some(limit) = self.limit {
            selected.truncate(limit);
        }
        selected
    }
}

/// Order between possibly-missing fields; a missing field sorts first.
pub fn compare_fields(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(a), Some(b)) => compare_values(a, b),
    }
}

/// Total order over JSON values:
/// null < bool < number < string < array < object.
pub fn compare_values(a: &Value, b: &Value) -> Ordering {
    let rank = type_rank(a).cmp(&type_rank(b));
    if rank != Ordering::Equal {
        return rank;
    }

    match (a, b) {
        (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
        (Value::Number(a), Value::Number(b)) => {
            match (a.as_i64(), b.as_i64()) {
                (Some(a), Some(b)) => a.cmp(&b),
                _ => {
                    let a = a.as_f64().unwrap_or(f64::NAN);
                    let b = b.as_f64().unwrap_or(f64::NAN);
                    a.partial_cmp(&b).unwrap_or(Ordering::Equal)
                }
            }
        }
        (Value::String(a), Value::String(b)) => a.cmp(b),
        (Value::Array(a), Value::Array(b)) => {
            for (x, y) in a.iter().zip(b.iter()) {
                let ord = compare_values(x, y);
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            a.len().cmp(&b.len())
        }
        (Value::Object(a), Value::Object(b)) => a.len().cmp(&b.len()),
        _ => Ordering::Equal,
    }
}

fn type_rank(value: &Value) -> u8 {
    match value {
        Value::Null => 0,
        Value::Bool(_) => 1,
        Value::Number(_) => 2,
        Value::String(_) => 3,
        Value::Array(_) => 4,
        Value::Object(_) => 5,
    }
}
