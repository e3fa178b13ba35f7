//! Core types for the document store.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Field map of a document.
pub type Fields = serde_json::Map<String, serde_json::Value>;

/// Length of generated document identifiers, in hex characters.
const GENERATED_ID_LEN: usize = 20;

/// Opaque identifier of a document within its collection.
#[derive(Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentId(pub String);

impl DocumentId {
    /// Use a caller-chosen key (e.g. the `"current"` inventory singleton).
    pub fn new(id: impl Into<String>) -> Self {
        DocumentId(id.into())
    }

    /// Derive a fresh identifier for a store-assigned document.
    pub fn generate(collection: &str, sequence: Sequence, timestamp: Timestamp) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(collection.as_bytes());
        hasher.update(sequence.0.to_le_bytes());
        hasher.update(timestamp.0.to_le_bytes());
        let digest = hex::encode(hasher.finalize());
        DocumentId(digest[..GENERATED_ID_LEN].to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DocumentId({})", self.0)
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for DocumentId {
    fn from(s: &str) -> Self {
        DocumentId(s.to_string())
    }
}

/// Position of a committed write in the store.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
pub struct Sequence(pub u64);

impl fmt::Debug for Sequence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Seq({})", self.0)
    }
}

impl Sequence {
    pub fn next(self) -> Self {
        Sequence(self.0 + 1)
    }
}

/// Last timestamp handed out by [`Timestamp::now`].
static LAST_TIMESTAMP: AtomicI64 = AtomicI64::new(0);

/// Microseconds since Unix epoch.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(pub i64);

impl Timestamp {
    /// Current time. Strictly increasing within a process, so two writes
    /// never share an `updatedAt`.
    pub fn now() -> Self {
        let wall = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_micros() as i64)
            .unwrap_or_default();

        let mut prev = LAST_TIMESTAMP.load(Ordering::SeqCst);
        loop {
            let next = wall.max(prev + 1);
            match LAST_TIMESTAMP.compare_exchange(prev, next, Ordering::SeqCst, Ordering::SeqCst) {
                Ok(_) => return Timestamp(next),
                Err(actual) => prev = actual,
            }
        }
    }

    pub fn from_micros(micros: i64) -> Self {
        Timestamp(micros)
    }

    pub fn as_micros(self) -> i64 {
        self.0
    }
}

impl fmt::Debug for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Timestamp({})", self.0)
    }
}

/// A document as stored: identifier plus schema-less fields.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: DocumentId,

    /// Collection the document lives in.
    pub collection: String,

    pub fields: Fields,

    /// Sequence of the write that produced this version.
    pub sequence: Sequence,
}

impl Document {
    /// Look up a top-level field.
    pub fn field(&self, name: &str) -> Option<&serde_json::Value> {
        self.fields.get(name)
    }

    /// Decode the fields into a typed record, merging in the identifier
    /// under `"id"`.
    pub fn decode<T: serde::de::DeserializeOwned>(&self) -> crate::Result<T> {
        let mut fields = self.fields.clone();
        fields.insert("id".to_string(), serde_json::Value::String(self.id.0.clone()));
        serde_json::from_value(serde_json::Value::Object(fields)).map_err(|e| {
            crate::TrackerError::Deserialization(format!(
                "{}/{}: {}",
                self.collection, self.id, e
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_generated_ids_are_short_hex() {
        let id = DocumentId::generate("customers", Sequence(1), Timestamp(42));
        assert_eq!(id.as_str().len(), GENERATED_ID_LEN);
        assert!(id.as_str().chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_generated_ids_differ_by_sequence() {
        let a = DocumentId::generate("customers", Sequence(1), Timestamp(42));
        let b = DocumentId::generate("customers", Sequence(2), Timestamp(42));
        assert_ne!(a, b);
    }

    #[test]
    fn test_timestamps_strictly_increase() {
        let mut prev = Timestamp::now();
        for _ in 0..1000 {
            let next = Timestamp::now();
            assert!(next > prev);
            prev = next;
        }
    }

    #[test]
    fn test_decode_merges_id() {
        #[derive(Deserialize)]
        struct Named {
            id: String,
            name: String,
        }

        let mut fields = Fields::new();
        fields.insert("name".into(), json!("Asha"));
        let doc = Document {
            id: DocumentId::new("abc"),
            collection: "customers".into(),
            fields,
            sequence: Sequence(3),
        };

        let named: Named = doc.decode().unwrap();
        assert_eq!(named.id, "abc");
        assert_eq!(named.name, "Asha");
    }
}
