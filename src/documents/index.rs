//! In-memory index of live documents.

use crate::types::DocumentId;
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};

/// Maps every live document to the log offset of its latest version.
///
/// Rebuilt from the log on open; deletes remove the entry outright.
#[derive(Default)]
pub struct DocumentIndex {
    /// collection -> id -> offset.
    collections: RwLock<HashMap<String, BTreeMap<DocumentId, u64>>>,
}

impl DocumentIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Point a document at its newest version.
    pub fn put(&self, collection: &str, id: DocumentId, offset: u64) {
        self.collections
            .write()
            .entry(collection.to_string())
            .or_default()
            .insert(id, offset);
    }

    /// Drop a document. Returns true if it was present.
    pub fn remove(&self, collection: &str, id: &DocumentId) -> bool {
        let mut collections = self.collections.write();
        match collections.get_mut(collection) {
            Some(docs) => docs.remove(id).is_some(),
            None => false,
        }
    }

    pub fn get_offset(&self, collection: &str, id: &DocumentId) -> Option<u64> {
        self.collections
            .read()
            .get(collection)
            .and_then(|docs| docs.get(id).copied())
    }

    /// All live documents of a collection, ordered by id.
    pub fn list(&self, collection: &str) -> Vec<(DocumentId, u64)> {
        self.collections
            .read()
            .get(collection)
            .map(|docs| docs.iter().map(|(id, off)| (id.clone(), *off)).collect())
            .unwrap_or_default()
    }

    pub fn count(&self, collection: &str) -> usize {
        self.collections
            .read()
            .get(collection)
            .map(BTreeMap::len)
            .unwrap_or(0)
    }

    /// Live documents across all collections.
    pub fn total(&self) -> usize {
        self.collections.read().values().map(BTreeMap::len).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_put_overwrites_offset() {
        let index = DocumentIndex::new();
        index.put("customers", DocumentId::new("a"), 5);
        index.put("customers", DocumentId::new("a"), 90);

        assert_eq!(index.get_offset("customers", &DocumentId::new("a")), Some(90));
        assert_eq!(index.count("customers"), 1);
    }

    #[test]
    fn test_remove() {
        let index = DocumentIndex::new();
        index.put("customers", DocumentId::new("a"), 5);

        assert!(index.remove("customers", &DocumentId::new("a")));
        assert!(!index.remove("customers", &DocumentId::new("a")));
        assert!(!index.remove("inventory", &DocumentId::new("a")));
        assert_eq!(index.count("customers"), 0);
        assert_eq!(index.total(), 0);
    }

    #[test]
    fn test_collections_are_separate() {
        let index = DocumentIndex::new();
        index.put("customers", DocumentId::new("current"), 5);
        index.put("inventory", DocumentId::new("current"), 9);

        assert_eq!(index.get_offset("inventory", &DocumentId::new("current")), Some(9));
        assert_eq!(index.total(), 2);
        assert_eq!(index.list("customers").len(), 1);
    }
}
