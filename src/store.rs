//! Main DocumentStore struct tying all components together.

use crate::documents::{DocumentIndex, DocumentLog, LogEntry, LogOperation};
use crate::error::{Result, TrackerError};
use crate::query::Query;
use crate::subscriptions::{
    Listener, QuerySnapshot, StoreEvent, SubscriptionConfig, SubscriptionHandle,
    SubscriptionManager,
};
use crate::types::{Document, DocumentId, Fields, Sequence, Timestamp};
use fs2::FileExt;
use lru::LruCache;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Write};
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Store configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Base path for the store.
    pub path: PathBuf,

    /// Document cache size (number of decoded documents).
    pub cache_size: usize,

    /// Whether to create the store if it doesn't exist.
    pub create_if_missing: bool,

    /// fsync the log every N writes.
    pub sync_interval: u64,

    /// Largest single document write, in encoded bytes.
    pub max_entry_bytes: usize,

    /// Queue depth of each subscription. A full queue keeps only the
    /// newest snapshot.
    pub subscription_buffer: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./lpg-data"),
            cache_size: 1000,
            create_if_missing: true,
            sync_interval: DocumentLog::DEFAULT_SYNC_INTERVAL,
            max_entry_bytes: DocumentLog::MAX_ENTRY_SIZE,
            subscription_buffer: SubscriptionConfig::default().buffer_size,
        }
    }
}

/// Magic bytes for store manifest.
const STORE_MAGIC: &[u8; 4] = b"LPG\0";

/// Current store format version.
const STORE_VERSION: u8 = 1;

const MANIFEST_FILE: &str = "MANIFEST";
const LOCK_FILE: &str = "LOCK";
const LOG_FILE: &str = "documents.log";

/// An embedded document database.
///
/// Provides:
/// - Collections of schema-less documents keyed by [`DocumentId`]
/// - Point reads, merge updates, deletes and ordered/filtered queries
/// - Closure-based transactions
/// - Live subscriptions that re-deliver full query results after each write
pub struct DocumentStore {
    /// Store configuration.
    config: StoreConfig,

    /// Lock file for exclusive access.
    _lock_file: File,

    log: DocumentLog,

    index: DocumentIndex,

    /// Decoded documents by log offset. Offsets are never rewritten, so
    /// entries never go stale.
    cache: Mutex<LruCache<u64, Document>>,

    /// Sequence of the last committed write.
    head: Mutex<Sequence>,

    subscriptions: Arc<SubscriptionManager>,

    /// Serialises writes, transactions and subscription registration.
    write_lock: Mutex<()>,
}

impl DocumentStore {
    /// Open an existing store or create a new one.
    pub fn open_or_create(config: StoreConfig) -> Result<Self> {
        if config.path.join(MANIFEST_FILE).exists() {
            Self::open(config)
        } else if config.create_if_missing {
            Self::create(config)
        } else {
            Err(TrackerError::NotInitialized)
        }
    }

    /// Create a new store.
    pub fn create(config: StoreConfig) -> Result<Self> {
        fs::create_dir_all(&config.path)?;
        Self::write_manifest(&config.path)?;
        info!(path = %config.path.display(), "creating document store");
        Self::open_components(config)
    }

    /// Open an existing store.
    pub fn open(config: StoreConfig) -> Result<Self> {
        Self::verify_manifest(&config.path)?;
        let store = Self::open_components(config)?;
        info!(
            path = %store.config.path.display(),
            documents = store.index.total(),
            head = store.head().0,
            "opened document store"
        );
        Ok(store)
    }

    fn open_components(config: StoreConfig) -> Result<Self> {
        let lock_file = Self::acquire_lock(&config.path)?;
        let log = DocumentLog::open_with_sync_interval(
            config.path.join(LOG_FILE),
            config.sync_interval,
        )?
        .with_write_limit(config.max_entry_bytes);

        // Rebuild the index by replaying every write.
        let index = DocumentIndex::new();
        let mut head = Sequence::default();
        for (offset, entry) in log.entries()? {
            match entry.operation {
                LogOperation::Put(_) => index.put(&entry.collection, entry.id, offset),
                LogOperation::Delete => {
                    index.remove(&entry.collection, &entry.id);
                }
            }
            head = head.max(entry.sequence);
        }

        let cache_size = NonZeroUsize::new(config.cache_size).unwrap_or(NonZeroUsize::MIN);

        Ok(Self {
            config,
            _lock_file: lock_file,
            log,
            index,
            cache: Mutex::new(LruCache::new(cache_size)),
            head: Mutex::new(head),
            subscriptions: Arc::new(SubscriptionManager::new()),
            write_lock: Mutex::new(()),
        })
    }

    // --- Reads ---

    /// Fetch a document; `None` if it does not exist.
    pub fn get(&self, collection: &str, id: &DocumentId) -> Result<Option<Document>> {
        match self.index.get_offset(collection, id) {
            Some(offset) => Ok(Some(self.read_document(offset)?)),
            None => Ok(None),
        }
    }

    /// Every document in a collection, in id order.
    pub fn scan(&self, collection: &str) -> Result<Vec<Document>> {
        self.index
            .list(collection)
            .into_iter()
            .map(|(_, offset)| self.read_document(offset))
            .collect()
    }

    /// Evaluate a query once.
    pub fn query(&self, query: &Query) -> Result<Vec<Document>> {
        let candidates = match query.document {
            Some(ref id) => self.get(&query.collection, id)?.into_iter().collect(),
            None => self.scan(&query.collection)?,
        };
        Ok(query.apply(candidates))
    }

    /// Number of documents in a collection.
    pub fn count(&self, collection: &str) -> usize {
        self.index.count(collection)
    }

    /// Sequence of the last committed write.
    pub fn head(&self) -> Sequence {
        *self.head.lock()
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    // --- Writes ---

    /// Insert a document under a fresh identifier.
    pub fn add(&self, collection: &str, fields: Fields) -> Result<DocumentId> {
        self.transaction(|tx| tx.add(collection, fields))
    }

    /// Create or replace a document.
    pub fn set(&self, collection: &str, id: &DocumentId, fields: Fields) -> Result<()> {
        self.transaction(|tx| {
            tx.set(collection, id, fields);
            Ok(())
        })
    }

    /// Merge top-level fields into an existing document.
    ///
    /// Fails with `NotFound` if the document does not exist.
    pub fn update(&self, collection: &str, id: &DocumentId, patch: Fields) -> Result<Document> {
        self.transaction(|tx| tx.update(collection, id, patch))
    }

    /// Remove a document. Returns false (and writes nothing) if it was
    /// already absent.
    pub fn delete(&self, collection: &str, id: &DocumentId) -> Result<bool> {
        self.transaction(|tx| tx.delete(collection, id))
    }

    /// Run a read-modify-write atomically.
    ///
    /// The closure sees the store plus its own pending writes. Writes are
    /// committed only if it returns `Ok`; on `Err` nothing is written.
    /// No other write can interleave between the closure's reads and the
    /// commit.
    pub fn transaction<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Transaction<'_>) -> Result<T>,
    {
        let _lock = self.write_lock.lock();

        let mut tx = Transaction {
            store: self,
            writes: Vec::new(),
        };
        let output = f(&mut tx)?;
        let writes = std::mem::take(&mut tx.writes);
        self.commit(writes)?;

        Ok(output)
    }

    /// Append pending writes to the log, update the index, and notify
    /// subscribers. Caller holds the write lock.
    ///
    /// If an append fails, the writes before it stay committed and their
    /// collections are still published before the error is returned.
    fn commit(&self, writes: Vec<PendingWrite>) -> Result<()> {
        if writes.is_empty() {
            return Ok(());
        }

        let mut touched = BTreeSet::new();
        let mut head = self.head.lock();
        let count = writes.len();
        let mut result = Ok(());

        for write in writes {
            let sequence = head.next();
            let operation = match write.fields {
                Some(fields) => LogOperation::Put(fields),
                None => LogOperation::Delete,
            };
            let entry = LogEntry {
                sequence,
                timestamp: Timestamp::now(),
                collection: write.collection,
                id: write.id,
                operation,
            };

            let offset = match self.log.append(&entry) {
                Ok(offset) => offset,
                Err(e) => {
                    result = Err(e);
                    break;
                }
            };
            *head = sequence;

            match entry.operation {
                LogOperation::Put(fields) => {
                    self.index.put(&entry.collection, entry.id.clone(), offset);
                    self.cache.lock().put(
                        offset,
                        Document {
                            id: entry.id,
                            collection: entry.collection.clone(),
                            fields,
                            sequence,
                        },
                    );
                }
                LogOperation::Delete => {
                    self.index.remove(&entry.collection, &entry.id);
                }
            }
            touched.insert(entry.collection);
        }

        let sequence = *head;
        drop(head);
        match &result {
            Ok(()) => debug!(writes = count, head = sequence.0, "committed"),
            Err(e) => warn!(
                writes = count,
                head = sequence.0,
                error = %e,
                "commit stopped partway"
            ),
        }

        for collection in touched {
            self.subscriptions
                .publish(&collection, sequence, |query| self.query(query));
        }

        result
    }

    // --- Subscriptions ---

    /// Subscribe to a query. The current result set is queued before this
    /// returns, so the first `recv` never waits for a write.
    pub fn subscribe(&self, query: Query, config: SubscriptionConfig) -> Result<SubscriptionHandle> {
        let _lock = self.write_lock.lock();

        let handle = self.subscriptions.subscribe(query.clone(), config);
        let documents = match self.query(&query) {
            Ok(documents) => documents,
            Err(e) => {
                self.subscriptions.unsubscribe(handle.id);
                return Err(e);
            }
        };

        let initial = StoreEvent::Snapshot(QuerySnapshot {
            sequence: self.head(),
            documents,
        });
        if !self.subscriptions.send_to(handle.id, initial) {
            return Err(TrackerError::SubscriptionDropped);
        }

        Ok(handle)
    }

    /// Subscribe with callbacks run on a dedicated listener thread.
    ///
    /// `on_data` gets every delivery, starting with the current result set.
    /// Returning `Err` from it ends the feed like any other terminal
    /// failure: `on_error` is called once and nothing further is delivered.
    pub fn listen<D, E>(&self, query: Query, on_data: D, on_error: E) -> Result<Listener>
    where
        D: FnMut(QuerySnapshot) -> Result<()> + Send + 'static,
        E: FnOnce(TrackerError) + Send + 'static,
    {
        let config = SubscriptionConfig {
            buffer_size: self.config.subscription_buffer,
        };
        let handle = self.subscribe(query, config)?;
        Listener::spawn(handle, Arc::clone(&self.subscriptions), on_data, on_error)
    }

    /// Number of live subscriptions.
    pub fn subscription_count(&self) -> usize {
        self.subscriptions.subscription_count()
    }

    // --- Internals ---

    fn read_document(&self, offset: u64) -> Result<Document> {
        if let Some(doc) = self.cache.lock().get(&offset) {
            return Ok(doc.clone());
        }

        let entry = self.log.read_at(offset)?;
        let fields = match entry.operation {
            LogOperation::Put(fields) => fields,
            LogOperation::Delete => {
                return Err(TrackerError::Corruption(format!(
                    "index points at a delete for {}/{}",
                    entry.collection, entry.id
                )));
            }
        };

        let doc = Document {
            id: entry.id,
            collection: entry.collection,
            fields,
            sequence: entry.sequence,
        };
        self.cache.lock().put(offset, doc.clone());
        Ok(doc)
    }

    fn write_manifest(path: &Path) -> Result<()> {
        let mut file = File::create(path.join(MANIFEST_FILE))?;
        file.write_all(STORE_MAGIC)?;
        file.write_all(&[STORE_VERSION])?;
        file.sync_all()?;
        Ok(())
    }

    fn verify_manifest(path: &Path) -> Result<()> {
        let manifest_path = path.join(MANIFEST_FILE);
        if !manifest_path.exists() {
            return Err(TrackerError::NotInitialized);
        }

        let mut file = File::open(manifest_path)?;
        let mut magic = [0u8; 4];
        file.read_exact(&mut magic)?;
        if &magic != STORE_MAGIC {
            return Err(TrackerError::InvalidFormat("Invalid store magic".into()));
        }

        let mut version = [0u8; 1];
        file.read_exact(&mut version)?;
        if version[0] != STORE_VERSION {
            return Err(TrackerError::InvalidFormat(format!(
                "Unsupported store version: {}",
                version[0]
            )));
        }

        Ok(())
    }

    fn acquire_lock(path: &Path) -> Result<File> {
        let lock_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path.join(LOCK_FILE))?;
        lock_file
            .try_lock_exclusive()
            .map_err(|_| TrackerError::Locked)?;
        Ok(lock_file)
    }
}

impl Drop for DocumentStore {
    fn drop(&mut self) {
        self.subscriptions.close_all();
        let _ = self.log.sync();
    }
}

/// A write waiting for its transaction to commit. `None` fields is a delete.
struct PendingWrite {
    collection: String,
    id: DocumentId,
    fields: Option<Fields>,
}

/// Reads and buffered writes inside [`DocumentStore::transaction`].
pub struct Transaction<'a> {
    store: &'a DocumentStore,
    writes: Vec<PendingWrite>,
}

impl Transaction<'_> {
    /// Read a document as this transaction currently sees it.
    pub fn get(&self, collection: &str, id: &DocumentId) -> Result<Option<Document>> {
        let pending = self
            .writes
            .iter()
            .rev()
            .find(|w| w.collection == collection && &w.id == id);

        match pending {
            Some(write) => Ok(write.fields.clone().map(|fields| Document {
                id: id.clone(),
                collection: collection.to_string(),
                fields,
                sequence: self.store.head(),
            })),
            None => self.store.get(collection, id),
        }
    }

    /// Insert under a fresh identifier.
    pub fn add(&mut self, collection: &str, fields: Fields) -> Result<DocumentId> {
        let hint = Sequence(self.store.head().0 + self.writes.len() as u64 + 1);
        let mut id = DocumentId::generate(collection, hint, Timestamp::now());
        while self.get(collection, &id)?.is_some() {
            id = DocumentId::generate(collection, hint, Timestamp::now());
        }

        self.set(collection, &id, fields);
        Ok(id)
    }

    pub fn set(&mut self, collection: &str, id: &DocumentId, fields: Fields) {
        self.writes.push(PendingWrite {
            collection: collection.to_string(),
            id: id.clone(),
            fields: Some(fields),
        });
    }

    /// Merge top-level fields; `NotFound` if the document is absent.
    pub fn update(&mut self, collection: &str, id: &DocumentId, patch: Fields) -> Result<Document> {
        let mut doc = self
            .get(collection, id)?
            .ok_or_else(|| TrackerError::NotFound {
                collection: collection.to_string(),
                id: id.clone(),
            })?;

        for (key, value) in patch {
            doc.fields.insert(key, value);
        }
        self.set(collection, id, doc.fields.clone());
        Ok(doc)
    }

    /// Returns false if the document was already absent.
    pub fn delete(&mut self, collection: &str, id: &DocumentId) -> Result<bool> {
        if self.get(collection, id)?.is_none() {
            return Ok(false);
        }
        self.writes.push(PendingWrite {
            collection: collection.to_string(),
            id: id.clone(),
            fields: None,
        });
        Ok(true)
    }
}
