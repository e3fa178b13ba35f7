//! Append-only document mutation log.

use crate::error::{Result, TrackerError};
use crate::types::{DocumentId, Fields, Sequence, Timestamp};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{BufReader, ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::warn;

/// Magic bytes for the document log.
const LOG_MAGIC: &[u8; 4] = b"DOC\0";

/// Current log format version.
const LOG_VERSION: u8 = 1;

/// Header size (magic + version).
const LOG_HEADER_SIZE: u64 = 5;

/// Upper bound on one encoded entry, on read and write.
const MAX_ENTRY_SIZE: usize = 64 * 1024 * 1024;

/// What a log entry does to its document.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum LogOperation {
    /// Replace the document with these fields (create, set and merged update).
    Put(Fields),
    /// Remove the document.
    Delete,
}

/// A single committed write.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub sequence: Sequence,
    pub timestamp: Timestamp,
    pub collection: String,
    pub id: DocumentId,
    pub operation: LogOperation,
}

/// Append-only log of document writes.
///
/// Every entry is framed as `len | msgpack | crc32`. The in-memory view of
/// the store is rebuilt by replaying the log from the header.
pub struct DocumentLog {
    path: PathBuf,

    /// Log file handle.
    file: Mutex<File>,

    /// End of the last valid entry.
    file_size: RwLock<u64>,

    /// Number of writes since last sync.
    writes_since_sync: Mutex<u64>,

    /// Sync every N writes.
    sync_interval: u64,

    /// Largest entry `append` accepts.
    write_limit: usize,
}

impl DocumentLog {
    /// Default sync interval: every write is durable before it is visible.
    pub const DEFAULT_SYNC_INTERVAL: u64 = 1;

    /// Largest entry the log can hold.
    pub const MAX_ENTRY_SIZE: usize = MAX_ENTRY_SIZE;

    /// Open or create a log with the default sync interval.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with_sync_interval(path, Self::DEFAULT_SYNC_INTERVAL)
    }

    /// Open or create a log.
    ///
    /// A torn or corrupt tail left by a crash is cut off at the last entry
    /// that decodes and checksums cleanly.
    pub fn open_with_sync_interval(path: impl AsRef<Path>, sync_interval: u64) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(&path)?;

        let len = file.metadata()?.len();
        let file_size = if len == 0 {
            file.write_all(LOG_MAGIC)?;
            file.write_all(&[LOG_VERSION])?;
            file.sync_all()?;
            LOG_HEADER_SIZE
        } else {
            Self::verify_header(&mut file)?;
            let valid_end = Self::find_valid_end(&file, len)?;
            if valid_end < len {
                warn!(
                    path = %path.display(),
                    valid_end,
                    len,
                    "truncating torn tail of document log"
                );
                file.set_len(valid_end)?;
                file.sync_all()?;
            }
            valid_end
        };

        Ok(Self {
            path,
            file: Mutex::new(file),
            file_size: RwLock::new(file_size),
            writes_since_sync: Mutex::new(0),
            sync_interval: sync_interval.max(1),
            write_limit: MAX_ENTRY_SIZE,
        })
    }

    /// Reject appends larger than `limit` bytes. Entries already in the log
    /// are still read up to [`Self::MAX_ENTRY_SIZE`].
    pub fn with_write_limit(mut self, limit: usize) -> Self {
        self.write_limit = limit.min(MAX_ENTRY_SIZE);
        self
    }

    /// Append an entry. Returns the offset it was written at.
    pub fn append(&self, entry: &LogEntry) -> Result<u64> {
        let encoded = rmp_serde::to_vec(entry)?;
        if encoded.len() > self.write_limit {
            return Err(TrackerError::InvalidOperation(format!(
                "document write of {} bytes exceeds limit",
                encoded.len()
            )));
        }

        let mut file = self.file.lock();
        let offset = *self.file_size.read();
        file.seek(SeekFrom::Start(offset))?;

        let mut frame = Vec::with_capacity(encoded.len() + 8);
        frame.extend_from_slice(&(encoded.len() as u32).to_le_bytes());
        frame.extend_from_slice(&encoded);
        frame.extend_from_slice(&crc32fast::hash(&encoded).to_le_bytes());
        file.write_all(&frame)?;

        *self.file_size.write() = offset + frame.len() as u64;

        let mut writes = self.writes_since_sync.lock();
        *writes += 1;
        if *writes >= self.sync_interval {
            file.sync_data()?;
            *writes = 0;
        }

        Ok(offset)
    }

    /// Force sync all pending writes to disk.
    pub fn sync(&self) -> Result<()> {
        self.file.lock().sync_all()?;
        *self.writes_since_sync.lock() = 0;
        Ok(())
    }

    /// Read the entry at a given offset.
    pub fn read_at(&self, offset: u64) -> Result<LogEntry> {
        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(offset))?;
        Self::read_frame(&mut *file)
    }

    /// Read every entry in write order, with its offset.
    pub fn entries(&self) -> Result<Vec<(u64, LogEntry)>> {
        let end = self.size();
        let mut reader = BufReader::new(File::open(&self.path)?);
        reader.seek(SeekFrom::Start(LOG_HEADER_SIZE))?;

        let mut offset = LOG_HEADER_SIZE;
        let mut entries = Vec::new();
        while offset < end {
            let entry = Self::read_frame(&mut reader)?;
            let next = reader.stream_position()?;
            entries.push((offset, entry));
            offset = next;
        }
        Ok(entries)
    }

    /// Current log size in bytes.
    pub fn size(&self) -> u64 {
        *self.file_size.read()
    }

    fn verify_header(file: &mut File) -> Result<()> {
        file.seek(SeekFrom::Start(0))?;

        let mut magic = [0u8; 4];
        file.read_exact(&mut magic)?;
        if &magic != LOG_MAGIC {
            return Err(TrackerError::InvalidFormat("Invalid document log magic".into()));
        }

        let mut version = [0u8; 1];
        file.read_exact(&mut version)?;
        if version[0] != LOG_VERSION {
            return Err(TrackerError::InvalidFormat(format!(
                "Unsupported document log version: {}",
                version[0]
            )));
        }

        Ok(())
    }

    /// Walk the log and return the end offset of the last intact entry.
    fn find_valid_end(file: &File, len: u64) -> Result<u64> {
        let mut reader = BufReader::new(file.try_clone()?);
        reader.seek(SeekFrom::Start(LOG_HEADER_SIZE))?;

        let mut valid_end = LOG_HEADER_SIZE;
        while valid_end < len {
            match Self::read_frame(&mut reader) {
                Ok(_) => valid_end = reader.stream_position()?,
                Err(TrackerError::Io(e)) if e.kind() != ErrorKind::UnexpectedEof => {
                    return Err(TrackerError::Io(e));
                }
                Err(_) => break,
            }
        }

        Ok(valid_end)
    }

    fn read_frame<R: Read>(reader: &mut R) -> Result<LogEntry> {
        let mut len_bytes = [0u8; 4];
        reader.read_exact(&mut len_bytes)?;
        let len = u32::from_le_bytes(len_bytes) as usize;

        if len > MAX_ENTRY_SIZE {
            return Err(TrackerError::Corruption("document log entry too large".into()));
        }

        let mut encoded = vec![0u8; len];
        reader.read_exact(&mut encoded)?;

        let mut checksum_bytes = [0u8; 4];
        reader.read_exact(&mut checksum_bytes)?;
        let stored = u32::from_le_bytes(checksum_bytes);
        let computed = crc32fast::hash(&encoded);
        if stored != computed {
            return Err(TrackerError::ChecksumMismatch {
                expected: stored,
                got: computed,
            });
        }

        Ok(rmp_serde::from_slice(&encoded)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn put(seq: u64, id: &str, name: &str) -> LogEntry {
        let mut fields = Fields::new();
        fields.insert("name".into(), json!(name));
        fields.insert("cylindersHeld".into(), json!(seq));
        LogEntry {
            sequence: Sequence(seq),
            timestamp: Timestamp::now(),
            collection: "customers".into(),
            id: DocumentId::new(id),
            operation: LogOperation::Put(fields),
        }
    }

    #[test]
    fn test_append_and_read() {
        let dir = TempDir::new().unwrap();
        let log = DocumentLog::open(dir.path().join("documents.log")).unwrap();

        let entry = put(1, "a", "Asha");
        let offset = log.append(&entry).unwrap();
        assert_eq!(offset, LOG_HEADER_SIZE);

        let read = log.read_at(offset).unwrap();
        assert_eq!(read, entry);
    }

    #[test]
    fn test_entries_in_order() {
        let dir = TempDir::new().unwrap();
        let log = DocumentLog::open(dir.path().join("documents.log")).unwrap();

        for i in 1..=10 {
            log.append(&put(i, &format!("c{}", i), "Ravi")).unwrap();
        }

        let entries = log.entries().unwrap();
        assert_eq!(entries.len(), 10);
        assert_eq!(entries[0].1.sequence, Sequence(1));
        assert_eq!(entries[9].1.id, DocumentId::new("c10"));
    }

    #[test]
    fn test_persistence() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("documents.log");

        {
            let log = DocumentLog::open(&path).unwrap();
            log.append(&put(1, "a", "Asha")).unwrap();
            log.append(&put(2, "b", "Ravi")).unwrap();
        }

        let log = DocumentLog::open(&path).unwrap();
        assert_eq!(log.entries().unwrap().len(), 2);
        log.append(&put(3, "c", "Meena")).unwrap();
        assert_eq!(log.entries().unwrap().len(), 3);
    }

    #[test]
    fn test_torn_tail_is_truncated() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("documents.log");

        let good_end = {
            let log = DocumentLog::open(&path).unwrap();
            log.append(&put(1, "a", "Asha")).unwrap();
            log.size()
        };

        // Half-written frame: a length prefix with no body.
        {
            let mut file = OpenOptions::new().append(true).open(&path).unwrap();
            file.write_all(&200u32.to_le_bytes()).unwrap();
            file.write_all(b"partial").unwrap();
        }

        let log = DocumentLog::open(&path).unwrap();
        assert_eq!(log.size(), good_end);
        assert_eq!(std::fs::metadata(&path).unwrap().len(), good_end);
        assert_eq!(log.entries().unwrap().len(), 1);
    }

    #[test]
    fn test_oversized_append_rejected_without_writing() {
        let dir = TempDir::new().unwrap();
        let log = DocumentLog::open(dir.path().join("documents.log"))
            .unwrap()
            .with_write_limit(256);

        log.append(&put(1, "a", "Asha")).unwrap();
        let size = log.size();

        let result = log.append(&put(2, "b", &"x".repeat(1024)));
        assert!(matches!(result, Err(TrackerError::InvalidOperation(_))));
        assert_eq!(log.size(), size);
        assert_eq!(log.entries().unwrap().len(), 1);
    }

    #[test]
    fn test_bad_magic_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("documents.log");
        std::fs::write(&path, b"NOPE\x01").unwrap();

        let result = DocumentLog::open(&path);
        assert!(matches!(result, Err(TrackerError::InvalidFormat(_))));
    }
}
