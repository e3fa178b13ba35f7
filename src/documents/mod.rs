//! Document log and index.
//!
//! Writes are appended to a checksummed log; the index maps each live
//! document to the offset of its newest version.

mod index;
mod log;

pub use index::DocumentIndex;
pub use log::{DocumentLog, LogEntry, LogOperation};
