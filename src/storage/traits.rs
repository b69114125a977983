//! Storage traits and error types
//!
//! This module defines the trait interfaces for the three persisted stores and
//! their shared error type.

use crate::state::Checkpoint;
use crate::storage::Record;
use std::collections::{BTreeMap, HashSet};
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Corrupt store: {0}")]
    Corrupt(String),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Snapshot of discovered identifiers keyed by page (`"page_<N>"`)
pub type LinkSnapshot = BTreeMap<String, Vec<String>>;

/// Append-only store of extracted records
///
/// Every `append` must be durable when it returns: a crash afterwards may only
/// lose a record that was still being appended, never an earlier one. Complete
/// rows are never rewritten or deleted.
pub trait RecordSink: Send {
    /// Appends exactly one record
    fn append(&mut self, record: &Record) -> StorageResult<()>;

    /// Returns every dedup key present in the sink
    ///
    /// A missing sink yields an empty set. A sink that cannot be read yields an
    /// error; callers treat that as an empty set.
    fn load_existing_keys(&self) -> StorageResult<HashSet<String>>;

    /// Counts stored rows
    fn count_records(&self) -> StorageResult<u64>;
}

/// Cumulative per-page snapshot of discovered identifiers
pub trait LinkIndex: Send {
    /// Replaces the entry for `page_key`, keeping every other page's entry
    fn merge(&mut self, page_key: &str, identifiers: &[String]) -> StorageResult<()>;

    /// Loads the whole snapshot (empty if absent or unreadable)
    fn load(&self) -> LinkSnapshot;
}

/// Single persisted resume cursor
pub trait CheckpointStore: Send {
    /// Loads the cursor, falling back to page 1 offset 0 on any failure
    fn load(&self) -> Checkpoint;

    /// Overwrites the cursor without ever leaving a partially written file
    fn save(&mut self, checkpoint: &Checkpoint) -> StorageResult<()>;
}
