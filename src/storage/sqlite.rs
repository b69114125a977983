//! SQLite record sink
//!
//! Each record is one row keyed by its dedup key, with the full record stored
//! as a JSON object in field order.

use crate::storage::atomic::ensure_parent_dir;
use crate::storage::schema::initialize_schema;
use crate::storage::traits::{RecordSink, StorageError, StorageResult};
use crate::storage::Record;
use chrono::Utc;
use rusqlite::{params, Connection};
use std::collections::HashSet;
use std::path::Path;

/// SQLite-backed record sink
pub struct SqliteRecordSink {
    conn: Connection,
    key_field: String,
}

impl SqliteRecordSink {
    /// Opens or creates the database at `path`
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file
    /// * `key_field` - Record field holding the dedup key
    ///
    /// # Returns
    ///
    /// * `Ok(SqliteRecordSink)` - Successfully opened/created database
    /// * `Err(StorageError)` - Failed to open database
    pub fn new(path: &Path, key_field: impl Into<String>) -> StorageResult<Self> {
        ensure_parent_dir(path)?;
        let conn = Connection::open(path)?;

        // Every append must be on disk before it returns
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = FULL;
        ",
        )?;

        initialize_schema(&conn)?;

        Ok(Self {
            conn,
            key_field: key_field.into(),
        })
    }

    /// Creates an in-memory database (for testing)
    #[cfg(test)]
    pub fn new_in_memory(key_field: &str) -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        initialize_schema(&conn)?;
        Ok(Self {
            conn,
            key_field: key_field.to_string(),
        })
    }
}

impl RecordSink for SqliteRecordSink {
    fn append(&mut self, record: &Record) -> StorageResult<()> {
        let key = record
            .get(&self.key_field)
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .ok_or_else(|| {
                StorageError::Corrupt(format!("record has no '{}' value", self.key_field))
            })?;

        let fields_json = serde_json::to_string(record)?;
        let now = Utc::now().to_rfc3339();

        let inserted = self.conn.execute(
            "INSERT OR IGNORE INTO records (record_key, fields_json, appended_at) VALUES (?1, ?2, ?3)",
            params![key, fields_json, now],
        )?;

        if inserted == 0 {
            tracing::debug!("Record {} already stored, append ignored", key);
        }

        Ok(())
    }

    fn load_existing_keys(&self) -> StorageResult<HashSet<String>> {
        let mut stmt = self.conn.prepare("SELECT record_key FROM records")?;
        let keys = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<HashSet<_>, _>>()?;
        Ok(keys)
    }

    fn count_records(&self) -> StorageResult<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM records", [], |row| row.get(0))?;
        Ok(count as u64)
    }
}
