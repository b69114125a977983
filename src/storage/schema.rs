//! Database schema definitions
//!
//! This module contains the SQL schema for the SQLite record sink.

/// SQL schema for the database
pub const SCHEMA_SQL: &str = r#"
-- One row per extracted record, never updated or deleted
CREATE TABLE IF NOT EXISTS records (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    record_key TEXT NOT NULL UNIQUE,
    fields_json TEXT NOT NULL,
    appended_at TEXT NOT NULL
);
"#;

/// Initializes the database schema
///
/// Creates the records table if it does not already exist.
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}
