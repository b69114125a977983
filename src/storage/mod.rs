//! Storage module for persisting harvest data
//!
//! This module owns the three files a harvest leaves behind:
//! - the record sink (CSV or SQLite), append-only
//! - the link snapshot, cumulative per listing page
//! - the checkpoint, a single resume cursor replaced atomically

mod atomic;
mod checkpoint_store;
mod csv_sink;
mod link_index;
mod record;
mod schema;
mod sqlite;
mod traits;

pub use atomic::write_atomic;
pub use checkpoint_store::JsonCheckpointStore;
pub use csv_sink::CsvRecordSink;
pub use link_index::{page_key, JsonLinkIndex};
pub use record::Record;
pub use sqlite::SqliteRecordSink;
pub use traits::{
    CheckpointStore, LinkIndex, LinkSnapshot, RecordSink, StorageError, StorageResult,
};

use crate::config::{OutputConfig, RecordConfig, SinkFormat};
use std::path::Path;

/// The three stores a controller works against
pub struct Stores {
    pub sink: Box<dyn RecordSink>,
    pub links: Box<dyn LinkIndex>,
    pub checkpoints: Box<dyn CheckpointStore>,
}

impl Stores {
    /// Opens the stores named by the output configuration
    ///
    /// # Arguments
    ///
    /// * `output` - File locations and sink format
    /// * `record` - Field names; the key field is what the sink deduplicates on
    ///
    /// # Returns
    ///
    /// * `Ok(Stores)` - Stores ready for use (files are created lazily)
    /// * `Err(StorageError)` - The SQLite sink could not be opened
    pub fn open(output: &OutputConfig, record: &RecordConfig) -> StorageResult<Self> {
        let sink: Box<dyn RecordSink> = match output.format {
            SinkFormat::Csv => Box::new(CsvRecordSink::new(
                &output.records_path,
                &record.key_field,
            )),
            SinkFormat::Sqlite => Box::new(SqliteRecordSink::new(
                Path::new(&output.records_path),
                &record.key_field,
            )?),
        };

        Ok(Self {
            sink,
            links: Box::new(JsonLinkIndex::new(&output.links_path)),
            checkpoints: Box::new(JsonCheckpointStore::new(&output.checkpoint_path)),
        })
    }
}
