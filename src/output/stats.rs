//! Statistics for a harvest run and for the stores it leaves behind
//!
//! This module provides functionality for counting what a run did and for
//! summarizing existing output files (`--stats`).

use crate::state::Checkpoint;
use crate::storage::{StorageResult, Stores};

/// Counters collected while a run is in progress
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunStatistics {
    /// Listing pages fetched
    pub pages_visited: u64,

    /// Identifiers seen across all fetched listing pages
    pub items_seen: u64,

    /// Records appended to the sink
    pub saved: u64,

    /// Items skipped because an earlier run already attempted them
    pub skipped_resumed: u64,

    /// Items skipped because the sink already holds their record
    pub skipped_duplicate: u64,

    /// Items whose extraction or append failed
    pub failed: u64,
}

impl RunStatistics {
    /// Writes a one-line summary to the log
    pub fn log_summary(&self) {
        tracing::info!(
            "Pages: {}, items: {}, saved: {}, skipped (resumed): {}, skipped (duplicate): {}, failed: {}",
            self.pages_visited,
            self.items_seen,
            self.saved,
            self.skipped_resumed,
            self.skipped_duplicate,
            self.failed
        );
    }
}

/// What the output files currently hold
#[derive(Debug, Clone)]
pub struct StoreStatistics {
    /// Rows in the record sink
    pub records: u64,

    /// Distinct non-empty keys in the record sink
    pub unique_keys: u64,

    /// Where the next run would resume
    pub checkpoint: Checkpoint,

    /// Listing pages in the link snapshot
    pub link_pages: u64,

    /// Identifiers across all pages of the link snapshot
    pub link_identifiers: u64,
}

/// Loads statistics from the stores
///
/// # Arguments
///
/// * `stores` - The stores opened from the output configuration
///
/// # Returns
///
/// * `Ok(StoreStatistics)` - Successfully loaded statistics
/// * `Err(StorageError)` - The record sink could not be read
pub fn load_statistics(stores: &Stores) -> StorageResult<StoreStatistics> {
    let records = stores.sink.count_records()?;
    let unique_keys = stores.sink.load_existing_keys()?.len() as u64;
    let checkpoint = stores.checkpoints.load();
    let snapshot = stores.links.load();

    Ok(StoreStatistics {
        records,
        unique_keys,
        checkpoint,
        link_pages: snapshot.len() as u64,
        link_identifiers: snapshot.values().map(|ids| ids.len() as u64).sum(),
    })
}

/// Prints statistics to stdout in a formatted manner
pub fn print_statistics(stats: &StoreStatistics) {
    println!("=== Harvest Statistics ===\n");

    println!("Records:");
    println!("  Rows: {}", stats.records);
    println!("  Unique keys: {}", stats.unique_keys);
    if stats.records > stats.unique_keys {
        println!(
            "  Rows without a unique key: {}",
            stats.records - stats.unique_keys
        );
    }
    println!();

    println!("Checkpoint:");
    println!("  Next page: {}", stats.checkpoint.page);
    println!("  Items already attempted: {}", stats.checkpoint.offset);
    if let Some(updated_at) = stats.checkpoint.updated_at {
        println!("  Written: {}", updated_at.to_rfc3339());
    }
    println!();

    println!("Link Snapshot:");
    println!("  Pages: {}", stats.link_pages);
    println!("  Identifiers: {}", stats.link_identifiers);
}
