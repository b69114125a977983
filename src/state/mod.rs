//! State module for tracking harvest progress
//!
//! # Components
//!
//! - `CrawlState`: where the controller is in its page/item iteration
//! - `Checkpoint`: the persisted resume cursor
//! - `DedupIndex`: identifiers that already have a record in the sink

mod checkpoint;
mod crawl_state;
mod dedup_index;

// Re-export main types
pub use checkpoint::Checkpoint;
pub use crawl_state::{CrawlState, HaltReason};
pub use dedup_index::DedupIndex;
