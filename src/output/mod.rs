//! Output module for reporting harvest results
//!
//! This module handles:
//! - Counting what a run did
//! - Summarizing the output files left by earlier runs

pub mod stats;

pub use stats::{load_statistics, print_statistics, RunStatistics, StoreStatistics};
