//! Sumi-Harvest: a resumable listing harvester
//!
//! This crate walks a paginated listing site, visits every detail page it finds,
//! and appends one flat record per detail page to a durable output. Progress is
//! checkpointed after every item so an interrupted, crashed, or blocked run picks
//! up where it stopped without writing the same record twice.

pub mod config;
pub mod crawler;
pub mod output;
pub mod state;
pub mod storage;

use thiserror::Error;

/// Main error type for Sumi-Harvest operations
#[derive(Debug, Error)]
pub enum HarvestError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Request for {url} failed: {message}")]
    Fetch { url: String, message: String },

    #[error("HTTP {status} for {url}")]
    HttpStatus { url: String, status: u16 },

    #[error("Storage error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("Session error: {0}")]
    Session(String),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),

    #[error("Invalid CSS selector: {0}")]
    InvalidSelector(String),
}

/// Result type alias for Sumi-Harvest operations
pub type Result<T> = std::result::Result<T, HarvestError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

// Re-export commonly used types
pub use config::Config;
pub use crawler::{Controller, RunOutcome};
pub use state::{Checkpoint, CrawlState, DedupIndex, HaltReason};
pub use storage::Record;
