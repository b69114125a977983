//! Collaborator traits
//!
//! The controller never talks to the network itself. A session provider hands
//! it a session, a page lister turns page numbers into detail identifiers, and
//! an item extractor turns an identifier into a record.

use crate::storage::Record;
use crate::HarvestError;
use async_trait::async_trait;
use thiserror::Error;

/// A failure extracting one item; always recoverable by skipping the item
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("request for {url} failed: {message}")]
    Fetch { url: String, message: String },

    #[error("HTTP {status} for {url}")]
    Status { url: String, status: u16 },
}

/// Acquires and releases the long-lived session every fetch goes through
#[async_trait]
pub trait SessionProvider: Send + Sync {
    type Session: Send + Sync;

    /// Acquires a session; failure prevents the run from starting
    async fn acquire(&self) -> Result<Self::Session, HarvestError>;

    /// Releases a session; must be safe to call more than once
    async fn release(&self, session: &Self::Session) -> Result<(), HarvestError>;
}

/// Lists the detail identifiers found on one listing page
#[async_trait]
pub trait PageLister<S: Send + Sync>: Send + Sync {
    /// Returns absolute, de-duplicated identifiers in page order
    async fn list_items(&self, session: &S, page: u32) -> Result<Vec<String>, HarvestError>;
}

/// Extracts one record from a detail page
#[async_trait]
pub trait ItemExtractor<S: Send + Sync>: Send + Sync {
    /// Returns `Ok(None)` when the source refuses to serve the item
    async fn extract(&self, session: &S, id: &str) -> Result<Option<Record>, ExtractError>;
}
