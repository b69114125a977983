//! JSON link snapshot store
//!
//! Keeps the identifiers seen on every listing page, cumulative across runs.
//! Crawl correctness never depends on this file; a corrupt one is replaced.

use crate::storage::atomic::write_atomic;
use crate::storage::traits::{LinkIndex, LinkSnapshot, StorageResult};
use std::fs;
use std::path::{Path, PathBuf};

/// Link snapshot persisted as a pretty-printed JSON object
pub struct JsonLinkIndex {
    path: PathBuf,
}

impl JsonLinkIndex {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl LinkIndex for JsonLinkIndex {
    fn merge(&mut self, page_key: &str, identifiers: &[String]) -> StorageResult<()> {
        let mut snapshot = self.load();
        snapshot.insert(page_key.to_string(), identifiers.to_vec());

        let json = serde_json::to_string_pretty(&snapshot)?;
        write_atomic(&self.path, json.as_bytes())?;

        tracing::debug!(
            "Saved {} links for {} to {}",
            identifiers.len(),
            page_key,
            self.path.display()
        );
        Ok(())
    }

    fn load(&self) -> LinkSnapshot {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return LinkSnapshot::new(),
            Err(e) => {
                tracing::warn!(
                    "Could not read link snapshot {}, starting empty: {}",
                    self.path.display(),
                    e
                );
                return LinkSnapshot::new();
            }
        };

        serde_json::from_str(&content).unwrap_or_else(|e| {
            tracing::warn!(
                "Link snapshot {} is not valid JSON, starting empty: {}",
                self.path.display(),
                e
            );
            LinkSnapshot::new()
        })
    }
}

/// Snapshot key for a listing page
pub fn page_key(page: u32) -> String {
    format!("page_{}", page)
}
