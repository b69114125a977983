use crate::storage::RecordSink;
use std::collections::HashSet;

/// In-memory set of detail-page identifiers that already have a record
///
/// Rebuilt from the record sink at startup and never persisted on its own. A
/// failed rebuild yields an empty index: items get reprocessed rather than
/// silently skipped.
#[derive(Debug, Clone, Default)]
pub struct DedupIndex {
    keys: HashSet<String>,
}

impl DedupIndex {
    /// Creates an empty index
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuilds the index from every key present in the sink
    pub fn rebuild(sink: &dyn RecordSink) -> Self {
        match sink.load_existing_keys() {
            Ok(keys) => {
                tracing::info!("Loaded {} already-saved records from the sink", keys.len());
                Self { keys }
            }
            Err(e) => {
                tracing::warn!(
                    "Could not read existing records, starting with an empty dedup index: {}",
                    e
                );
                Self::new()
            }
        }
    }

    pub fn contains(&self, id: &str) -> bool {
        self.keys.contains(id)
    }

    /// Marks an identifier as completed
    pub fn add(&mut self, id: impl Into<String>) {
        self.keys.insert(id.into());
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

impl FromIterator<String> for DedupIndex {
    fn from_iter<I: IntoIterator<Item = String>>(iter: I) -> Self {
        Self {
            keys: iter.into_iter().collect(),
        }
    }
}
