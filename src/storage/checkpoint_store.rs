//! JSON checkpoint store

use crate::state::Checkpoint;
use crate::storage::atomic::write_atomic;
use crate::storage::traits::{CheckpointStore, StorageError, StorageResult};
use std::fs;
use std::path::{Path, PathBuf};

/// Resume cursor persisted as a small JSON object
pub struct JsonCheckpointStore {
    path: PathBuf,
}

impl JsonCheckpointStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read(&self) -> StorageResult<Checkpoint> {
        let content = fs::read_to_string(&self.path)?;
        let checkpoint: Checkpoint = serde_json::from_str(&content)?;
        if !checkpoint.is_valid() {
            return Err(StorageError::Corrupt(format!(
                "page must be >= 1, got {}",
                checkpoint.page
            )));
        }
        Ok(checkpoint)
    }
}

impl CheckpointStore for JsonCheckpointStore {
    fn load(&self) -> Checkpoint {
        match self.read() {
            Ok(checkpoint) => {
                tracing::info!(
                    "Resuming from page {}, item {}",
                    checkpoint.page,
                    checkpoint.offset
                );
                checkpoint
            }
            Err(StorageError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!("No checkpoint at {}, starting from the beginning", self.path.display());
                Checkpoint::default()
            }
            Err(e) => {
                tracing::warn!(
                    "Could not load checkpoint {}, starting from the beginning: {}",
                    self.path.display(),
                    e
                );
                Checkpoint::default()
            }
        }
    }

    fn save(&mut self, checkpoint: &Checkpoint) -> StorageResult<()> {
        let json = serde_json::to_string_pretty(checkpoint)?;
        write_atomic(&self.path, json.as_bytes())?;
        tracing::debug!(
            "Checkpoint saved: page {}, item {}",
            checkpoint.page,
            checkpoint.offset
        );
        Ok(())
    }
}
