use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Resume cursor: the listing page to start on and how many of its items were
/// already attempted
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Listing page, starting at 1
    pub page: u32,

    /// Number of leading items on `page` that are already attempted
    pub offset: usize,

    /// When this checkpoint was written
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,

    /// Hash of the configuration file the run was started with
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config_hash: Option<String>,
}

impl Checkpoint {
    /// Creates a checkpoint at a position
    pub fn new(page: u32, offset: usize) -> Self {
        Self {
            page,
            offset,
            updated_at: None,
            config_hash: None,
        }
    }

    /// Returns the `(page, offset)` pair
    pub fn position(&self) -> (u32, usize) {
        (self.page, self.offset)
    }

    /// Returns true if the cursor is well formed (pages start at 1)
    pub fn is_valid(&self) -> bool {
        self.page >= 1
    }

    /// Stamps the checkpoint with a write time and configuration hash
    pub fn stamped(mut self, config_hash: Option<&str>) -> Self {
        self.updated_at = Some(Utc::now());
        self.config_hash = config_hash.map(str::to_string);
        self
    }
}

impl Default for Checkpoint {
    fn default() -> Self {
        Self::new(1, 0)
    }
}

impl PartialEq for Checkpoint {
    fn eq(&self, other: &Self) -> bool {
        self.position() == other.position()
    }
}

impl Eq for Checkpoint {}
