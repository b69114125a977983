/// Crawl state definitions for the harvest controller
///
/// This module defines every state the controller can be in and the reasons a
/// run can stop early.
use std::fmt;

/// Why a run stopped before exhausting the configured pages
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HaltReason {
    /// The source returned a detail page without its identity field
    Blocked { url: String },

    /// The operator interrupted the run
    Interrupted,

    /// An unrecoverable fault (listing fetch failure and the like)
    Error(String),
}

impl HaltReason {
    /// Returns true if the halt should be reported as a normal exit
    ///
    /// An operator interrupt is a requested stop, so it exits cleanly once the
    /// checkpoint is flushed.
    pub fn is_clean(&self) -> bool {
        matches!(self, Self::Interrupted)
    }

    /// Short machine-friendly label used in logs
    pub fn label(&self) -> &'static str {
        match self {
            Self::Blocked { .. } => "blocked",
            Self::Interrupted => "interrupted",
            Self::Error(_) => "error",
        }
    }
}

impl fmt::Display for HaltReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Blocked { url } => write!(f, "blocked at {}", url),
            Self::Interrupted => write!(f, "interrupted by operator"),
            Self::Error(message) => write!(f, "error: {}", message),
        }
    }
}

/// Represents the current state of the crawl controller
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CrawlState {
    // ===== Active States =====
    /// Fetching the identifier list of a listing page
    AdvancingPage { page: u32 },

    /// Working on the item at `index` of a listing page
    ProcessingItem { page: u32, index: usize },

    // ===== Terminal States =====
    /// Stopped early
    Halted(HaltReason),

    /// Every configured page was processed
    Finished,
}

impl CrawlState {
    /// Returns true if this is a terminal state (no further processing happens)
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Halted(_) | Self::Finished)
    }

    /// Returns true if the process should exit with a success status
    pub fn is_success(&self) -> bool {
        match self {
            Self::Finished => true,
            Self::Halted(reason) => reason.is_clean(),
            _ => false,
        }
    }

    /// Returns the halt reason, if halted
    pub fn halt_reason(&self) -> Option<&HaltReason> {
        match self {
            Self::Halted(reason) => Some(reason),
            _ => None,
        }
    }
}

impl fmt::Display for CrawlState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AdvancingPage { page } => write!(f, "advancing to page {}", page),
            Self::ProcessingItem { page, index } => {
                write!(f, "processing page {} item {}", page, index + 1)
            }
            Self::Halted(reason) => write!(f, "halted ({})", reason),
            Self::Finished => write!(f, "finished"),
        }
    }
}
