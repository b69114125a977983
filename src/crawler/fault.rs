//! Fault classification
//!
//! Every failure the controller recovers from is one of these kinds, and each
//! kind maps to exactly one recovery policy.

use std::fmt;

/// Kinds of failure the controller handles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Fault {
    /// A detail page came back without its identity field
    Blocked,

    /// Extracting or appending a single item failed
    TransientItem,

    /// Reading or writing the checkpoint or link snapshot failed
    Persistence,

    /// Acquiring or releasing the session failed
    Session,
}

/// What the controller does about a fault
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultPolicy {
    /// Save the checkpoint at the failing item and stop the run
    HaltRun,

    /// Log, advance past the item, keep going
    SkipItem,

    /// Log and continue with default or empty state
    UseDefault,

    /// Surface to the operator; never replaces the primary outcome
    Report,
}

impl Fault {
    /// Returns the recovery policy for this fault
    pub fn policy(self) -> FaultPolicy {
        match self {
            Self::Blocked => FaultPolicy::HaltRun,
            Self::TransientItem => FaultPolicy::SkipItem,
            Self::Persistence => FaultPolicy::UseDefault,
            Self::Session => FaultPolicy::Report,
        }
    }
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Blocked => "blocked",
            Self::TransientItem => "transient item fault",
            Self::Persistence => "persistence fault",
            Self::Session => "session fault",
        };
        write!(f, "{}", name)
    }
}
