//! Error taxonomy for the scouting core
//!
//! Validation failures (coordinate, count, species) are raised before any store
//! write. Version conflicts, terminal-state and guard failures are expected
//! outcomes that the caller resolves by re-fetching; they are never logged as
//! faults.

use serde::{Serialize, Serializer};
use thiserror::Error;

use crate::grid::GridError;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ScoutingError {
    #[error("Invalid coordinate: {0}")]
    InvalidCoordinate(#[from] GridError),

    #[error("Invalid count {count}: counts must be non-negative")]
    InvalidCount { count: i64 },

    #[error("Unknown species code '{code}'")]
    UnknownSpecies { code: String },

    #[error("Version conflict: current version is {current_version}")]
    VersionConflict { current_version: u64 },

    #[error("Session is in terminal state {status}")]
    TerminalState { status: String },

    #[error("Event '{event}' is not allowed from {from}")]
    TransitionNotAllowed { from: String, event: String },

    #[error("Transition guard failed: {0}")]
    GuardFailed(String),

    #[error("Invalid severity legend: {0}")]
    InvalidLegend(String),

    #[error("Heatmap is partial: skipped targets {skipped_targets:?}")]
    PartialResult { skipped_targets: Vec<String> },

    #[error("Farm '{0}' not found")]
    FarmNotFound(String),

    #[error("Session '{0}' not found")]
    SessionNotFound(String),

    #[error("Section '{section_id}' not found in session '{session_id}'")]
    SectionNotFound { session_id: String, section_id: String },

    #[error("Section '{section_id}' belongs to session '{owner}'")]
    SectionOwnedElsewhere { section_id: String, owner: String },

    #[error("Target '{0}' not found")]
    TargetNotFound(String),

    #[error("Invalid period: {0}")]
    InvalidPeriod(String),
}

impl ScoutingError {
    /// Conditions the caller is expected to handle (retry, re-fetch, prompt the user)
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            ScoutingError::VersionConflict { .. }
                | ScoutingError::TerminalState { .. }
                | ScoutingError::GuardFailed(_)
                | ScoutingError::PartialResult { .. }
        )
    }
}

// Errors cross the collaborator boundary as plain messages
impl Serialize for ScoutingError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(self.to_string().as_ref())
    }
}

pub type ScoutingResult<T> = Result<T, ScoutingError>;
