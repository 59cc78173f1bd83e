//! Optimistic-concurrency wrapper
//!
//! Every mutable record (observations, sessions) is stored as a `Versioned<T>`.
//! A write succeeds only when the caller's expected version equals the stored
//! version; otherwise it is rejected with `VersionConflict` and nothing
//! changes. There is no merge and no locking.

use serde::{Deserialize, Serialize};

use crate::error::{ScoutingError, ScoutingResult};

/// Version assigned to a newly created record
pub const INITIAL_VERSION: u64 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Versioned<T> {
    pub version: u64,
    #[serde(flatten)]
    pub value: T,
}

impl<T> Versioned<T> {
    pub fn initial(value: T) -> Self {
        Self {
            version: INITIAL_VERSION,
            value,
        }
    }

    /// Succeeds only if `expected` names the current version
    pub fn ensure_current(&self, expected: Option<u64>) -> ScoutingResult<()> {
        match expected {
            Some(v) if v == self.version => Ok(()),
            _ => Err(ScoutingError::VersionConflict {
                current_version: self.version,
            }),
        }
    }

    /// Successor record carrying `value` at `version + 1`
    pub fn succeed(&self, value: T) -> Versioned<T> {
        Versioned {
            version: self.version + 1,
            value,
        }
    }
}

/// Compare-and-swap over an optional current record.
///
/// | current | expected | outcome                                   |
/// |---------|----------|-------------------------------------------|
/// | none    | none     | create at version 1                       |
/// | none    | some     | conflict, current version 0               |
/// | some(v) | some(v)  | replace at v + 1                          |
/// | some(v) | other    | conflict, current version v               |
pub fn compare_and_swap<T>(
    current: Option<&Versioned<T>>,
    expected: Option<u64>,
    value: T,
) -> ScoutingResult<Versioned<T>> {
    match current {
        None => match expected {
            None => Ok(Versioned::initial(value)),
            Some(_) => Err(ScoutingError::VersionConflict { current_version: 0 }),
        },
        Some(existing) => {
            existing.ensure_current(expected)?;
            Ok(existing.succeed(value))
        }
    }
}
