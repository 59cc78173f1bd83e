//! Session Aggregator
//!
//! Rolls a session's observations into per-category totals and drives the
//! session lifecycle:
//!
//! | From               | Event    | To          | Guard                                         |
//! |--------------------|----------|-------------|-----------------------------------------------|
//! | DRAFT              | start    | IN_PROGRESS | at least one section                          |
//! | IN_PROGRESS        | complete | COMPLETED   | every section scouted, confirmation, version  |
//! | DRAFT, IN_PROGRESS | cancel   | CANCELLED   |                                               |
//! | COMPLETED, CANCELLED | any    |             | fails with TerminalState                      |
//!
//! Every transition is a compare-and-swap on the session version.

use chrono::{DateTime, Utc};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::data::{ScoutingSession, SessionStatus};
use crate::error::{ScoutingError, ScoutingResult};
use crate::species::{SpeciesCatalog, SpeciesCategory};
use crate::utils::Versioned;

/// Per-category totals for a session
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStats {
    /// Number of observation records
    pub total_observations: u64,
    pub pest_count: u64,
    pub disease_count: u64,
    pub beneficial_count: u64,
    pub sections: Vec<SectionStats>,
    /// Species sorted by total count (descending), then code
    pub species: Vec<SpeciesTally>,
}

impl SessionStats {
    /// Sum of all counts (beneficials included)
    pub fn total_count(&self) -> u64 {
        self.pest_count + self.disease_count + self.beneficial_count
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SectionStats {
    pub section_id: String,
    pub target_id: String,
    pub observation_count: u64,
    pub pest_count: u64,
    pub disease_count: u64,
    pub beneficial_count: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpeciesTally {
    pub species_code: String,
    pub category: SpeciesCategory,
    pub count: u64,
}

/// Category totals accumulator shared by session and section stats
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct CategoryTotals {
    pub pest: u64,
    pub disease: u64,
    pub beneficial: u64,
}

impl CategoryTotals {
    pub fn add(&mut self, category: SpeciesCategory, count: u64) {
        match category {
            SpeciesCategory::Pest => self.pest += count,
            SpeciesCategory::Disease => self.disease += count,
            SpeciesCategory::Beneficial => self.beneficial += count,
        }
    }
}

/// Sum counts by category across every section of the session.
///
/// Categories are re-derived from the species code through the catalog;
/// unknown codes fail with `UnknownSpecies`.
pub fn aggregate_session(
    session: &ScoutingSession,
    catalog: &SpeciesCatalog,
) -> ScoutingResult<SessionStats> {
    let mut stats = SessionStats::default();
    let mut totals = CategoryTotals::default();
    let mut by_species: FxHashMap<String, (SpeciesCategory, u64)> = FxHashMap::default();

    for section in &session.sections {
        let mut section_totals = CategoryTotals::default();
        for observation in &section.observations {
            let obs = &observation.value;
            let category = catalog.category_of(&obs.species_code)?;
            let count = u64::from(obs.count);

            section_totals.add(category, count);
            totals.add(category, count);
            by_species
                .entry(obs.species_code.clone())
                .or_insert((category, 0))
                .1 += count;
        }

        stats.sections.push(SectionStats {
            section_id: section.id.clone(),
            target_id: section.target_id.clone(),
            observation_count: section.observations.len() as u64,
            pest_count: section_totals.pest,
            disease_count: section_totals.disease,
            beneficial_count: section_totals.beneficial,
        });
        stats.total_observations += section.observations.len() as u64;
    }

    stats.pest_count = totals.pest;
    stats.disease_count = totals.disease;
    stats.beneficial_count = totals.beneficial;
    stats.species = rank_species(by_species);

    Ok(stats)
}

pub(crate) fn rank_species(by_species: FxHashMap<String, (SpeciesCategory, u64)>) -> Vec<SpeciesTally> {
    let mut species: Vec<SpeciesTally> = by_species
        .into_iter()
        .map(|(species_code, (category, count))| SpeciesTally {
            species_code,
            category,
            count,
        })
        .collect();
    species.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.species_code.cmp(&b.species_code)));
    species
}

/// In progress, and no section left unscouted
pub fn can_complete(session: &ScoutingSession) -> bool {
    session.status == SessionStatus::InProgress
        && session.sections.iter().all(|s| !s.observations.is_empty())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionEvent {
    Start,
    #[serde(rename_all = "camelCase")]
    Complete { confirmation_acknowledged: bool },
    Cancel,
}

impl fmt::Display for SessionEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            SessionEvent::Start => "start",
            SessionEvent::Complete { .. } => "complete",
            SessionEvent::Cancel => "cancel",
        };
        f.write_str(label)
    }
}

/// Apply `event` to the session, returning the successor state.
///
/// The caller persists the result with the same `expected_version`.
pub fn transition(
    session: &Versioned<ScoutingSession>,
    event: SessionEvent,
    expected_version: Option<u64>,
    now: DateTime<Utc>,
) -> ScoutingResult<ScoutingSession> {
    let current = &session.value;
    if current.status.is_terminal() {
        return Err(ScoutingError::TerminalState {
            status: current.status.to_string(),
        });
    }
    session.ensure_current(expected_version)?;

    let mut next = current.clone();
    match (current.status, event) {
        (SessionStatus::Draft, SessionEvent::Start) => {
            if current.sections.is_empty() {
                return Err(ScoutingError::GuardFailed(
                    "session has no targets to scout".to_string(),
                ));
            }
            next.status = SessionStatus::InProgress;
        }
        (SessionStatus::InProgress, SessionEvent::Complete { confirmation_acknowledged }) => {
            if !confirmation_acknowledged {
                return Err(ScoutingError::GuardFailed(
                    "completion must be explicitly confirmed".to_string(),
                ));
            }
            if !can_complete(current) {
                let unscouted: Vec<&str> = current
                    .sections
                    .iter()
                    .filter(|s| s.observations.is_empty())
                    .map(|s| s.id.as_str())
                    .collect();
                return Err(ScoutingError::GuardFailed(format!(
                    "sections without observations: {}",
                    unscouted.join(", ")
                )));
            }
            next.status = SessionStatus::Completed;
            next.completed_at = Some(now);
        }
        (SessionStatus::Draft | SessionStatus::InProgress, SessionEvent::Cancel) => {
            next.status = SessionStatus::Cancelled;
        }
        (from, event) => {
            return Err(ScoutingError::TransitionNotAllowed {
                from: from.to_string(),
                event: event.to_string(),
            });
        }
    }

    Ok(next)
}
