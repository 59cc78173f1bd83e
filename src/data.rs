//! Scouting domain records
//!
//! Farms own targets (see `grid`), sessions own sections, sections own
//! observations. Sessions and observations are mutable and therefore carried as
//! `Versioned<T>`; everything else is configuration read from the store.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::fmt;

use crate::grid::{resolve_tag, GridAxis, GridCoordinate, GridDefaults, GridError, ScoutingTarget, TagKind};
use crate::species::SpeciesCategory;
use crate::utils::Versioned;

/// Root tenant
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Farm {
    pub id: String,
    pub name: String,
    /// Grid shape used when a target leaves a dimension unset
    pub grid: GridDefaults,
    /// Soft-disable flag (subscription lapsed); farms are never deleted
    #[serde(default)]
    pub disabled: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionStatus {
    Draft,
    InProgress,
    Completed,
    Cancelled,
}

impl SessionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionStatus::Completed | SessionStatus::Cancelled)
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            SessionStatus::Draft => "DRAFT",
            SessionStatus::InProgress => "IN_PROGRESS",
            SessionStatus::Completed => "COMPLETED",
            SessionStatus::Cancelled => "CANCELLED",
        };
        f.write_str(label)
    }
}

/// Natural key of an observation (at most one record per key)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObservationKey {
    pub session_target_id: String,
    pub bay_index: i32,
    pub bench_index: i32,
    pub spot_index: i32,
    pub species_code: String,
}

impl ObservationKey {
    pub fn new(session_target_id: &str, coord: GridCoordinate, species_code: &str) -> Self {
        Self {
            session_target_id: session_target_id.to_string(),
            bay_index: coord.bay_index,
            bench_index: coord.bench_index,
            spot_index: coord.spot_index,
            species_code: species_code.to_string(),
        }
    }

    pub fn coordinate(&self) -> GridCoordinate {
        GridCoordinate::new(self.bay_index, self.bench_index, self.spot_index)
    }
}

/// One count of one species at one grid spot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Observation {
    pub session_id: String,
    pub session_target_id: String,
    #[serde(flatten)]
    pub coordinate: GridCoordinate,
    pub species_code: String,
    pub category: SpeciesCategory,
    pub count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scout_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recorded_at: Option<DateTime<Utc>>,
}

impl Observation {
    pub fn key(&self) -> ObservationKey {
        ObservationKey::new(&self.session_target_id, self.coordinate, &self.species_code)
    }
}

/// Tag list for a section filter; most filters name one or two tags
pub type TagFilter = SmallVec<[String; 4]>;

/// The slice of a session scoped to one target
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSection {
    /// Session-target id; observation keys reference this
    pub id: String,
    pub target_id: String,
    /// Only bays carrying one of these tags are scouted (empty = all)
    #[serde(default)]
    pub bay_tags: TagFilter,
    /// Only benches carrying one of these tags are scouted (empty = all)
    #[serde(default)]
    pub bench_tags: TagFilter,
    #[serde(default)]
    pub observations: Vec<Versioned<Observation>>,
}

impl SessionSection {
    pub fn new(id: &str, target_id: &str) -> Self {
        Self {
            id: id.to_string(),
            target_id: target_id.to_string(),
            bay_tags: TagFilter::new(),
            bench_tags: TagFilter::new(),
            observations: Vec::new(),
        }
    }

    /// Check the coordinate against the section's tag filters
    pub fn includes(&self, target: &ScoutingTarget, coord: &GridCoordinate) -> Result<(), GridError> {
        if !tag_allowed(&self.bay_tags, resolve_tag(target, TagKind::Bay, coord.bay_index)) {
            return Err(GridError::ExcludedByFilter {
                axis: GridAxis::Bay,
                index: coord.bay_index,
            });
        }
        if !tag_allowed(&self.bench_tags, resolve_tag(target, TagKind::Bench, coord.bench_index)) {
            return Err(GridError::ExcludedByFilter {
                axis: GridAxis::Bench,
                index: coord.bench_index,
            });
        }
        Ok(())
    }
}

fn tag_allowed(filter: &TagFilter, tag: Option<&str>) -> bool {
    if filter.is_empty() {
        return true;
    }
    match tag {
        Some(tag) => filter.iter().any(|f| f.eq_ignore_ascii_case(tag)),
        None => false,
    }
}

/// A dated scouting round against one farm
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoutingSession {
    pub id: String,
    pub farm_id: String,
    pub scout_id: String,
    pub scheduled_on: NaiveDate,
    pub status: SessionStatus,
    #[serde(default)]
    pub sections: Vec<SessionSection>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl ScoutingSession {
    pub fn section(&self, section_id: &str) -> Option<&SessionSection> {
        self.sections.iter().find(|s| s.id == section_id)
    }

    /// All observations across sections, in section order
    pub fn observations(&self) -> impl Iterator<Item = &Versioned<Observation>> {
        self.sections.iter().flat_map(|s| s.observations.iter())
    }
}

/// Mutation request for a single observation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObservationUpsert {
    pub session_id: String,
    pub session_target_id: String,
    pub coordinate: GridCoordinate,
    pub species_code: String,
    /// Signed so that negative counts reach validation
    pub count: i64,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub expected_version: Option<u64>,
    #[serde(default)]
    pub recorded_at: Option<DateTime<Utc>>,
}
