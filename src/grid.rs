//! Grid Addressing
//!
//! Defines the (bay, bench, spot) coordinate space of a scouting target and
//! validates coordinates against it. A target is either a greenhouse (bays ×
//! benches × spot checks) or a field block (bays × spot checks, one implicit
//! bench per bay). Shape fields left unset on the target fall back to the
//! farm's defaults.
//!
//! Tags are human labels looked up by index. Several bays may share a tag, so a
//! tag never identifies a unique index.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Upper bound on (bay, bench) cells per target
pub const MAX_CELLS_PER_TARGET: i64 = 1_000_000;

/// Axis of the scouting grid
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GridAxis {
    Bay,
    Bench,
    Spot,
}

impl fmt::Display for GridAxis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            GridAxis::Bay => "bay",
            GridAxis::Bench => "bench",
            GridAxis::Spot => "spot",
        };
        f.write_str(label)
    }
}

/// Kind of tag lookup (spots carry no tags)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagKind {
    Bay,
    Bench,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GridError {
    #[error("{axis} index {index} is outside 0..{limit}")]
    OutOfBounds { axis: GridAxis, index: i32, limit: i32 },

    #[error("target '{target_id}' has an invalid shape: {reason}")]
    InvalidShape { target_id: String, reason: String },

    #[error("{axis} index {index} is excluded by the section's tag filter")]
    ExcludedByFilter { axis: GridAxis, index: i32 },
}

/// A (bay, bench, spot) triple as supplied by the caller.
///
/// Indices are signed so that negative input is rejected by validation rather
/// than by deserialization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GridCoordinate {
    pub bay_index: i32,
    pub bench_index: i32,
    pub spot_index: i32,
}

impl GridCoordinate {
    pub fn new(bay_index: i32, bench_index: i32, spot_index: i32) -> Self {
        Self { bay_index, bench_index, spot_index }
    }
}

/// Farm-level default grid shape
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GridDefaults {
    pub bay_count: i32,
    pub benches_per_bay: i32,
    pub spot_checks_per_bench: i32,
}

impl Default for GridDefaults {
    fn default() -> Self {
        Self {
            bay_count: 1,
            benches_per_bay: 1,
            spot_checks_per_bench: 1,
        }
    }
}

/// Resolved grid shape of a target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TargetShape {
    #[serde(rename_all = "camelCase")]
    Greenhouse {
        bay_count: i32,
        benches_per_bay: i32,
        spot_checks_per_bench: i32,
    },
    #[serde(rename_all = "camelCase")]
    FieldBlock {
        bay_count: i32,
        spot_checks_per_bay: i32,
    },
}

impl TargetShape {
    pub fn bay_count(&self) -> i32 {
        match *self {
            TargetShape::Greenhouse { bay_count, .. } => bay_count,
            TargetShape::FieldBlock { bay_count, .. } => bay_count,
        }
    }

    /// Field blocks have a single implicit bench per bay
    pub fn benches_per_bay(&self) -> i32 {
        match *self {
            TargetShape::Greenhouse { benches_per_bay, .. } => benches_per_bay,
            TargetShape::FieldBlock { .. } => 1,
        }
    }

    pub fn spots_per_bench(&self) -> i32 {
        match *self {
            TargetShape::Greenhouse { spot_checks_per_bench, .. } => spot_checks_per_bench,
            TargetShape::FieldBlock { spot_checks_per_bay, .. } => spot_checks_per_bay,
        }
    }

    /// Number of (bay, bench) heatmap cells
    pub fn cell_count(&self) -> usize {
        (self.bay_count().max(0) as usize) * (self.benches_per_bay().max(0) as usize)
    }

    /// Every dimension must be at least 1 and the grid at most
    /// `MAX_CELLS_PER_TARGET` cells
    pub fn validate(&self, target_id: &str) -> Result<(), GridError> {
        let dims = [
            ("bayCount", self.bay_count()),
            ("benchesPerBay", self.benches_per_bay()),
            ("spotChecks", self.spots_per_bench()),
        ];
        for (name, value) in dims {
            if value <= 0 {
                return Err(GridError::InvalidShape {
                    target_id: target_id.to_string(),
                    reason: format!("{} must be positive, got {}", name, value),
                });
            }
        }
        let cells = i64::from(self.bay_count()) * i64::from(self.benches_per_bay());
        if cells > MAX_CELLS_PER_TARGET {
            return Err(GridError::InvalidShape {
                target_id: target_id.to_string(),
                reason: format!("{} cells exceeds the limit of {}", cells, MAX_CELLS_PER_TARGET),
            });
        }
        Ok(())
    }

    /// Check that every index lies in `0..count` for its axis
    pub fn validate_coordinate(&self, coord: &GridCoordinate) -> Result<(), GridError> {
        check_axis(GridAxis::Bay, coord.bay_index, self.bay_count())?;
        check_axis(GridAxis::Bench, coord.bench_index, self.benches_per_bay())?;
        check_axis(GridAxis::Spot, coord.spot_index, self.spots_per_bench())?;
        Ok(())
    }
}

fn check_axis(axis: GridAxis, index: i32, limit: i32) -> Result<(), GridError> {
    if index < 0 || index >= limit {
        return Err(GridError::OutOfBounds { axis, index, limit });
    }
    Ok(())
}

/// Per-target shape overrides; `None` falls back to the farm default
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TargetConfig {
    #[serde(rename_all = "camelCase")]
    Greenhouse {
        #[serde(default)]
        bay_count: Option<i32>,
        #[serde(default)]
        benches_per_bay: Option<i32>,
        #[serde(default)]
        spot_checks_per_bench: Option<i32>,
    },
    #[serde(rename_all = "camelCase")]
    FieldBlock {
        #[serde(default)]
        bay_count: Option<i32>,
        #[serde(default)]
        spot_checks_per_bay: Option<i32>,
    },
}

/// A greenhouse or field block being scouted
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoutingTarget {
    pub id: String,
    pub farm_id: String,
    pub name: String,
    pub config: TargetConfig,
    /// Tag per bay index (`None` = untagged)
    #[serde(default)]
    pub bay_tags: Vec<Option<String>>,
    /// Tag per bench index (`None` = untagged)
    #[serde(default)]
    pub bench_tags: Vec<Option<String>>,
    #[serde(default)]
    pub active_from: Option<NaiveDate>,
    #[serde(default)]
    pub active_until: Option<NaiveDate>,
}

impl ScoutingTarget {
    /// Resolve the grid shape, filling unset fields from the farm defaults
    pub fn shape(&self, defaults: &GridDefaults) -> TargetShape {
        match self.config {
            TargetConfig::Greenhouse {
                bay_count,
                benches_per_bay,
                spot_checks_per_bench,
            } => TargetShape::Greenhouse {
                bay_count: bay_count.unwrap_or(defaults.bay_count),
                benches_per_bay: benches_per_bay.unwrap_or(defaults.benches_per_bay),
                spot_checks_per_bench: spot_checks_per_bench
                    .unwrap_or(defaults.spot_checks_per_bench),
            },
            TargetConfig::FieldBlock {
                bay_count,
                spot_checks_per_bay,
            } => TargetShape::FieldBlock {
                bay_count: bay_count.unwrap_or(defaults.bay_count),
                spot_checks_per_bay: spot_checks_per_bay
                    .unwrap_or(defaults.spot_checks_per_bench),
            },
        }
    }

    /// Whether the target's activity window intersects `[start, end]`
    pub fn is_active_between(&self, start: NaiveDate, end: NaiveDate) -> bool {
        let started = self.active_from.map_or(true, |from| from <= end);
        let not_retired = self.active_until.map_or(true, |until| until >= start);
        started && not_retired
    }
}

/// Validate a coordinate against a target's current configuration
pub fn validate_coordinate(
    target: &ScoutingTarget,
    defaults: &GridDefaults,
    coord: &GridCoordinate,
) -> Result<(), GridError> {
    let shape = target.shape(defaults);
    shape.validate(&target.id)?;
    shape.validate_coordinate(coord)
}

/// Tag configured at `index`, if any (index lookup, never reverse lookup)
pub fn resolve_tag(target: &ScoutingTarget, kind: TagKind, index: i32) -> Option<&str> {
    if index < 0 {
        return None;
    }
    let tags = match kind {
        TagKind::Bay => &target.bay_tags,
        TagKind::Bench => &target.bench_tags,
    };
    tags.get(index as usize)
        .and_then(|tag| tag.as_deref())
        .filter(|tag| !tag.trim().is_empty())
}
