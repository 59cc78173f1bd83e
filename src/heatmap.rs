//! Heatmap Builder
//!
//! Turns the observations of a farm's sessions for one ISO week into a dense
//! (bay, bench) grid per target, classifies every cell through the severity
//! legend and reports farm-wide statistics.
//!
//! Algorithm:
//! 1. Keep targets active in the period and resolve their shapes (farm
//!    defaults fill unset dimensions). Targets with an invalid shape are
//!    skipped and reported; the rest of the farm is still built.
//! 2. Initialize every cell of every kept target to zero (dense output).
//! 3. Accumulate each observation's count into its (bay, bench) cell, split by
//!    category. Cancelled sessions contribute nothing.
//! 4. `totalCount = pest + disease + beneficial`, classified as a whole.
//! 5. Emit per-target sections, the flattened cell list and the legend.
//!
//! The builder holds no state besides the legend; two builds over the same
//! inputs produce identical output.

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::data::{Farm, ScoutingSession, SessionStatus};
use crate::error::{ScoutingError, ScoutingResult};
use crate::grid::{resolve_tag, ScoutingTarget, TagKind, TargetShape};
use crate::session::CategoryTotals;
use crate::severity::{LegendBand, SeverityLegend, SeverityLevel};
use crate::species::SpeciesCategory;
use crate::utils::{IsoWeekPeriod, Versioned};

/// One (bay, bench) cell; coordinates are relative to its target
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeatmapCell {
    pub target_id: String,
    pub bay_index: i32,
    pub bench_index: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bay_tag: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bench_tag: Option<String>,
    pub pest_count: u64,
    pub disease_count: u64,
    pub beneficial_count: u64,
    pub total_count: u64,
    pub severity_level: SeverityLevel,
    pub color_hex: String,
}

/// Aggregate statistics over a set of cells
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeatmapStats {
    pub cell_count: u64,
    pub total: u64,
    /// `round(total / cellCount)`, 0 for an empty grid
    pub average: u64,
    pub max: u64,
    /// Cells classified VERY_HIGH or EMERGENCY
    pub hotspots: u64,
}

impl HeatmapStats {
    pub fn from_cells<'a, I>(cells: I) -> Self
    where
        I: IntoIterator<Item = &'a HeatmapCell>,
    {
        let mut stats = HeatmapStats::default();
        for cell in cells {
            stats.cell_count += 1;
            stats.total += cell.total_count;
            stats.max = stats.max.max(cell.total_count);
            if cell.severity_level.is_hotspot() {
                stats.hotspots += 1;
            }
        }
        if stats.cell_count > 0 {
            stats.average = (stats.total as f64 / stats.cell_count as f64).round() as u64;
        }
        stats
    }
}

/// Sub-grid for one target
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeatmapSection {
    pub target_id: String,
    pub target_name: String,
    pub shape: TargetShape,
    pub bay_count: i32,
    pub benches_per_bay: i32,
    pub cells: Vec<HeatmapCell>,
    pub stats: HeatmapStats,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SkippedTarget {
    pub target_id: String,
    pub reason: String,
}

/// Result of one build; `skipped_targets` non-empty means a partial result
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Heatmap {
    pub cells: Vec<HeatmapCell>,
    pub sections: Vec<HeatmapSection>,
    pub severity_legend: Vec<LegendBand>,
    pub stats: HeatmapStats,
    pub skipped_targets: Vec<SkippedTarget>,
    /// Observations whose (bay, bench) no longer fits the target's shape
    pub dropped_observations: u64,
}

impl Heatmap {
    pub fn is_partial(&self) -> bool {
        !self.skipped_targets.is_empty()
    }

    /// Zero targets in scope: "no data", not an error
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Turn a degraded result into `PartialResult` for callers that want all-or-nothing
    pub fn into_strict(self) -> ScoutingResult<Self> {
        if self.is_partial() {
            return Err(ScoutingError::PartialResult {
                skipped_targets: self.skipped_targets.into_iter().map(|s| s.target_id).collect(),
            });
        }
        Ok(self)
    }
}

/// Per-target accumulation grid, row-major by bay
struct TargetGrid<'a> {
    target: &'a ScoutingTarget,
    shape: TargetShape,
    cells: Vec<CategoryTotals>,
}

impl<'a> TargetGrid<'a> {
    fn new(target: &'a ScoutingTarget, shape: TargetShape) -> Self {
        Self {
            target,
            shape,
            cells: vec![CategoryTotals::default(); shape.cell_count()],
        }
    }

    fn slot(&self, bay: i32, bench: i32) -> Option<usize> {
        if bay < 0 || bench < 0 || bay >= self.shape.bay_count() || bench >= self.shape.benches_per_bay() {
            return None;
        }
        Some(bay as usize * self.shape.benches_per_bay() as usize + bench as usize)
    }
}

/// Builds heatmaps against one validated legend
#[derive(Debug, Clone)]
pub struct HeatmapBuilder {
    legend: SeverityLegend,
}

impl HeatmapBuilder {
    pub fn new(legend: SeverityLegend) -> Self {
        Self { legend }
    }

    pub fn legend(&self) -> &SeverityLegend {
        &self.legend
    }

    /// Build the week's heatmap for a farm.
    ///
    /// `targets` are the farm's configured targets; `sessions` are the sessions
    /// scheduled in the period. Targets inactive in the period are left out.
    pub fn build(
        &self,
        farm: &Farm,
        targets: &[ScoutingTarget],
        sessions: &[Versioned<ScoutingSession>],
        period: &IsoWeekPeriod,
    ) -> Heatmap {
        let mut ordered: Vec<&ScoutingTarget> = targets
            .iter()
            .filter(|t| t.is_active_between(period.start, period.end))
            .collect();
        ordered.sort_by(|a, b| a.id.cmp(&b.id));

        // STEP 1-2: resolve shapes, allocate dense grids
        let mut grids: Vec<TargetGrid> = Vec::with_capacity(ordered.len());
        let mut skipped_targets = Vec::new();
        for target in ordered {
            let shape = target.shape(&farm.grid);
            match shape.validate(&target.id) {
                Ok(()) => grids.push(TargetGrid::new(target, shape)),
                Err(err) => {
                    tracing::warn!("Skipping target '{}' in heatmap: {}", target.id, err);
                    skipped_targets.push(SkippedTarget {
                        target_id: target.id.clone(),
                        reason: err.to_string(),
                    });
                }
            }
        }

        let grid_index: FxHashMap<String, usize> = grids
            .iter()
            .enumerate()
            .map(|(idx, grid)| (grid.target.id.clone(), idx))
            .collect();

        // STEP 3: accumulate observations
        let mut dropped_observations = 0u64;
        for session in sessions.iter().filter(|s| s.value.status != SessionStatus::Cancelled) {
            for section in &session.value.sections {
                let Some(&grid_idx) = grid_index.get(section.target_id.as_str()) else {
                    continue; // Target skipped or inactive
                };
                let grid = &mut grids[grid_idx];
                for observation in &section.observations {
                    let obs = &observation.value;
                    match grid.slot(obs.coordinate.bay_index, obs.coordinate.bench_index) {
                        Some(slot) => grid.cells[slot].add(obs.category, u64::from(obs.count)),
                        None => {
                            dropped_observations += 1;
                            tracing::warn!(
                                "Dropping observation {:?}: outside current shape of target '{}'",
                                obs.key(),
                                grid.target.id
                            );
                        }
                    }
                }
            }
        }

        // STEP 4-5: classify and emit
        let sections: Vec<HeatmapSection> = grids.iter().map(|grid| self.emit_section(grid)).collect();
        let cells: Vec<HeatmapCell> = sections.iter().flat_map(|s| s.cells.iter().cloned()).collect();
        let stats = HeatmapStats::from_cells(&cells);

        tracing::debug!(
            "Built heatmap for farm '{}' {}-W{:02}: {} cells, {} hotspots, {} skipped",
            farm.id,
            period.year,
            period.week,
            stats.cell_count,
            stats.hotspots,
            skipped_targets.len()
        );

        Heatmap {
            cells,
            sections,
            severity_legend: self.legend.bands().to_vec(),
            stats,
            skipped_targets,
            dropped_observations,
        }
    }

    fn emit_section(&self, grid: &TargetGrid) -> HeatmapSection {
        let benches = grid.shape.benches_per_bay();
        let cells: Vec<HeatmapCell> = grid
            .cells
            .iter()
            .enumerate()
            .map(|(slot, totals)| {
                let bay_index = slot as i32 / benches;
                let bench_index = slot as i32 % benches;
                self.classify_cell(grid.target, bay_index, bench_index, totals)
            })
            .collect();
        let stats = HeatmapStats::from_cells(&cells);

        HeatmapSection {
            target_id: grid.target.id.clone(),
            target_name: grid.target.name.clone(),
            shape: grid.shape,
            bay_count: grid.shape.bay_count(),
            benches_per_bay: benches,
            cells,
            stats,
        }
    }

    fn classify_cell(
        &self,
        target: &ScoutingTarget,
        bay_index: i32,
        bench_index: i32,
        totals: &CategoryTotals,
    ) -> HeatmapCell {
        // Beneficial counts are part of the classified total
        let total_count = totals.pest + totals.disease + totals.beneficial;
        let severity_level = self.legend.classify(total_count);
        HeatmapCell {
            target_id: target.id.clone(),
            bay_index,
            bench_index,
            bay_tag: resolve_tag(target, TagKind::Bay, bay_index).map(str::to_string),
            bench_tag: resolve_tag(target, TagKind::Bench, bench_index).map(str::to_string),
            pest_count: totals.pest,
            disease_count: totals.disease,
            beneficial_count: totals.beneficial,
            total_count,
            severity_level,
            color_hex: self.legend.color_of(severity_level).to_string(),
        }
    }
}

/// Count of cells per severity level, ZERO first
pub fn severity_histogram<'a, I>(cells: I) -> [u64; 6]
where
    I: IntoIterator<Item = &'a HeatmapCell>,
{
    let mut histogram = [0u64; 6];
    for cell in cells {
        histogram[cell.severity_level.ordinal() as usize] += 1;
    }
    histogram
}

/// Total per category over a set of cells
pub fn category_totals<'a, I>(cells: I) -> FxHashMap<SpeciesCategory, u64>
where
    I: IntoIterator<Item = &'a HeatmapCell>,
{
    let mut totals: FxHashMap<SpeciesCategory, u64> = FxHashMap::default();
    for cell in cells {
        *totals.entry(SpeciesCategory::Pest).or_insert(0) += cell.pest_count;
        *totals.entry(SpeciesCategory::Disease).or_insert(0) += cell.disease_count;
        *totals.entry(SpeciesCategory::Beneficial).or_insert(0) += cell.beneficial_count;
    }
    totals
}
