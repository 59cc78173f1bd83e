//! Scouting service facade
//!
//! Wires an injected `ScoutingStore` to the heatmap builder, the species
//! catalog and the session state machine. Every query reads the store fresh;
//! nothing is cached between calls.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::analytics::{monthly_summary, weekly_summary, MonthlyStats, WeeklyStats};
use crate::data::{Farm, Observation, ObservationUpsert, ScoutingSession};
use crate::error::{ScoutingError, ScoutingResult};
use crate::heatmap::{HeatmapBuilder, HeatmapCell, HeatmapSection, HeatmapStats, SkippedTarget};
use crate::observations;
use crate::session::{aggregate_session, transition, SessionEvent, SessionStats};
use crate::severity::{LegendBand, SeverityLegend};
use crate::species::SpeciesCatalog;
use crate::store::ScoutingStore;
use crate::utils::{weeks_overlapping_month, IsoWeekPeriod, Versioned};

/// Heatmap query result, as returned to screens
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeatmapResponse {
    pub farm_id: String,
    pub farm_name: String,
    pub week: u32,
    pub year: i32,
    /// Farm default grid; per-target shapes are on `sections`
    pub bay_count: i32,
    pub benches_per_bay: i32,
    pub cells: Vec<HeatmapCell>,
    pub sections: Vec<HeatmapSection>,
    pub severity_legend: Vec<LegendBand>,
    pub stats: HeatmapStats,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub skipped_targets: Vec<SkippedTarget>,
    #[serde(default)]
    pub dropped_observations: u64,
}

pub struct ScoutingService<S: ScoutingStore> {
    store: S,
    builder: HeatmapBuilder,
    catalog: SpeciesCatalog,
}

impl<S: ScoutingStore> ScoutingService<S> {
    pub fn new(store: S, legend: SeverityLegend, catalog: SpeciesCatalog) -> Self {
        Self {
            store,
            builder: HeatmapBuilder::new(legend),
            catalog,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn catalog(&self) -> &SpeciesCatalog {
        &self.catalog
    }

    pub fn legend(&self) -> &SeverityLegend {
        self.builder.legend()
    }

    fn farm(&self, farm_id: &str) -> ScoutingResult<Farm> {
        self.store
            .farm(farm_id)
            .ok_or_else(|| ScoutingError::FarmNotFound(farm_id.to_string()))
    }

    fn sessions_in(&self, farm_id: &str, period: &IsoWeekPeriod) -> Vec<Versioned<ScoutingSession>> {
        self.store.sessions_between(farm_id, period.start, period.end)
    }

    /// Heatmap of a farm for ISO week `week` of `year`
    pub fn get_heatmap(&self, farm_id: &str, week: u32, year: i32) -> ScoutingResult<HeatmapResponse> {
        let farm = self.farm(farm_id)?;
        let period = IsoWeekPeriod::new(year, week)?;
        let targets = self.store.targets_for_farm(farm_id);
        let sessions = self.sessions_in(farm_id, &period);

        let heatmap = self.builder.build(&farm, &targets, &sessions, &period);
        if heatmap.is_partial() {
            tracing::warn!(
                "Heatmap for farm '{}' {}-W{:02} is partial: {} targets skipped",
                farm.id,
                year,
                week,
                heatmap.skipped_targets.len()
            );
        }

        Ok(HeatmapResponse {
            farm_id: farm.id,
            farm_name: farm.name,
            week,
            year,
            bay_count: farm.grid.bay_count,
            benches_per_bay: farm.grid.benches_per_bay,
            cells: heatmap.cells,
            sections: heatmap.sections,
            severity_legend: heatmap.severity_legend,
            stats: heatmap.stats,
            skipped_targets: heatmap.skipped_targets,
            dropped_observations: heatmap.dropped_observations,
        })
    }

    pub fn get_weekly_analytics(&self, farm_id: &str, week: u32, year: i32) -> ScoutingResult<WeeklyStats> {
        let farm = self.farm(farm_id)?;
        let period = IsoWeekPeriod::new(year, week)?;
        let targets = self.store.targets_for_farm(farm_id);
        let sessions = self.sessions_in(farm_id, &period);
        weekly_summary(&self.builder, &self.catalog, &farm, &targets, &sessions, &period)
    }

    pub fn get_monthly_report(&self, farm_id: &str, year: i32, month: u32) -> ScoutingResult<MonthlyStats> {
        let farm = self.farm(farm_id)?;
        let targets = self.store.targets_for_farm(farm_id);
        let weeks: Vec<(IsoWeekPeriod, Vec<Versioned<ScoutingSession>>)> = weeks_overlapping_month(year, month)?
            .into_iter()
            .map(|period| {
                let sessions = self.sessions_in(farm_id, &period);
                (period, sessions)
            })
            .collect();
        monthly_summary(&self.builder, &self.catalog, &farm, &targets, year, month, &weeks)
    }

    pub fn get_session_stats(&self, session_id: &str) -> ScoutingResult<SessionStats> {
        let session = self
            .store
            .session(session_id)
            .ok_or_else(|| ScoutingError::SessionNotFound(session_id.to_string()))?;
        aggregate_session(&session.value, &self.catalog)
    }

    pub fn upsert_observation(&mut self, request: ObservationUpsert) -> ScoutingResult<Versioned<Observation>> {
        observations::upsert_observation(&mut self.store, &self.catalog, request)
    }

    /// Apply a lifecycle event and persist the result under the same version check
    pub fn transition_session(
        &mut self,
        session_id: &str,
        event: SessionEvent,
        expected_version: Option<u64>,
        now: DateTime<Utc>,
    ) -> ScoutingResult<Versioned<ScoutingSession>> {
        let session = self
            .store
            .session(session_id)
            .ok_or_else(|| ScoutingError::SessionNotFound(session_id.to_string()))?;

        let result = transition(&session, event, expected_version, now)
            .and_then(|next| self.store.put_session(next, expected_version));

        match &result {
            Ok(written) => tracing::info!(
                "Session '{}' {} -> {} (version {})",
                session_id,
                event,
                written.value.status,
                written.version
            ),
            Err(err) if err.is_recoverable() => {
                tracing::debug!("Transition {} on session '{}' rejected: {}", event, session_id, err)
            }
            Err(err) => tracing::warn!("Transition {} on session '{}' failed: {}", event, session_id, err),
        }

        result
    }
}
