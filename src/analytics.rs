//! Weekly / Monthly Analytics Roll-up
//!
//! Combines heatmaps (see `heatmap`) and session statistics (see `session`)
//! over ISO weeks. A month is summarized through the ISO weeks that overlap
//! it, one heatmap per week, so a week straddling two months contributes to
//! both monthly reports.
//!
//! Cancelled sessions are counted in the status breakdown but contribute no
//! observations, species or scouts.

use chrono::NaiveDate;
use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};

use crate::data::{Farm, ScoutingSession, SessionStatus};
use crate::error::ScoutingResult;
use crate::grid::ScoutingTarget;
use crate::heatmap::{HeatmapBuilder, HeatmapStats, SkippedTarget};
use crate::session::{aggregate_session, rank_species, SpeciesTally};
use crate::severity::SeverityLevel;
use crate::species::{SpeciesCatalog, SpeciesCategory};
use crate::utils::{IsoWeekPeriod, Versioned};

/// Number of species listed in `topSpecies`
pub const TOP_SPECIES_LIMIT: usize = 5;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStatusCounts {
    pub draft: u64,
    pub in_progress: u64,
    pub completed: u64,
    pub cancelled: u64,
}

impl SessionStatusCounts {
    fn record(&mut self, status: SessionStatus) {
        match status {
            SessionStatus::Draft => self.draft += 1,
            SessionStatus::InProgress => self.in_progress += 1,
            SessionStatus::Completed => self.completed += 1,
            SessionStatus::Cancelled => self.cancelled += 1,
        }
    }

    pub fn total(&self) -> u64 {
        self.draft + self.in_progress + self.completed + self.cancelled
    }

    /// Completed share of the sessions that were not cancelled (0 when none)
    pub fn completion_rate(&self) -> f64 {
        let live = self.total() - self.cancelled;
        if live == 0 {
            return 0.0;
        }
        self.completed as f64 / live as f64
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WeeklyStats {
    pub farm_id: String,
    pub year: i32,
    pub week: u32,
    pub period_start: NaiveDate,
    pub period_end: NaiveDate,
    pub heatmap: HeatmapStats,
    pub sessions: SessionStatusCounts,
    pub completion_rate: f64,
    pub total_observations: u64,
    pub pest_count: u64,
    pub disease_count: u64,
    pub beneficial_count: u64,
    pub top_species: Vec<SpeciesTally>,
    pub skipped_targets: Vec<SkippedTarget>,
}

/// An ISO week identified by its ISO year
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IsoWeekId {
    pub year: i32,
    pub week: u32,
}

/// One point of the monthly trend series
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WeekTrendPoint {
    pub year: i32,
    pub week: u32,
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub total: u64,
    pub average: u64,
    pub max: u64,
    pub hotspots: u64,
    pub observations: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonthlyStats {
    pub farm_id: String,
    pub year: i32,
    pub month: u32,
    pub total_observations: u64,
    pub total_count: u64,
    pub distinct_species: Vec<String>,
    pub distinct_species_count: u64,
    /// Mean severity ordinal (ZERO = 0 .. EMERGENCY = 5) over every weekly cell
    pub average_severity: f64,
    pub average_severity_level: SeverityLevel,
    pub worst_severity: SeverityLevel,
    /// Week with the highest single-cell total (earliest on ties)
    pub worst_week: Option<IsoWeekId>,
    pub active_scouts: u64,
    pub top_species: Vec<SpeciesTally>,
    pub trend: Vec<WeekTrendPoint>,
    pub skipped_targets: Vec<SkippedTarget>,
}

/// Observation/category/species totals across several sessions
#[derive(Debug, Default)]
struct SessionRollup {
    statuses: SessionStatusCounts,
    total_observations: u64,
    pest: u64,
    disease: u64,
    beneficial: u64,
    species: FxHashMap<String, (SpeciesCategory, u64)>,
    scouts: FxHashSet<String>,
}

impl SessionRollup {
    fn add(&mut self, session: &ScoutingSession, catalog: &SpeciesCatalog) -> ScoutingResult<()> {
        self.statuses.record(session.status);
        if session.status == SessionStatus::Cancelled {
            return Ok(());
        }

        let stats = aggregate_session(session, catalog)?;
        self.total_observations += stats.total_observations;
        self.pest += stats.pest_count;
        self.disease += stats.disease_count;
        self.beneficial += stats.beneficial_count;
        for tally in stats.species {
            self.species
                .entry(tally.species_code)
                .or_insert((tally.category, 0))
                .1 += tally.count;
        }
        self.scouts.insert(session.scout_id.clone());
        Ok(())
    }

    fn top_species(&self) -> Vec<SpeciesTally> {
        let mut ranked = rank_species(self.species.clone());
        ranked.truncate(TOP_SPECIES_LIMIT);
        ranked
    }

    /// Species with a non-zero total, sorted by code
    fn detected_species(&self) -> Vec<String> {
        let mut detected: Vec<String> = self
            .species
            .iter()
            .filter(|(_, (_, count))| *count > 0)
            .map(|(code, _)| code.clone())
            .collect();
        detected.sort();
        detected
    }
}

/// Summarize one ISO week: heatmap statistics plus session roll-up
pub fn weekly_summary(
    builder: &HeatmapBuilder,
    catalog: &SpeciesCatalog,
    farm: &Farm,
    targets: &[ScoutingTarget],
    sessions: &[Versioned<ScoutingSession>],
    period: &IsoWeekPeriod,
) -> ScoutingResult<WeeklyStats> {
    let in_week: Vec<Versioned<ScoutingSession>> = sessions
        .iter()
        .filter(|s| period.contains(s.value.scheduled_on))
        .cloned()
        .collect();

    let heatmap = builder.build(farm, targets, &in_week, period);

    let mut rollup = SessionRollup::default();
    for session in &in_week {
        rollup.add(&session.value, catalog)?;
    }

    Ok(WeeklyStats {
        farm_id: farm.id.clone(),
        year: period.year,
        week: period.week,
        period_start: period.start,
        period_end: period.end,
        heatmap: heatmap.stats,
        sessions: rollup.statuses,
        completion_rate: rollup.statuses.completion_rate(),
        total_observations: rollup.total_observations,
        pest_count: rollup.pest,
        disease_count: rollup.disease,
        beneficial_count: rollup.beneficial,
        top_species: rollup.top_species(),
        skipped_targets: heatmap.skipped_targets,
    })
}

/// Summarize a calendar month through its overlapping ISO weeks.
///
/// `weeks` holds each overlapping week with the sessions scheduled in it.
pub fn monthly_summary(
    builder: &HeatmapBuilder,
    catalog: &SpeciesCatalog,
    farm: &Farm,
    targets: &[ScoutingTarget],
    year: i32,
    month: u32,
    weeks: &[(IsoWeekPeriod, Vec<Versioned<ScoutingSession>>)],
) -> ScoutingResult<MonthlyStats> {
    let mut rollup = SessionRollup::default();
    let mut trend = Vec::with_capacity(weeks.len());
    let mut skipped: Vec<SkippedTarget> = Vec::new();

    let mut severity_sum: u64 = 0;
    let mut severity_cells: u64 = 0;
    let mut worst_severity = SeverityLevel::Zero;
    let mut worst_week: Option<(u64, IsoWeekId)> = None;
    let mut total_count: u64 = 0;

    for (period, sessions) in weeks {
        let in_week: Vec<Versioned<ScoutingSession>> = sessions
            .iter()
            .filter(|s| period.contains(s.value.scheduled_on))
            .cloned()
            .collect();

        let heatmap = builder.build(farm, targets, &in_week, period);
        for cell in &heatmap.cells {
            severity_sum += u64::from(cell.severity_level.ordinal());
            severity_cells += 1;
            worst_severity = worst_severity.max(cell.severity_level);
        }
        total_count += heatmap.stats.total;

        if heatmap.stats.max > 0 && worst_week.map_or(true, |(max, _)| heatmap.stats.max > max) {
            worst_week = Some((heatmap.stats.max, IsoWeekId { year: period.year, week: period.week }));
        }

        let before = rollup.total_observations;
        for session in &in_week {
            rollup.add(&session.value, catalog)?;
        }

        trend.push(WeekTrendPoint {
            year: period.year,
            week: period.week,
            start: period.start,
            end: period.end,
            total: heatmap.stats.total,
            average: heatmap.stats.average,
            max: heatmap.stats.max,
            hotspots: heatmap.stats.hotspots,
            observations: rollup.total_observations - before,
        });

        for target in heatmap.skipped_targets {
            if !skipped.iter().any(|s| s.target_id == target.target_id) {
                skipped.push(target);
            }
        }
    }

    let average_severity = if severity_cells > 0 {
        severity_sum as f64 / severity_cells as f64
    } else {
        0.0
    };
    let average_severity_level =
        SeverityLevel::from_ordinal(average_severity.round() as u8).unwrap_or(SeverityLevel::Zero);

    let distinct_species = rollup.detected_species();

    Ok(MonthlyStats {
        farm_id: farm.id.clone(),
        year,
        month,
        total_observations: rollup.total_observations,
        total_count,
        distinct_species_count: distinct_species.len() as u64,
        distinct_species,
        average_severity,
        average_severity_level,
        worst_severity,
        worst_week: worst_week.map(|(_, id)| id),
        active_scouts: rollup.scouts.len() as u64,
        top_species: rollup.top_species(),
        trend,
        skipped_targets: skipped,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{Observation, SessionSection};
    use crate::grid::{GridCoordinate, GridDefaults, TargetConfig};
    use crate::severity::SeverityLegend;
    use crate::utils::weeks_overlapping_month;
    use approx::assert_relative_eq;

    fn farm() -> Farm {
        Farm {
            id: "farm-1".into(),
            name: "Sunny Acres".into(),
            grid: GridDefaults { bay_count: 2, benches_per_bay: 2, spot_checks_per_bench: 1 },
            disabled: false,
        }
    }

    fn targets() -> Vec<ScoutingTarget> {
        vec![ScoutingTarget {
            id: "gh-1".into(),
            farm_id: "farm-1".into(),
            name: "Greenhouse 1".into(),
            config: TargetConfig::Greenhouse {
                bay_count: None,
                benches_per_bay: None,
                spot_checks_per_bench: None,
            },
            bay_tags: vec![],
            bench_tags: vec![],
            active_from: None,
            active_until: None,
        }]
    }

    fn session(
        id: &str,
        scout: &str,
        date: &str,
        status: SessionStatus,
        observations: &[(i32, i32, &str, SpeciesCategory, u32)],
    ) -> Versioned<ScoutingSession> {
        let section_id = format!("{}-st", id);
        let mut section = SessionSection::new(&section_id, "gh-1");
        for &(bay, bench, species, category, count) in observations {
            section.observations.push(Versioned::initial(Observation {
                session_id: id.into(),
                session_target_id: section_id.clone(),
                coordinate: GridCoordinate::new(bay, bench, 0),
                species_code: species.into(),
                category,
                count,
                notes: None,
                scout_id: Some(scout.into()),
                recorded_at: None,
            }));
        }
        Versioned::initial(ScoutingSession {
            id: id.into(),
            farm_id: "farm-1".into(),
            scout_id: scout.into(),
            scheduled_on: NaiveDate::parse_from_str(date, "%Y-%m-%d").unwrap(),
            status,
            sections: vec![section],
            completed_at: None,
        })
    }

    #[test]
    fn test_weekly_summary_combines_heatmap_and_sessions() {
        let builder = HeatmapBuilder::new(SeverityLegend::default());
        let sessions = vec![
            session("s-1", "ana", "2024-03-05", SessionStatus::Completed, &[
                (0, 0, "THRIPS", SpeciesCategory::Pest, 6),
                (1, 1, "POWDERY_MILDEW", SpeciesCategory::Disease, 35),
            ]),
            session("s-2", "ben", "2024-03-07", SessionStatus::Cancelled, &[
                (0, 1, "APHIDS", SpeciesCategory::Pest, 50),
            ]),
            session("s-3", "ana", "2024-03-08", SessionStatus::InProgress, &[
                (0, 0, "LADYBUGS", SpeciesCategory::Beneficial, 2),
            ]),
        ];
        let period = IsoWeekPeriod::new(2024, 10).unwrap();
        let stats = weekly_summary(&builder, &SpeciesCatalog::default(), &farm(), &targets(), &sessions, &period)
            .unwrap();

        assert_eq!(stats.heatmap.total, 43);
        assert_eq!(stats.heatmap.hotspots, 1);
        assert_eq!(stats.sessions.completed, 1);
        assert_eq!(stats.sessions.cancelled, 1);
        assert_relative_eq!(stats.completion_rate, 0.5);
        assert_eq!(stats.total_observations, 3);
        assert_eq!(stats.pest_count, 6);
        assert_eq!(stats.disease_count, 35);
        assert_eq!(stats.beneficial_count, 2);
        assert_eq!(stats.top_species[0].species_code, "POWDERY_MILDEW");
        assert!(stats.top_species.iter().all(|s| s.species_code != "APHIDS"));
    }

    #[test]
    fn test_weekly_summary_ignores_sessions_outside_week() {
        let builder = HeatmapBuilder::new(SeverityLegend::default());
        let sessions = vec![session("s-1", "ana", "2024-03-11", SessionStatus::Completed, &[
            (0, 0, "THRIPS", SpeciesCategory::Pest, 6),
        ])];
        let period = IsoWeekPeriod::new(2024, 10).unwrap();
        let stats = weekly_summary(&builder, &SpeciesCatalog::default(), &farm(), &targets(), &sessions, &period)
            .unwrap();
        assert_eq!(stats.heatmap.total, 0);
        assert_eq!(stats.sessions.total(), 0);
        assert_eq!(stats.completion_rate, 0.0);
    }

    #[test]
    fn test_monthly_summary() {
        let builder = HeatmapBuilder::new(SeverityLegend::default());
        let weeks: Vec<(IsoWeekPeriod, Vec<Versioned<ScoutingSession>>)> = weeks_overlapping_month(2024, 3)
            .unwrap()
            .into_iter()
            .map(|period| {
                let sessions = match period.week {
                    10 => vec![session("s-1", "ana", "2024-03-05", SessionStatus::Completed, &[
                        (0, 0, "THRIPS", SpeciesCategory::Pest, 6),
                        (1, 1, "POWDERY_MILDEW", SpeciesCategory::Disease, 35),
                    ])],
                    12 => vec![
                        session("s-2", "ben", "2024-03-19", SessionStatus::Completed, &[
                            (0, 1, "THRIPS", SpeciesCategory::Pest, 3),
                        ]),
                        session("s-3", "cy", "2024-03-20", SessionStatus::Cancelled, &[
                            (0, 1, "WHITEFLY", SpeciesCategory::Pest, 3),
                        ]),
                    ],
                    _ => vec![],
                };
                (period, sessions)
            })
            .collect();

        let stats = monthly_summary(&builder, &SpeciesCatalog::default(), &farm(), &targets(), 2024, 3, &weeks)
            .unwrap();

        assert_eq!(stats.trend.len(), 5);
        assert_eq!(stats.total_observations, 3);
        assert_eq!(stats.total_count, 44);
        assert_eq!(stats.distinct_species, vec!["POWDERY_MILDEW".to_string(), "THRIPS".to_string()]);
        assert_eq!(stats.active_scouts, 2);
        assert_eq!(stats.worst_severity, SeverityLevel::Emergency);
        assert_eq!(stats.worst_week, Some(IsoWeekId { year: 2024, week: 10 }));
        // 20 cells: MODERATE(2) + EMERGENCY(5) + LOW(1) = 8
        assert_relative_eq!(stats.average_severity, 0.4, epsilon = 1e-9);
        assert_eq!(stats.average_severity_level, SeverityLevel::Zero);
        assert_eq!(stats.trend[1].observations, 2);
        assert_eq!(stats.trend[3].total, 3);
    }

    #[test]
    fn test_worst_week_keeps_iso_year() {
        let builder = HeatmapBuilder::new(SeverityLegend::default());
        let weeks: Vec<(IsoWeekPeriod, Vec<Versioned<ScoutingSession>>)> = weeks_overlapping_month(2021, 1)
            .unwrap()
            .into_iter()
            .map(|period| {
                let sessions = if period.year == 2020 {
                    vec![session("s-1", "ana", "2021-01-01", SessionStatus::Completed, &[
                        (0, 0, "THRIPS", SpeciesCategory::Pest, 12),
                    ])]
                } else {
                    vec![]
                };
                (period, sessions)
            })
            .collect();

        let stats = monthly_summary(&builder, &SpeciesCatalog::default(), &farm(), &targets(), 2021, 1, &weeks)
            .unwrap();
        assert_eq!(stats.worst_week, Some(IsoWeekId { year: 2020, week: 53 }));
        let json = serde_json::to_value(&stats).unwrap();
        assert_eq!(json["worstWeek"]["year"], 2020);
    }

    #[test]
    fn test_monthly_summary_without_data() {
        let builder = HeatmapBuilder::new(SeverityLegend::default());
        let weeks: Vec<(IsoWeekPeriod, Vec<Versioned<ScoutingSession>>)> = weeks_overlapping_month(2024, 2)
            .unwrap()
            .into_iter()
            .map(|p| (p, vec![]))
            .collect();
        let stats = monthly_summary(&builder, &SpeciesCatalog::default(), &farm(), &[], 2024, 2, &weeks)
            .unwrap();
        assert_eq!(stats.total_count, 0);
        assert_eq!(stats.worst_week, None);
        assert_eq!(stats.worst_severity, SeverityLevel::Zero);
        assert_eq!(stats.average_severity, 0.0);
    }
}
