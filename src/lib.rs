//! Scouting Heatmap Core
//!
//! Pest and disease scouting for greenhouses and field blocks: observations
//! are recorded per grid cell, rolled up per session, classified into severity
//! bands and rendered as weekly heatmaps with monthly analytics.
//!
//! Module layout:
//! - `grid`: bay/bench/spot addressing and target shapes
//! - `species`: species code → category catalog
//! - `data`: farms, sessions, sections and observations
//! - `store`: optimistic-concurrency store contract + in-memory store
//! - `observations`: validated observation upsert
//! - `session`: session aggregation and lifecycle state machine
//! - `severity`: severity levels and the validated legend
//! - `heatmap`: dense per-week heatmap builder
//! - `analytics`: weekly and monthly roll-ups
//! - `service`: facade over an injected store
//! - `config`: environment-driven loading of legend, catalog and snapshot
//! - `utils/`: version wrapper and ISO week arithmetic

pub mod error;
pub mod utils;
pub mod grid;
pub mod species;
pub mod data;
pub mod store;
pub mod observations;
pub mod session;
pub mod severity;
pub mod heatmap;
pub mod analytics;
pub mod service;
pub mod config;

// Re-export commonly used types
pub use error::{ScoutingError, ScoutingResult};
pub use utils::{compare_and_swap, IsoWeekPeriod, Versioned};
pub use grid::{GridCoordinate, GridDefaults, GridError, ScoutingTarget, TargetConfig, TargetShape};
pub use species::{SpeciesCatalog, SpeciesCategory};
pub use data::{Farm, Observation, ObservationKey, ObservationUpsert, ScoutingSession, SessionSection, SessionStatus};
pub use store::{InMemoryStore, ScoutingStore, StoreSnapshot};
pub use session::{aggregate_session, can_complete, transition, SessionEvent, SessionStats};
pub use severity::{LegendBand, SeverityLegend, SeverityLevel};
pub use heatmap::{Heatmap, HeatmapBuilder, HeatmapCell, HeatmapSection, HeatmapStats};
pub use analytics::{IsoWeekId, MonthlyStats, WeeklyStats};
pub use service::{HeatmapResponse, ScoutingService};
pub use config::CoreConfig;
