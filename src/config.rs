//! Runtime configuration
//!
//! Paths come from environment variables; any unset path falls back to the
//! built-in reference data. A legend file that fails validation is a startup
//! error, never a silent fallback.

use anyhow::{Context, Result};
use std::path::PathBuf;

use crate::service::ScoutingService;
use crate::severity::SeverityLegend;
use crate::species::SpeciesCatalog;
use crate::store::InMemoryStore;

pub const LEGEND_ENV: &str = "SCOUTING_LEGEND";
pub const SPECIES_ENV: &str = "SCOUTING_SPECIES";
pub const SNAPSHOT_ENV: &str = "SCOUTING_SNAPSHOT";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CoreConfig {
    /// Severity legend JSON (list of bands)
    pub legend_path: Option<PathBuf>,
    /// Species catalog JSON (`speciesCode -> category`)
    pub species_path: Option<PathBuf>,
    /// Store snapshot JSON (`farms`, `targets`, `sessions`)
    pub snapshot_path: Option<PathBuf>,
}

impl CoreConfig {
    pub fn from_env() -> Self {
        let config = Self {
            legend_path: path_from_env(LEGEND_ENV),
            species_path: path_from_env(SPECIES_ENV),
            snapshot_path: path_from_env(SNAPSHOT_ENV),
        };

        tracing::info!("Configuration:");
        tracing::info!("  {}: {:?}", LEGEND_ENV, config.legend_path);
        tracing::info!("  {}: {:?}", SPECIES_ENV, config.species_path);
        tracing::info!("  {}: {:?}", SNAPSHOT_ENV, config.snapshot_path);
        config
    }

    pub fn load_legend(&self) -> Result<SeverityLegend> {
        match &self.legend_path {
            Some(path) => SeverityLegend::load(path),
            None => Ok(SeverityLegend::default()),
        }
    }

    pub fn load_catalog(&self) -> Result<SpeciesCatalog> {
        match &self.species_path {
            Some(path) => SpeciesCatalog::load(path),
            None => Ok(SpeciesCatalog::default()),
        }
    }

    /// Snapshot store; empty when no snapshot is configured
    pub fn load_store(&self, catalog: &SpeciesCatalog) -> Result<InMemoryStore> {
        match &self.snapshot_path {
            Some(path) => InMemoryStore::load(path, catalog),
            None => Ok(InMemoryStore::new()),
        }
    }

    /// Load legend, catalog and store, in that order
    pub fn build_service(&self) -> Result<ScoutingService<InMemoryStore>> {
        let legend = self.load_legend().context("Severity legend rejected")?;
        let catalog = self.load_catalog()?;
        let store = self.load_store(&catalog)?;
        Ok(ScoutingService::new(store, legend, catalog))
    }
}

fn path_from_env(name: &str) -> Option<PathBuf> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
}
