//! Observation store interface
//!
//! The persistent store is an external collaborator reached through
//! request/response calls. This module defines the contract the core relies on
//! (`ScoutingStore`) and an in-memory reference implementation with the exact
//! compare-and-swap semantics the external store must reproduce.
//!
//! Observations are keyed by `(sessionTargetId, bay, bench, spot, speciesCode)`
//! with one integer version per key. A successful observation write also
//! advances the owning session's version, so a completion racing an edit is
//! detected as a conflict.

use anyhow::{Context, Result};
use chrono::NaiveDate;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::data::{Farm, Observation, ObservationKey, ScoutingSession};
use crate::error::{ScoutingError, ScoutingResult};
use crate::grid::ScoutingTarget;
use crate::species::{normalize_code, SpeciesCatalog};
use crate::utils::{compare_and_swap, Versioned};

/// Contract between the core and whatever store is injected.
///
/// Reads return owned snapshots. Writes are compare-and-swap: a stale or
/// missing expected version is rejected with `VersionConflict` and the stored
/// record is left untouched.
pub trait ScoutingStore {
    fn farm(&self, farm_id: &str) -> Option<Farm>;

    fn targets_for_farm(&self, farm_id: &str) -> Vec<ScoutingTarget>;

    fn target(&self, target_id: &str) -> Option<ScoutingTarget>;

    /// Session with every section's observations attached
    fn session(&self, session_id: &str) -> Option<Versioned<ScoutingSession>>;

    /// Sessions of a farm scheduled within `[start, end]`, ordered by date then id
    fn sessions_between(
        &self,
        farm_id: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Vec<Versioned<ScoutingSession>>;

    fn observation(&self, key: &ObservationKey) -> Option<Versioned<Observation>>;

    /// Compare-and-swap write of one observation
    fn put_observation(
        &mut self,
        observation: Observation,
        expected_version: Option<u64>,
    ) -> ScoutingResult<Versioned<Observation>>;

    /// Compare-and-swap write of a session header (sections' observations are ignored)
    fn put_session(
        &mut self,
        session: ScoutingSession,
        expected_version: Option<u64>,
    ) -> ScoutingResult<Versioned<ScoutingSession>>;
}

/// Serialized store contents, used to seed the in-memory store
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreSnapshot {
    #[serde(default)]
    pub farms: Vec<Farm>,
    #[serde(default)]
    pub targets: Vec<ScoutingTarget>,
    #[serde(default)]
    pub sessions: Vec<Versioned<ScoutingSession>>,
}

/// Reference store backed by hash maps
#[derive(Debug, Default, Clone)]
pub struct InMemoryStore {
    farms: FxHashMap<String, Farm>,
    targets: FxHashMap<String, ScoutingTarget>,
    /// Session headers; section observation lists are always empty here
    sessions: FxHashMap<String, Versioned<ScoutingSession>>,
    observations: FxHashMap<ObservationKey, Versioned<Observation>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a JSON snapshot from disk; species codes are checked against `catalog`
    pub fn load(path: &Path, catalog: &SpeciesCatalog) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read store snapshot: {:?}", path))?;

        let snapshot: StoreSnapshot = serde_json::from_str(&contents)
            .with_context(|| "Failed to parse store snapshot JSON")?;

        let store = Self::from_snapshot(snapshot, catalog)
            .with_context(|| format!("Invalid store snapshot: {:?}", path))?;

        tracing::info!(
            "Loaded snapshot: {} farms, {} targets, {} sessions, {} observations",
            store.farms.len(),
            store.targets.len(),
            store.sessions.len(),
            store.observations.len()
        );
        Ok(store)
    }

    /// Build a store from a snapshot.
    ///
    /// Species codes are normalized and categories re-derived from `catalog`
    /// before keys are compared, so case variants of one code collide. A section
    /// id may belong to one session only.
    pub fn from_snapshot(snapshot: StoreSnapshot, catalog: &SpeciesCatalog) -> Result<Self> {
        let mut store = Self::new();
        for farm in snapshot.farms {
            store.insert_farm(farm);
        }
        for target in snapshot.targets {
            store.insert_target(target);
        }
        for mut session in snapshot.sessions {
            let session_id = session.value.id.clone();
            if store.sessions.contains_key(&session_id) {
                anyhow::bail!("Duplicate session id '{}'", session_id);
            }
            store
                .check_section_ownership(&session.value)
                .with_context(|| format!("Session '{}' reuses a section id", session_id))?;

            for section in session.value.sections.iter_mut() {
                for mut observation in section.observations.drain(..) {
                    let obs = &mut observation.value;
                    if obs.session_id != session_id {
                        anyhow::bail!(
                            "Observation in section '{}' names session '{}', expected '{}'",
                            section.id,
                            obs.session_id,
                            session_id
                        );
                    }

                    obs.species_code = normalize_code(&obs.species_code);
                    let category = catalog.category_of(&obs.species_code).with_context(|| {
                        format!("Observation in section '{}' has an unknown species", section.id)
                    })?;
                    if category != obs.category {
                        tracing::warn!(
                            "Observation {} in section '{}' stored as {:?}, catalog says {:?}",
                            obs.species_code,
                            section.id,
                            obs.category,
                            category
                        );
                        obs.category = category;
                    }

                    let key = obs.key();
                    if key.session_target_id != section.id {
                        anyhow::bail!(
                            "Observation {:?} is listed under section '{}'",
                            key,
                            section.id
                        );
                    }
                    if store.observations.insert(key.clone(), observation).is_some() {
                        anyhow::bail!("Duplicate observation key {:?}", key);
                    }
                }
            }
            store.sessions.insert(session_id, session);
        }
        Ok(store)
    }

    pub fn insert_farm(&mut self, farm: Farm) {
        self.farms.insert(farm.id.clone(), farm);
    }

    pub fn insert_target(&mut self, target: ScoutingTarget) {
        self.targets.insert(target.id.clone(), target);
    }

    /// Seed a session at version 1, replacing any existing one with the same id
    pub fn insert_session(&mut self, mut session: ScoutingSession) -> ScoutingResult<()> {
        self.check_section_ownership(&session)?;
        for section in session.sections.iter_mut() {
            section.observations.clear();
        }
        self.sessions
            .insert(session.id.clone(), Versioned::initial(session));
        Ok(())
    }

    /// Every section id of `session` must be unused by other sessions
    fn check_section_ownership(&self, session: &ScoutingSession) -> ScoutingResult<()> {
        for section in &session.sections {
            let owner = self
                .sessions
                .values()
                .find(|other| other.value.id != session.id && other.value.section(&section.id).is_some());
            if let Some(owner) = owner {
                return Err(ScoutingError::SectionOwnedElsewhere {
                    section_id: section.id.clone(),
                    owner: owner.value.id.clone(),
                });
            }
        }
        Ok(())
    }

    fn assemble(&self, header: &Versioned<ScoutingSession>) -> Versioned<ScoutingSession> {
        let mut session = header.clone();
        let session_id = session.value.id.clone();
        for section in session.value.sections.iter_mut() {
            let mut observations: Vec<Versioned<Observation>> = self
                .observations
                .iter()
                .filter(|(key, obs)| {
                    key.session_target_id == section.id && obs.value.session_id == session_id
                })
                .map(|(_, obs)| obs.clone())
                .collect();
            observations.sort_by(|a, b| a.value.key().cmp(&b.value.key()));
            section.observations = observations;
        }
        session
    }
}

impl ScoutingStore for InMemoryStore {
    fn farm(&self, farm_id: &str) -> Option<Farm> {
        self.farms.get(farm_id).cloned()
    }

    fn targets_for_farm(&self, farm_id: &str) -> Vec<ScoutingTarget> {
        let mut targets: Vec<ScoutingTarget> = self
            .targets
            .values()
            .filter(|t| t.farm_id == farm_id)
            .cloned()
            .collect();
        targets.sort_by(|a, b| a.id.cmp(&b.id));
        targets
    }

    fn target(&self, target_id: &str) -> Option<ScoutingTarget> {
        self.targets.get(target_id).cloned()
    }

    fn session(&self, session_id: &str) -> Option<Versioned<ScoutingSession>> {
        self.sessions.get(session_id).map(|s| self.assemble(s))
    }

    fn sessions_between(
        &self,
        farm_id: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Vec<Versioned<ScoutingSession>> {
        let mut sessions: Vec<Versioned<ScoutingSession>> = self
            .sessions
            .values()
            .filter(|s| {
                s.value.farm_id == farm_id
                    && s.value.scheduled_on >= start
                    && s.value.scheduled_on <= end
            })
            .map(|s| self.assemble(s))
            .collect();
        sessions.sort_by(|a, b| {
            (a.value.scheduled_on, &a.value.id).cmp(&(b.value.scheduled_on, &b.value.id))
        });
        sessions
    }

    fn observation(&self, key: &ObservationKey) -> Option<Versioned<Observation>> {
        self.observations.get(key).cloned()
    }

    fn put_observation(
        &mut self,
        observation: Observation,
        expected_version: Option<u64>,
    ) -> ScoutingResult<Versioned<Observation>> {
        let session_id = observation.session_id.clone();
        let session = self
            .sessions
            .get(&session_id)
            .ok_or_else(|| ScoutingError::SessionNotFound(session_id.clone()))?;
        if session.value.section(&observation.session_target_id).is_none() {
            return Err(ScoutingError::SectionNotFound {
                session_id,
                section_id: observation.session_target_id,
            });
        }

        let key = observation.key();
        let current = self.observations.get(&key);
        if let Some(existing) = current {
            if existing.value.session_id != session_id {
                return Err(ScoutingError::SectionOwnedElsewhere {
                    section_id: key.session_target_id,
                    owner: existing.value.session_id.clone(),
                });
            }
        }
        let written = compare_and_swap(current, expected_version, observation)?;
        self.observations.insert(key, written.clone());

        if let Some(session) = self.sessions.get_mut(&session_id) {
            session.version += 1;
        }

        Ok(written)
    }

    fn put_session(
        &mut self,
        mut session: ScoutingSession,
        expected_version: Option<u64>,
    ) -> ScoutingResult<Versioned<ScoutingSession>> {
        self.check_section_ownership(&session)?;
        for section in session.sections.iter_mut() {
            section.observations.clear();
        }
        let id = session.id.clone();
        let written = compare_and_swap(self.sessions.get(&id), expected_version, session)?;
        self.sessions.insert(id, written.clone());
        Ok(self.assemble(&written))
    }
}
