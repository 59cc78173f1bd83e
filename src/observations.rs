//! Observation upsert
//!
//! Validates an upsert request against the session, the target's current grid
//! and the species catalog, then hands it to the store as a compare-and-swap
//! write. All validation happens before the store is touched.
//!
//! Order of checks:
//! 1. count is non-negative
//! 2. species code is known
//! 3. session exists and is not terminal
//! 4. section exists, its target and farm exist
//! 5. coordinate is inside the target's grid and the section's tag filters
//! 6. store write with the caller's expected version

use crate::data::{Observation, ObservationUpsert};
use crate::error::{ScoutingError, ScoutingResult};
use crate::grid::validate_coordinate;
use crate::species::{normalize_code, SpeciesCatalog};
use crate::store::ScoutingStore;
use crate::utils::Versioned;

/// Create or update the observation at the request's natural key
pub fn upsert_observation<S: ScoutingStore>(
    store: &mut S,
    catalog: &SpeciesCatalog,
    request: ObservationUpsert,
) -> ScoutingResult<Versioned<Observation>> {
    if request.count < 0 {
        return Err(ScoutingError::InvalidCount { count: request.count });
    }
    let count = u32::try_from(request.count)
        .map_err(|_| ScoutingError::InvalidCount { count: request.count })?;

    let species_code = normalize_code(&request.species_code);
    let category = catalog.category_of(&species_code)?;

    let session = store
        .session(&request.session_id)
        .ok_or_else(|| ScoutingError::SessionNotFound(request.session_id.clone()))?;
    if session.value.status.is_terminal() {
        return Err(ScoutingError::TerminalState {
            status: session.value.status.to_string(),
        });
    }

    let section = session
        .value
        .section(&request.session_target_id)
        .ok_or_else(|| ScoutingError::SectionNotFound {
            session_id: request.session_id.clone(),
            section_id: request.session_target_id.clone(),
        })?;
    let target = store
        .target(&section.target_id)
        .ok_or_else(|| ScoutingError::TargetNotFound(section.target_id.clone()))?;
    let farm = store
        .farm(&target.farm_id)
        .ok_or_else(|| ScoutingError::FarmNotFound(target.farm_id.clone()))?;

    validate_coordinate(&target, &farm.grid, &request.coordinate)?;
    section.includes(&target, &request.coordinate)?;

    let observation = Observation {
        session_id: request.session_id,
        session_target_id: request.session_target_id,
        coordinate: request.coordinate,
        species_code,
        category,
        count,
        notes: request.notes.filter(|n| !n.trim().is_empty()),
        scout_id: Some(session.value.scout_id.clone()),
        recorded_at: request.recorded_at,
    };

    match store.put_observation(observation, request.expected_version) {
        Ok(written) => {
            tracing::debug!(
                "Upserted {:?} at version {}",
                written.value.key(),
                written.version
            );
            Ok(written)
        }
        Err(err) => {
            // Conflicts are an expected outcome for the caller, not a fault
            tracing::debug!("Upsert rejected: {}", err);
            Err(err)
        }
    }
}
