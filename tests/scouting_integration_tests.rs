//! Scouting Integration Tests
//!
//! Drives the service facade over the in-memory store: concurrency law on
//! observation upserts, the session lifecycle, heatmap output and the
//! weekly/monthly roll-ups.
//! Run with: cargo test --test scouting_integration_tests

use approx::assert_relative_eq;
use chrono::{TimeZone, Utc};
use serde_json::json;

use scouting_heatmap::{
    GridCoordinate, InMemoryStore, ObservationKey, ObservationUpsert, ScoutingError, ScoutingService,
    ScoutingStore, SessionEvent, SessionStatus, SeverityLegend, SeverityLevel, SpeciesCatalog,
    StoreSnapshot,
};

// Helper: farm with one 2x2 greenhouse and two sessions in 2024-W10
fn snapshot() -> StoreSnapshot {
    serde_json::from_value(json!({
        "farms": [{
            "id": "farm-1",
            "name": "Sunny Acres",
            "grid": { "bayCount": 2, "benchesPerBay": 2, "spotChecksPerBench": 1 }
        }],
        "targets": [
            {
                "id": "gh-1",
                "farmId": "farm-1",
                "name": "Greenhouse 1",
                "config": { "kind": "GREENHOUSE" },
                "bayTags": ["North", "South"]
            },
            {
                "id": "gh-2",
                "farmId": "farm-1",
                "name": "Greenhouse 2",
                "config": { "kind": "GREENHOUSE" }
            }
        ],
        "sessions": [
            {
                "id": "s-1",
                "version": 1,
                "farmId": "farm-1",
                "scoutId": "ana",
                "scheduledOn": "2024-03-05",
                "status": "IN_PROGRESS",
                "sections": [
                    { "id": "st-1", "targetId": "gh-1" },
                    { "id": "st-2", "targetId": "gh-2" }
                ]
            },
            {
                "id": "s-2",
                "version": 1,
                "farmId": "farm-1",
                "scoutId": "ben",
                "scheduledOn": "2024-03-19",
                "status": "DRAFT",
                "sections": [
                    { "id": "st-3", "targetId": "gh-1", "bayTags": ["north"] }
                ]
            }
        ]
    }))
    .expect("snapshot fixture parses")
}

fn service_from(snapshot: StoreSnapshot) -> ScoutingService<InMemoryStore> {
    let store = InMemoryStore::from_snapshot(snapshot, &SpeciesCatalog::default()).expect("snapshot is consistent");
    ScoutingService::new(store, SeverityLegend::default(), SpeciesCatalog::default())
}

fn service() -> ScoutingService<InMemoryStore> {
    service_from(snapshot())
}

// Helper: snapshot fixture with extra JSON merged into session `index`
fn snapshot_with(index: usize, patch: serde_json::Value) -> StoreSnapshot {
    let mut value = serde_json::to_value(snapshot()).unwrap();
    let session = value["sessions"][index].as_object_mut().unwrap();
    for (k, v) in patch.as_object().unwrap() {
        session.insert(k.clone(), v.clone());
    }
    serde_json::from_value(value).unwrap()
}

fn upsert(
    section: &str,
    coord: (i32, i32),
    species: &str,
    count: i64,
    expected_version: Option<u64>,
) -> ObservationUpsert {
    ObservationUpsert {
        session_id: if section == "st-3" { "s-2" } else { "s-1" }.into(),
        session_target_id: section.into(),
        coordinate: GridCoordinate::new(coord.0, coord.1, 0),
        species_code: species.into(),
        count,
        notes: None,
        expected_version,
        recorded_at: None,
    }
}

// =========================================================================
// Section 1: Optimistic concurrency
// =========================================================================

#[test]
fn test_conflict_law() {
    let mut svc = service();

    let v1 = svc.upsert_observation(upsert("st-1", (0, 0), "THRIPS", 3, None)).unwrap();
    assert_eq!(v1.version, 1);

    let v2 = svc.upsert_observation(upsert("st-1", (0, 0), "THRIPS", 4, Some(1))).unwrap();
    assert_eq!(v2.version, 2);

    for stale in [None, Some(1), Some(3)] {
        let err = svc
            .upsert_observation(upsert("st-1", (0, 0), "THRIPS", 99, stale))
            .unwrap_err();
        assert_eq!(err, ScoutingError::VersionConflict { current_version: 2 });
        assert!(err.is_recoverable());
    }

    let key = ObservationKey::new("st-1", GridCoordinate::new(0, 0, 0), "THRIPS");
    let stored = svc.store().observation(&key).unwrap();
    assert_eq!(stored.version, 2);
    assert_eq!(stored.value.count, 4);
}

#[test]
fn test_validation_happens_before_write() {
    let mut svc = service();
    let before = svc.store().session("s-1").unwrap().version;

    assert!(matches!(
        svc.upsert_observation(upsert("st-1", (2, 0), "THRIPS", 1, None)),
        Err(ScoutingError::InvalidCoordinate(_))
    ));
    assert!(matches!(
        svc.upsert_observation(upsert("st-1", (0, 0), "THRIPS", -1, None)),
        Err(ScoutingError::InvalidCount { count: -1 })
    ));
    assert!(matches!(
        svc.upsert_observation(upsert("st-1", (0, 0), "DRAGON", 1, None)),
        Err(ScoutingError::UnknownSpecies { .. })
    ));

    assert_eq!(svc.store().session("s-1").unwrap().version, before);
}

#[test]
fn test_section_tag_filter() {
    let mut svc = service();
    // st-3 only scouts the bay tagged "North" (bay 0)
    assert!(svc.upsert_observation(upsert("st-3", (0, 1), "APHIDS", 2, None)).is_ok());
    assert!(matches!(
        svc.upsert_observation(upsert("st-3", (1, 1), "APHIDS", 2, None)),
        Err(ScoutingError::InvalidCoordinate(_))
    ));
}

#[test]
fn test_section_ids_are_owned_by_one_session() {
    // s-2 reusing s-1's section id is an inconsistent snapshot
    let shared = snapshot_with(1, json!({ "sections": [{ "id": "st-1", "targetId": "gh-1" }] }));
    let err = InMemoryStore::from_snapshot(shared, &SpeciesCatalog::default()).unwrap_err();
    assert!(format!("{:?}", err).contains("st-1"));

    // A write from s-2 naming s-1's section is rejected and s-1 is untouched
    let mut svc = service();
    let v1 = svc.upsert_observation(upsert("st-1", (0, 0), "THRIPS", 3, None)).unwrap();
    let s1_version = svc.store().session("s-1").unwrap().version;

    let mut foreign = upsert("st-1", (0, 0), "THRIPS", 40, Some(v1.version));
    foreign.session_id = "s-2".into();
    assert!(matches!(
        svc.upsert_observation(foreign),
        Err(ScoutingError::SectionNotFound { .. })
    ));

    let key = ObservationKey::new("st-1", GridCoordinate::new(0, 0, 0), "THRIPS");
    let stored = svc.store().observation(&key).unwrap();
    assert_eq!((stored.version, stored.value.count), (1, 3));
    assert_eq!(stored.value.session_id, "s-1");
    assert_eq!(svc.store().session("s-1").unwrap().version, s1_version);
    assert!(svc.store().session("s-2").unwrap().value.observations().next().is_none());
}

#[test]
fn test_snapshot_species_codes_share_upsert_keys() {
    let seeded = snapshot_with(
        0,
        json!({
            "sections": [
                {
                    "id": "st-1",
                    "targetId": "gh-1",
                    "observations": [{
                        "version": 1,
                        "sessionId": "s-1",
                        "sessionTargetId": "st-1",
                        "bayIndex": 0,
                        "benchIndex": 0,
                        "spotIndex": 0,
                        "speciesCode": " thrips ",
                        "category": "DISEASE",
                        "count": 4
                    }]
                },
                { "id": "st-2", "targetId": "gh-2" }
            ]
        }),
    );
    let mut svc = service_from(seeded);

    let err = svc.upsert_observation(upsert("st-1", (0, 0), "THRIPS", 9, None)).unwrap_err();
    assert_eq!(err, ScoutingError::VersionConflict { current_version: 1 });

    let updated = svc.upsert_observation(upsert("st-1", (0, 0), "thrips", 9, Some(1))).unwrap();
    assert_eq!(updated.version, 2);
    assert_eq!(updated.value.species_code, "THRIPS");

    let weekly = svc.get_weekly_analytics("farm-1", 10, 2024).unwrap();
    assert_eq!(weekly.pest_count, 9);
    assert_eq!(weekly.disease_count, 0);

    let monthly = svc.get_monthly_report("farm-1", 2024, 3).unwrap();
    assert_eq!(monthly.distinct_species, vec!["THRIPS".to_string()]);
    assert_eq!(monthly.total_observations, 1);
}

// =========================================================================
// Section 2: Session lifecycle
// =========================================================================

#[test]
fn test_completion_guard_then_retry() {
    let mut svc = service();
    let now = Utc.with_ymd_and_hms(2024, 3, 5, 16, 30, 0).unwrap();
    let complete = SessionEvent::Complete { confirmation_acknowledged: true };

    svc.upsert_observation(upsert("st-1", (0, 0), "THRIPS", 6, None)).unwrap();
    let version = svc.store().session("s-1").unwrap().version;

    // st-2 has no observations yet
    let err = svc.transition_session("s-1", complete, Some(version), now).unwrap_err();
    assert!(matches!(err, ScoutingError::GuardFailed(ref msg) if msg.contains("st-2")));
    assert_eq!(svc.store().session("s-1").unwrap().value.status, SessionStatus::InProgress);

    svc.upsert_observation(upsert("st-2", (1, 0), "LADYBUGS", 1, None)).unwrap();
    let version = svc.store().session("s-1").unwrap().version;

    let done = svc.transition_session("s-1", complete, Some(version), now).unwrap();
    assert_eq!(done.value.status, SessionStatus::Completed);
    assert_eq!(done.version, version + 1);
    assert_eq!(done.value.completed_at, Some(now));

    // Terminal: further writes are rejected
    assert!(matches!(
        svc.upsert_observation(upsert("st-1", (1, 1), "THRIPS", 1, None)),
        Err(ScoutingError::TerminalState { .. })
    ));
    assert!(matches!(
        svc.transition_session("s-1", SessionEvent::Cancel, Some(done.version), now),
        Err(ScoutingError::TerminalState { .. })
    ));
}

#[test]
fn test_completion_racing_an_edit_conflicts() {
    let mut svc = service();
    let now = Utc.with_ymd_and_hms(2024, 3, 5, 16, 30, 0).unwrap();
    svc.upsert_observation(upsert("st-1", (0, 0), "THRIPS", 6, None)).unwrap();
    svc.upsert_observation(upsert("st-2", (0, 0), "THRIPS", 1, None)).unwrap();
    let seen = svc.store().session("s-1").unwrap().version;

    // Another scout edits after `seen` was read
    svc.upsert_observation(upsert("st-2", (0, 0), "THRIPS", 2, Some(1))).unwrap();

    let err = svc
        .transition_session(
            "s-1",
            SessionEvent::Complete { confirmation_acknowledged: true },
            Some(seen),
            now,
        )
        .unwrap_err();
    assert_eq!(err, ScoutingError::VersionConflict { current_version: seen + 1 });
}

#[test]
fn test_cancel_in_progress_session() {
    let mut svc = service();
    let now = Utc.with_ymd_and_hms(2024, 3, 5, 12, 0, 0).unwrap();
    svc.upsert_observation(upsert("st-1", (0, 0), "THRIPS", 12, None)).unwrap();
    let version = svc.store().session("s-1").unwrap().version;

    assert!(matches!(
        svc.transition_session("s-1", SessionEvent::Cancel, Some(version - 1), now),
        Err(ScoutingError::VersionConflict { .. })
    ));

    let cancelled = svc.transition_session("s-1", SessionEvent::Cancel, Some(version), now).unwrap();
    assert_eq!(cancelled.value.status, SessionStatus::Cancelled);
    assert_eq!(cancelled.version, version + 1);
    assert_eq!(cancelled.value.completed_at, None);

    assert!(matches!(
        svc.upsert_observation(upsert("st-1", (0, 1), "THRIPS", 1, None)),
        Err(ScoutingError::TerminalState { .. })
    ));

    // Cancelled work no longer shows on the map or in the week's counts
    let response = svc.get_heatmap("farm-1", 10, 2024).unwrap();
    assert_eq!(response.stats.max, 0);
    assert!(response.cells.iter().all(|c| c.total_count == 0));
    let weekly = svc.get_weekly_analytics("farm-1", 10, 2024).unwrap();
    assert_eq!(weekly.sessions.cancelled, 1);
    assert_eq!(weekly.pest_count, 0);
}

// =========================================================================
// Section 3: Heatmap
// =========================================================================

#[test]
fn test_reference_heatmap() {
    let mut svc = service();
    svc.upsert_observation(upsert("st-1", (0, 0), "THRIPS", 6, None)).unwrap();
    svc.upsert_observation(upsert("st-1", (1, 1), "powdery mildew", 35, None)).unwrap();

    let response = svc.get_heatmap("farm-1", 10, 2024).unwrap();
    let gh1 = response.sections.iter().find(|s| s.target_id == "gh-1").unwrap();

    assert_eq!(gh1.cells.len(), 4);
    let level = |bay: i32, bench: i32| {
        gh1.cells
            .iter()
            .find(|c| c.bay_index == bay && c.bench_index == bench)
            .map(|c| (c.total_count, c.severity_level))
            .unwrap()
    };
    assert_eq!(level(0, 0), (6, SeverityLevel::Moderate));
    assert_eq!(level(1, 1), (35, SeverityLevel::Emergency));
    assert_eq!(level(0, 1), (0, SeverityLevel::Zero));
    assert_eq!(level(1, 0), (0, SeverityLevel::Zero));

    assert_eq!(gh1.stats.hotspots, 1);
    assert_eq!(gh1.stats.max, 35);
    assert_eq!(gh1.stats.average, 10);
    assert_eq!(gh1.cells[0].bay_tag.as_deref(), Some("North"));

    // Two 2x2 targets, dense
    assert_eq!(response.cells.len(), 8);
    assert_eq!(response.severity_legend.len(), 6);
}

#[test]
fn test_heatmap_is_idempotent() {
    let mut svc = service();
    svc.upsert_observation(upsert("st-1", (0, 1), "WHITEFLY", 12, None)).unwrap();

    let first = serde_json::to_string(&svc.get_heatmap("farm-1", 10, 2024).unwrap()).unwrap();
    let second = serde_json::to_string(&svc.get_heatmap("farm-1", 10, 2024).unwrap()).unwrap();
    assert_eq!(first, second);
}

#[test]
fn test_heatmap_reads_fresh_state() {
    let mut svc = service();
    svc.upsert_observation(upsert("st-1", (0, 1), "WHITEFLY", 2, None)).unwrap();
    let before = svc.get_heatmap("farm-1", 10, 2024).unwrap();
    assert_eq!(before.stats.max, 2);

    svc.upsert_observation(upsert("st-1", (0, 1), "WHITEFLY", 25, Some(1))).unwrap();
    let after = svc.get_heatmap("farm-1", 10, 2024).unwrap();
    assert_eq!(after.stats.max, 25);
    assert_eq!(after.stats.hotspots, 1);
}

// =========================================================================
// Section 4: Analytics
// =========================================================================

#[test]
fn test_weekly_and_monthly_reports() {
    let mut svc = service();
    svc.upsert_observation(upsert("st-1", (0, 0), "THRIPS", 6, None)).unwrap();
    svc.upsert_observation(upsert("st-1", (1, 1), "POWDERY_MILDEW", 35, None)).unwrap();
    svc.upsert_observation(upsert("st-3", (0, 0), "APHIDS", 3, None)).unwrap();

    let weekly = svc.get_weekly_analytics("farm-1", 10, 2024).unwrap();
    assert_eq!(weekly.total_observations, 2);
    assert_eq!(weekly.pest_count, 6);
    assert_eq!(weekly.disease_count, 35);
    assert_eq!(weekly.sessions.in_progress, 1);
    assert_eq!(weekly.heatmap.hotspots, 1);

    let monthly = svc.get_monthly_report("farm-1", 2024, 3).unwrap();
    assert_eq!(monthly.trend.len(), 5);
    assert_eq!(monthly.total_observations, 3);
    assert_eq!(monthly.total_count, 44);
    assert_eq!(monthly.distinct_species_count, 3);
    assert_eq!(monthly.active_scouts, 2);
    assert_eq!(monthly.worst_severity, SeverityLevel::Emergency);
    let worst = monthly.worst_week.unwrap();
    assert_eq!((worst.year, worst.week), (2024, 10));
    // 5 weeks x 8 cells; MODERATE(2) + EMERGENCY(5) + LOW(1)
    assert_relative_eq!(monthly.average_severity, 8.0 / 40.0, epsilon = 1e-9);
}

#[test]
fn test_unknown_farm() {
    let svc = service();
    assert_eq!(
        svc.get_monthly_report("nope", 2024, 3).unwrap_err(),
        ScoutingError::FarmNotFound("nope".into())
    );
    assert!(matches!(
        svc.get_monthly_report("farm-1", 2024, 13),
        Err(ScoutingError::InvalidPeriod(_))
    ));
}
