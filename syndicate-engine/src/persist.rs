//! Versioned snapshot persistence with migrations and offline catch-up.
use serde_json::Value;

use crate::catalog::Catalog;
use crate::config::EngineCfg;
use crate::runs::{self, RunStatus, TickReport};
use crate::state::{LOG_OFFLINE_TRUNCATED, LOG_SNAPSHOT_CORRUPT, SCHEMA_VERSION, WorldState};

/// What a load pass had to do to produce a usable state.
#[derive(Debug, Default)]
pub struct LoadReport {
    pub recovered_from_corrupt: bool,
    pub migrated_from: Option<u32>,
    pub replayed: u32,
    pub truncated: bool,
    pub tick: TickReport,
}

/// Serialize the reduced snapshot, pruning completed runs past retention.
///
/// # Errors
///
/// Returns an error if the state cannot be serialized.
pub fn snapshot_json(state: &mut WorldState, cfg: &EngineCfg) -> serde_json::Result<String> {
    prune_completed_runs(state, cfg.completed_run_retention);
    serde_json::to_string(state)
}

/// Drop the oldest completed runs beyond the retention cap.
pub fn prune_completed_runs(state: &mut WorldState, retention: usize) {
    let completed = state
        .runs
        .iter()
        .filter(|run| run.status == RunStatus::Completed)
        .count();
    if completed <= retention {
        return;
    }

    let mut victims: Vec<(u64, u64)> = state
        .runs
        .iter()
        .filter(|run| run.status == RunStatus::Completed)
        .map(|run| (run.completed_at.unwrap_or(0), run.run_id))
        .collect();
    victims.sort_unstable();
    let doomed: Vec<u64> = victims
        .iter()
        .take(completed - retention)
        .map(|(_, run_id)| *run_id)
        .collect();
    state
        .runs
        .retain(|run| run.status != RunStatus::Completed || !doomed.contains(&run.run_id));
}

/// Rebuild a world state from a stored snapshot (or its absence).
///
/// Corrupt payloads are discarded in favor of a fresh default state plus a
/// warning — never propagated. Loaded states are merged over defaults,
/// re-clamped, migrated forward, and replayed through offline catch-up.
pub fn load_state(
    raw: Option<&str>,
    catalog: &Catalog,
    cfg: &EngineCfg,
    now_ms: u64,
    fallback_seed: u64,
) -> (WorldState, LoadReport) {
    let mut report = LoadReport::default();

    let mut state = match raw {
        None => WorldState::default().with_seed(fallback_seed, catalog),
        Some(payload) => match parse_snapshot(payload, &mut report) {
            Some(state) => state,
            None => {
                log::warn!("discarding corrupt save snapshot; starting fresh");
                report.recovered_from_corrupt = true;
                let mut fresh = WorldState::default().with_seed(fallback_seed, catalog);
                fresh.push_log(LOG_SNAPSHOT_CORRUPT.to_string(), cfg.log_tail_cap);
                fresh
            }
        },
    };

    state.version = SCHEMA_VERSION;
    state.ledger.reclamp();
    let _ = state.rng_bundle();

    let (replayed, truncated) = offline_catch_up(&mut state, catalog, cfg, now_ms, &mut report.tick);
    report.replayed = replayed;
    report.truncated = truncated;
    if truncated {
        log::warn!(
            "offline catch-up truncated after {replayed} completions; remaining runs resolve on subsequent ticks"
        );
        state.push_log(LOG_OFFLINE_TRUNCATED.to_string(), cfg.log_tail_cap);
    }
    (state, report)
}

fn parse_snapshot(payload: &str, report: &mut LoadReport) -> Option<WorldState> {
    let mut value: Value = serde_json::from_str(payload).ok()?;
    let original = migrate_value(&mut value);
    if original < SCHEMA_VERSION {
        report.migrated_from = Some(original);
    }
    serde_json::from_value(value).ok()
}

/// Walk the snapshot forward one schema version at a time. Missing tags
/// are treated as version 1 (the last untagged release).
fn migrate_value(value: &mut Value) -> u32 {
    let original = value
        .get("version")
        .and_then(Value::as_u64)
        .map_or(1, |v| v as u32);
    let mut version = original;
    while version < SCHEMA_VERSION {
        match version {
            1 => migrate_v1_to_v2(value),
            _ => {}
        }
        version += 1;
    }
    if let Some(object) = value.as_object_mut() {
        object.insert("version".to_string(), Value::from(SCHEMA_VERSION));
    }
    original
}

/// v1 stored the sideline expiry under `sidelined_until`.
fn migrate_v1_to_v2(value: &mut Value) {
    let Some(crew) = value.get_mut("crew").and_then(Value::as_array_mut) else {
        return;
    };
    for member in crew {
        let Some(object) = member.as_object_mut() else {
            continue;
        };
        if let Some(until) = object.remove("sidelined_until") {
            object.entry("unavailable_until").or_insert(until);
        }
    }
}

/// Repeatedly complete any matured run until a full scan is clean.
///
/// Each completion happens at the run's own maturity instant, so chained
/// continuations keep their natural cadence across the offline gap. The
/// loop is bounded: a pathological unbounded-repeat chain stops after
/// `offline_catchup_cap` completions and resumes on later ticks.
fn offline_catch_up(
    state: &mut WorldState,
    catalog: &Catalog,
    cfg: &EngineCfg,
    now_ms: u64,
    tick: &mut TickReport,
) -> (u32, bool) {
    let mut replayed = 0u32;
    loop {
        let Some(slot) = state
            .runs
            .iter()
            .position(|run| run.status == RunStatus::Active && run.ends_at <= now_ms)
        else {
            return (replayed, false);
        };
        if replayed >= cfg.offline_catchup_cap {
            return (replayed, true);
        }
        let matured_at = state.runs[slot].ends_at;
        runs::complete_run_at(state, catalog, cfg, slot, matured_at, tick);
        replayed += 1;
    }
}
