//! Run scheduling: start validation, in-place chain continuation, and
//! per-tick completion detection.
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::collections::HashMap;
use thiserror::Error;

use crate::catalog::{ActivityOption, Catalog};
use crate::config::EngineCfg;
use crate::crew::{CrewMember, CrewStatus};
use crate::effects::Effect;
use crate::ledger::{RES_CRED, RES_HEAT};
use crate::modifier::{ModifierAdjustments, compute_adjustments};
use crate::outcome::{plan_outcome, resolve_bundle};
use crate::progression;
use crate::state::{
    LOG_CHAIN_ENDED, LOG_CONTINUATION_FAILED_PREFIX, LOG_RUN_BOTCHED, LOG_RUN_CANCELLED,
    LOG_RUN_COMPLETED, LOG_RUN_STARTED, WorldState,
};

/// Staff ids stored inline without allocation for typical crew sizes.
pub type StaffIds = SmallVec<[String; 4]>;

/// Unbounded repeat sentinel for `runs_left` / `total_runs`.
pub const REPEAT_FOREVER: i32 = -1;

/// Lifecycle state of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    #[default]
    Active,
    Completed,
}

/// Locked-in decisions rolled at start time; overwritten on continuation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct RunSnapshot {
    #[serde(default)]
    pub planned_outcome_id: Option<String>,
    #[serde(default)]
    pub adjustments: ModifierAdjustments,
}

/// Audit record of one executed sub-run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubRunResult {
    pub sub_run_index: u32,
    pub completed_at: u64,
    pub was_success: bool,
    #[serde(default)]
    pub resources_gained: HashMap<String, f64>,
    #[serde(default)]
    pub botched: bool,
}

fn default_current_run() -> u32 {
    1
}

fn default_total_runs() -> i32 {
    1
}

/// One crew commitment and its repeat chain.
///
/// While a chain is alive, `run_id`, `started_at`, and `total_runs` never
/// change; each continuation overwrites `ends_at`, `current_run`,
/// `runs_left`, and `snapshot` in place. This preserves identity for UI
/// binding and for idempotent offline replay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Run {
    pub run_id: u64,
    pub activity_id: String,
    pub option_id: String,
    pub started_at: u64,
    pub ends_at: u64,
    #[serde(default)]
    pub assigned_staff_ids: StaffIds,
    #[serde(default)]
    pub runs_left: i32,
    #[serde(default)]
    pub snapshot: RunSnapshot,
    #[serde(default)]
    pub status: RunStatus,
    #[serde(default = "default_total_runs")]
    pub total_runs: i32,
    #[serde(default = "default_current_run")]
    pub current_run: u32,
    #[serde(default)]
    pub results: Vec<SubRunResult>,
    #[serde(default)]
    pub completed_at: Option<u64>,
}

/// Why a start request was rejected. First failure wins; a rejected start
/// has no side effects.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StartError {
    #[error("unknown activity {0}")]
    UnknownActivity(String),
    #[error("unknown option {activity_id}/{option_id}")]
    UnknownOption {
        activity_id: String,
        option_id: String,
    },
    #[error("option {0} is locked or not yet visible")]
    Locked(String),
    #[error("no available crew fills the {role_id} requirement")]
    StaffingUnfilled { role_id: String },
    #[error("crew member {0} not found")]
    UnknownStaff(String),
    #[error("crew member {0} is not available")]
    StaffUnavailable(String),
    #[error("crew member {0} does not satisfy any staffing requirement")]
    StaffUnqualified(String),
    #[error("insufficient inputs for {0}")]
    InsufficientInputs(String),
}

/// Why a cancel/stop request was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RunControlError {
    #[error("unknown run {0}")]
    UnknownRun(u64),
    #[error("run {0} is already completed")]
    AlreadyCompleted(u64),
}

/// Parameters for a start request.
#[derive(Debug, Clone)]
pub struct StartRequest {
    pub activity_id: String,
    pub option_id: String,
    pub assigned_staff_ids: Option<Vec<String>>,
    pub runs_left: i32,
    continuation_slot: Option<usize>,
}

impl StartRequest {
    /// A single-execution request with auto-assigned staffing.
    #[must_use]
    pub fn new(activity_id: &str, option_id: &str) -> Self {
        Self {
            activity_id: activity_id.to_string(),
            option_id: option_id.to_string(),
            assigned_staff_ids: None,
            runs_left: 0,
            continuation_slot: None,
        }
    }

    /// Use an explicit staff assignment instead of auto-assignment.
    #[must_use]
    pub fn with_staff(mut self, staff_ids: &[&str]) -> Self {
        self.assigned_staff_ids = Some(staff_ids.iter().map(|id| (*id).to_string()).collect());
        self
    }

    /// Request further sub-runs (`-1` repeats until stopped).
    #[must_use]
    pub const fn with_runs_left(mut self, runs_left: i32) -> Self {
        self.runs_left = runs_left;
        self
    }
}

/// Everything one scheduler pass surfaced to the caller.
#[derive(Debug, Clone, Default)]
pub struct TickReport {
    pub completed_run_ids: Vec<u64>,
    pub modal_keys: Vec<String>,
}

/// Validate and start a run (or continue a chain in place).
///
/// # Errors
///
/// Returns the first validation failure in documented order: existence,
/// visibility/unlock, staffing, input affordability.
pub fn start_run(
    state: &mut WorldState,
    catalog: &Catalog,
    cfg: &EngineCfg,
    now_ms: u64,
    request: &StartRequest,
) -> Result<u64, StartError> {
    let activity = catalog
        .activity(&request.activity_id)
        .ok_or_else(|| StartError::UnknownActivity(request.activity_id.clone()))?;
    let option = catalog
        .option(&request.activity_id, &request.option_id)
        .ok_or_else(|| StartError::UnknownOption {
            activity_id: request.activity_id.clone(),
            option_id: request.option_id.clone(),
        })?;

    if !state.activity_visible(activity)
        || !state.raw_conditions_met(&option.visible_when)
        || !state.raw_conditions_met(&option.unlocked_when)
    {
        return Err(StartError::Locked(option.id.clone()));
    }

    let staff_ids = match &request.assigned_staff_ids {
        None => auto_assign(state, catalog, option)?,
        Some(ids) => validate_supplied_staff(state, catalog, option, ids)?,
    };

    if !state.ledger.can_afford(&option.inputs) {
        let missing = option
            .inputs
            .resources
            .iter()
            .find(|(id, cost)| state.ledger.amount(id) < **cost)
            .map(|(id, _)| id.clone())
            .or_else(|| {
                option
                    .inputs
                    .items
                    .iter()
                    .find(|(id, count)| state.ledger.item_count(id) < **count)
                    .map(|(id, _)| id.clone())
            })
            .unwrap_or_default();
        return Err(StartError::InsufficientInputs(missing));
    }

    // All validation passed; from here on the commitment is made.
    let assigned: Vec<&CrewMember> = staff_ids
        .iter()
        .filter_map(|id| state.member(id))
        .collect();
    let adjustments = compute_adjustments(&option.modifiers, &assigned, state, catalog);

    let rng = state.rng_bundle();
    let planned_outcome_id = plan_outcome(&option.resolution, &adjustments, &mut *rng.outcomes());

    state.ledger.debit(&option.inputs);
    for id in &staff_ids {
        if let Some(member) = state.member_mut(id) {
            member.status = CrewStatus::Busy;
        }
    }

    let duration = (option.duration_ms as f64 * adjustments.duration_mult).max(0.0);
    let ends_at = now_ms + duration.round() as u64;
    let snapshot = RunSnapshot {
        planned_outcome_id,
        adjustments,
    };

    let run_id = if let Some(slot) = request.continuation_slot {
        let run = &mut state.runs[slot];
        run.ends_at = ends_at;
        run.runs_left = request.runs_left;
        run.current_run += 1;
        run.snapshot = snapshot;
        run.run_id
    } else {
        let run_id = state.next_run_id;
        state.next_run_id += 1;
        let total_runs = match request.runs_left {
            0 => 1,
            REPEAT_FOREVER => REPEAT_FOREVER,
            n => n + 1,
        };
        state.runs.push(Run {
            run_id,
            activity_id: request.activity_id.clone(),
            option_id: request.option_id.clone(),
            started_at: now_ms,
            ends_at,
            assigned_staff_ids: staff_ids,
            runs_left: request.runs_left,
            snapshot,
            status: RunStatus::Active,
            total_runs,
            current_run: 1,
            results: Vec::new(),
            completed_at: None,
        });
        state.push_log(
            format!("{LOG_RUN_STARTED}.{}", request.option_id),
            cfg.log_tail_cap,
        );
        run_id
    };
    Ok(run_id)
}

fn auto_assign(
    state: &WorldState,
    catalog: &Catalog,
    option: &ActivityOption,
) -> Result<StaffIds, StartError> {
    let mut picked = StaffIds::new();
    for requirement in &option.requirements.staff {
        let role = catalog.role(&requirement.role_id);
        let mut filled = 0;
        for member in &state.crew {
            if filled == requirement.count {
                break;
            }
            if member.role_id != requirement.role_id || !member.is_available() {
                continue;
            }
            if picked.iter().any(|id| id == &member.id) {
                continue;
            }
            let stars = role.map_or(0, |role| role.stars_for_xp(member.xp));
            if stars < requirement.stars_min {
                continue;
            }
            picked.push(member.id.clone());
            filled += 1;
        }
        if requirement.required && filled < requirement.count {
            return Err(StartError::StaffingUnfilled {
                role_id: requirement.role_id.clone(),
            });
        }
    }
    Ok(picked)
}

fn validate_supplied_staff(
    state: &WorldState,
    catalog: &Catalog,
    option: &ActivityOption,
    ids: &[String],
) -> Result<StaffIds, StartError> {
    for (index, id) in ids.iter().enumerate() {
        if ids[..index].contains(id) {
            return Err(StartError::StaffUnqualified(id.clone()));
        }
        let member = state
            .member(id)
            .ok_or_else(|| StartError::UnknownStaff(id.clone()))?;
        if !member.is_available() {
            return Err(StartError::StaffUnavailable(id.clone()));
        }
    }

    // Greedily consume supplied members against each requirement in
    // declared order; anyone left unmatched is unqualified for this option.
    let mut consumed = vec![false; ids.len()];
    for requirement in &option.requirements.staff {
        let role = catalog.role(&requirement.role_id);
        let mut filled = 0;
        for (index, id) in ids.iter().enumerate() {
            if filled == requirement.count || consumed[index] {
                continue;
            }
            let Some(member) = state.member(id) else {
                continue;
            };
            if member.role_id != requirement.role_id {
                continue;
            }
            let stars = role.map_or(0, |role| role.stars_for_xp(member.xp));
            if stars < requirement.stars_min {
                continue;
            }
            consumed[index] = true;
            filled += 1;
        }
        if requirement.required && filled < requirement.count {
            return Err(StartError::StaffingUnfilled {
                role_id: requirement.role_id.clone(),
            });
        }
    }

    if let Some(index) = consumed.iter().position(|used| !used)
        && !option.requirements.staff.is_empty()
    {
        return Err(StartError::StaffUnqualified(ids[index].clone()));
    }
    Ok(ids.iter().cloned().collect())
}

/// One scheduler pass: complete every matured run in list order, chaining
/// continuations synchronously within the same call.
pub fn tick_runs(
    state: &mut WorldState,
    catalog: &Catalog,
    cfg: &EngineCfg,
    now_ms: u64,
) -> TickReport {
    for member in &mut state.crew {
        member.refresh_availability(now_ms);
    }

    let mut report = TickReport::default();
    let mut slot = 0;
    while slot < state.runs.len() {
        let matured =
            state.runs[slot].status == RunStatus::Active && state.runs[slot].ends_at <= now_ms;
        if matured {
            complete_run_at(state, catalog, cfg, slot, now_ms, &mut report);
        }
        slot += 1;
    }
    report
}

/// Resolve one matured run: apply its locked-in outcome, record the
/// sub-run, then either continue the chain in place or finalize.
pub(crate) fn complete_run_at(
    state: &mut WorldState,
    catalog: &Catalog,
    cfg: &EngineCfg,
    slot: usize,
    now_ms: u64,
    report: &mut TickReport,
) {
    let (run_id, activity_id, option_id, staff_ids, snapshot, current_run) = {
        let run = &state.runs[slot];
        (
            run.run_id,
            run.activity_id.clone(),
            run.option_id.clone(),
            run.assigned_staff_ids.clone(),
            run.snapshot.clone(),
            run.current_run,
        )
    };

    let Some(option) = catalog.option(&activity_id, &option_id) else {
        // Content disappeared between sessions; finalize what we have.
        release_staff(state, &staff_ids);
        finalize_run(state, cfg, slot, now_ms, "option-missing");
        report.completed_run_ids.push(run_id);
        return;
    };

    let rng = state.rng_bundle();
    let bundle = resolve_bundle(
        &option.resolution,
        snapshot.planned_outcome_id.as_deref(),
        &snapshot.adjustments,
        &mut *rng.ranges(),
    );

    let mut gained = bundle.outputs.clone();
    if bundle.cred_delta != 0.0 {
        *gained.entry(RES_CRED.to_string()).or_insert(0.0) += bundle.cred_delta;
    }
    if bundle.heat_delta != 0.0 {
        *gained.entry(RES_HEAT.to_string()).or_insert(0.0) += bundle.heat_delta;
    }

    for (resource_id, delta) in &gained {
        state.ledger.add(resource_id, *delta);
    }
    for (item_id, delta) in &bundle.items {
        state.ledger.add_item(item_id, *delta);
    }
    for effect in &bundle.effects {
        match effect {
            Effect::Reveal { key } => {
                state.reveal(key);
            }
            Effect::SetFlag { flag, value } => state.set_flag(flag, *value),
            Effect::Log { key } => state.push_log(key.clone(), cfg.log_tail_cap),
            Effect::ShowModal { key } => report.modal_keys.push(key.clone()),
        }
    }

    let botched = bundle.is_botched();
    if let Some(jail) = &bundle.jail {
        for id in staff_ids.clone() {
            if let Some(member) = state.member_mut(&id) {
                member.sideline_until(now_ms + jail.duration_ms);
            }
        }
        if let Some(key) = &jail.log {
            state.push_log(key.clone(), cfg.log_tail_cap);
        }
        state.push_log(
            format!("{LOG_RUN_BOTCHED}.{option_id}"),
            cfg.log_tail_cap,
        );
        // A botch forcibly terminates the repeat chain.
        state.runs[slot].runs_left = 0;
    } else {
        release_staff(state, &staff_ids);
    }
    if let Some(key) = &bundle.log {
        state.push_log(key.clone(), cfg.log_tail_cap);
    }

    if bundle.success && option.xp_rewards.on_complete > 0 {
        progression::grant_completion_xp(
            state,
            catalog,
            &staff_ids,
            option.xp_rewards.on_complete,
            cfg,
        );
    }

    state.runs[slot].results.push(SubRunResult {
        sub_run_index: current_run,
        completed_at: now_ms,
        was_success: bundle.success,
        resources_gained: gained,
        botched,
    });
    report.completed_run_ids.push(run_id);

    let runs_left = state.runs[slot].runs_left;
    if runs_left == 0 {
        finalize_run(state, cfg, slot, now_ms, "");
        return;
    }

    let next_runs_left = if runs_left > 0 {
        runs_left - 1
    } else {
        REPEAT_FOREVER
    };
    let continuation = StartRequest {
        activity_id,
        option_id: option_id.clone(),
        assigned_staff_ids: Some(staff_ids.to_vec()),
        runs_left: next_runs_left,
        continuation_slot: Some(slot),
    };
    if let Err(reason) = start_run(state, catalog, cfg, now_ms, &continuation) {
        state.push_log(
            format!("{LOG_CONTINUATION_FAILED_PREFIX}{reason}"),
            cfg.log_tail_cap,
        );
        finalize_run(state, cfg, slot, now_ms, "");
    }
}

fn finalize_run(state: &mut WorldState, cfg: &EngineCfg, slot: usize, now_ms: u64, note: &str) {
    let run = &mut state.runs[slot];
    run.status = RunStatus::Completed;
    run.completed_at = Some(now_ms);
    let option_id = run.option_id.clone();
    let multi = run.total_runs != 1;
    if note.is_empty() {
        let key = if multi { LOG_CHAIN_ENDED } else { LOG_RUN_COMPLETED };
        state.push_log(format!("{key}.{option_id}"), cfg.log_tail_cap);
    } else {
        state.push_log(
            format!("{LOG_RUN_COMPLETED}.{option_id}.{note}"),
            cfg.log_tail_cap,
        );
    }
}

fn release_staff(state: &mut WorldState, staff_ids: &StaffIds) {
    for id in staff_ids {
        if let Some(member) = state.member_mut(id)
            && member.status == CrewStatus::Busy
        {
            member.status = CrewStatus::Available;
        }
    }
}

/// Cancel a run: crew are released; a run with recorded results is
/// finalized instead of removed so partial progress is never discarded.
///
/// # Errors
///
/// Returns `UnknownRun` / `AlreadyCompleted` for invalid targets.
pub fn cancel_run(
    state: &mut WorldState,
    cfg: &EngineCfg,
    run_id: u64,
    now_ms: u64,
) -> Result<(), RunControlError> {
    let slot = state
        .run_index(run_id)
        .ok_or(RunControlError::UnknownRun(run_id))?;
    if state.runs[slot].status == RunStatus::Completed {
        return Err(RunControlError::AlreadyCompleted(run_id));
    }

    let staff_ids = state.runs[slot].assigned_staff_ids.clone();
    release_staff(state, &staff_ids);

    let option_id = state.runs[slot].option_id.clone();
    if state.runs[slot].results.is_empty() {
        state.runs.remove(slot);
    } else {
        let run = &mut state.runs[slot];
        run.status = RunStatus::Completed;
        run.completed_at = Some(now_ms);
        run.runs_left = 0;
    }
    state.push_log(
        format!("{LOG_RUN_CANCELLED}.{option_id}"),
        cfg.log_tail_cap,
    );
    Ok(())
}

/// Let the in-flight sub-run finish, then stop instead of continuing.
///
/// # Errors
///
/// Returns `UnknownRun` / `AlreadyCompleted` for invalid targets.
pub fn stop_repeat(state: &mut WorldState, run_id: u64) -> Result<(), RunControlError> {
    let run = state
        .run_mut(run_id)
        .ok_or(RunControlError::UnknownRun(run_id))?;
    if run.status == RunStatus::Completed {
        return Err(RunControlError::AlreadyCompleted(run_id));
    }
    run.runs_left = 0;
    Ok(())
}
