//! Mutable world snapshot shared by every engine component.
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use crate::catalog::{Activity, Catalog, Condition};
use crate::crew::CrewMember;
use crate::ledger::{RES_CASH, RES_CRED, RES_HEAT, ResourceLedger};
use crate::rng::RngBundle;
use crate::runs::{Run, RunStatus};
use crate::stats::{Metric, StatsBoard};

/// Version tag written into every snapshot; bump alongside a migration step.
pub const SCHEMA_VERSION: u32 = 2;

pub const LOG_RUN_STARTED: &str = "log.run.started";
pub const LOG_RUN_COMPLETED: &str = "log.run.completed";
pub const LOG_RUN_BOTCHED: &str = "log.run.botched";
pub const LOG_RUN_CANCELLED: &str = "log.run.cancelled";
pub const LOG_CHAIN_ENDED: &str = "log.run.chain-ended";
pub const LOG_CONTINUATION_FAILED_PREFIX: &str = "log.run.continuation-failed.";
pub const LOG_SNAPSHOT_CORRUPT: &str = "log.save.corrupt-discarded";
pub const LOG_OFFLINE_TRUNCATED: &str = "log.offline.truncated";
pub const LOG_STAR_GAINED_PREFIX: &str = "log.crew.star-gained.";
pub const LOG_PERK_CHOSEN_PREFIX: &str = "log.crew.perk-chosen.";

/// The one mutable world snapshot; all engine operations funnel through it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorldState {
    #[serde(default)]
    pub version: u32,
    #[serde(default)]
    pub ledger: ResourceLedger,
    #[serde(default)]
    pub flags: HashMap<String, f64>,
    #[serde(default)]
    pub reveals: HashSet<String>,
    #[serde(default)]
    pub crew: Vec<CrewMember>,
    #[serde(default)]
    pub runs: Vec<Run>,
    #[serde(default)]
    pub logs: Vec<String>,
    #[serde(default)]
    pub stats: StatsBoard,
    #[serde(default)]
    pub seed: u64,
    #[serde(default = "default_next_run_id")]
    pub next_run_id: u64,
    #[serde(default)]
    pub last_tick_ms: u64,
    #[serde(skip)]
    pub rng: Option<Rc<RngBundle>>,
    /// Monotonic count of log appends this session; not persisted.
    #[serde(skip)]
    pub log_seq: u64,
}

fn default_next_run_id() -> u64 {
    1
}

impl Default for WorldState {
    fn default() -> Self {
        Self {
            version: SCHEMA_VERSION,
            ledger: ResourceLedger::default(),
            flags: HashMap::new(),
            reveals: HashSet::new(),
            crew: Vec::new(),
            runs: Vec::new(),
            logs: Vec::new(),
            stats: StatsBoard::default(),
            seed: 0,
            next_run_id: 1,
            last_tick_ms: 0,
            rng: None,
            log_seq: 0,
        }
    }
}

impl WorldState {
    /// Builder seeding the ledger from catalog resource defs and attaching
    /// a deterministic RNG bundle.
    #[must_use]
    pub fn with_seed(mut self, seed: u64, catalog: &Catalog) -> Self {
        self.seed = seed;
        for resource in &catalog.resources {
            if resource.start != 0.0 {
                self.ledger.add(&resource.id, resource.start);
            }
        }
        self.attach_rng_bundle(Rc::new(RngBundle::from_user_seed(seed)));
        self
    }

    /// Attach (or replace) the RNG bundle backing this state.
    pub fn attach_rng_bundle(&mut self, bundle: Rc<RngBundle>) {
        self.rng = Some(bundle);
    }

    /// Current RNG bundle, rebuilt from the seed when absent (after load).
    pub fn rng_bundle(&mut self) -> Rc<RngBundle> {
        if let Some(bundle) = &self.rng {
            return Rc::clone(bundle);
        }
        let bundle = Rc::new(RngBundle::from_user_seed(self.seed));
        self.rng = Some(Rc::clone(&bundle));
        bundle
    }

    /// Grant a one-way reveal. Returns true when newly granted.
    pub fn reveal(&mut self, key: &str) -> bool {
        self.reveals.insert(key.to_string())
    }

    #[must_use]
    pub fn is_revealed(&self, key: &str) -> bool {
        self.reveals.contains(key)
    }

    /// Whether an activity is visible under current reveals.
    #[must_use]
    pub fn activity_visible(&self, activity: &Activity) -> bool {
        !activity.hidden || self.is_revealed(&format!("activity:{}", activity.id))
    }

    pub fn set_flag(&mut self, flag: &str, value: f64) {
        self.flags.insert(flag.to_string(), value);
    }

    /// Evaluate one parsed condition against flags, reveals, and the ledger.
    #[must_use]
    pub fn condition_met(&self, condition: &Condition) -> bool {
        match condition {
            Condition::Revealed { key } => self.is_revealed(key),
            Condition::FlagEquals { flag, value } => {
                let current = self.flags.get(flag).copied().unwrap_or(0.0);
                (current - value).abs() < 1e-9
            }
            Condition::ResourceGte { resource, value } => self.ledger.amount(resource) >= *value,
        }
    }

    /// Evaluate raw authored condition entries; malformed entries are
    /// skipped rather than failing the whole gate.
    #[must_use]
    pub fn raw_conditions_met(&self, raw: &[Value]) -> bool {
        raw.iter().all(|entry| {
            match serde_json::from_value::<Condition>(entry.clone()) {
                Ok(condition) => self.condition_met(&condition),
                Err(err) => {
                    log::debug!("ignoring unrecognized condition entry: {err}");
                    true
                }
            }
        })
    }

    /// Append a log entry, trimming the tail to `cap`.
    pub fn push_log(&mut self, entry: String, cap: usize) {
        self.logs.push(entry);
        self.log_seq += 1;
        if self.logs.len() > cap {
            let excess = self.logs.len() - cap;
            self.logs.drain(..excess);
        }
    }

    /// Add a member to the roster. Returns false when the id is taken.
    pub fn add_member(&mut self, member: CrewMember) -> bool {
        if self.member(&member.id).is_some() {
            return false;
        }
        self.crew.push(member);
        true
    }

    /// Members currently free to be committed to a run.
    #[must_use]
    pub fn available_members(&self) -> Vec<&CrewMember> {
        self.crew
            .iter()
            .filter(|member| member.is_available())
            .collect()
    }

    #[must_use]
    pub fn member(&self, member_id: &str) -> Option<&CrewMember> {
        self.crew.iter().find(|member| member.id == member_id)
    }

    pub fn member_mut(&mut self, member_id: &str) -> Option<&mut CrewMember> {
        self.crew.iter_mut().find(|member| member.id == member_id)
    }

    #[must_use]
    pub fn run(&self, run_id: u64) -> Option<&Run> {
        self.runs.iter().find(|run| run.run_id == run_id)
    }

    pub fn run_mut(&mut self, run_id: u64) -> Option<&mut Run> {
        self.runs.iter_mut().find(|run| run.run_id == run_id)
    }

    #[must_use]
    pub fn run_index(&self, run_id: u64) -> Option<usize> {
        self.runs.iter().position(|run| run.run_id == run_id)
    }

    #[must_use]
    pub fn active_run_count(&self) -> usize {
        self.runs
            .iter()
            .filter(|run| run.status == RunStatus::Active)
            .count()
    }

    /// Successes over recorded sub-run results; 0.0 with no data.
    #[must_use]
    pub fn success_rate(&self) -> f64 {
        let mut total = 0usize;
        let mut successes = 0usize;
        for run in &self.runs {
            for result in &run.results {
                total += 1;
                if result.was_success {
                    successes += 1;
                }
            }
        }
        if total == 0 {
            0.0
        } else {
            successes as f64 / total as f64
        }
    }

    /// Current value of a tracked stats metric.
    #[must_use]
    pub fn metric_value(&self, metric: Metric) -> f64 {
        match metric {
            Metric::Cash => self.ledger.amount(RES_CASH),
            Metric::Heat => self.ledger.amount(RES_HEAT),
            Metric::Cred => self.ledger.amount(RES_CRED),
            Metric::CrewCount => self.crew.len() as f64,
            Metric::ActiveRuns => self.active_run_count() as f64,
            Metric::SuccessRate => self.success_rate(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn reveals_are_monotonic() {
        let mut state = WorldState::default();
        assert!(state.reveal("activity:heist"));
        assert!(!state.reveal("activity:heist"));
        assert!(state.is_revealed("activity:heist"));
    }

    #[test]
    fn raw_conditions_skip_malformed_entries() {
        let mut state = WorldState::default();
        state.set_flag("met_fence", 1.0);
        let gates = vec![
            json!({ "kind": "flag_equals", "flag": "met_fence", "value": 1.0 }),
            json!({ "kind": "alignment_of_planets" }),
        ];
        assert!(state.raw_conditions_met(&gates));

        let failing = vec![json!({ "kind": "resource_gte", "resource": "cash", "value": 10.0 })];
        assert!(!state.raw_conditions_met(&failing));
    }

    #[test]
    fn log_tail_is_capped() {
        let mut state = WorldState::default();
        for i in 0..30 {
            state.push_log(format!("entry-{i}"), 16);
        }
        assert_eq!(state.logs.len(), 16);
        assert_eq!(state.logs.first().map(String::as_str), Some("entry-14"));
    }

    #[test]
    fn with_seed_populates_ledger_and_rng() {
        let catalog: Catalog = serde_json::from_value(json!({
            "resources": [
                { "id": "cash", "name": "Cash", "start": 100.0 },
                { "id": "cred", "name": "Cred", "start": 10.0 }
            ]
        }))
        .unwrap();
        let mut state = WorldState::default().with_seed(42, &catalog);
        assert!((state.ledger.amount(RES_CASH) - 100.0).abs() < f64::EPSILON);
        assert_eq!(state.seed, 42);
        let _ = state.rng_bundle();
    }

    #[test]
    fn success_rate_counts_recorded_results() {
        let state = WorldState::default();
        assert!(state.success_rate().abs() < f64::EPSILON);
    }

    #[test]
    fn roster_rejects_duplicate_ids() {
        let mut state = WorldState::default();
        assert!(state.add_member(CrewMember::new("vex", "Vex", "burglar")));
        assert!(!state.add_member(CrewMember::new("vex", "Imposter", "fence")));
        assert_eq!(state.available_members().len(), 1);
    }
}
