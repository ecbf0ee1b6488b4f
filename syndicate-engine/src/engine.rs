//! Engine facade composing scheduler, progression, stats, and persistence
//! over one mutable world state.
use std::collections::VecDeque;

use crate::SlotStorage;
use crate::catalog::Catalog;
use crate::config::{EngineCfg, EngineCfgError};
use crate::effects::EngineEvent;
use crate::ledger::RES_HEAT;
use crate::persist::{self, LoadReport};
use crate::progression::{self, PerkError};
use crate::runs::{self, RunControlError, StartError, StartRequest, TickReport};
use crate::state::WorldState;
use crate::stats::Metric;

/// The public engine surface used by the surrounding UI/input layer.
///
/// Single-threaded and poll-driven: a host timer calls [`Engine::tick`],
/// and every user action is a direct synchronous call. Observable events
/// accumulate in a queue the host drains; they are notifications only.
pub struct Engine<S: SlotStorage> {
    catalog: Catalog,
    cfg: EngineCfg,
    storage: S,
    state: WorldState,
    events: VecDeque<EngineEvent>,
}

impl<S: SlotStorage> Engine<S> {
    /// Build an engine over a validated configuration.
    ///
    /// # Errors
    ///
    /// Returns a configuration error when `cfg` violates documented bounds.
    pub fn new(
        catalog: Catalog,
        cfg: EngineCfg,
        storage: S,
        seed: u64,
    ) -> Result<Self, EngineCfgError> {
        cfg.validate()?;
        let state = WorldState::default().with_seed(seed, &catalog);
        Ok(Self {
            catalog,
            cfg,
            storage,
            state,
            events: VecDeque::new(),
        })
    }

    /// Borrow the world state.
    #[must_use]
    pub const fn state(&self) -> &WorldState {
        &self.state
    }

    /// Borrow the world state mutably (tests and host tooling).
    pub const fn state_mut(&mut self) -> &mut WorldState {
        &mut self.state
    }

    /// Borrow the loaded content catalog.
    #[must_use]
    pub const fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Borrow the active configuration.
    #[must_use]
    pub const fn cfg(&self) -> &EngineCfg {
        &self.cfg
    }

    /// Validate and start a run.
    ///
    /// # Errors
    ///
    /// Returns the first validation failure; a rejected start leaves no
    /// side effects.
    pub fn start(&mut self, now_ms: u64, request: &StartRequest) -> Result<u64, StartError> {
        let seq = self.state.log_seq;
        let run_id = runs::start_run(&mut self.state, &self.catalog, &self.cfg, now_ms, request)?;
        self.emit_log_events(seq);
        self.events.push_back(EngineEvent::StateChanged);
        Ok(run_id)
    }

    /// Cancel a run, releasing its crew.
    ///
    /// # Errors
    ///
    /// Returns `UnknownRun` / `AlreadyCompleted` for invalid targets.
    pub fn cancel(&mut self, now_ms: u64, run_id: u64) -> Result<(), RunControlError> {
        let seq = self.state.log_seq;
        runs::cancel_run(&mut self.state, &self.cfg, run_id, now_ms)?;
        self.emit_log_events(seq);
        self.events.push_back(EngineEvent::StateChanged);
        Ok(())
    }

    /// Stop a repeat chain after its in-flight sub-run completes.
    ///
    /// # Errors
    ///
    /// Returns `UnknownRun` / `AlreadyCompleted` for invalid targets.
    pub fn stop_repeat(&mut self, run_id: u64) -> Result<(), RunControlError> {
        runs::stop_repeat(&mut self.state, run_id)?;
        self.events.push_back(EngineEvent::StateChanged);
        Ok(())
    }

    /// Resolve a crew member's pending perk choice.
    ///
    /// # Errors
    ///
    /// Fails when no choice is pending or the perk is not offered.
    pub fn choose_perk(&mut self, member_id: &str, perk_id: &str) -> Result<(), PerkError> {
        let seq = self.state.log_seq;
        progression::choose_perk(&mut self.state, member_id, perk_id, &self.cfg)?;
        self.emit_log_events(seq);
        self.events.push_back(EngineEvent::StateChanged);
        Ok(())
    }

    /// Advance the simulation to `now_ms`: decay heat, resolve matured
    /// runs (chaining continuations), and sample stats.
    pub fn tick(&mut self, now_ms: u64) -> TickReport {
        let dt = now_ms.saturating_sub(self.state.last_tick_ms);
        let heat_before = self.state.ledger.amount(RES_HEAT);
        if self.state.last_tick_ms > 0 {
            self.state
                .ledger
                .decay_heat(dt, self.cfg.heat_half_life_ms);
        }

        let seq = self.state.log_seq;
        let report = runs::tick_runs(&mut self.state, &self.catalog, &self.cfg, now_ms);
        self.record_stats(now_ms);
        self.state.last_tick_ms = now_ms;

        self.emit_log_events(seq);
        self.events
            .push_back(EngineEvent::TickAdvanced { now_ms });
        if !report.completed_run_ids.is_empty() {
            self.events.push_back(EngineEvent::RunsCompleted {
                run_ids: report.completed_run_ids.clone(),
            });
        }
        for key in &report.modal_keys {
            self.events
                .push_back(EngineEvent::ModalRequested { key: key.clone() });
        }
        let heat_moved = (self.state.ledger.amount(RES_HEAT) - heat_before).abs() > f64::EPSILON;
        if !report.completed_run_ids.is_empty() || heat_moved {
            self.events.push_back(EngineEvent::StateChanged);
        }
        report
    }

    /// Serialize the current state into a save slot.
    ///
    /// # Errors
    ///
    /// Returns an error when serialization or the storage write fails.
    pub fn save(&mut self, slot: &str) -> Result<(), anyhow::Error> {
        let payload = persist::snapshot_json(&mut self.state, &self.cfg)?;
        self.storage.set(slot, &payload).map_err(anyhow::Error::new)
    }

    /// Replace the current state from a save slot, replaying any runs that
    /// matured while the engine was not ticking.
    ///
    /// # Errors
    ///
    /// Returns an error only when the storage read itself fails; corrupt
    /// payloads recover to a fresh default state.
    pub fn load(&mut self, slot: &str, now_ms: u64) -> Result<LoadReport, anyhow::Error> {
        let raw = self.storage.get(slot).map_err(anyhow::Error::new)?;
        let (state, report) = persist::load_state(
            raw.as_deref(),
            &self.catalog,
            &self.cfg,
            now_ms,
            self.state.seed,
        );
        self.state = state;
        if !report.tick.completed_run_ids.is_empty() {
            self.events.push_back(EngineEvent::RunsCompleted {
                run_ids: report.tick.completed_run_ids.clone(),
            });
        }
        for key in &report.tick.modal_keys {
            self.events
                .push_back(EngineEvent::ModalRequested { key: key.clone() });
        }
        self.events.push_back(EngineEvent::StateChanged);
        Ok(report)
    }

    /// Remove a save slot.
    ///
    /// # Errors
    ///
    /// Returns an error when the storage delete fails.
    pub fn clear_slot(&self, slot: &str) -> Result<(), anyhow::Error> {
        self.storage.remove(slot).map_err(anyhow::Error::new)
    }

    /// Whether a save slot currently holds a snapshot.
    ///
    /// # Errors
    ///
    /// Returns an error when the storage probe fails.
    pub fn slot_exists(&self, slot: &str) -> Result<bool, anyhow::Error> {
        self.storage.exists(slot).map_err(anyhow::Error::new)
    }

    /// Drain all queued notifications.
    pub fn drain_events(&mut self) -> Vec<EngineEvent> {
        self.events.drain(..).collect()
    }

    fn record_stats(&mut self, now_ms: u64) {
        let values: Vec<(Metric, f64)> = Metric::ALL
            .into_iter()
            .map(|metric| (metric, self.state.metric_value(metric)))
            .collect();
        self.state
            .stats
            .record(now_ms, self.cfg.stats_capacity, |metric| {
                values
                    .iter()
                    .find(|(candidate, _)| *candidate == metric)
                    .map_or(0.0, |(_, value)| *value)
            });
    }

    fn emit_log_events(&mut self, seq_before: u64) {
        let appended = (self.state.log_seq - seq_before) as usize;
        if appended == 0 {
            return;
        }
        let start = self.state.logs.len().saturating_sub(appended);
        let entries: Vec<String> = self.state.logs[start..].to_vec();
        for entry in entries {
            self.events.push_back(EngineEvent::LogAppended { entry });
        }
    }
}
