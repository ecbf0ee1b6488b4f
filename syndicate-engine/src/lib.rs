//! Syndicate Progression Engine
//!
//! Platform-agnostic core logic for the Syndicate idle crime sim: timed
//! crew operations resolving into randomized-or-fixed economy changes,
//! repeat chains that survive serialization, offline catch-up replay, and
//! a star/perk crew progression layer. This crate provides the whole
//! simulation without UI or platform-specific dependencies.

pub mod catalog;
pub mod config;
pub mod crew;
pub mod effects;
pub mod engine;
pub mod ledger;
pub mod modifier;
pub mod outcome;
pub mod persist;
pub mod progression;
pub mod rng;
pub mod runs;
pub mod state;
pub mod stats;

// Re-export commonly used types
pub use catalog::{
    Activity, ActivityOption, Amount, Branch, Catalog, Condition, InputCosts, JailSpec,
    OutcomeSpec, Perk, PerkTier, Requirements, Resolution, ResourceDef, Role, StaffRequirement,
    StarThreshold, XpRewards,
};
pub use config::{EngineCfg, EngineCfgError};
pub use crew::{CrewMember, CrewStatus, PendingPerkChoice};
pub use effects::{Effect, EngineEvent};
pub use engine::Engine;
pub use ledger::{RES_CASH, RES_CRED, RES_HEAT, ResourceLedger};
pub use modifier::{ModifierAdjustments, ModifierRule, ModifierTrigger, compute_adjustments};
pub use outcome::{EffectBundle, plan_outcome, resolve_bundle};
pub use persist::{LoadReport, load_state, prune_completed_runs, snapshot_json};
pub use progression::{PerkError, REDEMPTION_TIER, choose_perk, grant_completion_xp};
pub use rng::{CountingRng, RngBundle};
pub use runs::{
    REPEAT_FOREVER, Run, RunControlError, RunSnapshot, RunStatus, StaffIds, StartError,
    StartRequest, SubRunResult, TickReport, cancel_run, start_run, stop_repeat, tick_runs,
};
pub use state::{SCHEMA_VERSION, WorldState};
pub use stats::{Metric, ScaleSeries, StatScale, StatsBoard};

/// Trait for the external save-slot collaborator.
///
/// The engine treats the stored value as an opaque serialized snapshot; it
/// owns the schema, the slot layer owns naming/namespacing only.
pub trait SlotStorage {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Read the payload stored under a slot key.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying store cannot be read.
    fn get(&self, slot: &str) -> Result<Option<String>, Self::Error>;

    /// Write a payload under a slot key.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying store cannot be written.
    fn set(&self, slot: &str, payload: &str) -> Result<(), Self::Error>;

    /// Remove a slot key.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying store cannot be written.
    fn remove(&self, slot: &str) -> Result<(), Self::Error>;

    /// Whether a slot key currently holds a payload.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying store cannot be read.
    fn exists(&self, slot: &str) -> Result<bool, Self::Error>;
}
