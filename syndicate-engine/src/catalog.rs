//! Authored content catalog: branches, activities, roles, resources, perks.
//!
//! Loaded once at startup and never mutated by the engine. Fields the engine
//! does not read are ignored; malformed modifier/effect/condition entries are
//! kept as raw JSON and degrade to no-ops when evaluated.
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// A fixed amount or an inclusive range resolved at application time.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Amount {
    Fixed(f64),
    Range { min: f64, max: f64 },
}

impl Default for Amount {
    fn default() -> Self {
        Self::Fixed(0.0)
    }
}

/// Staff slot requirement declared by an option.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaffRequirement {
    pub role_id: String,
    #[serde(default = "default_count")]
    pub count: u32,
    #[serde(default)]
    pub stars_min: u8,
    #[serde(default = "default_true")]
    pub required: bool,
}

fn default_count() -> u32 {
    1
}

fn default_true() -> bool {
    true
}

/// Commitment costs debited when a run starts, not when it completes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct InputCosts {
    #[serde(default)]
    pub resources: HashMap<String, f64>,
    #[serde(default)]
    pub items: HashMap<String, i64>,
}

impl InputCosts {
    /// True when no cost of any kind is declared.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.resources.is_empty() && self.items.is_empty()
    }
}

/// Staffing requirements for an option.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Requirements {
    #[serde(default)]
    pub staff: Vec<StaffRequirement>,
}

/// XP granted to assigned crew on a successful completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct XpRewards {
    #[serde(default)]
    pub on_complete: u32,
}

/// Sidelining clause carried by a botched outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JailSpec {
    pub duration_ms: u64,
    #[serde(default)]
    pub log: Option<String>,
}

fn default_weight() -> f64 {
    1.0
}

/// One named outcome inside a `weighted_outcomes` resolution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutcomeSpec {
    pub id: String,
    #[serde(default = "default_weight")]
    pub weight: f64,
    #[serde(default)]
    pub outputs: HashMap<String, Amount>,
    #[serde(default)]
    pub items: HashMap<String, i64>,
    #[serde(default)]
    pub cred: f64,
    #[serde(default)]
    pub heat: f64,
    #[serde(default = "default_true")]
    pub success: bool,
    #[serde(default)]
    pub effects: Vec<Value>,
    #[serde(default)]
    pub jail: Option<JailSpec>,
    #[serde(default)]
    pub log: Option<String>,
}

/// Resolution rule turning a completed run into economy effects.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Resolution {
    /// Fixed amounts applied as-is.
    Deterministic {
        #[serde(default)]
        outputs: HashMap<String, f64>,
        #[serde(default)]
        items: HashMap<String, i64>,
        #[serde(default)]
        cred: f64,
        #[serde(default)]
        heat: f64,
        #[serde(default)]
        effects: Vec<Value>,
    },
    /// Numeric fields may be `{min,max}` pairs drawn at completion time.
    RangedOutputs {
        #[serde(default)]
        outputs: HashMap<String, Amount>,
        #[serde(default)]
        items: HashMap<String, i64>,
        #[serde(default)]
        cred: Amount,
        #[serde(default)]
        heat: Amount,
        #[serde(default)]
        effects: Vec<Value>,
    },
    /// Named outcomes; the winner is rolled once, at run-start time.
    WeightedOutcomes { outcomes: Vec<OutcomeSpec> },
}

/// Boolean gate over flags, reveals, and the resource ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Condition {
    Revealed { key: String },
    FlagEquals { flag: String, value: f64 },
    ResourceGte { resource: String, value: f64 },
}

/// A specific variant of an activity a player can commit crew to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityOption {
    pub id: String,
    pub name: String,
    pub duration_ms: u64,
    #[serde(default)]
    pub inputs: InputCosts,
    #[serde(default)]
    pub requirements: Requirements,
    pub resolution: Resolution,
    #[serde(default)]
    pub modifiers: Vec<Value>,
    #[serde(default)]
    pub xp_rewards: XpRewards,
    #[serde(default)]
    pub visible_when: Vec<Value>,
    #[serde(default)]
    pub unlocked_when: Vec<Value>,
}

/// An activity grouping one or more options under a branch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Activity {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub branch_id: Option<String>,
    /// Hidden activities require the `activity:<id>` reveal before any
    /// option can start.
    #[serde(default)]
    pub hidden: bool,
    #[serde(default)]
    pub options: Vec<ActivityOption>,
}

/// XP threshold entry; the table is scanned ascending.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StarThreshold {
    pub stars: u8,
    pub min_xp: u32,
}

/// Perk-choice tier unlocked at an exact star count.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PerkTier {
    pub tier_id: String,
    pub stars_required: u8,
    pub options: Vec<String>,
}

/// A crew role with its progression tables.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub xp_to_stars: Vec<StarThreshold>,
    #[serde(default)]
    pub perk_choices: Vec<PerkTier>,
}

impl Role {
    /// Highest star tier whose threshold is met by `xp`.
    #[must_use]
    pub fn stars_for_xp(&self, xp: u32) -> u8 {
        let mut stars = 0;
        for entry in &self.xp_to_stars {
            if xp >= entry.min_xp {
                stars = stars.max(entry.stars);
            }
        }
        stars
    }

    /// Perk tier unlocked at exactly `stars`, if the role defines one.
    #[must_use]
    pub fn tier_at(&self, stars: u8) -> Option<&PerkTier> {
        self.perk_choices
            .iter()
            .find(|tier| tier.stars_required == stars)
    }
}

/// Resource definition; `start` seeds the ledger of a fresh state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceDef {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub start: f64,
}

/// Branch grouping for activities.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Branch {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub hidden: bool,
}

/// A permanent crew ability unlocked at a star tier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Perk {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub desc: String,
}

/// Container for all authored content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Catalog {
    #[serde(default)]
    pub branches: Vec<Branch>,
    #[serde(default)]
    pub activities: Vec<Activity>,
    #[serde(default)]
    pub roles: Vec<Role>,
    #[serde(default)]
    pub resources: Vec<ResourceDef>,
    #[serde(default)]
    pub perks: Vec<Perk>,
}

impl Catalog {
    /// Create an empty catalog (useful for tests).
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Load a catalog from a JSON string.
    ///
    /// # Errors
    ///
    /// Returns an error if the JSON cannot be parsed into valid content.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Look up an activity by id.
    #[must_use]
    pub fn activity(&self, activity_id: &str) -> Option<&Activity> {
        self.activities
            .iter()
            .find(|activity| activity.id == activity_id)
    }

    /// Look up an option within an activity.
    #[must_use]
    pub fn option(&self, activity_id: &str, option_id: &str) -> Option<&ActivityOption> {
        self.activity(activity_id)?
            .options
            .iter()
            .find(|option| option.id == option_id)
    }

    /// Look up a role by id.
    #[must_use]
    pub fn role(&self, role_id: &str) -> Option<&Role> {
        self.roles.iter().find(|role| role.id == role_id)
    }

    /// Look up a perk by id.
    #[must_use]
    pub fn perk(&self, perk_id: &str) -> Option<&Perk> {
        self.perks.iter().find(|perk| perk.id == perk_id)
    }
}
