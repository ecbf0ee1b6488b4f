//! Conditional adjustments reweighting outcomes and rescaling deltas.
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

use crate::catalog::Catalog;
use crate::crew::CrewMember;
use crate::ledger::RES_HEAT;
use crate::state::WorldState;

const FLAG_EPSILON: f64 = 1e-9;

fn default_mult() -> f64 {
    1.0
}

/// Condition deciding whether (and how many times) a rule applies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ModifierTrigger {
    HeatAbove { value: f64 },
    HeatBelow { value: f64 },
    ResourceGte { resource: String, value: f64 },
    FlagEquals { flag: String, value: f64 },
    /// Applies once per star the best-qualified assigned member of the
    /// role has reached.
    PerStarOfRole { role_id: String },
    HasRole { role_id: String },
}

/// One authored modifier rule on an option.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModifierRule {
    pub when: ModifierTrigger,
    #[serde(default)]
    pub weight_deltas: HashMap<String, f64>,
    #[serde(default)]
    pub cred_add: f64,
    #[serde(default)]
    pub heat_add: f64,
    #[serde(default = "default_mult")]
    pub cred_mult: f64,
    #[serde(default = "default_mult")]
    pub heat_mult: f64,
    #[serde(default = "default_mult")]
    pub duration_mult: f64,
}

/// Accumulated adjustment bundle fed into resolution.
///
/// Weight deltas and additive deltas accumulate additively across rules;
/// multipliers accumulate multiplicatively. Computed once at run start and
/// carried in the run snapshot, never recomputed at completion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModifierAdjustments {
    #[serde(default)]
    pub weight_deltas: HashMap<String, f64>,
    #[serde(default)]
    pub cred_add: f64,
    #[serde(default)]
    pub heat_add: f64,
    #[serde(default = "default_mult")]
    pub cred_mult: f64,
    #[serde(default = "default_mult")]
    pub heat_mult: f64,
    #[serde(default = "default_mult")]
    pub duration_mult: f64,
}

impl Default for ModifierAdjustments {
    fn default() -> Self {
        Self {
            weight_deltas: HashMap::new(),
            cred_add: 0.0,
            heat_add: 0.0,
            cred_mult: 1.0,
            heat_mult: 1.0,
            duration_mult: 1.0,
        }
    }
}

impl ModifierAdjustments {
    /// Weight delta for one outcome id; absent entries read as zero.
    #[must_use]
    pub fn weight_delta(&self, outcome_id: &str) -> f64 {
        self.weight_deltas.get(outcome_id).copied().unwrap_or(0.0)
    }
}

/// Evaluate an option's raw modifier rules against the acting crew and
/// current world state. Malformed rules are skipped.
#[must_use]
pub fn compute_adjustments(
    raw_rules: &[Value],
    assigned: &[&CrewMember],
    state: &WorldState,
    catalog: &Catalog,
) -> ModifierAdjustments {
    let mut adjustments = ModifierAdjustments::default();
    for raw in raw_rules {
        let rule: ModifierRule = match serde_json::from_value(raw.clone()) {
            Ok(rule) => rule,
            Err(err) => {
                log::debug!("ignoring unrecognized modifier rule: {err}");
                continue;
            }
        };
        let times = trigger_multiplicity(&rule.when, assigned, state, catalog);
        if times == 0 {
            continue;
        }
        let times_f = f64::from(times);
        for (outcome_id, delta) in &rule.weight_deltas {
            *adjustments
                .weight_deltas
                .entry(outcome_id.clone())
                .or_insert(0.0) += delta * times_f;
        }
        adjustments.cred_add += rule.cred_add * times_f;
        adjustments.heat_add += rule.heat_add * times_f;
        adjustments.cred_mult *= rule.cred_mult.powi(times as i32);
        adjustments.heat_mult *= rule.heat_mult.powi(times as i32);
        adjustments.duration_mult *= rule.duration_mult.powi(times as i32);
    }
    adjustments
}

fn trigger_multiplicity(
    trigger: &ModifierTrigger,
    assigned: &[&CrewMember],
    state: &WorldState,
    catalog: &Catalog,
) -> u32 {
    match trigger {
        ModifierTrigger::HeatAbove { value } => {
            u32::from(state.ledger.amount(RES_HEAT) > *value)
        }
        ModifierTrigger::HeatBelow { value } => {
            u32::from(state.ledger.amount(RES_HEAT) < *value)
        }
        ModifierTrigger::ResourceGte { resource, value } => {
            u32::from(state.ledger.amount(resource) >= *value)
        }
        ModifierTrigger::FlagEquals { flag, value } => {
            let current = state.flags.get(flag).copied().unwrap_or(0.0);
            u32::from((current - value).abs() < FLAG_EPSILON)
        }
        ModifierTrigger::PerStarOfRole { role_id } => best_stars(assigned, role_id, catalog),
        ModifierTrigger::HasRole { role_id } => {
            u32::from(assigned.iter().any(|member| member.role_id == *role_id))
        }
    }
}

fn best_stars(assigned: &[&CrewMember], role_id: &str, catalog: &Catalog) -> u32 {
    let Some(role) = catalog.role(role_id) else {
        return 0;
    };
    assigned
        .iter()
        .filter(|member| member.role_id == role_id)
        .map(|member| u32::from(role.stars_for_xp(member.xp)))
        .max()
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{Role, StarThreshold};
    use serde_json::json;

    fn make_state_with_heat(heat: f64) -> WorldState {
        let mut state = WorldState::default();
        state.ledger.add(RES_HEAT, heat);
        state
    }

    fn make_catalog_with_role() -> Catalog {
        let mut catalog = Catalog::empty();
        catalog.roles.push(Role {
            id: "burglar".into(),
            name: "Burglar".into(),
            xp_to_stars: vec![
                StarThreshold { stars: 1, min_xp: 10 },
                StarThreshold { stars: 2, min_xp: 30 },
            ],
            perk_choices: Vec::new(),
        });
        catalog
    }

    #[test]
    fn heat_trigger_gates_rule() {
        let rules = vec![json!({
            "when": { "kind": "heat_above", "value": 50.0 },
            "weight_deltas": { "busted": 10.0 },
            "duration_mult": 1.5
        })];
        let catalog = Catalog::empty();

        let cold = make_state_with_heat(10.0);
        let adj = compute_adjustments(&rules, &[], &cold, &catalog);
        assert!((adj.weight_delta("busted")).abs() < f64::EPSILON);
        assert!((adj.duration_mult - 1.0).abs() < f64::EPSILON);

        let hot = make_state_with_heat(80.0);
        let adj = compute_adjustments(&rules, &[], &hot, &catalog);
        assert!((adj.weight_delta("busted") - 10.0).abs() < f64::EPSILON);
        assert!((adj.duration_mult - 1.5).abs() < f64::EPSILON);
    }

    #[test]
    fn per_star_rule_scales_with_best_member() {
        let catalog = make_catalog_with_role();
        let mut ace = CrewMember::new("ace", "Ace", "burglar");
        ace.xp = 35; // two stars
        let novice = CrewMember::new("kid", "Kid", "burglar");
        let rules = vec![json!({
            "when": { "kind": "per_star_of_role", "role_id": "burglar" },
            "cred_add": 2.0,
            "duration_mult": 0.9
        })];

        let state = WorldState::default();
        let adj = compute_adjustments(&rules, &[&ace, &novice], &state, &catalog);
        assert!((adj.cred_add - 4.0).abs() < f64::EPSILON);
        assert!((adj.duration_mult - 0.81).abs() < 1e-9);
    }

    #[test]
    fn malformed_rules_are_skipped() {
        let rules = vec![
            json!({"when": {"kind": "summon_meteor"}, "cred_add": 99.0}),
            json!(42),
            json!({
                "when": { "kind": "has_role", "role_id": "burglar" },
                "heat_add": -1.0
            }),
        ];
        let catalog = Catalog::empty();
        let member = CrewMember::new("ace", "Ace", "burglar");
        let state = WorldState::default();

        let adj = compute_adjustments(&rules, &[&member], &state, &catalog);
        assert!((adj.cred_add).abs() < f64::EPSILON);
        assert!((adj.heat_add + 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn rules_accumulate_additively_and_multiplicatively() {
        let rules = vec![
            json!({
                "when": { "kind": "heat_below", "value": 100.0 },
                "weight_deltas": { "clean": 5.0 },
                "cred_add": 1.0,
                "cred_mult": 2.0
            }),
            json!({
                "when": { "kind": "heat_below", "value": 100.0 },
                "weight_deltas": { "clean": 3.0 },
                "cred_add": 0.5,
                "cred_mult": 1.5
            }),
        ];
        let catalog = Catalog::empty();
        let state = WorldState::default();

        let adj = compute_adjustments(&rules, &[], &state, &catalog);
        assert!((adj.weight_delta("clean") - 8.0).abs() < f64::EPSILON);
        assert!((adj.cred_add - 1.5).abs() < f64::EPSILON);
        assert!((adj.cred_mult - 3.0).abs() < f64::EPSILON);
    }
}
