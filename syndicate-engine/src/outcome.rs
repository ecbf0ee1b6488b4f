//! Outcome resolution: the roll happens at commit time, the reveal later.
use rand::Rng;
use std::collections::HashMap;

use crate::catalog::{Amount, JailSpec, OutcomeSpec, Resolution};
use crate::effects::{Effect, parse_effect};
use crate::modifier::ModifierAdjustments;

/// Concrete resource/item/flag consequences of one completed sub-run.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct EffectBundle {
    pub outputs: HashMap<String, f64>,
    pub items: HashMap<String, i64>,
    pub cred_delta: f64,
    pub heat_delta: f64,
    pub effects: Vec<Effect>,
    pub jail: Option<JailSpec>,
    pub log: Option<String>,
    pub success: bool,
}

impl EffectBundle {
    /// A jail clause marks the resolution as botched.
    #[must_use]
    pub const fn is_botched(&self) -> bool {
        self.jail.is_some()
    }
}

/// Choose the planned outcome id for a `weighted_outcomes` resolution.
///
/// Called exactly once, at run-start time. Selection accumulates
/// `max(0, weight)` after modifier adjustment, draws uniformly over the
/// total, and picks the first outcome whose cumulative weight meets the
/// draw; a zero total falls back to the first outcome. Other resolution
/// kinds have nothing to plan.
#[must_use]
pub fn plan_outcome<R: Rng>(
    resolution: &Resolution,
    adjustments: &ModifierAdjustments,
    rng: &mut R,
) -> Option<String> {
    let Resolution::WeightedOutcomes { outcomes } = resolution else {
        return None;
    };
    let first = outcomes.first()?;

    let weights: Vec<f64> = outcomes
        .iter()
        .map(|outcome| (outcome.weight + adjustments.weight_delta(&outcome.id)).max(0.0))
        .collect();
    let total: f64 = weights.iter().sum();
    if total <= 0.0 {
        return Some(first.id.clone());
    }

    let roll = rng.gen_range(0.0..total);
    let mut cumulative = 0.0;
    for (outcome, weight) in outcomes.iter().zip(&weights) {
        cumulative += weight;
        if roll < cumulative {
            return Some(outcome.id.clone());
        }
    }
    Some(first.id.clone())
}

/// Apply an already-decided resolution, producing the effect bundle.
///
/// For weighted resolutions the stored planned id is looked up
/// deterministically — it is never re-rolled; only ranged draws consume
/// randomness here, at application time.
#[must_use]
pub fn resolve_bundle<R: Rng>(
    resolution: &Resolution,
    planned_outcome_id: Option<&str>,
    adjustments: &ModifierAdjustments,
    rng: &mut R,
) -> EffectBundle {
    let mut bundle = match resolution {
        Resolution::Deterministic {
            outputs,
            items,
            cred,
            heat,
            effects,
        } => EffectBundle {
            outputs: outputs.clone(),
            items: items.clone(),
            cred_delta: *cred,
            heat_delta: *heat,
            effects: effects.iter().filter_map(parse_effect).collect(),
            jail: None,
            log: None,
            success: true,
        },
        Resolution::RangedOutputs {
            outputs,
            items,
            cred,
            heat,
            effects,
        } => EffectBundle {
            outputs: outputs
                .iter()
                .map(|(id, amount)| (id.clone(), draw_amount(*amount, rng)))
                .collect(),
            items: items.clone(),
            cred_delta: draw_amount(*cred, rng),
            heat_delta: draw_amount(*heat, rng),
            effects: effects.iter().filter_map(parse_effect).collect(),
            jail: None,
            log: None,
            success: true,
        },
        Resolution::WeightedOutcomes { outcomes } => {
            let Some(outcome) = lookup_outcome(outcomes, planned_outcome_id) else {
                return EffectBundle {
                    success: true,
                    ..EffectBundle::default()
                };
            };
            apply_outcome_spec(outcome, rng)
        }
    };

    bundle.cred_delta = (bundle.cred_delta + adjustments.cred_add) * adjustments.cred_mult;
    bundle.heat_delta = (bundle.heat_delta + adjustments.heat_add) * adjustments.heat_mult;
    bundle
}

fn lookup_outcome<'a>(
    outcomes: &'a [OutcomeSpec],
    planned_outcome_id: Option<&str>,
) -> Option<&'a OutcomeSpec> {
    planned_outcome_id
        .and_then(|id| outcomes.iter().find(|outcome| outcome.id == id))
        .or_else(|| outcomes.first())
}

fn apply_outcome_spec<R: Rng>(outcome: &OutcomeSpec, rng: &mut R) -> EffectBundle {
    EffectBundle {
        outputs: outcome
            .outputs
            .iter()
            .map(|(id, amount)| (id.clone(), draw_amount(*amount, rng)))
            .collect(),
        items: outcome.items.clone(),
        cred_delta: outcome.cred,
        heat_delta: outcome.heat,
        effects: outcome.effects.iter().filter_map(parse_effect).collect(),
        jail: outcome.jail.clone(),
        log: outcome.log.clone(),
        success: outcome.success && outcome.jail.is_none(),
    }
}

fn draw_amount<R: Rng>(amount: Amount, rng: &mut R) -> f64 {
    match amount {
        Amount::Fixed(value) => value,
        Amount::Range { min, max } => {
            if max <= min {
                return min;
            }
            if min.fract() == 0.0 && max.fract() == 0.0 {
                // Whole-number bounds draw a uniform integer, inclusive.
                rng.gen_range(min as i64..=max as i64) as f64
            } else {
                rng.gen_range(min..=max)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;
    use serde_json::json;

    fn weighted(outcomes: Vec<OutcomeSpec>) -> Resolution {
        Resolution::WeightedOutcomes { outcomes }
    }

    fn outcome(id: &str, weight: f64) -> OutcomeSpec {
        serde_json::from_value(json!({ "id": id, "weight": weight })).unwrap()
    }

    #[test]
    fn zero_weight_outcome_is_never_planned() {
        let resolution = weighted(vec![outcome("never", 0.0), outcome("always", 100.0)]);
        let adjustments = ModifierAdjustments::default();
        for seed in 0..64 {
            let mut rng = ChaCha20Rng::seed_from_u64(seed);
            let planned = plan_outcome(&resolution, &adjustments, &mut rng);
            assert_eq!(planned.as_deref(), Some("always"));
        }
    }

    #[test]
    fn zero_total_weight_falls_back_to_first() {
        let resolution = weighted(vec![outcome("first", 0.0), outcome("second", 0.0)]);
        let adjustments = ModifierAdjustments::default();
        let mut rng = ChaCha20Rng::seed_from_u64(9);
        assert_eq!(
            plan_outcome(&resolution, &adjustments, &mut rng).as_deref(),
            Some("first")
        );
    }

    #[test]
    fn weight_deltas_shift_planning() {
        let resolution = weighted(vec![outcome("a", 1.0), outcome("b", 1.0)]);
        let mut adjustments = ModifierAdjustments::default();
        adjustments.weight_deltas.insert("a".into(), -1.0);
        for seed in 0..32 {
            let mut rng = ChaCha20Rng::seed_from_u64(seed);
            assert_eq!(
                plan_outcome(&resolution, &adjustments, &mut rng).as_deref(),
                Some("b")
            );
        }
    }

    #[test]
    fn planned_id_is_replayed_not_rerolled() {
        let busted: OutcomeSpec = serde_json::from_value(json!({
            "id": "busted",
            "weight": 1.0,
            "cred": -5.0,
            "jail": { "duration_ms": 60000 }
        }))
        .unwrap();
        let resolution = weighted(vec![outcome("clean", 99.0), busted]);
        let adjustments = ModifierAdjustments::default();

        // Whatever the rng state, the stored id wins.
        for seed in 0..16 {
            let mut rng = ChaCha20Rng::seed_from_u64(seed);
            let bundle = resolve_bundle(&resolution, Some("busted"), &adjustments, &mut rng);
            assert!(bundle.is_botched());
            assert!(!bundle.success);
            assert!((bundle.cred_delta + 5.0).abs() < f64::EPSILON);
        }
    }

    #[test]
    fn ranged_outputs_draw_within_bounds() {
        let resolution: Resolution = serde_json::from_value(json!({
            "kind": "ranged_outputs",
            "outputs": { "cash": { "min": 10.0, "max": 20.0 } },
            "heat": { "min": 1.0, "max": 3.0 }
        }))
        .unwrap();
        let adjustments = ModifierAdjustments::default();
        let mut rng = ChaCha20Rng::seed_from_u64(3);

        for _ in 0..200 {
            let bundle = resolve_bundle(&resolution, None, &adjustments, &mut rng);
            let cash = bundle.outputs.get("cash").copied().unwrap();
            assert!((10.0..=20.0).contains(&cash));
            assert!(cash.fract().abs() < f64::EPSILON, "whole bounds draw integers");
            assert!((1.0..=3.0).contains(&bundle.heat_delta));
            assert!(bundle.success);
        }
    }

    #[test]
    fn adjustments_rescale_deltas() {
        let resolution: Resolution = serde_json::from_value(json!({
            "kind": "deterministic",
            "cred": 4.0,
            "heat": 10.0
        }))
        .unwrap();
        let adjustments = ModifierAdjustments {
            cred_add: 1.0,
            heat_mult: 0.5,
            ..ModifierAdjustments::default()
        };
        let mut rng = ChaCha20Rng::seed_from_u64(0);
        let bundle = resolve_bundle(&resolution, None, &adjustments, &mut rng);
        assert!((bundle.cred_delta - 5.0).abs() < f64::EPSILON);
        assert!((bundle.heat_delta - 5.0).abs() < f64::EPSILON);
    }

    #[test]
    fn deterministic_bundle_parses_effects() {
        let resolution: Resolution = serde_json::from_value(json!({
            "kind": "deterministic",
            "outputs": { "cash": 25.0 },
            "effects": [
                { "type": "reveal", "key": "activity:fence" },
                { "type": "launch_zeppelin" }
            ]
        }))
        .unwrap();
        let mut rng = ChaCha20Rng::seed_from_u64(0);
        let bundle = resolve_bundle(
            &resolution,
            None,
            &ModifierAdjustments::default(),
            &mut rng,
        );
        assert_eq!(bundle.effects.len(), 1, "unknown effect entries drop out");
        assert_eq!(bundle.outputs.get("cash"), Some(&25.0));
    }
}
