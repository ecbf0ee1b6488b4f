//! Resource and item ledger with clamp invariants and ambient heat decay.
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::catalog::InputCosts;

/// Well-known resource ids with special handling.
pub const RES_CASH: &str = "cash";
pub const RES_CRED: &str = "cred";
pub const RES_HEAT: &str = "heat";

const CRED_MIN: f64 = 0.0;
const CRED_MAX: f64 = 100.0;
const HEAT_EPSILON: f64 = 0.01;

/// Mapping of resource id to numeric amount plus a parallel item inventory.
///
/// All mutation is funneled through [`ResourceLedger::add`] so the clamp
/// invariants hold after every write: `cred` stays in `[0, 100]`, `heat`
/// never goes negative. Everything else is an unclamped signed accumulator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ResourceLedger {
    #[serde(default)]
    resources: HashMap<String, f64>,
    #[serde(default)]
    items: HashMap<String, i64>,
}

impl ResourceLedger {
    /// Current amount of a resource; missing entries read as zero.
    #[must_use]
    pub fn amount(&self, resource_id: &str) -> f64 {
        self.resources.get(resource_id).copied().unwrap_or(0.0)
    }

    /// Current count of an item; missing entries read as zero.
    #[must_use]
    pub fn item_count(&self, item_id: &str) -> i64 {
        self.items.get(item_id).copied().unwrap_or(0)
    }

    /// Apply a signed delta to a resource, then re-clamp it.
    pub fn add(&mut self, resource_id: &str, delta: f64) {
        let entry = self.resources.entry(resource_id.to_string()).or_insert(0.0);
        *entry = clamp_resource(resource_id, *entry + delta);
    }

    /// Apply a signed delta to an item count, floored at zero.
    pub fn add_item(&mut self, item_id: &str, delta: i64) {
        let entry = self.items.entry(item_id.to_string()).or_insert(0);
        *entry = (*entry + delta).max(0);
    }

    /// Whether every declared input cost is currently affordable.
    #[must_use]
    pub fn can_afford(&self, costs: &InputCosts) -> bool {
        costs
            .resources
            .iter()
            .all(|(id, cost)| self.amount(id) >= *cost)
            && costs
                .items
                .iter()
                .all(|(id, count)| self.item_count(id) >= *count)
    }

    /// Debit all declared input costs. Callers check affordability first.
    pub fn debit(&mut self, costs: &InputCosts) {
        for (id, cost) in &costs.resources {
            self.add(id, -cost);
        }
        for (id, count) in &costs.items {
            self.add_item(id, -count);
        }
    }

    /// Geometric heat decay toward zero over an elapsed interval.
    pub fn decay_heat(&mut self, dt_ms: u64, half_life_ms: u64) {
        if dt_ms == 0 {
            return;
        }
        let heat = self.amount(RES_HEAT);
        if heat <= 0.0 {
            return;
        }
        let halvings = dt_ms as f64 / half_life_ms.max(1) as f64;
        let mut decayed = heat * 0.5_f64.powf(halvings);
        if decayed < HEAT_EPSILON {
            decayed = 0.0;
        }
        self.resources.insert(RES_HEAT.to_string(), decayed);
    }

    /// Re-apply every clamp; used after merging a loaded snapshot.
    pub fn reclamp(&mut self) {
        for (id, value) in &mut self.resources {
            *value = clamp_resource(id, *value);
        }
        for value in self.items.values_mut() {
            *value = (*value).max(0);
        }
    }

    /// Iterate resource entries (stable only per process, used for display).
    pub fn resources(&self) -> impl Iterator<Item = (&str, f64)> {
        self.resources.iter().map(|(id, v)| (id.as_str(), *v))
    }
}

fn clamp_resource(resource_id: &str, value: f64) -> f64 {
    match resource_id {
        RES_CRED => value.clamp(CRED_MIN, CRED_MAX),
        RES_HEAT => value.max(0.0),
        _ => value,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cred_clamps_to_band() {
        let mut ledger = ResourceLedger::default();
        ledger.add(RES_CRED, 250.0);
        assert!((ledger.amount(RES_CRED) - 100.0).abs() < f64::EPSILON);
        ledger.add(RES_CRED, -500.0);
        assert!(ledger.amount(RES_CRED).abs() < f64::EPSILON);
    }

    #[test]
    fn heat_never_negative() {
        let mut ledger = ResourceLedger::default();
        ledger.add(RES_HEAT, 5.0);
        ledger.add(RES_HEAT, -20.0);
        assert!(ledger.amount(RES_HEAT).abs() < f64::EPSILON);
    }

    #[test]
    fn other_resources_go_negative() {
        let mut ledger = ResourceLedger::default();
        ledger.add(RES_CASH, -40.0);
        assert!((ledger.amount(RES_CASH) + 40.0).abs() < f64::EPSILON);
    }

    #[test]
    fn heat_decay_is_monotone_and_snaps_to_zero() {
        let mut ledger = ResourceLedger::default();
        ledger.add(RES_HEAT, 8.0);
        ledger.decay_heat(90_000, 90_000);
        let after_one_half_life = ledger.amount(RES_HEAT);
        assert!((after_one_half_life - 4.0).abs() < 1e-9);

        ledger.decay_heat(90_000 * 20, 90_000);
        assert!(ledger.amount(RES_HEAT).abs() < f64::EPSILON);
    }

    #[test]
    fn afford_and_debit_cover_items() {
        let mut ledger = ResourceLedger::default();
        ledger.add(RES_CASH, 10.0);
        ledger.add_item("lockpick", 2);

        let mut costs = InputCosts::default();
        costs.resources.insert(RES_CASH.to_string(), 10.0);
        costs.items.insert("lockpick".to_string(), 1);
        assert!(ledger.can_afford(&costs));

        ledger.debit(&costs);
        assert!(ledger.amount(RES_CASH).abs() < f64::EPSILON);
        assert_eq!(ledger.item_count("lockpick"), 1);
        assert!(!ledger.can_afford(&costs));
    }
}
