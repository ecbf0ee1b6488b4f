//! Engine tuning configuration with authored-JSON overrides.
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Tunable engine parameters; every field has a documented default so a
/// `{}` config deserializes to the shipped behavior.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineCfg {
    /// Half-life of ambient heat decay, in milliseconds.
    #[serde(default = "EngineCfg::default_heat_half_life_ms")]
    pub heat_half_life_ms: u64,
    /// Maximum sub-run completions replayed by one offline catch-up pass.
    #[serde(default = "EngineCfg::default_offline_catchup_cap")]
    pub offline_catchup_cap: u32,
    /// Completed runs retained in the snapshot before oldest-first pruning.
    #[serde(default = "EngineCfg::default_completed_run_retention")]
    pub completed_run_retention: usize,
    /// Log entries retained in the in-state ledger tail.
    #[serde(default = "EngineCfg::default_log_tail_cap")]
    pub log_tail_cap: usize,
    /// Samples retained per metric per stats scale.
    #[serde(default = "EngineCfg::default_stats_capacity")]
    pub stats_capacity: usize,
}

impl Default for EngineCfg {
    fn default() -> Self {
        Self {
            heat_half_life_ms: Self::default_heat_half_life_ms(),
            offline_catchup_cap: Self::default_offline_catchup_cap(),
            completed_run_retention: Self::default_completed_run_retention(),
            log_tail_cap: Self::default_log_tail_cap(),
            stats_capacity: Self::default_stats_capacity(),
        }
    }
}

impl EngineCfg {
    const fn default_heat_half_life_ms() -> u64 {
        90_000
    }

    const fn default_offline_catchup_cap() -> u32 {
        1_000
    }

    const fn default_completed_run_retention() -> usize {
        50
    }

    const fn default_log_tail_cap() -> usize {
        200
    }

    const fn default_stats_capacity() -> usize {
        64
    }

    /// Validate documented bounds.
    ///
    /// # Errors
    ///
    /// Returns `EngineCfgError` when any field violates its bounds.
    pub fn validate(&self) -> Result<(), EngineCfgError> {
        if self.heat_half_life_ms < 1_000 {
            return Err(EngineCfgError::MinViolation {
                field: "heat_half_life_ms",
                min: 1_000,
                value: self.heat_half_life_ms,
            });
        }
        if self.offline_catchup_cap == 0 {
            return Err(EngineCfgError::MinViolation {
                field: "offline_catchup_cap",
                min: 1,
                value: u64::from(self.offline_catchup_cap),
            });
        }
        if !(8..=512).contains(&self.stats_capacity) {
            return Err(EngineCfgError::RangeViolation {
                field: "stats_capacity",
                min: 8,
                max: 512,
                value: self.stats_capacity as u64,
            });
        }
        if self.log_tail_cap < 16 {
            return Err(EngineCfgError::MinViolation {
                field: "log_tail_cap",
                min: 16,
                value: self.log_tail_cap as u64,
            });
        }
        Ok(())
    }
}

/// Errors raised when engine configuration invariants are violated.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum EngineCfgError {
    #[error("{field} must be at least {min} (got {value})")]
    MinViolation {
        field: &'static str,
        min: u64,
        value: u64,
    },
    #[error("{field} must be between {min} and {max} (got {value})")]
    RangeViolation {
        field: &'static str,
        min: u64,
        max: u64,
        value: u64,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_json_yields_defaults() {
        let cfg: EngineCfg = serde_json::from_str("{}").unwrap();
        assert_eq!(cfg, EngineCfg::default());
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn validation_rejects_zero_catchup_cap() {
        let cfg = EngineCfg {
            offline_catchup_cap: 0,
            ..EngineCfg::default()
        };
        assert_eq!(
            cfg.validate(),
            Err(EngineCfgError::MinViolation {
                field: "offline_catchup_cap",
                min: 1,
                value: 0,
            })
        );
    }

    #[test]
    fn validation_rejects_tiny_half_life() {
        let cfg = EngineCfg {
            heat_half_life_ms: 10,
            ..EngineCfg::default()
        };
        assert!(cfg.validate().is_err());
    }
}
