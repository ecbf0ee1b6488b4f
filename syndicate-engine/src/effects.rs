//! Closed effect union dispatched by outcomes, plus outward notifications.
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// An authored side effect attached to an outcome.
///
/// Reveal/flag/log effects apply directly against engine state; modal
/// effects surface through the event queue for the presentation layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Effect {
    Reveal { key: String },
    SetFlag { flag: String, value: f64 },
    Log { key: String },
    ShowModal { key: String },
}

/// Parse a raw catalog effect entry.
///
/// Unknown or malformed entries are a logged no-op, never an error —
/// catalog content is externally authored and must degrade gracefully.
#[must_use]
pub fn parse_effect(raw: &Value) -> Option<Effect> {
    match serde_json::from_value(raw.clone()) {
        Ok(effect) => Some(effect),
        Err(err) => {
            log::debug!("ignoring unrecognized effect entry: {err}");
            None
        }
    }
}

/// Observable notifications emitted toward the presentation layer.
///
/// Notifications only — never used to drive engine-internal control flow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    StateChanged,
    TickAdvanced { now_ms: u64 },
    RunsCompleted { run_ids: Vec<u64> },
    LogAppended { entry: String },
    ModalRequested { key: String },
}
