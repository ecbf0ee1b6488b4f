//! Bounded metric history sampled at six independent time scales.
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};

/// Sampling scale; each scale records at its nominal interval, so a full
/// ring of samples spans `capacity x interval`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatScale {
    Second,
    Minute,
    FiveMinute,
    Hour,
    Day,
    Month,
}

impl StatScale {
    pub const ALL: [Self; 6] = [
        Self::Second,
        Self::Minute,
        Self::FiveMinute,
        Self::Hour,
        Self::Day,
        Self::Month,
    ];

    /// Minimum gap between two samples on this scale.
    #[must_use]
    pub const fn interval_ms(self) -> u64 {
        match self {
            Self::Second => 1_000,
            Self::Minute => 60_000,
            Self::FiveMinute => 300_000,
            Self::Hour => 3_600_000,
            Self::Day => 86_400_000,
            Self::Month => 30 * 86_400_000,
        }
    }
}

/// Tracked economy metric.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    Cash,
    Heat,
    Cred,
    CrewCount,
    ActiveRuns,
    SuccessRate,
}

impl Metric {
    pub const ALL: [Self; 6] = [
        Self::Cash,
        Self::Heat,
        Self::Cred,
        Self::CrewCount,
        Self::ActiveRuns,
        Self::SuccessRate,
    ];
}

/// Ring buffers for one scale, keyed by metric.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScaleSeries {
    pub scale: StatScale,
    #[serde(default)]
    pub last_recorded: u64,
    #[serde(default)]
    pub samples: HashMap<Metric, VecDeque<f64>>,
}

impl ScaleSeries {
    fn new(scale: StatScale) -> Self {
        Self {
            scale,
            last_recorded: 0,
            samples: HashMap::new(),
        }
    }

    fn due(&self, now_ms: u64) -> bool {
        self.last_recorded == 0
            || now_ms.saturating_sub(self.last_recorded) >= self.scale.interval_ms()
    }
}

/// Sparkline-ready history without unbounded memory growth.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatsBoard {
    pub scales: Vec<ScaleSeries>,
}

impl Default for StatsBoard {
    fn default() -> Self {
        Self {
            scales: StatScale::ALL.into_iter().map(ScaleSeries::new).collect(),
        }
    }
}

impl StatsBoard {
    /// Sample every due scale, evicting the oldest entries past `capacity`.
    pub fn record(&mut self, now_ms: u64, capacity: usize, read: impl Fn(Metric) -> f64) {
        for series in &mut self.scales {
            if !series.due(now_ms) {
                continue;
            }
            for metric in Metric::ALL {
                let buffer = series.samples.entry(metric).or_default();
                buffer.push_back(read(metric));
                while buffer.len() > capacity {
                    buffer.pop_front();
                }
            }
            series.last_recorded = now_ms;
        }
    }

    /// Recorded history for one metric on one scale.
    #[must_use]
    pub fn series(&self, scale: StatScale, metric: Metric) -> Option<&VecDeque<f64>> {
        self.scales
            .iter()
            .find(|series| series.scale == scale)
            .and_then(|series| series.samples.get(&metric))
    }
}
