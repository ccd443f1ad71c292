//! Link quality measurement
//!
//! Sequential rounds of short echo bursts produce one [`QualitySample`]
//! each. The aggregator derives jitter between consecutive rounds,
//! summarizes every series and assigns a [`QualityLabel`].

pub mod aggregator;
pub mod pinger;
pub mod stats;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use aggregator::{QualityAggregator, QualityReport, QualityRequest};
pub use pinger::{BurstStats, IcmpPinger, LatencyProbe, PingMode};
pub use stats::StatSummary;

/// Loss, latency and jitter limits for one label, exclusive
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Thresholds {
    pub loss_pct: f64,
    pub latency_ms: f64,
    pub jitter_ms: f64,
}

pub const POOR: Thresholds = Thresholds {
    loss_pct: 5.0,
    latency_ms: 300.0,
    jitter_ms: 50.0,
};

pub const FAIR: Thresholds = Thresholds {
    loss_pct: 1.0,
    latency_ms: 100.0,
    jitter_ms: 20.0,
};

pub const GOOD: Thresholds = Thresholds {
    loss_pct: 0.1,
    latency_ms: 50.0,
    jitter_ms: 10.0,
};

impl Thresholds {
    fn exceeded_by(&self, loss_pct: f64, latency_ms: Option<f64>, jitter_ms: Option<f64>) -> bool {
        loss_pct > self.loss_pct
            || latency_ms.is_some_and(|latency| latency > self.latency_ms)
            || jitter_ms.is_some_and(|jitter| jitter > self.jitter_ms)
    }
}

/// Qualitative verdict for a measurement run
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum QualityLabel {
    Excellent,
    Good,
    Fair,
    Poor,
}

impl QualityLabel {
    /// Worst matching label for the run averages
    pub fn classify(avg_loss_pct: f64, avg_latency_ms: Option<f64>, avg_jitter_ms: Option<f64>) -> Self {
        if POOR.exceeded_by(avg_loss_pct, avg_latency_ms, avg_jitter_ms) {
            QualityLabel::Poor
        } else if FAIR.exceeded_by(avg_loss_pct, avg_latency_ms, avg_jitter_ms) {
            QualityLabel::Fair
        } else if GOOD.exceeded_by(avg_loss_pct, avg_latency_ms, avg_jitter_ms) {
            QualityLabel::Good
        } else {
            QualityLabel::Excellent
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            QualityLabel::Excellent => "excellent",
            QualityLabel::Good => "good",
            QualityLabel::Fair => "fair",
            QualityLabel::Poor => "poor",
        }
    }
}

impl std::fmt::Display for QualityLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of one completed round
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualitySample {
    pub timestamp: DateTime<Utc>,
    /// Mean round trip of the burst; `None` when every echo was lost
    pub latency_ms: Option<f64>,
    pub packet_loss_pct: f64,
    /// Distance from the previous round with a latency; 0 for the first one
    pub jitter_ms: Option<f64>,
    pub mode: PingMode,
}

/// Absolute differences between consecutive latencies, starting at 0
///
/// ```
/// use netscout::quality::jitter_series;
///
/// assert_eq!(jitter_series(&[20.0, 25.0, 15.0]), vec![0.0, 5.0, 10.0]);
/// ```
pub fn jitter_series(latencies: &[f64]) -> Vec<f64> {
    let mut previous: Option<f64> = None;
    latencies
        .iter()
        .map(|&latency| {
            let jitter = previous.map_or(0.0, |prev| (latency - prev).abs());
            previous = Some(latency);
            jitter
        })
        .collect()
}
