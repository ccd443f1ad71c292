//! Host data collection: helper commands, platform rules, counters and telemetry

pub mod command;
pub mod formatting;
pub mod platform;
pub mod rate;
pub mod telemetry;

pub use rate::{RateCalculator, RateReading, RateSample, RateStatus};
pub use telemetry::{TelemetrySampler, TelemetrySnapshot};
