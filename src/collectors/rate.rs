//! Throughput from cumulative traffic counters
//!
//! The calculator turns two consecutive counter snapshots into a combined
//! receive+transmit rate in megabits per second. It keeps exactly one
//! previous sample and is owned by whoever samples the counters, so two
//! samplers never share (or corrupt) each other's baseline.

use chrono::{DateTime, Utc};
use log::{debug, trace, warn};
use serde::{Deserialize, Serialize};

const BITS_PER_BYTE: f64 = 8.0;
const BYTES_PER_MEBIBIT: f64 = 1024.0 * 1024.0;

/// One reading of the cumulative interface counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateSample {
    pub timestamp: DateTime<Utc>,
    pub bytes_received: u64,
    pub bytes_sent: u64,
}

impl RateSample {
    pub fn new(timestamp: DateTime<Utc>, bytes_received: u64, bytes_sent: u64) -> Self {
        Self {
            timestamp,
            bytes_received,
            bytes_sent,
        }
    }

    /// Sample stamped with the current time
    pub fn now(bytes_received: u64, bytes_sent: u64) -> Self {
        Self::new(Utc::now(), bytes_received, bytes_sent)
    }
}

/// How a reading was obtained
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RateStatus {
    /// First sample; nothing to compare against yet
    Baseline,
    /// Normal delta over a positive interval
    Measured,
    /// Elapsed time was zero or negative; the previous rate is repeated
    StaleClock,
    /// A counter went backwards (interface restart, wrap); the sample becomes the new baseline
    CounterReset,
}

/// Result of one `update`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RateReading {
    pub mbps: f64,
    pub status: RateStatus,
}

/// Stateful counter-to-throughput converter
#[derive(Debug, Clone, Default)]
pub struct RateCalculator {
    previous: Option<RateSample>,
    last_mbps: f64,
}

impl RateCalculator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Most recently computed rate
    pub fn last_rate(&self) -> f64 {
        self.last_mbps
    }

    pub fn previous(&self) -> Option<&RateSample> {
        self.previous.as_ref()
    }

    pub fn reset(&mut self) {
        self.previous = None;
        self.last_mbps = 0.0;
    }

    /// Feeds a new sample and returns the rate since the previous one
    ///
    /// The previous sample is only replaced when time actually moved
    /// forward, so a clock step backwards does not poison the next delta.
    pub fn update(&mut self, sample: RateSample) -> RateReading {
        let Some(previous) = self.previous else {
            trace!(
                "No previous counter sample, establishing baseline (rx={}, tx={})",
                sample.bytes_received, sample.bytes_sent
            );
            self.previous = Some(sample);
            self.last_mbps = 0.0;
            return RateReading {
                mbps: 0.0,
                status: RateStatus::Baseline,
            };
        };

        // Full timestamp precision: a sub-millisecond interval is still forward time
        let elapsed = sample.timestamp - previous.timestamp;
        let elapsed_secs = match elapsed.to_std() {
            Ok(forward) if !forward.is_zero() => forward.as_secs_f64(),
            _ => {
                warn!(
                    "Time anomaly in counter samples: elapsed={}us (current={}, previous={}), keeping last rate",
                    elapsed.num_microseconds().unwrap_or_default(),
                    sample.timestamp.format("%H:%M:%S%.6f"),
                    previous.timestamp.format("%H:%M:%S%.6f")
                );
                return RateReading {
                    mbps: self.last_mbps,
                    status: RateStatus::StaleClock,
                };
            }
        };

        if sample.bytes_received < previous.bytes_received
            || sample.bytes_sent < previous.bytes_sent
        {
            debug!(
                "Counter reset detected (rx: {} -> {}, tx: {} -> {}), establishing new baseline",
                previous.bytes_received, sample.bytes_received, previous.bytes_sent, sample.bytes_sent
            );
            self.previous = Some(sample);
            self.last_mbps = 0.0;
            return RateReading {
                mbps: 0.0,
                status: RateStatus::CounterReset,
            };
        }

        let delta = (sample.bytes_received - previous.bytes_received)
            + (sample.bytes_sent - previous.bytes_sent);
        let mbps = delta as f64 * BITS_PER_BYTE / elapsed_secs / BYTES_PER_MEBIBIT;

        trace!(
            "Rate calculation: delta={} bytes over {:.3}s = {:.3} Mbps",
            delta, elapsed_secs, mbps
        );

        self.previous = Some(sample);
        self.last_mbps = mbps;
        RateReading {
            mbps,
            status: RateStatus::Measured,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn at(base: DateTime<Utc>, millis: i64, rx: u64, tx: u64) -> RateSample {
        RateSample::new(base + Duration::milliseconds(millis), rx, tx)
    }

    #[test]
    fn test_first_sample_is_baseline() {
        let mut calculator = RateCalculator::new();
        let reading = calculator.update(RateSample::now(1_000, 2_000));
        assert_eq!(reading.mbps, 0.0);
        assert_eq!(reading.status, RateStatus::Baseline);
        assert!(calculator.previous().is_some());
    }

    #[test]
    fn test_one_mebibyte_per_second_is_eight_mbps() {
        let base = Utc::now();
        let mut calculator = RateCalculator::new();
        calculator.update(at(base, 0, 0, 0));
        let reading = calculator.update(at(base, 1_000, 524_288, 524_288));

        assert_eq!(reading.status, RateStatus::Measured);
        assert!((reading.mbps - 8.0).abs() < 1e-9);
    }

    #[test]
    fn test_zero_elapsed_repeats_last_rate_and_keeps_baseline() {
        let base = Utc::now();
        let mut calculator = RateCalculator::new();
        calculator.update(at(base, 0, 0, 0));
        let measured = calculator.update(at(base, 2_000, 1_048_576, 0));

        let stale = calculator.update(at(base, 2_000, 9_999_999, 0));
        assert_eq!(stale.status, RateStatus::StaleClock);
        assert_eq!(stale.mbps, measured.mbps);
        assert_eq!(calculator.previous().unwrap().bytes_received, 1_048_576);

        let backwards = calculator.update(at(base, 1_000, 2_000_000, 0));
        assert_eq!(backwards.status, RateStatus::StaleClock);
        assert_eq!(backwards.mbps, measured.mbps);
    }

    #[test]
    fn test_unchanged_counters_give_zero() {
        let base = Utc::now();
        let mut calculator = RateCalculator::new();
        calculator.update(at(base, 0, 500, 500));
        let reading = calculator.update(at(base, 3_000, 500, 500));
        assert_eq!(reading.mbps, 0.0);
        assert_eq!(reading.status, RateStatus::Measured);
    }

    #[test]
    fn test_counter_decrease_rebaselines() {
        let base = Utc::now();
        let mut calculator = RateCalculator::new();
        calculator.update(at(base, 0, 10_000, 10_000));
        let reset = calculator.update(at(base, 1_000, 100, 10_500));

        assert_eq!(reset.status, RateStatus::CounterReset);
        assert_eq!(reset.mbps, 0.0);
        assert_eq!(calculator.previous().unwrap().bytes_received, 100);

        let next = calculator.update(at(base, 2_000, 131_172, 10_500));
        assert_eq!(next.status, RateStatus::Measured);
        assert!((next.mbps - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_sub_millisecond_interval_is_measured() {
        let base = Utc::now();
        let mut calculator = RateCalculator::new();
        calculator.update(at(base, 0, 0, 0));
        let busy = calculator.update(at(base, 1_000, 1_048_576, 0));
        assert!((busy.mbps - 8.0).abs() < 1e-9);

        let idle = calculator.update(RateSample::new(
            base + Duration::milliseconds(1_000) + Duration::microseconds(500),
            1_048_576,
            0,
        ));
        assert_eq!(idle.status, RateStatus::Measured);
        assert_eq!(idle.mbps, 0.0);
        assert_eq!(calculator.last_rate(), 0.0);
    }
}
