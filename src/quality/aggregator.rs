//! Timed quality measurement rounds
//!
//! Rounds run strictly one after another. Each sends one burst; if the
//! unprivileged mode fails the round is retried once in privileged mode,
//! which then stays selected for the remaining rounds. A round that fails
//! in both modes is skipped and counted, never fatal.

use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use tokio::time::{Instant, sleep_until};

use crate::config::{QualitySettings, secs};
use crate::errors::ProbeError;
use crate::quality::pinger::{BurstSpec, BurstStats, LatencyProbe, PingMode};
use crate::quality::stats::{StatSummary, mean};
use crate::quality::{QualityLabel, QualitySample, jitter_series};

/// What to measure and for how long
#[derive(Debug, Clone, PartialEq)]
pub struct QualityRequest {
    pub target: String,
    pub duration: Duration,
    pub interval: Duration,
    pub packet_size: usize,
    pub burst_size: u32,
    pub echo_timeout: Duration,
}

impl QualityRequest {
    pub fn from_settings(settings: &QualitySettings) -> Self {
        Self {
            target: settings.target.clone(),
            duration: secs(settings.duration_secs),
            interval: secs(settings.interval_secs),
            packet_size: settings.packet_size,
            burst_size: settings.burst_size,
            echo_timeout: secs(settings.echo_timeout_secs),
        }
    }

    fn burst_spec(&self) -> BurstSpec {
        BurstSpec {
            count: self.burst_size,
            packet_size: self.packet_size,
            echo_timeout: self.echo_timeout,
        }
    }
}

/// Summary of a measurement run
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QualityReport {
    pub target: String,
    pub resolved_address: String,
    pub duration: f64,
    pub interval: f64,
    pub packet_size: usize,
    pub elapsed: f64,
    pub rounds_attempted: u32,
    pub rounds_skipped: u32,
    pub final_mode: PingMode,
    pub samples: Vec<QualitySample>,
    pub avg_latency: Option<f64>,
    pub avg_jitter: Option<f64>,
    pub avg_packet_loss: Option<f64>,
    pub latency_stats: Option<StatSummary>,
    pub jitter_stats: Option<StatSummary>,
    pub packet_loss_stats: Option<StatSummary>,
    /// `None` when no round completed
    #[serde(rename = "network_quality")]
    pub quality: Option<QualityLabel>,
}

/// Runs measurement rounds through a [`LatencyProbe`]
#[derive(Clone)]
pub struct QualityAggregator {
    probe: Arc<dyn LatencyProbe>,
}

impl std::fmt::Debug for QualityAggregator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QualityAggregator").finish_non_exhaustive()
    }
}

impl QualityAggregator {
    pub fn new(probe: Arc<dyn LatencyProbe>) -> Self {
        Self { probe }
    }

    pub async fn run(&self, request: &QualityRequest) -> Result<QualityReport, ProbeError> {
        if request.duration.is_zero() {
            return Err(ProbeError::invalid_parameter("duration", "must be greater than zero"));
        }
        if request.interval.is_zero() {
            return Err(ProbeError::invalid_parameter("interval", "must be greater than zero"));
        }
        if request.burst_size == 0 {
            return Err(ProbeError::invalid_parameter("burst_size", "must be at least 1"));
        }
        if request.echo_timeout.is_zero() {
            return Err(ProbeError::InvalidTimeout);
        }

        let address = resolve_target(&request.target).await?;
        let spec = request.burst_spec();
        let started = Instant::now();
        let deadline = started + request.duration;

        info!(
            "Measuring quality to {} ({}) for {:.1}s every {:.1}s",
            request.target,
            address,
            request.duration.as_secs_f64(),
            request.interval.as_secs_f64()
        );

        let mut mode = PingMode::Unprivileged;
        let mut samples = Vec::new();
        let mut rounds_attempted = 0u32;
        let mut rounds_skipped = 0u32;

        loop {
            let round_started = Instant::now();
            rounds_attempted += 1;

            match self.round(address, &mut mode, &spec).await {
                Some(burst) => samples.push(QualitySample {
                    timestamp: Utc::now(),
                    latency_ms: burst.mean_latency(),
                    packet_loss_pct: burst.loss_pct(),
                    jitter_ms: None,
                    mode,
                }),
                None => rounds_skipped += 1,
            }

            let round_elapsed = round_started.elapsed();
            let next_round = round_started + request.interval;
            if next_round + round_elapsed > deadline {
                debug!(
                    "Next round could not finish before the deadline, stopping after {} rounds",
                    rounds_attempted
                );
                break;
            }
            sleep_until(next_round).await;
        }

        assign_jitter(&mut samples);
        let report = summarize(
            request,
            address,
            started.elapsed(),
            rounds_attempted,
            rounds_skipped,
            mode,
            samples,
        );

        info!(
            "Quality to {}: {} rounds ({} skipped), label={}",
            request.target,
            rounds_attempted,
            rounds_skipped,
            report.quality.map_or("no data", |label| label.as_str())
        );
        Ok(report)
    }

    /// One burst with the privileged fallback; `None` when both modes fail
    async fn round(&self, address: IpAddr, mode: &mut PingMode, spec: &BurstSpec) -> Option<BurstStats> {
        match self.probe.burst(address, *mode, spec).await {
            Ok(burst) => return Some(burst),
            Err(e) if *mode == PingMode::Privileged => {
                warn!("Privileged echo burst failed, skipping round: {}", e);
                return None;
            }
            Err(e) => warn!("Unprivileged echo burst failed, retrying privileged: {}", e),
        }

        match self.probe.burst(address, PingMode::Privileged, spec).await {
            Ok(burst) => {
                info!("Switching to privileged echo mode for the remaining rounds");
                *mode = PingMode::Privileged;
                Some(burst)
            }
            Err(e) => {
                warn!("Privileged retry failed, skipping round: {}", e);
                None
            }
        }
    }
}

async fn resolve_target(target: &str) -> Result<IpAddr, ProbeError> {
    let target = target.trim();
    if target.is_empty() {
        return Err(ProbeError::invalid_target(target, "empty target"));
    }
    if let Ok(address) = target.parse::<IpAddr>() {
        return Ok(address);
    }
    let mut addresses = tokio::net::lookup_host((target, 0))
        .await
        .map_err(|e| ProbeError::invalid_target(target, e.to_string()))?;
    addresses
        .next()
        .map(|socket| socket.ip())
        .ok_or_else(|| ProbeError::invalid_target(target, "name resolved to no addresses"))
}

/// Fills jitter for rounds with a latency; totally lost rounds keep `None`
fn assign_jitter(samples: &mut [QualitySample]) {
    let latencies: Vec<f64> = samples.iter().filter_map(|sample| sample.latency_ms).collect();
    let mut jitters = jitter_series(&latencies).into_iter();
    for sample in samples.iter_mut().filter(|sample| sample.latency_ms.is_some()) {
        sample.jitter_ms = jitters.next();
    }
}

fn summarize(
    request: &QualityRequest,
    address: IpAddr,
    elapsed: Duration,
    rounds_attempted: u32,
    rounds_skipped: u32,
    final_mode: PingMode,
    samples: Vec<QualitySample>,
) -> QualityReport {
    let latencies: Vec<f64> = samples.iter().filter_map(|s| s.latency_ms).collect();
    let jitters: Vec<f64> = samples.iter().filter_map(|s| s.jitter_ms).collect();
    let losses: Vec<f64> = samples.iter().map(|s| s.packet_loss_pct).collect();

    let avg_latency = mean(&latencies);
    let avg_jitter = mean(&jitters);
    let avg_packet_loss = mean(&losses);
    let quality = avg_packet_loss.map(|loss| QualityLabel::classify(loss, avg_latency, avg_jitter));

    QualityReport {
        target: request.target.clone(),
        resolved_address: address.to_string(),
        duration: request.duration.as_secs_f64(),
        interval: request.interval.as_secs_f64(),
        packet_size: request.packet_size,
        elapsed: elapsed.as_secs_f64(),
        rounds_attempted,
        rounds_skipped,
        final_mode,
        avg_latency,
        avg_jitter,
        avg_packet_loss,
        latency_stats: StatSummary::from_samples(&latencies),
        jitter_stats: StatSummary::from_samples(&jitters),
        packet_loss_stats: StatSummary::from_samples(&losses),
        quality,
        samples,
    }
}
