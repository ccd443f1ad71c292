//! Layered runtime configuration
//!
//! Settings are assembled from built-in defaults, an optional configuration
//! file and `NETSCOUT__SECTION__KEY` environment variables, in that order of
//! precedence. Every section deserializes with defaults so a partial file is
//! always valid.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use config::{Config, Environment, File};
use log::debug;
use serde::{Deserialize, Serialize};

use crate::probes::registry::DuplicatePolicy;

/// Prefix for environment overrides, e.g. `NETSCOUT__PORT_SCAN__CONCURRENCY=100`
pub const ENV_PREFIX: &str = "NETSCOUT";

/// Top-level settings for the probe engine
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Settings {
    pub registry: RegistrySettings,
    pub port_scan: PortScanSettings,
    pub discovery: DiscoverySettings,
    pub reverse_dns: ReverseDnsSettings,
    pub quality: QualitySettings,
    pub telemetry: TelemetrySettings,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RegistrySettings {
    /// What happens when two probes register under the same id
    pub duplicate_policy: DuplicatePolicy,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PortScanSettings {
    pub concurrency: usize,
    pub timeout_secs: f64,
    /// Overall sweep deadline; ports not admitted by then are reported as not scanned
    pub deadline_secs: f64,
}

impl Default for PortScanSettings {
    fn default() -> Self {
        Self {
            concurrency: 50,
            timeout_secs: 1.0,
            deadline_secs: 300.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DiscoverySettings {
    pub concurrency: usize,
    pub scan_timeout_secs: f64,
    /// Timeout of the single echo used to populate the neighbor cache
    pub ping_timeout_secs: f64,
    /// Largest accepted range, as a prefix length (ranges wider than this are rejected)
    pub min_prefix_len: u8,
    /// Per-port connect timeout while fingerprinting a device
    pub identify_port_timeout_ms: u64,
    /// Overall budget for fingerprinting one device
    pub identify_budget_secs: f64,
}

impl Default for DiscoverySettings {
    fn default() -> Self {
        Self {
            concurrency: 20,
            scan_timeout_secs: 30.0,
            ping_timeout_secs: 1.0,
            min_prefix_len: 16,
            identify_port_timeout_ms: 500,
            identify_budget_secs: 3.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ReverseDnsSettings {
    pub concurrency: usize,
    pub timeout_secs: f64,
    pub deadline_secs: f64,
}

impl Default for ReverseDnsSettings {
    fn default() -> Self {
        Self {
            concurrency: 5,
            timeout_secs: 5.0,
            deadline_secs: 120.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct QualitySettings {
    pub target: String,
    pub duration_secs: f64,
    pub interval_secs: f64,
    pub packet_size: usize,
    /// Echo requests sent per round
    pub burst_size: u32,
    /// Wait for each echo reply
    pub echo_timeout_secs: f64,
}

impl Default for QualitySettings {
    fn default() -> Self {
        Self {
            target: "8.8.8.8".to_string(),
            duration_secs: 30.0,
            interval_secs: 1.0,
            packet_size: 56,
            burst_size: 3,
            echo_timeout_secs: 1.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TelemetrySettings {
    /// Cadence of the periodic broadcaster
    pub poll_interval_secs: f64,
    /// Snapshots buffered per subscriber before it starts lagging
    pub channel_capacity: usize,
    /// Ping the gateway while sampling to fill latency and loss
    pub probe_connection: bool,
    /// Upper bound for every helper command the sampler runs
    pub command_timeout_secs: f64,
}

impl Default for TelemetrySettings {
    fn default() -> Self {
        Self {
            poll_interval_secs: 3.0,
            channel_capacity: 16,
            probe_connection: true,
            command_timeout_secs: 5.0,
        }
    }
}

impl TelemetrySettings {
    pub fn poll_interval(&self) -> Duration {
        secs(self.poll_interval_secs)
    }

    pub fn command_timeout(&self) -> Duration {
        secs(self.command_timeout_secs)
    }
}

impl Settings {
    /// Loads settings from defaults, an optional file and the environment
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder();

        if let Some(path) = path {
            debug!("Loading configuration file: {}", path.display());
            builder = builder.add_source(File::from(path).required(true));
        }

        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .separator("__")
                .try_parsing(true),
        );

        let settings: Settings = builder
            .build()
            .context("Failed to assemble configuration sources")?
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        debug!("Effective configuration: {:?}", settings);
        Ok(settings)
    }
}

/// Converts a user-facing seconds value into a `Duration`, treating negatives as zero
pub fn secs(value: f64) -> Duration {
    if value.is_finite() && value > 0.0 {
        Duration::from_secs_f64(value)
    } else {
        Duration::ZERO
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_match_documented_values() {
        let settings = Settings::default();
        assert_eq!(settings.port_scan.concurrency, 50);
        assert_eq!(settings.discovery.concurrency, 20);
        assert_eq!(settings.reverse_dns.concurrency, 5);
        assert_eq!(settings.quality.burst_size, 3);
        assert_eq!(settings.registry.duplicate_policy, DuplicatePolicy::Overwrite);
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "[port_scan]\nconcurrency = 128\n\n[registry]\nduplicate_policy = \"reject\"").unwrap();

        let settings = Settings::load(Some(file.path())).unwrap();
        assert_eq!(settings.port_scan.concurrency, 128);
        assert_eq!(settings.port_scan.timeout_secs, 1.0);
        assert_eq!(settings.registry.duplicate_policy, DuplicatePolicy::Reject);
        assert_eq!(settings.quality, QualitySettings::default());
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let result = Settings::load(Some(Path::new("/nonexistent/netscout.toml")));
        assert!(result.is_err());
    }

    #[test]
    fn test_secs_clamps_invalid_values() {
        assert_eq!(secs(-1.0), Duration::ZERO);
        assert_eq!(secs(f64::NAN), Duration::ZERO);
        assert_eq!(secs(0.25), Duration::from_millis(250));
    }
}
