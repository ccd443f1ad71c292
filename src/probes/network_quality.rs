//! Live link quality monitor backed by the quality aggregator

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::config::{QualitySettings, secs};
use crate::errors::ProbeError;
use crate::probes::descriptor::{ParameterSpec, ProbeDescriptor};
use crate::probes::params::Parameters;
use crate::probes::registry::ProbeHandler;
use crate::probes::to_result;
use crate::quality::{LatencyProbe, QualityAggregator, QualityRequest};

pub const PROBE_ID: &str = "network_quality";

pub struct NetworkQualityProbe {
    settings: QualitySettings,
    aggregator: QualityAggregator,
}

impl NetworkQualityProbe {
    pub fn new(settings: QualitySettings, probe: Arc<dyn LatencyProbe>) -> Self {
        Self {
            settings,
            aggregator: QualityAggregator::new(probe),
        }
    }

    fn request(&self, params: &Parameters) -> Result<QualityRequest, ProbeError> {
        let mut request = QualityRequest::from_settings(&self.settings);
        request.target = params.string_or("target", &self.settings.target);
        request.duration = secs(params.bounded_number("duration", self.settings.duration_secs, 1.0, 3600.0)?);
        request.interval = secs(params.bounded_number("interval", self.settings.interval_secs, 0.1, 60.0)?);
        request.packet_size =
            params.bounded_number("packet_size", self.settings.packet_size as f64, 16.0, 1472.0)? as usize;
        Ok(request)
    }
}

#[async_trait]
impl ProbeHandler for NetworkQualityProbe {
    fn descriptor(&self) -> ProbeDescriptor {
        ProbeDescriptor::new(
            PROBE_ID,
            "Network Quality Monitor",
            "Measure latency, jitter and packet loss over time",
        )
        .icon("activity")
        .parameter(
            ParameterSpec::string("target", "Target", "Host to measure against")
                .default_value(self.settings.target.as_str()),
        )
        .parameter(
            ParameterSpec::range("duration", "Duration", "Monitoring duration in seconds", 1.0, 3600.0, 1.0)
                .default_value(self.settings.duration_secs),
        )
        .parameter(
            ParameterSpec::range("interval", "Interval", "Seconds between measurement rounds", 0.1, 60.0, 0.1)
                .default_value(self.settings.interval_secs),
        )
        .parameter(
            ParameterSpec::number("packet_size", "Packet Size", "Echo payload size in bytes")
                .default_value(self.settings.packet_size as u64)
                .bounds(16.0, 1472.0, 1.0),
        )
    }

    async fn execute(&self, params: &Parameters) -> Result<Value, ProbeError> {
        let request = self.request(params)?;
        let report = self.aggregator.run(&request).await?;
        to_result(&report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quality::pinger::{BurstSpec, BurstStats, PingMode};
    use std::net::IpAddr;
    use std::time::Duration;

    struct SteadyProbe;

    #[async_trait]
    impl LatencyProbe for SteadyProbe {
        async fn burst(&self, _: IpAddr, _: PingMode, spec: &BurstSpec) -> Result<BurstStats, ProbeError> {
            Ok(BurstStats {
                sent: spec.count,
                received: spec.count,
                rtts_ms: vec![12.0; spec.count as usize],
            })
        }
    }

    #[test]
    fn test_parameters_override_settings() {
        let probe = NetworkQualityProbe::new(QualitySettings::default(), Arc::new(SteadyProbe));
        let params = Parameters::new()
            .with("target", "1.1.1.1")
            .with("duration", 5)
            .with("interval", 0.5)
            .with("packet_size", 100);
        let request = probe.request(&params).unwrap();
        assert_eq!(request.target, "1.1.1.1");
        assert_eq!(request.duration, Duration::from_secs(5));
        assert_eq!(request.interval, Duration::from_millis(500));
        assert_eq!(request.packet_size, 100);
        assert_eq!(request.burst_size, 3);
    }

    #[tokio::test]
    async fn test_report_is_labelled() {
        let settings = QualitySettings {
            target: "127.0.0.1".to_string(),
            ..QualitySettings::default()
        };
        let probe = NetworkQualityProbe::new(settings, Arc::new(SteadyProbe));
        let params = Parameters::new().with("duration", 1).with("interval", 0.4);
        let value = probe.execute(&params).await.unwrap();
        assert_eq!(value["network_quality"], "excellent");
        assert_eq!(value["avg_latency"], 12.0);
        assert_eq!(value["final_mode"], "unprivileged");
    }
}
