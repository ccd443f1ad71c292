//! Probe catalog and the built-in network probes

pub mod descriptor;
pub mod device_discovery;
pub mod network_info;
pub mod network_quality;
pub mod params;
pub mod port_scanner;
pub mod registry;
pub mod reverse_dns;

use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;

pub use descriptor::{ParamOption, ParameterSpec, ParameterType, ProbeDescriptor};
pub use params::{Parameters, ProbeInvocation};
pub use registry::{DuplicatePolicy, ProbeHandler, ProbeRegistry, ProbeResult};

use crate::collectors::telemetry::SharedSampler;
use crate::config::Settings;
use crate::errors::ProbeError;
use crate::quality::IcmpPinger;

/// Registry holding every built-in probe
///
/// `network_info` samples through `sampler`, so callers that also stream
/// telemetry can hand in the same instance.
pub fn builtin_registry(settings: &Settings, sampler: SharedSampler) -> Result<ProbeRegistry, ProbeError> {
    let mut registry = ProbeRegistry::new(settings.registry.duplicate_policy);

    let handlers: Vec<Arc<dyn ProbeHandler>> = vec![
        Arc::new(port_scanner::PortScannerProbe::new(settings.port_scan.clone())),
        Arc::new(device_discovery::DeviceDiscoveryProbe::new(settings.discovery.clone())),
        Arc::new(reverse_dns::ReverseDnsProbe::new(settings.reverse_dns.clone())),
        Arc::new(network_quality::NetworkQualityProbe::new(
            settings.quality.clone(),
            Arc::new(IcmpPinger::new()),
        )),
        Arc::new(network_info::NetworkInfoProbe::new(sampler)),
    ];
    for handler in handlers {
        registry.register(handler)?;
    }
    Ok(registry)
}

/// Serializes a probe report into the opaque result mapping
pub(crate) fn to_result<T: Serialize>(report: &T) -> Result<Value, ProbeError> {
    serde_json::to_value(report).map_err(|e| ProbeError::Other(e.into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collectors::telemetry::TelemetrySampler;
    use tokio::sync::Mutex;

    fn registry() -> ProbeRegistry {
        let settings = Settings::default();
        let sampler = Arc::new(Mutex::new(TelemetrySampler::new(settings.telemetry.clone())));
        builtin_registry(&settings, sampler).unwrap()
    }

    #[test]
    fn test_builtin_catalog() {
        let registry = registry();
        let ids: Vec<&str> = registry.list().iter().map(|d| d.id.as_str()).collect();
        assert_eq!(
            ids,
            vec![
                "device_discovery",
                "network_info",
                "network_quality",
                "port_scanner",
                "reverse_dns_lookup"
            ]
        );
    }

    #[test]
    fn test_builtin_required_parameters() {
        let registry = registry();
        let err = registry.validate("port_scanner", &Parameters::new()).unwrap_err();
        assert_eq!(err.to_string(), "missing required parameter: host, portRange");

        let err = registry.validate("reverse_dns_lookup", &Parameters::new()).unwrap_err();
        assert_eq!(err.to_string(), "missing required parameter: ip_addresses");

        assert!(registry.validate("network_info", &Parameters::new()).is_ok());
        assert!(registry.validate("device_discovery", &Parameters::new()).is_ok());
    }

    #[test]
    fn test_reject_policy_applies_to_builtins() {
        let mut settings = Settings::default();
        settings.registry.duplicate_policy = DuplicatePolicy::Reject;
        let sampler = Arc::new(Mutex::new(TelemetrySampler::new(settings.telemetry.clone())));
        let mut registry = builtin_registry(&settings, sampler).unwrap();

        let again = Arc::new(port_scanner::PortScannerProbe::new(settings.port_scan.clone()));
        assert!(matches!(
            registry.register(again),
            Err(ProbeError::DuplicateProbe { .. })
        ));
    }
}
