//! Interface and neighbor telemetry as a probe

use async_trait::async_trait;
use serde_json::Value;

use crate::collectors::telemetry::SharedSampler;
use crate::errors::ProbeError;
use crate::probes::descriptor::ProbeDescriptor;
use crate::probes::params::Parameters;
use crate::probes::registry::ProbeHandler;
use crate::probes::to_result;

pub const PROBE_ID: &str = "network_info";

/// Runs the shared sampler so consecutive calls yield a bandwidth figure
pub struct NetworkInfoProbe {
    sampler: SharedSampler,
}

impl NetworkInfoProbe {
    pub fn new(sampler: SharedSampler) -> Self {
        Self { sampler }
    }
}

#[async_trait]
impl ProbeHandler for NetworkInfoProbe {
    fn descriptor(&self) -> ProbeDescriptor {
        ProbeDescriptor::new(
            PROBE_ID,
            "Network Information",
            "Active interface, addressing, gateway, DNS, traffic and ARP neighbors",
        )
        .icon("info")
    }

    async fn execute(&self, _params: &Parameters) -> Result<Value, ProbeError> {
        let snapshot = self.sampler.lock().await.sample().await;
        to_result(&snapshot)
    }
}
