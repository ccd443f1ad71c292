//! Single-shot host telemetry sampler
//!
//! Interfaces and addresses come from `pnet::datalink`, cumulative traffic
//! counters from `sysinfo`. The sampler owns its [`RateCalculator`], so the
//! bandwidth figure always compares against this sampler's previous call.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use log::{debug, info, trace};
use pnet::datalink::{self, NetworkInterface};
use pnet::ipnetwork::IpNetwork;
use sysinfo::Networks;
use tokio::sync::Mutex;

use crate::collectors::platform::{InterfaceKind, Platform};
use crate::collectors::rate::{RateCalculator, RateSample};
use crate::collectors::telemetry::neighbors::read_neighbor_table;
use crate::collectors::telemetry::snapshot::{
    ConnectionInfo, ConnectionStatus, DhcpInfo, InterfaceInfo, TelemetrySnapshot, TrafficInfo,
    VlanInfo, WirelessInfo,
};
use crate::collectors::telemetry::system;
use crate::collectors::telemetry::SnapshotSource;
use crate::config::TelemetrySettings;

const CONNECTION_PROBE_COUNT: u32 = 3;
const FALLBACK_PROBE_TARGET: &str = "8.8.8.8";

/// OS-independent view of one interface, as needed for selection
#[derive(Debug, Clone, PartialEq)]
pub struct InterfaceCandidate {
    pub name: String,
    pub index: u32,
    pub is_up: bool,
    pub is_loopback: bool,
    pub mac: Option<String>,
    pub ipv4: Option<(Ipv4Addr, u8)>,
    pub ipv6: Option<Ipv6Addr>,
}

impl From<&NetworkInterface> for InterfaceCandidate {
    fn from(interface: &NetworkInterface) -> Self {
        let ipv4 = interface.ips.iter().find_map(|network| match network {
            IpNetwork::V4(v4) => Some((v4.ip(), v4.prefix())),
            IpNetwork::V6(_) => None,
        });
        let ipv6 = interface.ips.iter().find_map(|network| match network.ip() {
            IpAddr::V6(v6) => Some(v6),
            IpAddr::V4(_) => None,
        });

        Self {
            name: interface.name.clone(),
            index: interface.index,
            is_up: interface.is_up(),
            is_loopback: interface.is_loopback(),
            mac: interface.mac.map(|mac| mac.to_string()),
            ipv4,
            ipv6,
        }
    }
}

/// First interface that is both up and not loopback, in system order
pub fn select_active_interface(candidates: &[InterfaceCandidate]) -> Option<&InterfaceCandidate> {
    candidates
        .iter()
        .find(|candidate| candidate.is_up && !candidate.is_loopback)
}

/// Builds snapshots of the host's networking state
pub struct TelemetrySampler {
    settings: TelemetrySettings,
    networks: Networks,
    rate: RateCalculator,
    rate_interface: Option<String>,
    platform: Platform,
    samples_taken: u64,
}

impl std::fmt::Debug for TelemetrySampler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelemetrySampler")
            .field("settings", &self.settings)
            .field("rate", &self.rate)
            .field("rate_interface", &self.rate_interface)
            .field("samples_taken", &self.samples_taken)
            .finish()
    }
}

impl TelemetrySampler {
    pub fn new(settings: TelemetrySettings) -> Self {
        info!(
            "Initializing telemetry sampler (probe_connection={}, command_timeout={:.1}s)",
            settings.probe_connection, settings.command_timeout_secs
        );
        Self {
            settings,
            networks: Networks::new_with_refreshed_list(),
            rate: RateCalculator::new(),
            rate_interface: None,
            platform: Platform::current(),
            samples_taken: 0,
        }
    }

    pub fn rate_calculator(&self) -> &RateCalculator {
        &self.rate
    }

    pub fn samples_taken(&self) -> u64 {
        self.samples_taken
    }

    /// Takes one snapshot; missing data leaves fields unset rather than failing
    pub async fn sample(&mut self) -> TelemetrySnapshot {
        self.samples_taken += 1;
        let limit = self.settings.command_timeout();

        let candidates: Vec<InterfaceCandidate> =
            datalink::interfaces().iter().map(InterfaceCandidate::from).collect();
        trace!(
            "Sample #{}: {} interfaces reported",
            self.samples_taken,
            candidates.len()
        );

        let mut snapshot = TelemetrySnapshot::empty();
        snapshot.gateway = system::read_default_gateway(limit).await;
        snapshot.dns_servers = system::read_dns_servers().await;
        snapshot.connection.uptime = system::read_uptime().await;
        snapshot.neighbors = match read_neighbor_table(limit).await {
            Ok((entries, _source)) => entries,
            Err(e) => {
                debug!("Neighbor table unavailable: {}", e);
                Vec::new()
            }
        };

        let Some(active) = select_active_interface(&candidates) else {
            debug!("No interface is up and non-loopback; returning unset snapshot");
            return snapshot;
        };

        let kind = InterfaceKind::classify(self.platform, &active.name);
        snapshot.interface = Some(InterfaceInfo {
            name: active.name.clone(),
            mac_address: active.mac.clone(),
            kind,
            index: active.index,
        });
        if let Some((address, prefix)) = active.ipv4 {
            snapshot.ipv4_address = Some(address.to_string());
            snapshot.prefix_length = Some(prefix);
            snapshot.subnet_mask = system::prefix_to_mask(prefix).map(|mask| mask.to_string());
        }
        snapshot.ipv6_address = active.ipv6.map(|address| address.to_string());
        snapshot.vlan_info = VlanInfo::from_interface(&active.name);
        snapshot.dhcp_info = self.dhcp_info(snapshot.gateway.as_deref()).await;
        snapshot.wireless = self.wireless_info(&active.name, kind).await;
        snapshot.traffic = self.traffic_info(&active.name);
        snapshot.connection = self
            .connection_info(
                snapshot.ipv4_address.is_some() || snapshot.ipv6_address.is_some(),
                snapshot.gateway.as_deref(),
                snapshot.connection.uptime,
            )
            .await;
        snapshot.timestamp = Utc::now();

        debug!(
            "Sample #{} on {}: status={:?}, bandwidth={:.3} Mbps, neighbors={}",
            self.samples_taken,
            active.name,
            snapshot.connection.status,
            snapshot.traffic.current_bandwidth,
            snapshot.neighbors.len()
        );
        snapshot
    }

    async fn dhcp_info(&self, gateway: Option<&str>) -> DhcpInfo {
        match system::read_dhcp_server().await {
            Some(server) => DhcpInfo {
                enabled: true,
                dhcp_server: Some(server),
                server_inferred: false,
            },
            None => DhcpInfo {
                enabled: gateway.is_some(),
                dhcp_server: gateway.map(str::to_string),
                server_inferred: gateway.is_some(),
            },
        }
    }

    async fn wireless_info(&self, interface: &str, kind: InterfaceKind) -> WirelessInfo {
        let (ssid, signal_strength) =
            system::read_wireless(interface, self.settings.command_timeout()).await;
        WirelessInfo {
            is_wireless: kind == InterfaceKind::Wifi || ssid.is_some(),
            ssid,
            signal_strength,
        }
    }

    fn traffic_info(&mut self, interface: &str) -> TrafficInfo {
        self.networks.refresh(true);

        let Some(data) = self.networks.get(interface) else {
            debug!("No traffic counters reported for interface '{}'", interface);
            return TrafficInfo::default();
        };

        if self.rate_interface.as_deref() != Some(interface) {
            if self.rate_interface.is_some() {
                info!("Active interface changed to '{}', resetting rate baseline", interface);
            }
            self.rate.reset();
            self.rate_interface = Some(interface.to_string());
        }

        let reading = self
            .rate
            .update(RateSample::now(data.total_received(), data.total_transmitted()));

        TrafficInfo {
            bytes_received: data.total_received(),
            bytes_sent: data.total_transmitted(),
            packets_received: data.total_packets_received(),
            packets_sent: data.total_packets_transmitted(),
            current_bandwidth: reading.mbps,
            rate_status: reading.status,
        }
    }

    async fn connection_info(
        &self,
        has_address: bool,
        gateway: Option<&str>,
        uptime: Option<u64>,
    ) -> ConnectionInfo {
        let (latency_ms, packet_loss) = if self.settings.probe_connection && has_address {
            let target = gateway.unwrap_or(FALLBACK_PROBE_TARGET);
            system::read_ping_summary(target, CONNECTION_PROBE_COUNT, self.settings.command_timeout())
                .await
        } else {
            (None, None)
        };

        ConnectionInfo {
            status: ConnectionStatus::classify(has_address, gateway.is_some(), packet_loss),
            uptime,
            latency_ms,
            packet_loss,
        }
    }
}

#[async_trait]
impl SnapshotSource for TelemetrySampler {
    async fn snapshot(&mut self) -> TelemetrySnapshot {
        self.sample().await
    }
}

/// A sampler shared between the broadcaster and on-demand callers
pub type SharedSampler = Arc<Mutex<TelemetrySampler>>;

#[async_trait]
impl SnapshotSource for SharedSampler {
    async fn snapshot(&mut self) -> TelemetrySnapshot {
        self.lock().await.sample().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(name: &str, is_up: bool, is_loopback: bool) -> InterfaceCandidate {
        InterfaceCandidate {
            name: name.to_string(),
            index: 0,
            is_up,
            is_loopback,
            mac: None,
            ipv4: None,
            ipv6: None,
        }
    }

    #[test]
    fn test_selects_first_up_non_loopback() {
        let candidates = vec![
            candidate("lo", true, true),
            candidate("eth0", false, false),
            candidate("wlan0", true, false),
            candidate("eth1", true, false),
        ];
        assert_eq!(select_active_interface(&candidates).unwrap().name, "wlan0");
    }

    #[test]
    fn test_no_active_interface() {
        let candidates = vec![candidate("lo", true, true), candidate("eth0", false, false)];
        assert!(select_active_interface(&candidates).is_none());
        assert!(select_active_interface(&[]).is_none());
    }

    #[tokio::test]
    async fn test_sample_never_fails_and_owns_its_baseline() {
        let settings = TelemetrySettings {
            probe_connection: false,
            command_timeout_secs: 2.0,
            ..TelemetrySettings::default()
        };
        let mut sampler = TelemetrySampler::new(settings);

        let first = sampler.sample().await;
        if first.interface.is_some() && sampler.rate_calculator().previous().is_some() {
            assert_eq!(first.traffic.current_bandwidth, 0.0);
        }
        let _second = sampler.sample().await;
        assert_eq!(sampler.samples_taken(), 2);
    }
}
