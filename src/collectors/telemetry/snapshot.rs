//! Telemetry snapshot data model
//!
//! Serialized in camelCase because the dashboard reads these field names
//! directly.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::collectors::platform::InterfaceKind;
use crate::collectors::rate::RateStatus;
use crate::collectors::telemetry::neighbors::NeighborEntry;

/// Host networking state at one instant
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TelemetrySnapshot {
    /// Active interface; `None` when no interface is both up and non-loopback
    pub interface: Option<InterfaceInfo>,
    pub ipv4_address: Option<String>,
    pub ipv6_address: Option<String>,
    pub prefix_length: Option<u8>,
    pub subnet_mask: Option<String>,
    pub gateway: Option<String>,
    pub dns_servers: Vec<String>,
    pub dhcp_info: DhcpInfo,
    pub vlan_info: VlanInfo,
    pub wireless: WirelessInfo,
    pub connection: ConnectionInfo,
    pub traffic: TrafficInfo,
    pub neighbors: Vec<NeighborEntry>,
    pub timestamp: DateTime<Utc>,
}

impl TelemetrySnapshot {
    /// A snapshot with every field unset, stamped now
    pub fn empty() -> Self {
        Self {
            interface: None,
            ipv4_address: None,
            ipv6_address: None,
            prefix_length: None,
            subnet_mask: None,
            gateway: None,
            dns_servers: Vec::new(),
            dhcp_info: DhcpInfo::default(),
            vlan_info: VlanInfo::default(),
            wireless: WirelessInfo::default(),
            connection: ConnectionInfo::default(),
            traffic: TrafficInfo::default(),
            neighbors: Vec::new(),
            timestamp: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct InterfaceInfo {
    pub name: String,
    pub mac_address: Option<String>,
    pub kind: InterfaceKind,
    /// Interface index as reported by the OS
    pub index: u32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DhcpInfo {
    pub enabled: bool,
    pub dhcp_server: Option<String>,
    /// True when no lease file named a server and the gateway was assumed
    pub server_inferred: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VlanInfo {
    pub enabled: bool,
    pub vlan_id: Option<u16>,
    pub name: Option<String>,
}

impl VlanInfo {
    pub fn from_interface(name: &str) -> Self {
        match super::system::parse_vlan_id(name) {
            Some(id) => Self {
                enabled: true,
                vlan_id: Some(id),
                name: Some(format!("VLAN {}", id)),
            },
            None => Self::default(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WirelessInfo {
    pub is_wireless: bool,
    pub ssid: Option<String>,
    /// dBm
    pub signal_strength: Option<i32>,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    Connected,
    /// Addressed but without a default route, or the gateway did not answer
    Limited,
    #[default]
    Disconnected,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionInfo {
    pub status: ConnectionStatus,
    /// Host uptime in seconds
    pub uptime: Option<u64>,
    pub latency_ms: Option<f64>,
    pub packet_loss: Option<f64>,
}

impl ConnectionStatus {
    pub fn classify(has_address: bool, has_gateway: bool, packet_loss: Option<f64>) -> Self {
        if !has_address {
            ConnectionStatus::Disconnected
        } else if !has_gateway || packet_loss.is_some_and(|loss| loss >= 100.0) {
            ConnectionStatus::Limited
        } else {
            ConnectionStatus::Connected
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TrafficInfo {
    pub bytes_received: u64,
    pub bytes_sent: u64,
    pub packets_received: u64,
    pub packets_sent: u64,
    /// Combined receive and transmit rate in Mbps
    pub current_bandwidth: f64,
    pub rate_status: RateStatus,
}

impl Default for TrafficInfo {
    fn default() -> Self {
        Self {
            bytes_received: 0,
            bytes_sent: 0,
            packets_received: 0,
            packets_sent: 0,
            current_bandwidth: 0.0,
            rate_status: RateStatus::Baseline,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_serializes_camel_case() {
        let mut snapshot = TelemetrySnapshot::empty();
        snapshot.ipv4_address = Some("192.168.1.10".to_string());
        snapshot.dns_servers = vec!["1.1.1.1".to_string()];

        let value = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(value["ipv4Address"], "192.168.1.10");
        assert_eq!(value["dnsServers"][0], "1.1.1.1");
        assert_eq!(value["connection"]["status"], "disconnected");
        assert_eq!(value["traffic"]["rateStatus"], "baseline");
        assert!(value["interface"].is_null());
    }

    #[test]
    fn test_connection_status_classification() {
        assert_eq!(
            ConnectionStatus::classify(false, true, Some(0.0)),
            ConnectionStatus::Disconnected
        );
        assert_eq!(ConnectionStatus::classify(true, false, None), ConnectionStatus::Limited);
        assert_eq!(
            ConnectionStatus::classify(true, true, Some(100.0)),
            ConnectionStatus::Limited
        );
        assert_eq!(
            ConnectionStatus::classify(true, true, Some(20.0)),
            ConnectionStatus::Connected
        );
        assert_eq!(ConnectionStatus::classify(true, true, None), ConnectionStatus::Connected);
    }

    #[test]
    fn test_vlan_from_interface_name() {
        let vlan = VlanInfo::from_interface("eth0.42");
        assert!(vlan.enabled);
        assert_eq!(vlan.vlan_id, Some(42));
        assert_eq!(vlan.name.as_deref(), Some("VLAN 42"));
        assert!(!VlanInfo::from_interface("eth0").enabled);
    }
}
