//! Host discovery across an IPv4 range
//!
//! Liveness comes from the neighbor table: a host already listed is alive,
//! otherwise a single echo is sent to make the kernel resolve it and the
//! table is read again. Hosts without a neighbor source (no `ip` and no
//! `arp`) are checked with TCP handshakes instead, where a refused
//! connection counts as alive.

use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use log::{debug, info, warn};
use pnet::ipnetwork::{IpNetwork, Ipv4Network};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::collectors::command::run_command;
use crate::collectors::telemetry::neighbors::{NeighborEntry, read_neighbor_table};
use crate::config::{DiscoverySettings, secs};
use crate::errors::ProbeError;
use crate::probes::descriptor::{ParameterSpec, ProbeDescriptor};
use crate::probes::params::Parameters;
use crate::probes::port_scanner::{PortState, probe_port};
use crate::probes::registry::ProbeHandler;
use crate::probes::reverse_dns::{resolve_hostname, system_resolver};
use crate::probes::to_result;
use crate::runner::{BoundedRunner, ItemOutcome, RunnerConfig};

pub const PROBE_ID: &str = "device_discovery";

const DEFAULT_RANGE: &str = "192.168.1.0/24";
const NEIGHBOR_READ_TIMEOUT: Duration = Duration::from_secs(5);
const HOSTNAME_TIMEOUT: Duration = Duration::from_secs(2);

/// Ports tried when fingerprinting a device
pub const IDENTIFY_PORTS: [u16; 18] = [
    80, 443, 22, 23, 445, 8080, 5000, 9999, 1883, 5353, 161, 139, 1900, 631, 8443, 9100, 3389, 53,
];

/// Ports tried when no neighbor source exists
const HANDSHAKE_PORTS: [u16; 4] = [80, 443, 22, 445];

/// How liveness was established
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DiscoveryMethod {
    NeighborTable,
    TcpHandshake,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Device {
    pub ip: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mac_address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vendor: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub open_ports: Vec<u16>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DiscoveryReport {
    pub network_range: String,
    pub scan_timeout: f64,
    pub resolve_hostnames: bool,
    pub identify_devices: bool,
    pub discovery_method: DiscoveryMethod,
    pub devices: Vec<Device>,
    pub device_count: usize,
    pub hosts_scanned: usize,
    /// Hosts the scan deadline kept from being checked
    pub hosts_not_scanned: usize,
    pub partial: bool,
    pub scan_time: f64,
    pub timestamp: String,
}

/// Parses an IPv4 CIDR and rejects ranges wider than `min_prefix_len`
pub fn parse_range(text: &str, min_prefix_len: u8) -> Result<Ipv4Network, ProbeError> {
    let network: IpNetwork = text
        .trim()
        .parse()
        .map_err(|e| ProbeError::invalid_target(text, format!("invalid network range: {}", e)))?;
    let IpNetwork::V4(network) = network else {
        return Err(ProbeError::invalid_target(text, "only IPv4 ranges can be swept"));
    };
    if network.prefix() < min_prefix_len {
        return Err(ProbeError::invalid_target(
            text,
            format!("range is wider than /{}", min_prefix_len),
        ));
    }
    Ok(network)
}

/// Host addresses of `network`, without network and broadcast for /30 and wider
pub fn host_addresses(network: Ipv4Network) -> Vec<Ipv4Addr> {
    let base = Ipv4Network::new(network.network(), network.prefix()).unwrap_or(network);
    let skip_edges = base.prefix() <= 30;
    let (first, last) = (base.network(), base.broadcast());
    base.iter()
        .filter(|address| !skip_edges || (*address != first && *address != last))
        .collect()
}

/// Device type from the set of open ports
pub fn classify_device(open_ports: &[u16]) -> &'static str {
    let has = |port: u16| open_ports.contains(&port);

    if open_ports.is_empty() {
        return "Unknown";
    }
    if has(80) || has(443) {
        return if has(8080) || has(8443) {
            "Web Server"
        } else if has(1883) {
            "IoT Gateway"
        } else if has(631) || has(9100) {
            "Printer"
        } else if has(5000) || has(9999) {
            "IoT Device"
        } else {
            "Web Server/IoT Device"
        };
    }
    if has(22) {
        return "Linux/SSH Server";
    }
    if has(445) || has(139) {
        return if has(3389) { "Windows Server" } else { "Windows/SMB Device" };
    }
    if has(23) || has(161) {
        return "Network Equipment";
    }
    if has(5353) || has(1900) {
        return "IoT/Media Device";
    }
    if has(67) || has(53) {
        return "Router/Network Infrastructure";
    }

    open_ports
        .iter()
        .find_map(|port| port_role(*port))
        .unwrap_or("Unknown Device")
}

fn port_role(port: u16) -> Option<&'static str> {
    let role = match port {
        21 => "FTP Server",
        25 => "SMTP Server",
        110 => "POP3 Server",
        143 => "IMAP Server",
        993 => "IMAP SSL Server",
        995 => "POP3 SSL Server",
        1883 => "MQTT Broker",
        3389 => "Windows/RDP Server",
        5000 | 9999 => "IoT Device",
        5900 => "VNC Server",
        8080 => "Web Server/Proxy",
        8443 => "Web Server (HTTPS)",
        9100 => "Printer (Raw)",
        631 => "Printer/CUPS Server",
        _ => return None,
    };
    Some(role)
}

/// Vendor for the OUI of `mac`, when it is one of the known prefixes
pub fn lookup_vendor(mac: &str) -> Option<&'static str> {
    let octets: Vec<u8> = mac
        .split([':', '-'])
        .take(3)
        .map(|part| u8::from_str_radix(part, 16))
        .collect::<Result<_, _>>()
        .ok()?;
    let &[a, b, c] = octets.as_slice() else {
        return None;
    };
    let vendor = match (u32::from(a) << 16) | (u32::from(b) << 8) | u32::from(c) {
        0x000C29 => "VMware",
        0x0050C2 => "IEEE Registration Authority",
        0x00005E => "IANA",
        0x0001C7 | 0x1CE85D => "Cisco",
        0x000D3A => "Microsoft",
        0x00037F => "Atheros",
        0x0024D7 => "Intel",
        0x001A11 => "Google",
        0x001801 => "Hewlett-Packard",
        0x002608 | 0x5C26C1 | 0x1865F5 => "Apple",
        0x1060B0 => "Huawei",
        0x001D33 => "Ubiquiti",
        0x001CDF => "Belkin",
        0x0024F7 => "Cisco Meraki",
        0x70E284 | 0x3CEC0F => "Wistron",
        0x74D02B => "ASUSTek",
        0x9C8E99 | 0xC8B5AD => "Hewlett Packard Enterprise",
        0xE06995 | 0xF01FAF => "Dell",
        0x6C4B90 => "Liteon",
        0x1CE2CC => "Texas Instruments",
        0x74AC5F => "Qiku",
        0x7CC709 => "Shenzhen RF",
        _ => return None,
    };
    Some(vendor)
}

fn neighbor_map(entries: Vec<NeighborEntry>) -> HashMap<String, String> {
    entries
        .into_iter()
        .map(|entry| (entry.ip_address, entry.mac_address))
        .collect()
}

async fn ping_once(address: Ipv4Addr, limit: Duration) {
    let host = address.to_string();
    let args: &[&str] = if cfg!(target_os = "windows") {
        &["-n", "1", "-w", "1000", host.as_str()]
    } else {
        &["-c", "1", "-W", "1", host.as_str()]
    };
    if let Err(e) = run_command("ping", args, limit).await {
        debug!("Ping to {} could not run: {}", address, e);
    }
}

/// Open ports among [`IDENTIFY_PORTS`], bounded by one overall budget
pub async fn fingerprint(address: IpAddr, per_port: Duration, budget: Duration) -> Vec<u16> {
    let config = RunnerConfig::new(IDENTIFY_PORTS.len(), per_port).with_deadline(budget);
    let Ok(runner) = BoundedRunner::new(config) else {
        return Vec::new();
    };
    let report = runner
        .run(IDENTIFY_PORTS.to_vec(), move |port| {
            probe_port(SocketAddr::new(address, port), per_port)
        })
        .await;

    let mut open: Vec<u16> = report
        .completed()
        .filter(|(_, state)| **state == PortState::Open)
        .map(|(port, _)| *port)
        .collect();
    open.sort_unstable();
    open
}

struct HostCheck {
    method: DiscoveryMethod,
    neighbors: HashMap<String, String>,
    ping_timeout: Duration,
    resolve_hostnames: bool,
    identify_devices: bool,
    resolver: Option<SocketAddr>,
    identify_port_timeout: Duration,
    identify_budget: Duration,
}

impl HostCheck {
    async fn check(&self, address: Ipv4Addr) -> Option<Device> {
        let ip = address.to_string();
        let mac_address = match self.method {
            DiscoveryMethod::NeighborTable => Some(self.resolve_mac(address, &ip).await?),
            DiscoveryMethod::TcpHandshake => {
                self.handshake(address).await?;
                None
            }
        };

        let target = IpAddr::V4(address);
        let hostname = match (self.resolve_hostnames, self.resolver) {
            (true, Some(resolver)) => resolve_hostname(target, resolver, HOSTNAME_TIMEOUT).await,
            _ => None,
        };
        let (device_type, open_ports) = if self.identify_devices {
            let open = fingerprint(target, self.identify_port_timeout, self.identify_budget).await;
            (Some(classify_device(&open).to_string()), open)
        } else {
            (None, Vec::new())
        };
        let vendor = mac_address
            .as_deref()
            .and_then(lookup_vendor)
            .map(str::to_string);

        debug!("Found device {} ({:?})", ip, mac_address);
        Some(Device {
            ip,
            mac_address,
            hostname,
            device_type,
            vendor,
            open_ports,
        })
    }

    async fn resolve_mac(&self, address: Ipv4Addr, ip: &str) -> Option<String> {
        if let Some(mac) = self.neighbors.get(ip) {
            return Some(mac.clone());
        }
        ping_once(address, self.ping_timeout + Duration::from_secs(1)).await;
        match read_neighbor_table(NEIGHBOR_READ_TIMEOUT).await {
            Ok((entries, _)) => entries
                .into_iter()
                .find(|entry| entry.ip_address == ip)
                .map(|entry| entry.mac_address),
            Err(e) => {
                debug!("Neighbor table re-read failed: {}", e);
                None
            }
        }
    }

    async fn handshake(&self, address: Ipv4Addr) -> Option<()> {
        for port in HANDSHAKE_PORTS {
            let state = probe_port(SocketAddr::new(IpAddr::V4(address), port), self.ping_timeout).await;
            if state != PortState::Filtered {
                return Some(());
            }
        }
        None
    }
}

pub struct DeviceDiscoveryProbe {
    settings: DiscoverySettings,
}

impl DeviceDiscoveryProbe {
    pub fn new(settings: DiscoverySettings) -> Self {
        Self { settings }
    }

    fn item_timeout(&self, check: &HostCheck) -> Duration {
        let mut limit = check.ping_timeout + NEIGHBOR_READ_TIMEOUT + Duration::from_secs(1);
        if check.resolve_hostnames {
            limit += HOSTNAME_TIMEOUT;
        }
        if check.identify_devices {
            limit += check.identify_budget + check.identify_port_timeout;
        }
        limit
    }
}

#[async_trait]
impl ProbeHandler for DeviceDiscoveryProbe {
    fn descriptor(&self) -> ProbeDescriptor {
        ProbeDescriptor::new(
            PROBE_ID,
            "Device Discovery",
            "Discover devices on the local network and identify their types",
        )
        .icon("devices")
        .parameter(
            ParameterSpec::string("network_range", "Network Range", "Range to scan in CIDR notation")
                .default_value(DEFAULT_RANGE),
        )
        .parameter(
            ParameterSpec::number("scan_timeout", "Scan Timeout", "Maximum time for the whole scan in seconds")
                .default_value(self.settings.scan_timeout_secs)
                .bounds(1.0, 600.0, 1.0),
        )
        .parameter(
            ParameterSpec::boolean("resolve_hostnames", "Resolve Hostnames", "Look up a PTR name for each device")
                .default_value(true),
        )
        .parameter(
            ParameterSpec::boolean("identify_devices", "Identify Devices", "Probe common ports to guess the device type")
                .default_value(true),
        )
        .parameter(
            ParameterSpec::range("concurrency", "Concurrency", "Hosts checked at the same time", 1.0, 256.0, 1.0)
                .default_value(self.settings.concurrency as u64),
        )
    }

    async fn execute(&self, params: &Parameters) -> Result<Value, ProbeError> {
        let range_text = params.string_or("network_range", DEFAULT_RANGE);
        let network = parse_range(&range_text, self.settings.min_prefix_len)?;
        let scan_timeout = params.bounded_number("scan_timeout", self.settings.scan_timeout_secs, 1.0, 600.0)?;
        let resolve_hostnames = params.boolean_or("resolve_hostnames", true)?;
        let identify_devices = params.boolean_or("identify_devices", true)?;
        let concurrency = params.bounded_number("concurrency", self.settings.concurrency as f64, 1.0, 256.0)?;

        let (method, neighbors) = match read_neighbor_table(NEIGHBOR_READ_TIMEOUT).await {
            Ok((entries, source)) => {
                debug!("Neighbor source {:?} has {} entries", source, entries.len());
                (DiscoveryMethod::NeighborTable, neighbor_map(entries))
            }
            Err(e) => {
                warn!("No neighbor source ({}), falling back to TCP handshakes", e);
                (DiscoveryMethod::TcpHandshake, HashMap::new())
            }
        };

        let resolver = if resolve_hostnames { system_resolver().await } else { None };
        if resolve_hostnames && resolver.is_none() {
            warn!("No system nameserver configured, hostnames will not be resolved");
        }

        let check = HostCheck {
            method,
            neighbors,
            ping_timeout: secs(self.settings.ping_timeout_secs),
            resolve_hostnames,
            identify_devices,
            resolver,
            identify_port_timeout: Duration::from_millis(self.settings.identify_port_timeout_ms),
            identify_budget: secs(self.settings.identify_budget_secs),
        };
        let runner = BoundedRunner::new(
            RunnerConfig::new(concurrency as usize, self.item_timeout(&check)).with_deadline(secs(scan_timeout)),
        )?;

        let hosts = host_addresses(network);
        info!(
            "Discovering devices in {} ({} hosts, method={:?})",
            network,
            hosts.len(),
            method
        );

        let check = Arc::new(check);
        let report = runner
            .run(hosts, move |address| {
                let check = Arc::clone(&check);
                async move { check.check(address).await }
            })
            .await;

        let mut devices: Vec<Device> = report
            .outcomes
            .iter()
            .filter_map(|outcome| match &outcome.outcome {
                ItemOutcome::Completed(Some(device)) => Some(device.clone()),
                _ => None,
            })
            .collect();
        devices.sort_by_key(|device| device.ip.parse::<Ipv4Addr>().ok());

        info!("Device discovery found {} devices in {}", devices.len(), network);

        let discovery = DiscoveryReport {
            network_range: range_text,
            scan_timeout,
            resolve_hostnames,
            identify_devices,
            discovery_method: method,
            device_count: devices.len(),
            devices,
            hosts_scanned: report.outcomes.len(),
            hosts_not_scanned: report.not_admitted.len(),
            partial: !report.is_complete(),
            scan_time: report.elapsed.as_secs_f64(),
            timestamp: Utc::now().to_rfc3339(),
        };
        to_result(&discovery)
    }
}
