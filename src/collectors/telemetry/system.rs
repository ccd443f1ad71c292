//! Host configuration parsers
//!
//! Each parser works on already captured text so it can be tested without
//! touching the host. The `read_*` functions do the I/O and never fail:
//! missing files or helpers simply produce empty values.

use std::net::Ipv4Addr;
use std::path::Path;
use std::time::Duration;

use log::{debug, trace};

use crate::collectors::command::run_command;
use crate::collectors::platform::Platform;

const RESOLV_CONF: &str = "/etc/resolv.conf";
const PROC_UPTIME: &str = "/proc/uptime";

const LEASE_DIRS: [&str; 4] = [
    "/var/lib/dhcp",
    "/var/lib/dhclient",
    "/var/lib/NetworkManager",
    "/run/systemd/netif/leases",
];

/// Subnet mask for a prefix length, computed for every length 0..=32
pub fn prefix_to_mask(prefix: u8) -> Option<Ipv4Addr> {
    if prefix > 32 {
        return None;
    }
    let bits = if prefix == 0 {
        0
    } else {
        u32::MAX << (32 - u32::from(prefix))
    };
    Some(Ipv4Addr::from(bits))
}

/// `default via 192.168.1.1 dev wlan0 proto dhcp metric 600`
pub fn parse_default_gateway(output: &str) -> Option<String> {
    output.lines().find_map(|line| {
        let fields: Vec<&str> = line.split_whitespace().collect();
        match fields.as_slice() {
            ["default", "via", gateway, ..] => Some(gateway.to_string()),
            _ => None,
        }
    })
}

/// `nameserver` entries of a resolv.conf, in file order
pub fn parse_resolv_conf(content: &str) -> Vec<String> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| line.starts_with("nameserver"))
        .filter_map(|line| line.split_whitespace().nth(1))
        .map(str::to_string)
        .collect()
}

/// DHCP server from dhclient (`option dhcp-server-identifier X;`),
/// dhcpcd (`DHCPSID=X`) or systemd-networkd (`SERVER_ADDRESS=X`) leases
///
/// dhclient appends leases, so the last identifier in the file wins.
pub fn parse_dhcp_server(content: &str) -> Option<String> {
    content.lines().rev().find_map(|line| {
        let line = line.trim();
        if line.contains("dhcp-server-identifier") {
            line.split_whitespace()
                .last()
                .map(|value| value.trim_end_matches(';').to_string())
        } else if let Some(value) = line.strip_prefix("DHCPSID=") {
            Some(value.trim_matches('\'').to_string())
        } else {
            line.strip_prefix("SERVER_ADDRESS=").map(str::to_string)
        }
    })
}

/// First field of /proc/uptime, truncated to whole seconds
pub fn parse_uptime(content: &str) -> Option<u64> {
    content
        .split_whitespace()
        .next()?
        .parse::<f64>()
        .ok()
        .filter(|secs| secs.is_finite() && *secs >= 0.0)
        .map(|secs| secs as u64)
}

/// VLAN id from an interface named `parent.N`
pub fn parse_vlan_id(interface: &str) -> Option<u16> {
    let (parent, id) = interface.rsplit_once('.')?;
    if parent.is_empty() {
        return None;
    }
    id.parse().ok()
}

/// SSID and signal level from `iwconfig <iface>` output
pub fn parse_iwconfig(output: &str) -> (Option<String>, Option<i32>) {
    let ssid = output.find("ESSID:\"").and_then(|start| {
        let rest = &output[start + "ESSID:\"".len()..];
        rest.find('"').map(|end| rest[..end].to_string())
    });

    let signal = output.find("Signal level=").and_then(|start| {
        let rest = &output[start + "Signal level=".len()..];
        let token = rest.split_whitespace().next()?;
        token.trim_end_matches("dBm").parse::<i32>().ok()
    });

    (ssid.filter(|ssid| !ssid.is_empty()), signal)
}

/// Average round trip and loss from a `ping -c N` summary
///
/// Missing markers leave the corresponding value unset.
pub fn parse_ping_summary(output: &str) -> (Option<f64>, Option<f64>) {
    let latency = output
        .lines()
        .find(|line| line.contains("min/avg/max"))
        .and_then(|line| line.split('=').nth(1))
        .and_then(|values| values.trim().split('/').nth(1))
        .and_then(|avg| avg.trim().parse::<f64>().ok());

    let loss = output.find("packet loss").and_then(|end| {
        output[..end]
            .split_whitespace()
            .last()
            .map(|field| field.trim_end_matches('%'))
            .and_then(|value| value.parse::<f64>().ok())
    });

    (latency, loss)
}

pub async fn read_default_gateway(limit: Duration) -> Option<String> {
    match run_command("ip", &["route", "show", "default"], limit).await {
        Ok(output) => parse_default_gateway(&output.stdout),
        Err(e) => {
            debug!("Default gateway unavailable: {}", e);
            None
        }
    }
}

pub async fn read_dns_servers() -> Vec<String> {
    match tokio::fs::read_to_string(RESOLV_CONF).await {
        Ok(content) => parse_resolv_conf(&content),
        Err(e) => {
            debug!("Could not read {}: {}", RESOLV_CONF, e);
            Vec::new()
        }
    }
}

/// DHCP server from the newest lease file that names one
pub async fn read_dhcp_server() -> Option<String> {
    let mut newest: Option<(std::time::SystemTime, String)> = None;

    for dir in LEASE_DIRS {
        let Ok(mut entries) = tokio::fs::read_dir(dir).await else {
            continue;
        };
        while let Ok(Some(entry)) = entries.next_entry().await {
            let path = entry.path();
            if !is_lease_file(&path, dir) {
                continue;
            }
            let Ok(content) = tokio::fs::read_to_string(&path).await else {
                continue;
            };
            let Some(server) = parse_dhcp_server(&content) else {
                continue;
            };
            let modified = entry
                .metadata()
                .await
                .and_then(|meta| meta.modified())
                .unwrap_or(std::time::UNIX_EPOCH);
            trace!("DHCP server {} found in {}", server, path.display());
            if newest.as_ref().is_none_or(|(time, _)| modified > *time) {
                newest = Some((modified, server));
            }
        }
    }

    newest.map(|(_, server)| server)
}

fn is_lease_file(path: &Path, dir: &str) -> bool {
    // systemd-networkd names its lease files by ifindex with no extension
    if dir.starts_with("/run/systemd") {
        return path.is_file();
    }
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext == "lease" || ext == "leases" || ext == "info")
}

pub async fn read_uptime() -> Option<u64> {
    tokio::fs::read_to_string(PROC_UPTIME)
        .await
        .ok()
        .and_then(|content| parse_uptime(&content))
}

/// SSID and signal for a wireless interface; `(None, None)` when iwconfig is absent
pub async fn read_wireless(interface: &str, limit: Duration) -> (Option<String>, Option<i32>) {
    match run_command("iwconfig", &[interface], limit).await {
        Ok(output) if !output.stdout.contains("no wireless extensions") => {
            parse_iwconfig(&output.stdout)
        }
        Ok(_) => (None, None),
        Err(e) => {
            debug!("Wireless details unavailable for {}: {}", interface, e);
            (None, None)
        }
    }
}

/// Arguments for a short `count`-echo ping with a one second reply wait
pub fn ping_summary_args(platform: Platform, target: &str, count: u32) -> Vec<String> {
    let count = count.to_string();
    let args = match platform {
        Platform::Windows => ["-n", count.as_str(), "-w", "1000", target],
        // macOS reads -W in milliseconds
        Platform::MacOS => ["-c", count.as_str(), "-W", "1000", target],
        Platform::Linux | Platform::Unknown => ["-c", count.as_str(), "-W", "1", target],
    };
    args.iter().map(|arg| arg.to_string()).collect()
}

/// Average latency and loss to `target` from a short ping
pub async fn read_ping_summary(target: &str, count: u32, limit: Duration) -> (Option<f64>, Option<f64>) {
    let args = ping_summary_args(Platform::current(), target, count);
    let args: Vec<&str> = args.iter().map(String::as_str).collect();
    match run_command("ping", &args, limit).await {
        Ok(output) => parse_ping_summary(&output.stdout),
        Err(e) => {
            debug!("Connection check to {} failed: {}", target, e);
            (None, None)
        }
    }
}
