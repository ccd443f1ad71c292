//! Neighbor (ARP/NDP) table collection
//!
//! `ip neigh show` is the primary source. Hosts without iproute2 fall back
//! to `arp -n`, whose Linux and BSD output formats are both understood.
//! Entries without both an address and a link-layer address are dropped.

use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;
use std::time::Duration;

use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::collectors::command::run_command;
use crate::errors::ProbeError;

/// Neighbor cache state as reported by the kernel
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "UPPERCASE")]
pub enum NeighborState {
    Reachable,
    Stale,
    Delay,
    Permanent,
    Incomplete,
    Failed,
    Probe,
    Noarp,
}

impl FromStr for NeighborState {
    type Err = ();

    fn from_str(token: &str) -> Result<Self, Self::Err> {
        match token {
            "REACHABLE" => Ok(NeighborState::Reachable),
            "STALE" => Ok(NeighborState::Stale),
            "DELAY" => Ok(NeighborState::Delay),
            "PERMANENT" => Ok(NeighborState::Permanent),
            "INCOMPLETE" => Ok(NeighborState::Incomplete),
            "FAILED" => Ok(NeighborState::Failed),
            "PROBE" => Ok(NeighborState::Probe),
            "NOARP" => Ok(NeighborState::Noarp),
            _ => Err(()),
        }
    }
}

impl fmt::Display for NeighborState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            NeighborState::Reachable => "REACHABLE",
            NeighborState::Stale => "STALE",
            NeighborState::Delay => "DELAY",
            NeighborState::Permanent => "PERMANENT",
            NeighborState::Incomplete => "INCOMPLETE",
            NeighborState::Failed => "FAILED",
            NeighborState::Probe => "PROBE",
            NeighborState::Noarp => "NOARP",
        };
        f.write_str(label)
    }
}

/// One IP-to-MAC mapping
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct NeighborEntry {
    pub ip_address: String,
    pub mac_address: String,
    pub device: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<NeighborState>,
}

impl NeighborEntry {
    pub fn ip(&self) -> Option<IpAddr> {
        self.ip_address.parse().ok()
    }
}

/// Where a neighbor table came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NeighborSource {
    IpNeigh,
    Arp,
}

/// Parses one line of `ip neigh show`
///
/// `192.168.1.1 dev eth0 lladdr 00:11:22:33:44:55 REACHABLE`
pub fn parse_ip_neigh_line(line: &str) -> Option<NeighborEntry> {
    let fields: Vec<&str> = line.split_whitespace().collect();
    if fields.len() < 4 {
        return None;
    }

    let mut device = String::new();
    let mut mac = String::new();
    let mut state = None;

    let mut i = 1;
    while i < fields.len() {
        match fields[i] {
            "dev" if i + 1 < fields.len() => {
                device = fields[i + 1].to_string();
                i += 1;
            }
            "lladdr" if i + 1 < fields.len() => {
                mac = fields[i + 1].to_string();
                i += 1;
            }
            token => {
                if let Ok(parsed) = token.parse::<NeighborState>() {
                    state = Some(parsed);
                }
            }
        }
        i += 1;
    }

    if fields[0].is_empty() || mac.is_empty() {
        return None;
    }

    Some(NeighborEntry {
        ip_address: fields[0].to_string(),
        mac_address: mac,
        device,
        state,
    })
}

/// Parses one line of `arp -n` (Linux net-tools) or `arp -an` (BSD, macOS)
///
/// ```text
/// 192.168.1.1      ether   aa:bb:cc:dd:ee:ff   C     eth0
/// ? (192.168.1.1) at aa:bb:cc:dd:ee:ff on en0 ifscope [ethernet]
/// ```
pub fn parse_arp_line(line: &str) -> Option<NeighborEntry> {
    let fields: Vec<&str> = line.split_whitespace().collect();
    if fields.is_empty() || fields[0] == "Address" {
        return None;
    }

    // BSD style
    if let Some(at) = fields.iter().position(|field| *field == "at") {
        let ip = fields
            .get(at.checked_sub(1)?)?
            .trim_start_matches('(')
            .trim_end_matches(')');
        let mac = *fields.get(at + 1)?;
        if !looks_like_mac(mac) {
            return None;
        }
        let device = fields
            .iter()
            .position(|field| *field == "on")
            .and_then(|on| fields.get(on + 1))
            .map(|name| name.to_string())
            .unwrap_or_default();
        let state = if fields.contains(&"permanent") {
            NeighborState::Permanent
        } else {
            NeighborState::Reachable
        };
        return Some(NeighborEntry {
            ip_address: ip.to_string(),
            mac_address: mac.to_string(),
            device,
            state: Some(state),
        });
    }

    // Linux net-tools style
    // Address HWtype HWaddress Flags Mask Iface
    let mac_at = fields.iter().position(|field| looks_like_mac(field))?;
    let mac = fields[mac_at];
    let flags_permanent = fields.get(mac_at + 1).is_some_and(|flags| {
        flags.chars().all(|flag| matches!(flag, 'C' | 'M' | 'P')) && flags.contains('M')
    });
    Some(NeighborEntry {
        ip_address: fields[0].to_string(),
        mac_address: mac.to_string(),
        device: fields.last().map(|name| name.to_string()).unwrap_or_default(),
        state: Some(if flags_permanent {
            NeighborState::Permanent
        } else {
            NeighborState::Reachable
        }),
    })
}

fn looks_like_mac(token: &str) -> bool {
    let parts: Vec<&str> = token.split(':').collect();
    parts.len() == 6
        && parts
            .iter()
            .all(|part| !part.is_empty() && part.len() <= 2 && part.chars().all(|c| c.is_ascii_hexdigit()))
}

pub fn parse_ip_neigh(output: &str) -> Vec<NeighborEntry> {
    output.lines().filter_map(parse_ip_neigh_line).collect()
}

pub fn parse_arp(output: &str) -> Vec<NeighborEntry> {
    output.lines().filter_map(parse_arp_line).collect()
}

/// Reads the neighbor table, preferring `ip neigh show` over `arp -n`
///
/// Fails with `ToolUnavailable` only when neither helper exists.
pub async fn read_neighbor_table(
    limit: Duration,
) -> Result<(Vec<NeighborEntry>, NeighborSource), ProbeError> {
    match run_command("ip", &["neigh", "show"], limit).await {
        Ok(output) if output.success => {
            let entries = parse_ip_neigh(&output.stdout);
            debug!("Read {} neighbor entries from ip neigh", entries.len());
            return Ok((entries, NeighborSource::IpNeigh));
        }
        Ok(output) => warn!("ip neigh show failed: {}", output.stderr.trim()),
        Err(ProbeError::ToolUnavailable { .. }) => debug!("ip not available, falling back to arp"),
        Err(e) => return Err(e),
    }

    let args: &[&str] = if cfg!(target_os = "linux") { &["-n"] } else { &["-an"] };
    let output = run_command("arp", args, limit).await?;
    let entries = parse_arp(&output.stdout);
    debug!("Read {} neighbor entries from arp", entries.len());
    Ok((entries, NeighborSource::Arp))
}
