//! Interface classification from platform naming conventions

use log::trace;
use serde::{Deserialize, Serialize};

/// Broad interface category reported in telemetry snapshots
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum InterfaceKind {
    Ethernet,
    Wifi,
    Loopback,
    /// VPN tunnels, container veths, bridges and VM adapters
    Virtual,
    Unknown,
}

/// Supported platforms
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    MacOS,
    Linux,
    Windows,
    Unknown,
}

impl Platform {
    pub fn current() -> Self {
        match std::env::consts::OS {
            "macos" => Platform::MacOS,
            "linux" => Platform::Linux,
            "windows" => Platform::Windows,
            _ => Platform::Unknown,
        }
    }
}

impl InterfaceKind {
    /// Classifies an interface name using the rules of `platform`
    pub fn classify(platform: Platform, name: &str) -> Self {
        let lower = name.to_lowercase();
        let kind = match platform {
            Platform::Linux => linux_kind(&lower),
            Platform::MacOS => macos_kind(&lower),
            Platform::Windows => windows_kind(&lower),
            Platform::Unknown => None,
        }
        .unwrap_or_else(|| generic_kind(&lower));

        trace!("Interface '{}' classified as {:?}", name, kind);
        kind
    }

    pub fn is_virtual(self) -> bool {
        matches!(self, InterfaceKind::Virtual | InterfaceKind::Loopback)
    }
}

fn linux_kind(name: &str) -> Option<InterfaceKind> {
    const VIRTUAL: [&str; 8] = ["tun", "tap", "veth", "docker", "br-", "virbr", "wg", "vxlan"];

    if name.starts_with("lo") {
        Some(InterfaceKind::Loopback)
    } else if name.starts_with("wl") {
        Some(InterfaceKind::Wifi)
    } else if VIRTUAL.iter().any(|prefix| name.starts_with(prefix)) {
        Some(InterfaceKind::Virtual)
    } else if name.starts_with("eth") || name.starts_with("en") || name.starts_with("em") {
        Some(InterfaceKind::Ethernet)
    } else {
        None
    }
}

fn macos_kind(name: &str) -> Option<InterfaceKind> {
    const VIRTUAL: [&str; 8] = ["utun", "anpi", "ipsec", "ppp", "awdl", "llw", "bridge", "vmnet"];

    if name.starts_with("lo") {
        Some(InterfaceKind::Loopback)
    } else if VIRTUAL.iter().any(|prefix| name.starts_with(prefix)) {
        Some(InterfaceKind::Virtual)
    } else if name == "en0" {
        // en0 is the built-in wireless adapter on every current Mac laptop
        Some(InterfaceKind::Wifi)
    } else if name.starts_with("en") {
        Some(InterfaceKind::Ethernet)
    } else {
        None
    }
}

fn windows_kind(name: &str) -> Option<InterfaceKind> {
    if name.contains("loopback") {
        Some(InterfaceKind::Loopback)
    } else if name.contains("wi-fi") || name.contains("wifi") || name.contains("wireless") {
        Some(InterfaceKind::Wifi)
    } else if ["vpn", "tunnel", "hyper-v", "vmware", "virtualbox"]
        .iter()
        .any(|marker| name.contains(marker))
    {
        Some(InterfaceKind::Virtual)
    } else if name.contains("ethernet") {
        Some(InterfaceKind::Ethernet)
    } else {
        None
    }
}

fn generic_kind(name: &str) -> InterfaceKind {
    match name {
        n if n.starts_with("lo") => InterfaceKind::Loopback,
        n if n.starts_with("wl") || n.contains("wifi") => InterfaceKind::Wifi,
        n if n.starts_with("tun") || n.starts_with("tap") => InterfaceKind::Virtual,
        n if n.starts_with("eth") || n.starts_with("en") => InterfaceKind::Ethernet,
        _ => InterfaceKind::Unknown,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_linux_names() {
        assert_eq!(InterfaceKind::classify(Platform::Linux, "lo"), InterfaceKind::Loopback);
        assert_eq!(InterfaceKind::classify(Platform::Linux, "eth0"), InterfaceKind::Ethernet);
        assert_eq!(InterfaceKind::classify(Platform::Linux, "enp3s0"), InterfaceKind::Ethernet);
        assert_eq!(InterfaceKind::classify(Platform::Linux, "wlp2s0"), InterfaceKind::Wifi);
        assert_eq!(InterfaceKind::classify(Platform::Linux, "docker0"), InterfaceKind::Virtual);
        assert_eq!(InterfaceKind::classify(Platform::Linux, "veth12ab"), InterfaceKind::Virtual);
        assert_eq!(InterfaceKind::classify(Platform::Linux, "can0"), InterfaceKind::Unknown);
    }

    #[test]
    fn test_macos_names() {
        assert_eq!(InterfaceKind::classify(Platform::MacOS, "lo0"), InterfaceKind::Loopback);
        assert_eq!(InterfaceKind::classify(Platform::MacOS, "en0"), InterfaceKind::Wifi);
        assert_eq!(InterfaceKind::classify(Platform::MacOS, "en5"), InterfaceKind::Ethernet);
        assert_eq!(InterfaceKind::classify(Platform::MacOS, "utun3"), InterfaceKind::Virtual);
    }

    #[test]
    fn test_windows_names() {
        assert_eq!(
            InterfaceKind::classify(Platform::Windows, "Wi-Fi"),
            InterfaceKind::Wifi
        );
        assert_eq!(
            InterfaceKind::classify(Platform::Windows, "vEthernet (Hyper-V)"),
            InterfaceKind::Virtual
        );
        assert_eq!(
            InterfaceKind::classify(Platform::Windows, "Ethernet 2"),
            InterfaceKind::Ethernet
        );
    }

    #[test]
    fn test_virtual_kinds() {
        assert!(InterfaceKind::Loopback.is_virtual());
        assert!(InterfaceKind::Virtual.is_virtual());
        assert!(!InterfaceKind::Wifi.is_virtual());
    }
}
