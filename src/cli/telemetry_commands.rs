use std::time::Duration;

use anyhow::Result;
use log::{info, warn};
use tokio::sync::broadcast::error::RecvError;
use tokio::time::sleep;

use netscout::collectors::formatting::{format_bytes, format_latency, format_mbps, format_uptime};
use netscout::collectors::telemetry::{SharedSampler, TelemetryBroadcaster};
use netscout::collectors::TelemetrySnapshot;
use netscout::config::{TelemetrySettings, secs};

pub struct TelemetryCommandHandler {
    sampler: SharedSampler,
    settings: TelemetrySettings,
}

impl TelemetryCommandHandler {
    pub fn new(sampler: SharedSampler, settings: TelemetrySettings) -> Self {
        Self { sampler, settings }
    }

    pub async fn handle_status_command(&self, measurement_duration: u64, json: bool) -> Result<()> {
        if !json {
            println!("Measuring for {} seconds...", measurement_duration);
        }

        // The first sample only establishes the rate baseline
        self.sampler.lock().await.sample().await;
        sleep(Duration::from_secs(measurement_duration)).await;
        let snapshot = self.sampler.lock().await.sample().await;

        if json {
            println!("{}", serde_json::to_string_pretty(&snapshot)?);
        } else {
            print_status(&snapshot);
        }
        Ok(())
    }

    pub async fn handle_watch_command(&self, interval: Option<f64>, count: Option<u64>, json: bool) -> Result<()> {
        let period = interval.map(secs).unwrap_or_else(|| self.settings.poll_interval());
        let broadcaster = TelemetryBroadcaster::new(self.settings.channel_capacity, period);
        let mut receiver = broadcaster.subscribe();
        let handle = broadcaster.spawn(self.sampler.clone());

        let mut shown = 0u64;
        loop {
            tokio::select! {
                received = receiver.recv() => match received {
                    Ok(snapshot) => {
                        shown += 1;
                        if json {
                            println!("{}", serde_json::to_string(&*snapshot)?);
                        } else {
                            print_watch_line(&snapshot);
                        }
                        if count.is_some_and(|limit| shown >= limit) {
                            break;
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => warn!("Output fell behind, skipped {} snapshots", skipped),
                    Err(RecvError::Closed) => break,
                },
                _ = tokio::signal::ctrl_c() => {
                    info!("Interrupted, stopping telemetry stream");
                    break;
                }
            }
        }

        let published = handle.stop().await;
        info!("Telemetry stream finished: {} shown, {} published", shown, published);
        Ok(())
    }
}

fn print_status(snapshot: &TelemetrySnapshot) {
    println!("Network Status");
    println!("==============");

    let Some(interface) = &snapshot.interface else {
        println!("\nNo active interface (every interface is down or loopback)");
        return;
    };

    println!("\nInterface: {} ({:?})", interface.name, interface.kind);
    if let Some(mac) = &interface.mac_address {
        println!("  MAC:         {}", mac);
    }
    println!("  IPv4:        {}", snapshot.ipv4_address.as_deref().unwrap_or("-"));
    println!("  Subnet Mask: {}", snapshot.subnet_mask.as_deref().unwrap_or("-"));
    println!("  IPv6:        {}", snapshot.ipv6_address.as_deref().unwrap_or("-"));
    println!("  Gateway:     {}", snapshot.gateway.as_deref().unwrap_or("-"));
    if !snapshot.dns_servers.is_empty() {
        println!("  DNS:         {}", snapshot.dns_servers.join(", "));
    }
    if let Some(server) = &snapshot.dhcp_info.dhcp_server {
        let note = if snapshot.dhcp_info.server_inferred { " (inferred from gateway)" } else { "" };
        println!("  DHCP Server: {}{}", server, note);
    }
    if let Some(vlan) = &snapshot.vlan_info.name {
        println!("  VLAN:        {}", vlan);
    }
    if snapshot.wireless.is_wireless {
        println!(
            "  SSID:        {} ({} dBm)",
            snapshot.wireless.ssid.as_deref().unwrap_or("-"),
            snapshot
                .wireless
                .signal_strength
                .map_or_else(|| "-".to_string(), |signal| signal.to_string())
        );
    }

    println!("\nConnection: {:?}", snapshot.connection.status);
    println!("  Latency:     {}", format_latency(snapshot.connection.latency_ms));
    if let Some(loss) = snapshot.connection.packet_loss {
        println!("  Packet Loss: {:.1}%", loss);
    }
    if let Some(uptime) = snapshot.connection.uptime {
        println!("  Uptime:      {}", format_uptime(uptime));
    }

    println!("\nTraffic:");
    println!("  Bandwidth:   {} ({:?})", format_mbps(snapshot.traffic.current_bandwidth), snapshot.traffic.rate_status);
    println!("  Received:    {}", format_bytes(snapshot.traffic.bytes_received));
    println!("  Sent:        {}", format_bytes(snapshot.traffic.bytes_sent));

    if !snapshot.neighbors.is_empty() {
        println!("\nNeighbors ({}):", snapshot.neighbors.len());
        for neighbor in &snapshot.neighbors {
            let state = neighbor.state.map(|state| state.to_string()).unwrap_or_default();
            println!(
                "  {:<40} {:<18} {:<10} {}",
                neighbor.ip_address, neighbor.mac_address, neighbor.device, state
            );
        }
    }
}

fn print_watch_line(snapshot: &TelemetrySnapshot) {
    println!(
        "{} {:<10} {:<12} {:>12} latency={} neighbors={}",
        snapshot.timestamp.format("%H:%M:%S"),
        snapshot.interface.as_ref().map_or("-", |interface| interface.name.as_str()),
        format!("{:?}", snapshot.connection.status),
        format_mbps(snapshot.traffic.current_bandwidth),
        format_latency(snapshot.connection.latency_ms),
        snapshot.neighbors.len()
    );
}
