//! Echo bursts in unprivileged and privileged mode
//!
//! Unprivileged mode drives the system `ping` binary, which works for any
//! user on most hosts. Privileged mode builds ICMP echo requests itself on a
//! raw socket and therefore needs root or `CAP_NET_RAW`.

use std::net::IpAddr;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use log::{debug, trace, warn};
use serde::{Deserialize, Serialize};

use crate::collectors::command::run_command;
use crate::collectors::platform;
use crate::errors::ProbeError;
use crate::quality::stats;

const ICMP_HEADER_LEN: usize = 8;
const MAX_PAYLOAD: usize = 65_507 - ICMP_HEADER_LEN;

/// How echo requests are sent
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PingMode {
    Unprivileged,
    Privileged,
}

/// Shape of one burst
#[derive(Debug, Clone, PartialEq)]
pub struct BurstSpec {
    pub count: u32,
    /// ICMP payload size in bytes
    pub packet_size: usize,
    /// How long to wait for each reply
    pub echo_timeout: Duration,
}

impl BurstSpec {
    /// Upper bound for the whole burst, including helper start-up
    pub fn budget(&self) -> Duration {
        self.echo_timeout * self.count.max(1) + Duration::from_secs(2)
    }
}

/// Replies observed for one burst
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BurstStats {
    pub sent: u32,
    pub received: u32,
    pub rtts_ms: Vec<f64>,
}

impl BurstStats {
    pub fn loss_pct(&self) -> f64 {
        if self.sent == 0 {
            return 100.0;
        }
        let lost = self.sent.saturating_sub(self.received);
        f64::from(lost) / f64::from(self.sent) * 100.0
    }

    /// Mean round trip, `None` when nothing came back
    pub fn mean_latency(&self) -> Option<f64> {
        stats::mean(&self.rtts_ms)
    }
}

/// Sends one burst of echo requests
#[async_trait]
pub trait LatencyProbe: Send + Sync {
    async fn burst(&self, target: IpAddr, mode: PingMode, spec: &BurstSpec) -> Result<BurstStats, ProbeError>;
}

/// ICMP echo via the system `ping` or a raw socket
#[derive(Debug, Clone, Default)]
pub struct IcmpPinger;

impl IcmpPinger {
    pub fn new() -> Self {
        Self
    }

    async fn system_ping(&self, target: IpAddr, spec: &BurstSpec) -> Result<BurstStats, ProbeError> {
        let count = spec.count.to_string();
        let size = spec.packet_size.to_string();
        let wait_secs = spec.echo_timeout.as_secs().max(1).to_string();
        let wait_ms = spec.echo_timeout.as_millis().max(1).to_string();
        let host = target.to_string();
        let (count, size, host) = (count.as_str(), size.as_str(), host.as_str());

        let args: Vec<&str> = if cfg!(target_os = "windows") {
            vec!["-n", count, "-l", size, "-w", wait_ms.as_str(), host]
        } else if cfg!(target_os = "macos") {
            vec!["-c", count, "-s", size, "-i", "0.2", host]
        } else {
            vec!["-c", count, "-s", size, "-W", wait_secs.as_str(), "-i", "0.2", host]
        };

        let output = run_command("ping", &args, spec.budget()).await?;
        let rtts_ms = parse_reply_times(&output.stdout);
        let sent = parse_transmitted(&output.stdout);

        if !output.success && rtts_ms.is_empty() && sent.is_none() {
            return Err(ProbeError::Other(anyhow::anyhow!(
                "ping could not run: {}",
                output.stderr.trim()
            )));
        }

        let sent = sent.unwrap_or(spec.count);
        Ok(BurstStats {
            sent,
            received: (rtts_ms.len() as u32).min(sent),
            rtts_ms,
        })
    }

    async fn raw_ping(&self, target: IpAddr, spec: &BurstSpec) -> Result<BurstStats, ProbeError> {
        let IpAddr::V4(_) = target else {
            return Err(ProbeError::tool_unavailable(
                "raw ICMP socket",
                "privileged echo supports IPv4 targets only",
            ));
        };

        let spec = spec.clone();
        let budget = spec.budget();
        let job = tokio::task::spawn_blocking(move || {
            if !platform::has_raw_socket_privileges() {
                return Err(ProbeError::tool_unavailable(
                    "raw ICMP socket",
                    format!("requires {}", platform::required_privileges().join(", ")),
                ));
            }
            raw_echo_burst(target, &spec)
        });

        match tokio::time::timeout(budget, job).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_error)) => Err(ProbeError::Other(anyhow::anyhow!(
                "raw echo task failed: {}",
                join_error
            ))),
            Err(_) => Err(ProbeError::Other(anyhow::anyhow!(
                "raw echo burst exceeded {}ms",
                budget.as_millis()
            ))),
        }
    }
}

#[async_trait]
impl LatencyProbe for IcmpPinger {
    async fn burst(&self, target: IpAddr, mode: PingMode, spec: &BurstSpec) -> Result<BurstStats, ProbeError> {
        trace!("Echo burst to {} ({:?}, count={})", target, mode, spec.count);
        match mode {
            PingMode::Unprivileged => self.system_ping(target, spec).await,
            PingMode::Privileged => self.raw_ping(target, spec).await,
        }
    }
}

/// Blocking raw-socket burst; one request at a time, each with its own wait
fn raw_echo_burst(target: IpAddr, spec: &BurstSpec) -> Result<BurstStats, ProbeError> {
    use pnet::packet::Packet;
    use pnet::packet::icmp::{IcmpTypes, echo_reply, echo_request};
    use pnet::packet::ip::IpNextHeaderProtocols;
    use pnet::transport::TransportChannelType::Layer4;
    use pnet::transport::TransportProtocol::Ipv4;
    use pnet::transport::{icmp_packet_iter, transport_channel};

    let protocol = Layer4(Ipv4(IpNextHeaderProtocols::Icmp));
    let (mut tx, mut rx) = transport_channel(4096, protocol).map_err(|e| {
        if e.kind() == std::io::ErrorKind::PermissionDenied {
            ProbeError::tool_unavailable("raw ICMP socket", "permission denied")
        } else {
            ProbeError::Io(e)
        }
    })?;

    let identifier = (std::process::id() & 0xFFFF) as u16;
    let payload = spec.packet_size.min(MAX_PAYLOAD);
    let mut rtts_ms = Vec::with_capacity(spec.count as usize);
    let mut sent = 0u32;

    for sequence in 0..spec.count {
        let mut buffer = vec![0u8; ICMP_HEADER_LEN + payload];
        let mut request = echo_request::MutableEchoRequestPacket::new(&mut buffer).ok_or_else(|| {
            ProbeError::Other(anyhow::anyhow!("echo buffer too small"))
        })?;
        request.set_icmp_type(IcmpTypes::EchoRequest);
        request.set_icmp_code(echo_request::IcmpCodes::NoCode);
        request.set_identifier(identifier);
        request.set_sequence_number(sequence as u16);
        let checksum = pnet::util::checksum(request.packet(), 1);
        request.set_checksum(checksum);

        let started = Instant::now();
        if let Err(e) = tx.send_to(request, target) {
            warn!("Failed to send echo request {} to {}: {}", sequence, target, e);
            continue;
        }
        sent += 1;

        let mut replies = icmp_packet_iter(&mut rx);
        while let Some(remaining) = spec.echo_timeout.checked_sub(started.elapsed()) {
            match replies.next_with_timeout(remaining) {
                Ok(Some((packet, from))) if from == target => {
                    if packet.get_icmp_type() != IcmpTypes::EchoReply {
                        continue;
                    }
                    let Some(reply) = echo_reply::EchoReplyPacket::new(packet.packet()) else {
                        continue;
                    };
                    if reply.get_identifier() == identifier
                        && reply.get_sequence_number() == sequence as u16
                    {
                        rtts_ms.push(started.elapsed().as_secs_f64() * 1000.0);
                        break;
                    }
                }
                Ok(Some(_)) => continue,
                Ok(None) => break,
                Err(e) => {
                    debug!("Error receiving echo reply: {}", e);
                    break;
                }
            }
        }
    }

    Ok(BurstStats {
        sent,
        received: rtts_ms.len() as u32,
        rtts_ms,
    })
}

/// Round-trip times from `time=12.3 ms` (or Windows `time<1ms`) reply lines
pub fn parse_reply_times(output: &str) -> Vec<f64> {
    output
        .lines()
        .filter_map(|line| {
            let start = line.find("time=").or_else(|| line.find("time<"))? + "time=".len();
            let value: String = line[start..]
                .chars()
                .take_while(|c| c.is_ascii_digit() || *c == '.')
                .collect();
            value.parse::<f64>().ok()
        })
        .collect()
}

/// Count from `3 packets transmitted` or Windows `Sent = 3`
pub fn parse_transmitted(output: &str) -> Option<u32> {
    output.lines().find_map(|line| {
        if let Some(end) = line.find(" packets transmitted") {
            return line[..end].split_whitespace().last()?.parse().ok();
        }
        let start = line.find("Sent = ")? + "Sent = ".len();
        line[start..]
            .split(|c: char| !c.is_ascii_digit())
            .next()?
            .parse()
            .ok()
    })
}
