//! TCP connect sweep over a port range

use std::io::ErrorKind;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::net::TcpStream;

use crate::config::{PortScanSettings, secs};
use crate::errors::ProbeError;
use crate::probes::descriptor::{ParameterSpec, ProbeDescriptor};
use crate::probes::params::Parameters;
use crate::probes::registry::ProbeHandler;
use crate::probes::to_result;
use crate::runner::{BoundedRunner, ItemOutcome, RunnerConfig};

pub const PROBE_ID: &str = "port_scanner";

const MAX_CONCURRENCY: f64 = 1000.0;

/// Result of one connect attempt
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PortState {
    Open,
    /// Refused, the host answered with a reset
    Closed,
    /// No answer within the timeout
    Filtered,
}

/// Well-known service for `port`, `"Unknown"` otherwise
pub fn service_name(port: u16) -> &'static str {
    match port {
        21 => "FTP",
        22 => "SSH",
        23 => "Telnet",
        25 | 587 => "SMTP",
        53 => "DNS",
        80 => "HTTP",
        110 => "POP3",
        143 => "IMAP",
        443 => "HTTPS",
        993 => "IMAPS",
        995 => "POP3S",
        3306 => "MySQL",
        3389 => "RDP",
        5432 => "PostgreSQL",
        5900 => "VNC",
        6379 => "Redis",
        8080 => "HTTP-Alt",
        8443 => "HTTPS-Alt",
        _ => "Unknown",
    }
}

/// Parses `a-b` or a single port into an inclusive range
pub fn parse_port_range(text: &str) -> Result<(u16, u16), ProbeError> {
    let text = text.trim();
    let parse = |part: &str| -> Result<u16, ProbeError> {
        let port: u32 = part
            .trim()
            .parse()
            .map_err(|_| ProbeError::invalid_parameter("portRange", format!("'{}' is not a port", part.trim())))?;
        if !(1..=65535).contains(&port) {
            return Err(ProbeError::invalid_parameter(
                "portRange",
                "ports must be between 1 and 65535",
            ));
        }
        Ok(port as u16)
    };

    let (start, end) = match text.split_once('-') {
        Some((start, end)) => (parse(start)?, parse(end)?),
        None => {
            let port = parse(text)?;
            (port, port)
        }
    };
    if start > end {
        return Err(ProbeError::invalid_parameter(
            "portRange",
            "start port must be less than or equal to end port",
        ));
    }
    Ok((start, end))
}

/// One TCP handshake attempt, bounded by `limit`
pub async fn probe_port(address: SocketAddr, limit: Duration) -> PortState {
    match tokio::time::timeout(limit, TcpStream::connect(address)).await {
        Ok(Ok(_stream)) => PortState::Open,
        Ok(Err(e)) if e.kind() == ErrorKind::ConnectionRefused => PortState::Closed,
        Ok(Err(e)) => {
            debug!("Connect to {} failed: {}", address, e);
            PortState::Filtered
        }
        Err(_elapsed) => PortState::Filtered,
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OpenPort {
    pub port: u16,
    pub service: String,
    pub status: PortState,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PortScanReport {
    pub host: String,
    pub port_range: String,
    pub open_ports: Vec<OpenPort>,
    pub closed_ports: usize,
    pub filtered_ports: usize,
    /// Ports the sweep deadline kept from being tried
    pub not_scanned: usize,
    pub partial: bool,
    pub scan_time: f64,
    pub timestamp: String,
}

/// Sweep parameters after validation
#[derive(Debug, Clone, PartialEq)]
pub struct PortSweep {
    pub address: IpAddr,
    pub ports: (u16, u16),
    pub timeout: Duration,
    pub concurrency: usize,
    pub deadline: Option<Duration>,
}

/// Runs a sweep and tallies the outcomes
pub async fn sweep(host: &str, range_text: &str, request: &PortSweep) -> Result<PortScanReport, ProbeError> {
    let runner = BoundedRunner::new(match request.deadline {
        Some(deadline) => RunnerConfig::new(request.concurrency, request.timeout).with_deadline(deadline),
        None => RunnerConfig::new(request.concurrency, request.timeout),
    })?;

    let address = request.address;
    let limit = request.timeout;
    let ports: Vec<u16> = (request.ports.0..=request.ports.1).collect();

    info!(
        "Scanning {} ports on {} (concurrency={}, timeout={}ms)",
        ports.len(),
        host,
        request.concurrency,
        limit.as_millis()
    );

    let report = runner
        .run(ports, move |port| probe_port(SocketAddr::new(address, port), limit))
        .await;

    let mut open_ports = Vec::new();
    let mut closed_ports = 0;
    let mut filtered_ports = 0;
    for outcome in &report.outcomes {
        match outcome.outcome {
            ItemOutcome::Completed(PortState::Open) => open_ports.push(OpenPort {
                port: outcome.item,
                service: service_name(outcome.item).to_string(),
                status: PortState::Open,
            }),
            ItemOutcome::Completed(PortState::Closed) => closed_ports += 1,
            ItemOutcome::Completed(PortState::Filtered) | ItemOutcome::TimedOut => filtered_ports += 1,
        }
    }
    open_ports.sort_by_key(|open| open.port);

    info!(
        "Port scan of {} finished: {} open, {} closed, {} filtered, {} not scanned",
        host,
        open_ports.len(),
        closed_ports,
        filtered_ports,
        report.not_admitted.len()
    );

    Ok(PortScanReport {
        host: host.to_string(),
        port_range: range_text.to_string(),
        open_ports,
        closed_ports,
        filtered_ports,
        not_scanned: report.not_admitted.len(),
        partial: !report.is_complete(),
        scan_time: report.elapsed.as_secs_f64(),
        timestamp: Utc::now().to_rfc3339(),
    })
}

/// Resolves a host name or literal address to the first address
pub(crate) async fn resolve_host(host: &str) -> Result<IpAddr, ProbeError> {
    let host = host.trim();
    if let Ok(address) = host.parse::<IpAddr>() {
        return Ok(address);
    }
    tokio::net::lookup_host((host, 0))
        .await
        .map_err(|e| ProbeError::invalid_target(host, e.to_string()))?
        .next()
        .map(|socket| socket.ip())
        .ok_or_else(|| ProbeError::invalid_target(host, "name resolved to no addresses"))
}

pub struct PortScannerProbe {
    settings: PortScanSettings,
}

impl PortScannerProbe {
    pub fn new(settings: PortScanSettings) -> Self {
        Self { settings }
    }
}

#[async_trait]
impl ProbeHandler for PortScannerProbe {
    fn descriptor(&self) -> ProbeDescriptor {
        ProbeDescriptor::new(
            PROBE_ID,
            "Port Scanner",
            "Scan for open TCP ports on a target host",
        )
        .icon("search")
        .parameter(ParameterSpec::string("host", "Host", "Target hostname or IP address").required())
        .parameter(
            ParameterSpec::string("portRange", "Port Range", "Range of ports to scan (e.g. 1-1024) or a single port")
                .required()
                .default_value("1-1024"),
        )
        .parameter(
            ParameterSpec::number("timeout", "Timeout", "Timeout in seconds for each port")
                .default_value(self.settings.timeout_secs)
                .bounds(0.1, 10.0, 0.1),
        )
        .parameter(
            ParameterSpec::number("concurrency", "Concurrency", "Ports probed at the same time")
                .default_value(self.settings.concurrency as u64)
                .bounds(1.0, MAX_CONCURRENCY, 1.0),
        )
    }

    async fn execute(&self, params: &Parameters) -> Result<Value, ProbeError> {
        let host = params.string_or("host", "");
        if host.is_empty() {
            return Err(ProbeError::invalid_target(&host, "empty host"));
        }
        let range_text = params.string_or("portRange", "1-1024");
        let ports = parse_port_range(&range_text)?;
        let timeout = params.bounded_number("timeout", self.settings.timeout_secs, 0.1, 10.0)?;
        let concurrency =
            params.bounded_number("concurrency", self.settings.concurrency as f64, 1.0, MAX_CONCURRENCY)?;

        let deadline = secs(self.settings.deadline_secs);
        let request = PortSweep {
            address: resolve_host(&host).await?,
            ports,
            timeout: secs(timeout),
            concurrency: concurrency as usize,
            deadline: (!deadline.is_zero()).then_some(deadline),
        };

        let report = sweep(&host, &range_text, &request).await?;
        to_result(&report)
    }
}
