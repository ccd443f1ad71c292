//! PTR lookups over UDP against a chosen resolver
//!
//! Queries are built with pnet's DNS header type; the answer section is
//! walked by hand so compressed names in PTR data resolve correctly.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::time::{Duration, Instant};

use anyhow::Context;
use async_trait::async_trait;
use chrono::Utc;
use log::{debug, info};
use pnet::packet::dns::{DnsPacket, MutableDnsPacket, Opcode, Retcode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::net::UdpSocket;

use crate::collectors::telemetry::system;
use crate::config::{ReverseDnsSettings, secs};
use crate::errors::ProbeError;
use crate::probes::descriptor::{ParameterSpec, ProbeDescriptor};
use crate::probes::params::Parameters;
use crate::probes::registry::ProbeHandler;
use crate::probes::to_result;
use crate::runner::{BoundedRunner, ItemOutcome, RunnerConfig};

pub const PROBE_ID: &str = "reverse_dns_lookup";

pub const DNS_HDR_LEN: usize = 12;
const DNS_PORT: u16 = 53;
const TYPE_PTR: u16 = 12;
const CLASS_IN: u16 = 1;
const RCODE_NAME_ERROR: u8 = 3;
const MAX_DATAGRAM: usize = 4096;
const MAX_POINTER_HOPS: usize = 16;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LookupStatus {
    Success,
    NotFound,
    Timeout,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LookupResult {
    pub ip_address: String,
    pub hostnames: Vec<String>,
    pub status: LookupStatus,
    /// Seconds
    pub response_time: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl LookupResult {
    fn failed(ip_address: &str, status: LookupStatus, error: Option<String>, elapsed: Duration) -> Self {
        Self {
            ip_address: ip_address.to_string(),
            hostnames: Vec::new(),
            status,
            response_time: elapsed.as_secs_f64(),
            error,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReverseDnsReport {
    pub ip_count: usize,
    pub timeout: f64,
    pub dns_server: String,
    pub results: Vec<LookupResult>,
    pub success_count: usize,
    pub not_found_count: usize,
    pub timeout_count: usize,
    pub error_count: usize,
    /// Addresses the sweep deadline kept from being queried
    pub not_queried: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub average_response_time: Option<f64>,
    pub timestamp: String,
}

/// Splits a newline and/or comma separated address list
pub fn parse_address_list(text: &str) -> Vec<String> {
    text.split(['\n', ','])
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(str::to_string)
        .collect()
}

/// `4.3.2.1.in-addr.arpa` or the nibble form under `ip6.arpa`
pub fn reverse_name(address: IpAddr) -> String {
    match address {
        IpAddr::V4(v4) => {
            let [a, b, c, d] = v4.octets();
            format!("{}.{}.{}.{}.in-addr.arpa", d, c, b, a)
        }
        IpAddr::V6(v6) => {
            let mut labels = Vec::with_capacity(33);
            for byte in v6.octets().iter().rev() {
                labels.push(format!("{:x}", byte & 0x0F));
                labels.push(format!("{:x}", byte >> 4));
            }
            labels.push("ip6.arpa".to_string());
            labels.join(".")
        }
    }
}

fn encode_name(name: &str) -> Vec<u8> {
    let mut encoded = Vec::with_capacity(name.len() + 2);
    for label in name.split('.').filter(|label| !label.is_empty()) {
        encoded.push(label.len() as u8);
        encoded.extend_from_slice(label.as_bytes());
    }
    encoded.push(0);
    encoded
}

/// Wire-format PTR query for `address`
pub fn build_ptr_query(address: IpAddr, id: u16) -> anyhow::Result<Vec<u8>> {
    let qname = encode_name(&reverse_name(address));
    let mut buffer = vec![0u8; DNS_HDR_LEN + qname.len() + 4];
    {
        let mut header = MutableDnsPacket::new(&mut buffer).context("creating dns header")?;
        header.set_id(id);
        header.set_is_response(0);
        header.set_opcode(Opcode::StandardQuery);
        header.set_is_recursion_desirable(1);
        header.set_rcode(Retcode::NoError);
        header.set_query_count(1);
        header.set_response_count(0);
        header.set_authority_rr_count(0);
        header.set_additional_rr_count(0);
    }

    let mut cursor = DNS_HDR_LEN;
    buffer[cursor..cursor + qname.len()].copy_from_slice(&qname);
    cursor += qname.len();
    buffer[cursor..cursor + 2].copy_from_slice(&TYPE_PTR.to_be_bytes());
    buffer[cursor + 2..cursor + 4].copy_from_slice(&CLASS_IN.to_be_bytes());
    Ok(buffer)
}

/// Reads a possibly compressed name at `offset`; returns it with the
/// offset just past the name in the original position
fn read_name(message: &[u8], offset: usize) -> Option<(String, usize)> {
    let mut labels: Vec<String> = Vec::new();
    let mut cursor = offset;
    let mut resume_at = None;
    let mut hops = 0;

    loop {
        let len = *message.get(cursor)? as usize;
        if len == 0 {
            cursor += 1;
            break;
        }
        if len & 0xC0 == 0xC0 {
            let low = *message.get(cursor + 1)? as usize;
            if resume_at.is_none() {
                resume_at = Some(cursor + 2);
            }
            hops += 1;
            if hops > MAX_POINTER_HOPS {
                return None;
            }
            cursor = ((len & 0x3F) << 8) | low;
            continue;
        }
        let label = message.get(cursor + 1..cursor + 1 + len)?;
        labels.push(String::from_utf8_lossy(label).into_owned());
        cursor += 1 + len;
    }

    Some((labels.join("."), resume_at.unwrap_or(cursor)))
}

/// Outcome of parsing one response
#[derive(Debug, Clone, PartialEq)]
pub enum PtrAnswer {
    Names(Vec<String>),
    NotFound,
    Failed(String),
}

/// Extracts PTR names from a response to query `id`
pub fn parse_ptr_response(message: &[u8], id: u16) -> PtrAnswer {
    let Some(packet) = DnsPacket::new(message) else {
        return PtrAnswer::Failed("response shorter than a DNS header".to_string());
    };
    if packet.get_id() != id {
        return PtrAnswer::Failed("response id does not match the query".to_string());
    }

    let rcode = message[3] & 0x0F;
    if rcode == RCODE_NAME_ERROR {
        return PtrAnswer::NotFound;
    }
    if rcode != 0 {
        return PtrAnswer::Failed(format!("DNS query failed with code: {}", rcode));
    }

    let mut cursor = DNS_HDR_LEN;
    for _ in 0..packet.get_query_count() {
        let Some((_, next)) = read_name(message, cursor) else {
            return PtrAnswer::Failed("truncated question section".to_string());
        };
        cursor = next + 4;
    }

    let mut names = Vec::new();
    for _ in 0..packet.get_response_count() {
        let Some((_, next)) = read_name(message, cursor) else {
            break;
        };
        let Some(fixed) = message.get(next..next + 10) else {
            break;
        };
        let rtype = u16::from_be_bytes([fixed[0], fixed[1]]);
        let rdlength = u16::from_be_bytes([fixed[8], fixed[9]]) as usize;
        let rdata_start = next + 10;
        if rtype == TYPE_PTR {
            if let Some((name, _)) = read_name(message, rdata_start) {
                names.push(name.trim_end_matches('.').to_string());
            }
        }
        cursor = rdata_start + rdlength;
    }

    if names.is_empty() {
        PtrAnswer::NotFound
    } else {
        PtrAnswer::Names(names)
    }
}

/// One PTR exchange with `server`
///
/// The caller bounds the exchange; this function waits until a matching
/// response arrives.
pub async fn ptr_lookup(address: IpAddr, server: SocketAddr) -> Result<PtrAnswer, ProbeError> {
    let id = rand_id(address);
    let query = build_ptr_query(address, id)?;

    let bind = if server.is_ipv4() {
        SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 0)
    } else {
        SocketAddr::new(IpAddr::V6(Ipv6Addr::UNSPECIFIED), 0)
    };
    let socket = UdpSocket::bind(bind).await?;
    socket.connect(server).await?;
    socket.send(&query).await?;

    let mut buffer = vec![0u8; MAX_DATAGRAM];
    loop {
        let len = socket.recv(&mut buffer).await?;
        // stray datagram from an earlier exchange
        if len >= 2 && u16::from_be_bytes([buffer[0], buffer[1]]) != id {
            continue;
        }
        return Ok(parse_ptr_response(&buffer[..len], id));
    }
}

/// First PTR name for `address`, `None` on any failure
pub async fn resolve_hostname(address: IpAddr, server: SocketAddr, limit: Duration) -> Option<String> {
    match tokio::time::timeout(limit, ptr_lookup(address, server)).await {
        Ok(Ok(PtrAnswer::Names(names))) => names.into_iter().next(),
        _ => None,
    }
}

fn rand_id(address: IpAddr) -> u16 {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|elapsed| elapsed.subsec_nanos())
        .unwrap_or_default();
    let salt = match address {
        IpAddr::V4(v4) => u32::from(v4),
        IpAddr::V6(v6) => v6.segments().iter().map(|s| u32::from(*s)).sum(),
    };
    ((nanos ^ salt.rotate_left(7)) & 0xFFFF) as u16
}

/// `host` or `host:port`, defaulting to port 53
pub fn parse_server(text: &str) -> Result<SocketAddr, ProbeError> {
    let text = text.trim();
    if let Ok(socket) = text.parse::<SocketAddr>() {
        return Ok(socket);
    }
    text.parse::<IpAddr>()
        .map(|address| SocketAddr::new(address, DNS_PORT))
        .map_err(|_| ProbeError::invalid_parameter("dns_server", format!("'{}' is not an address", text)))
}

/// First configured nameserver that parses as an address
pub async fn system_resolver() -> Option<SocketAddr> {
    system::read_dns_servers()
        .await
        .iter()
        .find_map(|server| server.parse::<IpAddr>().ok())
        .map(|address| SocketAddr::new(address, DNS_PORT))
}

pub struct ReverseDnsProbe {
    settings: ReverseDnsSettings,
}

impl ReverseDnsProbe {
    pub fn new(settings: ReverseDnsSettings) -> Self {
        Self { settings }
    }

    async fn lookup_all(
        &self,
        addresses: Vec<String>,
        server: SocketAddr,
        limit: Duration,
        concurrency: usize,
    ) -> Result<(Vec<LookupResult>, usize), ProbeError> {
        let mut config = RunnerConfig::new(concurrency, limit);
        let deadline = secs(self.settings.deadline_secs);
        if !deadline.is_zero() {
            config = config.with_deadline(deadline);
        }
        let runner = BoundedRunner::new(config)?;

        let report = runner
            .run(addresses, move |text: String| async move {
                let started = Instant::now();
                let Ok(address) = text.parse::<IpAddr>() else {
                    return LookupResult::failed(
                        &text,
                        LookupStatus::Error,
                        Some("Invalid IP address format".to_string()),
                        started.elapsed(),
                    );
                };
                let answer = ptr_lookup(address, server).await;
                let elapsed = started.elapsed();
                match answer {
                    Ok(PtrAnswer::Names(hostnames)) => LookupResult {
                        ip_address: text,
                        hostnames,
                        status: LookupStatus::Success,
                        response_time: elapsed.as_secs_f64(),
                        error: None,
                    },
                    Ok(PtrAnswer::NotFound) => LookupResult::failed(&text, LookupStatus::NotFound, None, elapsed),
                    Ok(PtrAnswer::Failed(reason)) => {
                        LookupResult::failed(&text, LookupStatus::Error, Some(reason), elapsed)
                    }
                    Err(e) => LookupResult::failed(&text, LookupStatus::Error, Some(e.to_string()), elapsed),
                }
            })
            .await;

        let not_queried = report.not_admitted.len();
        let results = report
            .outcomes
            .into_iter()
            .map(|outcome| match outcome.outcome {
                ItemOutcome::Completed(result) => result,
                ItemOutcome::TimedOut => {
                    LookupResult::failed(&outcome.item, LookupStatus::Timeout, None, outcome.elapsed)
                }
            })
            .collect();
        Ok((results, not_queried))
    }
}

#[async_trait]
impl ProbeHandler for ReverseDnsProbe {
    fn descriptor(&self) -> ProbeDescriptor {
        ProbeDescriptor::new(
            PROBE_ID,
            "Reverse DNS Lookup",
            "Resolve IP addresses to hostnames using PTR records",
        )
        .icon("globe")
        .parameter(
            ParameterSpec::string(
                "ip_addresses",
                "IP Addresses",
                "Addresses to resolve, separated by newlines or commas",
            )
            .required(),
        )
        .parameter(
            ParameterSpec::number("timeout", "Timeout", "Timeout in seconds for each lookup")
                .default_value(self.settings.timeout_secs)
                .bounds(0.1, 30.0, 0.1),
        )
        .parameter(ParameterSpec::string(
            "dns_server",
            "DNS Server",
            "Resolver to query (defaults to the first system nameserver)",
        ))
        .parameter(
            ParameterSpec::range("concurrent_lookups", "Concurrent Lookups", "Lookups in flight at once", 1.0, 50.0, 1.0)
                .default_value(self.settings.concurrency as u64),
        )
    }

    async fn execute(&self, params: &Parameters) -> Result<Value, ProbeError> {
        let addresses = parse_address_list(&params.string_or("ip_addresses", ""));
        if addresses.is_empty() {
            return Err(ProbeError::invalid_parameter("ip_addresses", "no addresses given"));
        }
        let timeout = params.bounded_number("timeout", self.settings.timeout_secs, 0.1, 30.0)?;
        let concurrency =
            params.bounded_number("concurrent_lookups", self.settings.concurrency as f64, 1.0, 50.0)?;

        let server = match params.string("dns_server").filter(|text| !text.trim().is_empty()) {
            Some(text) => parse_server(&text)?,
            None => system_resolver().await.ok_or_else(|| {
                ProbeError::invalid_parameter("dns_server", "not given and no system nameserver is configured")
            })?,
        };

        info!("Resolving {} addresses via {}", addresses.len(), server);
        let ip_count = addresses.len();
        let (results, not_queried) = self
            .lookup_all(addresses, server, secs(timeout), concurrency as usize)
            .await?;

        let count = |status: LookupStatus| results.iter().filter(|r| r.status == status).count();
        let average_response_time = (!results.is_empty())
            .then(|| results.iter().map(|r| r.response_time).sum::<f64>() / results.len() as f64);

        let report = ReverseDnsReport {
            ip_count,
            timeout,
            dns_server: server.to_string(),
            success_count: count(LookupStatus::Success),
            not_found_count: count(LookupStatus::NotFound),
            timeout_count: count(LookupStatus::Timeout),
            error_count: count(LookupStatus::Error),
            not_queried,
            average_response_time,
            results,
            timestamp: Utc::now().to_rfc3339(),
        };
        debug!(
            "Reverse DNS: {} success, {} not found, {} timeout, {} error",
            report.success_count, report.not_found_count, report.timeout_count, report.error_count
        );
        to_result(&report)
    }
}
