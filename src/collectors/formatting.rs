//! Human-readable rendering of rates, byte counts and latencies
//!
//! Used by the command-line front end when printing snapshots and probe
//! summaries. The JSON output never goes through these helpers.

/// Formats a rate given in megabits per second
///
/// ```
/// use netscout::collectors::formatting::format_mbps;
///
/// assert_eq!(format_mbps(0.0), "0.00 Kbps");
/// assert_eq!(format_mbps(0.5), "512.00 Kbps");
/// assert_eq!(format_mbps(12.345), "12.35 Mbps");
/// assert_eq!(format_mbps(2048.0), "2.00 Gbps");
/// ```
pub fn format_mbps(mbps: f64) -> String {
    if mbps < 1.0 {
        format!("{:.2} Kbps", mbps * 1024.0)
    } else if mbps < 1024.0 {
        format!("{:.2} Mbps", mbps)
    } else {
        format!("{:.2} Gbps", mbps / 1024.0)
    }
}

/// Formats a byte count with binary unit prefixes
///
/// ```
/// use netscout::collectors::formatting::format_bytes;
///
/// assert_eq!(format_bytes(512), "512 B");
/// assert_eq!(format_bytes(1536), "1.50 KB");
/// assert_eq!(format_bytes(1_099_511_627_776), "1.00 TB");
/// ```
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["KB", "MB", "GB", "TB"];

    if bytes < 1024 {
        return format!("{} B", bytes);
    }
    let mut value = bytes as f64 / 1024.0;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{:.2} {}", value, UNITS[unit])
}

/// Formats an optional latency in milliseconds, `-` when there is none
pub fn format_latency(latency_ms: Option<f64>) -> String {
    match latency_ms {
        Some(ms) if ms < 1.0 => format!("{:.3} ms", ms),
        Some(ms) => format!("{:.1} ms", ms),
        None => "-".to_string(),
    }
}

/// Formats an uptime in seconds as `1d 2h 3m`
pub fn format_uptime(seconds: u64) -> String {
    let days = seconds / 86_400;
    let hours = (seconds % 86_400) / 3_600;
    let minutes = (seconds % 3_600) / 60;

    if days > 0 {
        format!("{}d {}h {}m", days, hours, minutes)
    } else if hours > 0 {
        format!("{}h {}m", hours, minutes)
    } else {
        format!("{}m {}s", minutes, seconds % 60)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_mbps_unit_boundaries() {
        assert_eq!(format_mbps(0.999), "1022.98 Kbps");
        assert_eq!(format_mbps(1.0), "1.00 Mbps");
        assert_eq!(format_mbps(1023.99), "1023.99 Mbps");
        assert_eq!(format_mbps(1024.0), "1.00 Gbps");
    }

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(0), "0 B");
        assert_eq!(format_bytes(1023), "1023 B");
        assert_eq!(format_bytes(1024), "1.00 KB");
        assert_eq!(format_bytes(1_048_576), "1.00 MB");
        assert_eq!(format_bytes(1_610_612_736), "1.50 GB");
        assert_eq!(format_bytes(u64::MAX), "16777216.00 TB");
    }

    #[test]
    fn test_format_latency() {
        assert_eq!(format_latency(None), "-");
        assert_eq!(format_latency(Some(0.25)), "0.250 ms");
        assert_eq!(format_latency(Some(23.46)), "23.5 ms");
    }

    #[test]
    fn test_format_uptime() {
        assert_eq!(format_uptime(59), "0m 59s");
        assert_eq!(format_uptime(3_720), "1h 2m");
        assert_eq!(format_uptime(93_784), "1d 2h 3m");
    }
}
