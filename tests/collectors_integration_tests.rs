use std::io::Write;

use chrono::{Duration as ChronoDuration, TimeZone, Utc};
use netscout::collectors::telemetry::NeighborState;
use netscout::collectors::telemetry::neighbors::{parse_arp, parse_ip_neigh};
use netscout::collectors::telemetry::snapshot::ConnectionStatus;
use netscout::collectors::telemetry::system::{parse_resolv_conf, prefix_to_mask};
use netscout::collectors::{RateCalculator, RateSample, RateStatus};
use netscout::config::Settings;
use netscout::probes::DuplicatePolicy;
use tempfile::Builder;

/// Sampler building blocks exercised without touching live interfaces

#[test]
fn test_rate_calculator_over_a_counter_series() {
    let start = Utc.with_ymd_and_hms(2026, 1, 1, 12, 0, 0).unwrap();
    let at = |secs: i64| start + ChronoDuration::seconds(secs);
    let mut calculator = RateCalculator::new();

    let first = calculator.update(RateSample::new(at(0), 1_000_000, 500_000));
    assert_eq!(first.status, RateStatus::Baseline);
    assert_eq!(first.mbps, 0.0);

    // 2 MiB received + 0.5 MiB sent over 2 seconds
    let second = calculator.update(RateSample::new(at(2), 1_000_000 + 2_097_152, 500_000 + 524_288));
    assert_eq!(second.status, RateStatus::Measured);
    assert!((second.mbps - 10.0).abs() < 1e-9);

    // Interface restart: counters drop, the sample becomes the new baseline
    let reset = calculator.update(RateSample::new(at(4), 1_000, 1_000));
    assert_eq!(reset.status, RateStatus::CounterReset);
    assert_eq!(reset.mbps, 0.0);

    let resumed = calculator.update(RateSample::new(at(5), 1_000 + 131_072, 1_000));
    assert_eq!(resumed.status, RateStatus::Measured);
    assert!((resumed.mbps - 1.0).abs() < 1e-9);

    // Same timestamp: previous rate is repeated and the baseline is kept
    let stale = calculator.update(RateSample::new(at(5), 9_999_999, 9_999_999));
    assert_eq!(stale.status, RateStatus::StaleClock);
    assert!((stale.mbps - 1.0).abs() < 1e-9);
    assert_eq!(calculator.previous().map(|sample| sample.timestamp), Some(at(5)));
}

#[test]
fn test_independent_calculators_keep_separate_baselines() {
    let start = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
    let mut a = RateCalculator::new();
    let mut b = RateCalculator::new();

    a.update(RateSample::new(start, 0, 0));
    let reading = a.update(RateSample::new(start + ChronoDuration::seconds(1), 131_072, 0));
    assert_eq!(reading.status, RateStatus::Measured);

    let first_b = b.update(RateSample::new(start + ChronoDuration::seconds(1), 131_072, 0));
    assert_eq!(first_b.status, RateStatus::Baseline);
}

#[test]
fn test_neighbor_tables_from_both_tools() {
    let ip_neigh = "\
192.168.1.1 dev eth0 lladdr 00:11:22:33:44:55 REACHABLE
192.168.1.20 dev eth0 lladdr aa:bb:cc:dd:ee:ff STALE
192.168.1.30 dev eth0  FAILED
fe80::1 dev eth0 lladdr 00:11:22:33:44:55 router DELAY
";
    let entries = parse_ip_neigh(ip_neigh);
    assert_eq!(entries.len(), 3);
    assert_eq!(entries[0].ip_address, "192.168.1.1");
    assert_eq!(entries[0].state, Some(NeighborState::Reachable));
    assert_eq!(entries[1].state, Some(NeighborState::Stale));
    assert_eq!(entries[2].ip_address, "fe80::1");
    assert_eq!(entries[2].state, Some(NeighborState::Delay));

    let arp = "\
? (10.0.0.1) at 0:11:22:33:44:55 on en0 ifscope [ethernet]
? (10.0.0.7) at (incomplete) on en0 ifscope [ethernet]
? (10.0.0.9) at a4:5e:60:1:2:3 on en0 ifscope permanent [ethernet]
";
    let entries = parse_arp(arp);
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].device, "en0");
    assert_eq!(entries[1].state, Some(NeighborState::Permanent));
}

#[test]
fn test_network_facts() {
    assert_eq!(prefix_to_mask(24).map(|mask| mask.to_string()).as_deref(), Some("255.255.255.0"));
    assert_eq!(prefix_to_mask(20).map(|mask| mask.to_string()).as_deref(), Some("255.255.240.0"));
    assert_eq!(prefix_to_mask(0).map(|mask| mask.to_string()).as_deref(), Some("0.0.0.0"));
    assert!(prefix_to_mask(33).is_none());

    let resolv = "# generated\nnameserver 1.1.1.1\nsearch lan\nnameserver 9.9.9.9\n";
    assert_eq!(parse_resolv_conf(resolv), vec!["1.1.1.1", "9.9.9.9"]);

    assert_eq!(ConnectionStatus::classify(false, true, Some(0.0)), ConnectionStatus::Disconnected);
    assert_eq!(ConnectionStatus::classify(true, false, None), ConnectionStatus::Limited);
    assert_eq!(ConnectionStatus::classify(true, true, Some(100.0)), ConnectionStatus::Limited);
    assert_eq!(ConnectionStatus::classify(true, true, Some(0.0)), ConnectionStatus::Connected);
}

#[test]
fn test_settings_from_partial_file() {
    let mut file = Builder::new().suffix(".toml").tempfile().unwrap();
    writeln!(
        file,
        r#"
[registry]
duplicate_policy = "reject"

[port_scan]
concurrency = 128

[quality]
target = "1.1.1.1"
"#
    )
    .unwrap();

    let settings = Settings::load(Some(file.path())).unwrap();
    assert_eq!(settings.registry.duplicate_policy, DuplicatePolicy::Reject);
    assert_eq!(settings.port_scan.concurrency, 128);
    assert_eq!(settings.port_scan.timeout_secs, 1.0);
    assert_eq!(settings.quality.target, "1.1.1.1");
    assert_eq!(settings.quality.burst_size, 3);
    assert_eq!(settings.reverse_dns, Default::default());
}

#[test]
fn test_missing_settings_file_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("absent.toml");
    assert!(Settings::load(Some(&missing)).is_err());
}
