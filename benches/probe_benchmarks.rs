use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use chrono::{Duration as ChronoDuration, Utc};
use netscout::collectors::telemetry::neighbors::parse_ip_neigh;
use netscout::collectors::{RateCalculator, RateSample};
use netscout::probes::reverse_dns::{build_ptr_query, parse_ptr_response};
use netscout::quality::{StatSummary, jitter_series};
use netscout::runner::{BoundedRunner, RunnerConfig};
use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;

/// Benchmark the statistics used by the quality aggregator
fn benchmark_quality_statistics(c: &mut Criterion) {
    let mut group = c.benchmark_group("quality_statistics");

    for size in [30usize, 300, 3600] {
        let latencies: Vec<f64> = (0..size).map(|i| 10.0 + (i % 17) as f64 * 0.7).collect();

        group.bench_with_input(BenchmarkId::new("stat_summary", size), &latencies, |b, samples| {
            b.iter(|| black_box(StatSummary::from_samples(black_box(samples))));
        });

        group.bench_with_input(BenchmarkId::new("jitter_series", size), &latencies, |b, samples| {
            b.iter(|| black_box(jitter_series(black_box(samples))));
        });
    }

    group.finish();
}

/// Benchmark counter-to-rate conversion across a long sample series
fn benchmark_rate_calculator(c: &mut Criterion) {
    let mut group = c.benchmark_group("rate_calculator");
    let start = Utc::now();
    let samples: Vec<RateSample> = (0..1000i64)
        .map(|i| {
            let bytes = (i as u64) * 125_000;
            RateSample::new(start + ChronoDuration::seconds(i), bytes, bytes / 4)
        })
        .collect();

    group.bench_function("update_1000_samples", |b| {
        b.iter(|| {
            let mut calculator = RateCalculator::new();
            for sample in &samples {
                black_box(calculator.update(*sample));
            }
        });
    });

    group.finish();
}

/// Benchmark neighbor table parsing on a busy LAN
fn benchmark_neighbor_parsing(c: &mut Criterion) {
    let mut group = c.benchmark_group("neighbor_parsing");
    let output: String = (1..=250)
        .map(|host| {
            format!(
                "192.168.1.{} dev eth0 lladdr 02:00:00:00:00:{:02x} REACHABLE\n",
                host, host
            )
        })
        .collect();

    group.bench_function("ip_neigh_250_entries", |b| {
        b.iter(|| black_box(parse_ip_neigh(black_box(&output))));
    });

    group.finish();
}

/// Benchmark PTR query construction and answer parsing
fn benchmark_ptr_codec(c: &mut Criterion) {
    let mut group = c.benchmark_group("ptr_codec");
    let address = IpAddr::V4(Ipv4Addr::new(192, 168, 1, 10));

    group.bench_function("build_query", |b| {
        b.iter(|| black_box(build_ptr_query(black_box(address), 0x1234)));
    });

    // A query with the QR bit set and no answers parses as an empty success
    if let Ok(mut response) = build_ptr_query(address, 0x1234) {
        response[2] |= 0x80;
        group.bench_function("parse_empty_response", |b| {
            b.iter(|| black_box(parse_ptr_response(black_box(&response), 0x1234)));
        });
    }

    group.finish();
}

/// Benchmark runner overhead with checks that complete immediately
fn benchmark_runner_overhead(c: &mut Criterion) {
    let mut group = c.benchmark_group("bounded_runner");
    group.measurement_time(Duration::from_secs(10));

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("Skipping runner benchmarks: {}", e);
            return;
        }
    };

    for concurrency in [1usize, 16, 128] {
        group.bench_with_input(
            BenchmarkId::new("1000_items", concurrency),
            &concurrency,
            |b, &concurrency| {
                let runner = BoundedRunner::new(RunnerConfig::new(concurrency, Duration::from_secs(1)))
                    .expect("valid runner config");
                b.iter(|| {
                    runtime.block_on(async {
                        let report = runner
                            .run((0..1000u32).collect(), |n| async move { n.wrapping_mul(31) })
                            .await;
                        black_box(report.outcomes.len())
                    })
                });
            },
        );
    }

    group.finish();
}

criterion_group!(
    benches,
    benchmark_quality_statistics,
    benchmark_rate_calculator,
    benchmark_neighbor_parsing,
    benchmark_ptr_codec,
    benchmark_runner_overhead
);
criterion_main!(benches);
