//! Benchmarks for the report path: summarizing resource streams and
//! rendering the comparison tables.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use indexmap::IndexMap;
use servbench::artifacts::parse_resource_stream;
use servbench::pure::stats::summarize_resources;
use servbench::{
    render, AggregatedReport, CandidateId, CandidateResults, LatencyProfile, LoadTestResult,
    LoadTestSettings, MachineProfile, ResourceSample, StatisticalSummary,
};

/// A resource stream as the sampler writes it: one JSON object per line
fn resource_stream(samples: usize) -> String {
    (0..samples)
        .map(|i| {
            let sample = ResourceSample {
                timestamp: 1_700_000_000_000 + i as i64 * 100,
                cpu: (i % 400) as f64 * 0.25,
                memory: 64.0 + (i % 97) as f64,
                elapsed: i as u64 * 100,
            };
            serde_json::to_string(&sample).unwrap_or_default()
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn summary(mean: f64) -> StatisticalSummary {
    StatisticalSummary {
        mean,
        median: mean,
        stddev: mean * 0.05,
        min: mean * 0.9,
        max: mean * 1.1,
        relative: 1.0,
    }
}

fn report(candidates: usize) -> AggregatedReport {
    let mut results = IndexMap::new();
    for i in 0..candidates {
        let samples: Vec<ResourceSample> = parse_resource_stream(&resource_stream(200));
        results.insert(
            CandidateId::new(format!("candidate-{i}")),
            CandidateResults {
                build: Some(summary(1.0 + i as f64 * 0.3)),
                cold_start: Some(summary(0.2 + i as f64 * 0.05)),
                load_test: Some(LoadTestResult {
                    requests_per_sec_mean: 20_000.0 - i as f64 * 900.0,
                    throughput_mean: 2_000_000.0,
                    latency: LatencyProfile {
                        mean: 4.0 + i as f64,
                        stddev: 1.0,
                        p50: 4.0 + i as f64,
                        p75: 5.0 + i as f64,
                        p90: 6.0 + i as f64,
                        p95: 7.0 + i as f64,
                        p99: 9.0 + i as f64,
                        p999: 14.0 + i as f64,
                    },
                    error_count: 0,
                }),
                resources: summarize_resources(&samples),
            },
        );
    }

    AggregatedReport {
        generated_at: "2024-03-05T14:07:00+00:00".into(),
        machine: MachineProfile {
            os: "Ubuntu 24.04".into(),
            cpu_model: "Bench CPU".into(),
            core_count: 16,
            total_memory_gb: 32,
        },
        load_test_settings: LoadTestSettings::default(),
        runtime_label: Some("Node.js 22".into()),
        raw_data: Some("results/latest.json".into()),
        results,
    }
}

fn bench_resource_summary(c: &mut Criterion) {
    let mut group = c.benchmark_group("resource_summary");
    // 10s load test at 100ms cadence is ~100 samples; long runs go far beyond
    for size in [100usize, 1_000, 10_000] {
        let raw = resource_stream(size);
        group.bench_with_input(BenchmarkId::new("parse_and_summarize", size), &raw, |b, raw| {
            b.iter(|| {
                let samples = parse_resource_stream(black_box(raw));
                summarize_resources(&samples)
            })
        });
    }
    group.finish();
}

fn bench_render(c: &mut Criterion) {
    let mut group = c.benchmark_group("render");
    for candidates in [3usize, 10, 30] {
        let report = report(candidates);
        group.bench_with_input(BenchmarkId::from_parameter(candidates), &report, |b, report| {
            b.iter(|| render(black_box(report)))
        });
    }
    group.finish();
}

criterion_group!(benches, bench_resource_summary, bench_render);
criterion_main!(benches);
