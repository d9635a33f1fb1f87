//! Aggregation from raw artifacts through rendering and publishing

use anyhow::Result;
use chrono::TimeZone;
use pretty_assertions::assert_eq;
use servbench::publish::load_report;
use servbench::{
    aggregate, render, Candidate, CandidateId, LoadTestSettings, MachineProfile, Publisher,
    ReportContext, RunLayout, MARKER_END, MARKER_START,
};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

fn candidates(ids: &[&str]) -> Vec<Candidate> {
    ids.iter()
        .map(|id| Candidate {
            id: CandidateId::from(*id),
            start_command: "pnpm start".into(),
            build_command: "pnpm build".into(),
            root: PathBuf::from(format!("apps/{id}")),
            build_output: PathBuf::from("dist"),
        })
        .collect()
}

fn context() -> ReportContext {
    ReportContext {
        machine: MachineProfile {
            os: "Ubuntu 24.04".into(),
            cpu_model: "AMD Ryzen 9 7950X".into(),
            core_count: 32,
            total_memory_gb: 64,
        },
        load_test_settings: LoadTestSettings::default(),
        generated_at: "2024-03-05T14:07:00+00:00".into(),
        runtime_label: Some("Node.js 22".into()),
        raw_data: Some("results/latest.json".into()),
    }
}

fn hyperfine_json(entries: &[(&str, f64)]) -> String {
    let results: Vec<String> = entries
        .iter()
        .map(|(command, mean)| {
            format!(
                r#"{{"command": "{command}", "mean": {mean}, "stddev": 0.05, "median": {mean}, "min": {min}, "max": {max}, "times": [{mean}]}}"#,
                min = mean - 0.1,
                max = mean + 0.1
            )
        })
        .collect();
    format!(r#"{{"results": [{}]}}"#, results.join(","))
}

fn autocannon_json(rps: f64, p97_5: f64) -> String {
    format!(
        r#"{{
            "requests": {{"average": {rps}, "mean": {rps}, "total": 100000}},
            "throughput": {{"average": 2048000, "mean": 2048000}},
            "latency": {{"average": 4.2, "mean": 4.2, "stddev": 1.1, "min": 1, "max": 40,
                        "p50": 4, "p75": 5, "p90": 6, "p97_5": {p97_5}, "p99": 9, "p99_9": 15}},
            "errors": 0,
            "timeouts": 0
        }}"#
    )
}

fn write(path: &Path, contents: &str) -> Result<()> {
    std::fs::write(path, contents)?;
    Ok(())
}

#[test]
fn test_build_ranking_from_hyperfine_export() -> Result<()> {
    let dir = TempDir::new()?;
    let layout = RunLayout::open(dir.path());
    write(
        &layout.build_json(),
        &hyperfine_json(&[("A", 2.0), ("B", 1.5), ("C", 3.0)]),
    )?;

    let report = aggregate(&candidates(&["A", "B", "C"]), &layout, context());
    let md = render(&report);

    let build_table: Vec<&str> = md
        .lines()
        .skip_while(|line| !line.starts_with("#### ⚡ Build Time"))
        .skip(4)
        .take(3)
        .collect();
    assert_eq!(
        build_table,
        vec![
            "| **B** 🏆 | 1.50s | 1.50s | 1.40s | 1.60s | 1.00× |",
            "| **A** | 2.00s | 2.00s | 1.90s | 2.10s | 1.33× slower |",
            "| **C** | 3.00s | 3.00s | 2.90s | 3.10s | 2.00× slower |",
        ]
    );
    Ok(())
}

#[test]
fn test_missing_artifacts_become_absent_fields() -> Result<()> {
    let dir = TempDir::new()?;
    let layout = RunLayout::open(dir.path());
    let ids = candidates(&["up", "down", "garbled"]);

    write(&layout.load_test(&ids[0].id), &autocannon_json(15000.0, 7.5))?;
    write(
        &layout.resources(&ids[0].id),
        "{\"timestamp\":1,\"cpu\":50.0,\"memory\":80.0,\"elapsed\":1000}\n\
         {\"timestamp\":2,\"cpu\":70.0,\"memory\":90.0,\"elapsed\":1100}\n\
         {\"timestamp\":3,\"cpu\":",
    )?;
    write(&layout.load_test(&ids[2].id), r#"{"unexpected": true}"#)?;
    write(&layout.resources(&ids[2].id), "")?;

    let report = aggregate(&ids, &layout, context());

    let up = report.get(&ids[0].id).unwrap();
    let load = up.load_test.unwrap();
    assert_eq!(load.latency.p95, 7.5);
    assert_eq!(load.latency.p999, 15.0);
    let resources = up.resources.unwrap();
    assert_eq!(resources.samples, 2);
    assert_eq!(resources.cpu.mean, 60.0);
    assert_eq!(resources.memory.max, 90.0);
    assert!(up.build.is_none());

    let down = report.get(&ids[1].id).unwrap();
    assert!(down.load_test.is_none() && down.resources.is_none());

    let garbled = report.get(&ids[2].id).unwrap();
    assert!(garbled.load_test.is_none());
    assert!(garbled.resources.is_none());

    let order: Vec<&str> = report.results.keys().map(|id| id.as_str()).collect();
    assert_eq!(order, vec!["up", "down", "garbled"]);
    Ok(())
}

#[test]
fn test_render_is_byte_identical_across_calls() -> Result<()> {
    let dir = TempDir::new()?;
    let layout = RunLayout::open(dir.path());
    let ids = candidates(&["vercube", "nestjs"]);
    write(
        &layout.cold_start_json(),
        &hyperfine_json(&[("vercube", 0.35), ("nestjs", 0.7)]),
    )?;
    write(&layout.load_test(&ids[0].id), &autocannon_json(20000.0, 6.0))?;
    write(&layout.load_test(&ids[1].id), &autocannon_json(10000.0, 12.0))?;

    let report = aggregate(&ids, &layout, context());
    let first = render(&report);
    let second = render(&report.clone());
    assert_eq!(first, second);

    assert!(first.contains("| **vercube** 🏆 | 350ms | 350ms | 250ms | 450ms | 1.00× |"));
    assert!(first.contains("| **nestjs** | 700ms | 700ms | 600ms | 800ms | 2.00× slower |"));
    assert!(first.contains("| **nestjs** | 10000 | 4.00ms | 12.00ms | 9.00ms | -100% | +100% |"));
    Ok(())
}

#[test]
fn test_publish_then_regenerate_is_stable() -> Result<()> {
    let dir = TempDir::new()?;
    let readme = dir.path().join("README.md");
    write(
        &readme,
        &format!("# Bench\n\n{MARKER_START}\nplaceholder\n{MARKER_END}\n\nMore text\n"),
    )?;

    let layout = RunLayout::create(
        &dir.path().join("results"),
        chrono::Utc.with_ymd_and_hms(2024, 3, 5, 14, 7, 0).unwrap(),
    )?;
    let ids = candidates(&["vercube"]);
    write(&layout.load_test(&ids[0].id), &autocannon_json(20000.0, 6.0))?;
    let report = aggregate(&ids, &layout, context());

    let latest = dir.path().join("results/latest.json");
    let publisher = Publisher::new(latest.clone(), dir.path().join("results/summary.md"), readme.clone());
    publisher.publish(&report)?;

    let published = std::fs::read_to_string(&readme)?;
    assert!(published.starts_with(&format!("# Bench\n\n{MARKER_START}\n### Results Summary")));
    assert!(published.ends_with(&format!("{MARKER_END}\n\nMore text\n")));
    assert!(!published.contains("placeholder"));
    assert_eq!(load_report(&latest)?, report);

    assert!(publisher.regenerate()?);
    assert_eq!(std::fs::read_to_string(&readme)?, published);
    assert_eq!(
        std::fs::read_to_string(dir.path().join("results/summary.md"))?,
        render(&report)
    );
    Ok(())
}

#[test]
fn test_regenerate_without_results_is_a_noop() -> Result<()> {
    let dir = TempDir::new()?;
    let readme = dir.path().join("README.md");
    write(&readme, "no markers here\n")?;
    let publisher = Publisher::new(
        dir.path().join("latest.json"),
        dir.path().join("summary.md"),
        readme.clone(),
    );

    assert!(!publisher.regenerate()?);
    assert_eq!(std::fs::read_to_string(&readme)?, "no markers here\n");
    Ok(())
}

#[test]
fn test_missing_markers_fail_after_results_are_saved() -> Result<()> {
    let dir = TempDir::new()?;
    let readme = dir.path().join("README.md");
    write(&readme, "# No markers\n")?;
    let latest = dir.path().join("latest.json");
    let publisher = Publisher::new(latest.clone(), dir.path().join("summary.md"), readme);

    let report = aggregate(&candidates(&["a"]), &RunLayout::open(dir.path()), context());
    let err = publisher.publish(&report).unwrap_err();

    let bench = err.downcast_ref::<servbench::BenchError>().unwrap();
    assert!(bench.is_fatal());
    assert!(latest.exists());
    Ok(())
}
