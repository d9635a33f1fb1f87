// Report Rendering
// Turns an aggregated report into Markdown comparison tables.
//
// `render` is a pure function of the report: the timestamp, machine profile
// and load-test settings all travel inside the report, so rendering the same
// report twice yields byte-identical text.

use crate::pure::stats::percent_worse;
use crate::types::{
    AggregatedReport, CandidateId, CandidateResults, LoadTestResult, ResourceSummary,
    StatisticalSummary,
};
use chrono::DateTime;

const TROPHY: &str = " 🏆";
const NO_DIFF: &str = "—";

/// Render the full results section
pub fn render(report: &AggregatedReport) -> String {
    let mut md = String::from("### Results Summary\n\n");
    md.push_str(&format!(
        "> Last updated: {}\n\n",
        format_timestamp(&report.generated_at)
    ));
    md.push_str(
        "> Statistical comparison powered by [hyperfine](https://github.com/sharkdp/hyperfine)\n\n",
    );

    render_build(report, &mut md);
    render_cold_start(report, &mut md);
    render_load_test(report, &mut md);
    render_resources(report, &mut md);
    render_footer(report, &mut md);

    md
}

fn format_timestamp(raw: &str) -> String {
    match DateTime::parse_from_rfc3339(raw) {
        Ok(ts) => ts
            .naive_utc()
            .format("%A, %B %-d, %Y at %-I:%M %p UTC")
            .to_string(),
        Err(_) => raw.to_string(),
    }
}

/// Candidates with a value for the phase, ascending by mean; ties keep report order
fn ranked<'a>(
    report: &'a AggregatedReport,
    select: fn(&CandidateResults) -> Option<&StatisticalSummary>,
) -> Vec<(&'a CandidateId, &'a StatisticalSummary)> {
    let mut rows = report.with_phase(select);
    rows.sort_by(|a, b| a.1.mean.total_cmp(&b.1.mean));
    rows
}

fn relative_label(index: usize, relative: f64) -> String {
    if index == 0 || relative <= 1.0 {
        "1.00×".to_string()
    } else {
        format!("{:.2}× slower", relative)
    }
}

fn render_build(report: &AggregatedReport, md: &mut String) {
    md.push_str("#### ⚡ Build Time\n\n");
    md.push_str("| Framework | Mean | Median | Min | Max | Relative |\n");
    md.push_str("|-----------|------|--------|-----|-----|:--------:|\n");

    for (index, (id, b)) in ranked(report, |r| r.build.as_ref()).into_iter().enumerate() {
        let trophy = if index == 0 { TROPHY } else { "" };
        md.push_str(&format!(
            "| **{}**{} | {:.2}s | {:.2}s | {:.2}s | {:.2}s | {} |\n",
            id,
            trophy,
            b.mean,
            b.median,
            b.min,
            b.max,
            relative_label(index, b.relative)
        ));
    }
    md.push('\n');
}

fn render_cold_start(report: &AggregatedReport, md: &mut String) {
    md.push_str("#### 🚀 Cold Start Time\n\n");
    md.push_str("| Framework | Mean | Median | Min | Max | Relative |\n");
    md.push_str("|-----------|------|--------|-----|-----|:--------:|\n");

    for (index, (id, c)) in ranked(report, |r| r.cold_start.as_ref())
        .into_iter()
        .enumerate()
    {
        let trophy = if index == 0 { TROPHY } else { "" };
        md.push_str(&format!(
            "| **{}**{} | {:.0}ms | {:.0}ms | {:.0}ms | {:.0}ms | {} |\n",
            id,
            trophy,
            c.mean * 1000.0,
            c.median * 1000.0,
            c.min * 1000.0,
            c.max * 1000.0,
            relative_label(index, c.relative)
        ));
    }
    md.push('\n');
}

/// Throughput winner (max req/s) and latency winner (min p95), first wins ties
fn load_winners<'a>(
    rows: &[(&'a CandidateId, &'a LoadTestResult)],
) -> Option<(&'a CandidateId, &'a CandidateId)> {
    let &(first_id, first) = rows.first()?;
    let mut rps_winner = (first_id, first);
    let mut latency_winner = (first_id, first);

    for &(id, result) in rows.iter().skip(1) {
        if result.requests_per_sec_mean > rps_winner.1.requests_per_sec_mean {
            rps_winner = (id, result);
        }
        if result.latency.p95 < latency_winner.1.latency.p95 {
            latency_winner = (id, result);
        }
    }
    Some((rps_winner.0, latency_winner.0))
}

fn render_load_test(report: &AggregatedReport, md: &mut String) {
    md.push_str("#### 🔥 Load Test Performance\n\n");
    md.push_str(
        "| Framework | Requests/sec | Latency p50 | Latency p95 | Latency p99 | vs Best RPS | vs Best p95 |\n",
    );
    md.push_str(
        "|-----------|--------------|-------------|-------------|-------------|:-----------:|:-----------:|\n",
    );

    let rows = report.with_phase(|r| r.load_test.as_ref());
    if let Some((rps_winner, latency_winner)) = load_winners(&rows) {
        let best_rps = report
            .get(rps_winner)
            .and_then(|r| r.load_test.as_ref())
            .map_or(0.0, |l| l.requests_per_sec_mean);
        let best_p95 = report
            .get(latency_winner)
            .and_then(|r| r.load_test.as_ref())
            .map_or(0.0, |l| l.latency.p95);

        for (id, l) in &rows {
            let is_rps_winner = *id == rps_winner;
            let is_latency_winner = *id == latency_winner;
            let trophy = if is_rps_winner || is_latency_winner {
                TROPHY
            } else {
                ""
            };

            let rps_diff = if is_rps_winner {
                NO_DIFF.to_string()
            } else {
                format!(
                    "-{:.0}%",
                    percent_worse(best_rps, l.requests_per_sec_mean, true)
                )
            };
            let latency_diff = if is_latency_winner {
                NO_DIFF.to_string()
            } else {
                format!("+{:.0}%", percent_worse(best_p95, l.latency.p95, false))
            };

            md.push_str(&format!(
                "| **{}**{} | {:.0} | {:.2}ms | {:.2}ms | {:.2}ms | {} | {} |\n",
                id,
                trophy,
                l.requests_per_sec_mean,
                l.latency.p50,
                l.latency.p95,
                l.latency.p99,
                rps_diff,
                latency_diff
            ));
        }
    }
    md.push('\n');
}

fn render_resources(report: &AggregatedReport, md: &mut String) {
    let rows: Vec<(&CandidateId, &ResourceSummary)> =
        report.with_phase(|r| r.resources.as_ref());
    if rows.is_empty() {
        return;
    }

    md.push_str("#### 📈 Resource Usage Under Load\n\n");
    md.push_str("| Framework | CPU mean | CPU p95 | CPU max | Memory mean | Memory p95 | Memory max |\n");
    md.push_str("|-----------|----------|---------|---------|-------------|------------|------------|\n");
    for (id, r) in rows {
        md.push_str(&format!(
            "| **{}** | {:.1}% | {:.1}% | {:.1}% | {:.1}MB | {:.1}MB | {:.1}MB |\n",
            id, r.cpu.mean, r.cpu.p95, r.cpu.max, r.memory.mean, r.memory.p95, r.memory.max
        ));
    }
    md.push('\n');
}

fn render_footer(report: &AggregatedReport, md: &mut String) {
    md.push_str("---\n\n");
    if let Some(link) = &report.raw_data {
        md.push_str(&format!("📊 [View raw data]({})\n\n", link));
    }

    let m = &report.machine;
    let runtime = report
        .runtime_label
        .as_deref()
        .map(|label| format!(", {}", label))
        .unwrap_or_default();
    md.push_str(&format!(
        "**Test environment:** {}, {} ({} cores), {}GB RAM{}\n\n",
        m.os, m.cpu_model, m.core_count, m.total_memory_gb, runtime
    ));

    let s = &report.load_test_settings;
    md.push_str(&format!(
        "**Load test config:** {} concurrent connections, {}s duration, {} pipelining\n",
        s.connections, s.duration, s.pipelining
    ));
}
