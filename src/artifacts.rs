// Raw Artifacts
// Run directory layout and the typed shapes of external tool output.
//
// Every reader here fails closed: a missing file, a file that does not
// parse, or a record that does not match the expected schema is reported
// as `None` with a warning, never as an error.

use crate::types::{CandidateId, LatencyProfile, LoadTestResult, ResourceSample};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

pub const RUN_DIR_FORMAT: &str = "%Y-%m-%d-%H-%M-%S";

/// File names inside one run directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunLayout {
    dir: PathBuf,
}

impl RunLayout {
    /// Create `<results_dir>/raw/<timestamp>/`
    pub fn create(results_dir: &Path, started_at: DateTime<Utc>) -> Result<Self> {
        let dir = results_dir
            .join("raw")
            .join(started_at.format(RUN_DIR_FORMAT).to_string());
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create run directory {}", dir.display()))?;
        Ok(Self { dir })
    }

    /// Use an existing run directory
    pub fn open(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn build_json(&self) -> PathBuf {
        self.dir.join("build.json")
    }

    pub fn build_markdown(&self) -> PathBuf {
        self.dir.join("build.md")
    }

    pub fn cold_start_json(&self) -> PathBuf {
        self.dir.join("cold-start.json")
    }

    pub fn cold_start_markdown(&self) -> PathBuf {
        self.dir.join("cold-start.md")
    }

    pub fn load_test(&self, id: &CandidateId) -> PathBuf {
        self.dir.join(format!("{id}-load-test.json"))
    }

    pub fn resources(&self, id: &CandidateId) -> PathBuf {
        self.dir.join(format!("{id}-resources.jsonl"))
    }

    pub fn report(&self) -> PathBuf {
        self.dir.join("report.json")
    }
}

/// `hyperfine --export-json` document
#[derive(Debug, Clone, Deserialize)]
pub struct HyperfineExport {
    pub results: Vec<HyperfineResult>,
}

/// One benchmarked command. Times are seconds.
#[derive(Debug, Clone, Deserialize)]
pub struct HyperfineResult {
    pub command: String,
    pub mean: f64,
    /// Null when hyperfine ran a single measurement
    #[serde(default)]
    pub stddev: Option<f64>,
    pub median: f64,
    pub min: f64,
    pub max: f64,
}

impl HyperfineExport {
    /// Result for `id`: exact command name first, then substring containment
    pub fn find(&self, id: &CandidateId) -> Option<&HyperfineResult> {
        self.results
            .iter()
            .find(|r| r.command == id.as_str())
            .or_else(|| self.results.iter().find(|r| r.command.contains(id.as_str())))
    }
}

/// Subset of `autocannon --json` output that the report uses
#[derive(Debug, Clone, Deserialize)]
pub struct AutocannonOutput {
    pub requests: AutocannonStat,
    pub throughput: AutocannonStat,
    pub latency: AutocannonLatency,
    pub errors: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AutocannonStat {
    pub mean: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AutocannonLatency {
    pub mean: f64,
    pub stddev: f64,
    pub p50: f64,
    pub p75: f64,
    pub p90: f64,
    pub p97_5: f64,
    pub p99: f64,
    #[serde(alias = "p99_9")]
    pub p999: f64,
}

impl From<AutocannonOutput> for LoadTestResult {
    /// The 97.5th percentile bucket fills the `p95` column.
    fn from(raw: AutocannonOutput) -> Self {
        LoadTestResult {
            requests_per_sec_mean: raw.requests.mean,
            throughput_mean: raw.throughput.mean,
            latency: LatencyProfile {
                mean: raw.latency.mean,
                stddev: raw.latency.stddev,
                p50: raw.latency.p50,
                p75: raw.latency.p75,
                p90: raw.latency.p90,
                p95: raw.latency.p97_5,
                p99: raw.latency.p99,
                p999: raw.latency.p999,
            },
            error_count: raw.errors,
        }
    }
}

/// Read and parse a JSON artifact; absent or malformed yields `None`
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Option<T> {
    let raw = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "Artifact not present");
            return None;
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Could not read artifact");
            return None;
        }
    };

    match serde_json::from_str(&raw) {
        Ok(value) => Some(value),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Artifact does not match expected schema");
            None
        }
    }
}

pub fn read_hyperfine(path: &Path) -> Option<HyperfineExport> {
    read_json(path)
}

pub fn read_load_test(path: &Path) -> Option<LoadTestResult> {
    read_json::<AutocannonOutput>(path).map(LoadTestResult::from)
}

/// Parse a newline-delimited sample stream, skipping lines that do not parse
pub fn read_resource_stream(path: &Path) -> Option<Vec<ResourceSample>> {
    let raw = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) => {
            debug!(path = %path.display(), error = %e, "Resource stream not readable");
            return None;
        }
    };
    Some(parse_resource_stream(&raw))
}

pub fn parse_resource_stream(raw: &str) -> Vec<ResourceSample> {
    let mut skipped = 0usize;
    let samples: Vec<ResourceSample> = raw
        .lines()
        .filter(|line| !line.trim().is_empty())
        .filter_map(|line| match serde_json::from_str(line) {
            Ok(sample) => Some(sample),
            Err(_) => {
                skipped += 1;
                None
            }
        })
        .collect();

    if skipped > 0 {
        warn!(skipped, kept = samples.len(), "Skipped unparseable resource samples");
    }
    samples
}
