// Benchmark Data Model
// Canonical shapes shared by every phase, the aggregator and the renderer.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// One service implementation under comparison.
///
/// The identifier is the join key for every phase and never changes
/// during a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candidate {
    pub id: CandidateId,
    /// Shell command that starts the service in the foreground
    pub start_command: String,
    /// Shell command that produces a production build
    pub build_command: String,
    /// Working directory for both commands
    pub root: PathBuf,
    /// Directory removed before each measured build
    pub build_output: PathBuf,
}

impl Candidate {
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Absolute-or-relative path to the build output, resolved against the root
    pub fn build_output_path(&self) -> PathBuf {
        self.root.join(&self.build_output)
    }
}

/// Stable candidate identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CandidateId(String);

impl CandidateId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CandidateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CandidateId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Repeated-run measurement summary produced by the external harness.
///
/// All durations are in seconds. `relative` is this candidate's mean divided
/// by the fastest candidate's mean for the same phase.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StatisticalSummary {
    pub mean: f64,
    pub median: f64,
    pub stddev: f64,
    pub min: f64,
    pub max: f64,
    pub relative: f64,
}

/// Latency distribution in milliseconds
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatencyProfile {
    pub mean: f64,
    pub stddev: f64,
    pub p50: f64,
    pub p75: f64,
    pub p90: f64,
    pub p95: f64,
    pub p99: f64,
    pub p999: f64,
}

/// Result of one load-test invocation against one candidate
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadTestResult {
    pub requests_per_sec_mean: f64,
    /// Bytes per second
    pub throughput_mean: f64,
    pub latency: LatencyProfile,
    pub error_count: u64,
}

/// One CPU/memory observation of a running process
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ResourceSample {
    /// Wall clock, milliseconds since the Unix epoch
    pub timestamp: i64,
    /// CPU usage in percent of one core
    pub cpu: f64,
    /// Resident memory in MiB
    pub memory: f64,
    /// Process run time in milliseconds
    pub elapsed: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricSummary {
    pub mean: f64,
    pub max: f64,
    pub p95: f64,
}

/// Summary of a complete resource sample stream
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ResourceSummary {
    pub cpu: MetricSummary,
    pub memory: MetricSummary,
    pub samples: usize,
}

/// Host characteristics captured once per run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MachineProfile {
    pub os: String,
    pub cpu_model: String,
    pub core_count: usize,
    pub total_memory_gb: u64,
}

/// Load-test knobs, copied into the report so rendering needs nothing else
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoadTestSettings {
    pub connections: u32,
    /// Seconds
    pub duration: u32,
    pub pipelining: u32,
}

impl Default for LoadTestSettings {
    fn default() -> Self {
        Self {
            connections: 100,
            duration: 10,
            pipelining: 1,
        }
    }
}

/// Per-candidate results; any phase may be absent
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CandidateResults {
    pub build: Option<StatisticalSummary>,
    pub cold_start: Option<StatisticalSummary>,
    pub load_test: Option<LoadTestResult>,
    pub resources: Option<ResourceSummary>,
}

/// Everything the renderer needs, in configuration order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregatedReport {
    /// RFC 3339 timestamp of aggregation
    pub generated_at: String,
    pub machine: MachineProfile,
    pub load_test_settings: LoadTestSettings,
    #[serde(default)]
    pub runtime_label: Option<String>,
    /// Link to the persisted report, shown under the tables
    #[serde(default)]
    pub raw_data: Option<String>,
    pub results: IndexMap<CandidateId, CandidateResults>,
}

impl AggregatedReport {
    pub fn get(&self, id: &CandidateId) -> Option<&CandidateResults> {
        self.results.get(id)
    }

    /// Candidates that have a value for the selected phase, in report order
    pub fn with_phase<'a, T, F>(&'a self, select: F) -> Vec<(&'a CandidateId, &'a T)>
    where
        F: Fn(&'a CandidateResults) -> Option<&'a T>,
    {
        self.results
            .iter()
            .filter_map(|(id, results)| select(results).map(|value| (id, value)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_json_uses_camel_case_and_nulls() {
        let mut results = IndexMap::new();
        results.insert(CandidateId::from("nestjs"), CandidateResults::default());
        let report = AggregatedReport {
            generated_at: "2024-01-01T00:00:00+00:00".into(),
            machine: MachineProfile {
                os: "Linux".into(),
                cpu_model: "Test CPU".into(),
                core_count: 8,
                total_memory_gb: 16,
            },
            load_test_settings: LoadTestSettings::default(),
            runtime_label: None,
            raw_data: None,
            results,
        };

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["machine"]["cpuModel"], "Test CPU");
        assert!(json["results"]["nestjs"]["loadTest"].is_null());
        assert!(json["results"]["nestjs"]["coldStart"].is_null());
    }

    #[test]
    fn test_with_phase_preserves_order() {
        let mut results = IndexMap::new();
        for (id, mean) in [("c", Some(3.0)), ("a", None), ("b", Some(1.0))] {
            results.insert(
                CandidateId::from(id),
                CandidateResults {
                    build: mean.map(|mean| StatisticalSummary {
                        mean,
                        median: mean,
                        stddev: 0.0,
                        min: mean,
                        max: mean,
                        relative: 1.0,
                    }),
                    ..Default::default()
                },
            );
        }
        let report = AggregatedReport {
            generated_at: String::new(),
            machine: MachineProfile {
                os: String::new(),
                cpu_model: String::new(),
                core_count: 1,
                total_memory_gb: 1,
            },
            load_test_settings: LoadTestSettings::default(),
            runtime_label: None,
            raw_data: None,
            results,
        };

        let ids: Vec<&str> = report
            .with_phase(|r| r.build.as_ref())
            .into_iter()
            .map(|(id, _)| id.as_str())
            .collect();
        assert_eq!(ids, vec!["c", "b"]);
    }
}
