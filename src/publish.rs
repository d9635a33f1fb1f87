// Report Publishing
// Persists the aggregated report, the rendered summary, and re-injects the
// summary into a host document between two literal marker lines.

use crate::errors::{BenchError, BenchResult};
use crate::pure::render;
use crate::types::AggregatedReport;
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

pub const MARKER_START: &str = "<!-- BENCHMARK_RESULTS_START -->";
pub const MARKER_END: &str = "<!-- BENCHMARK_RESULTS_END -->";

/// Replace whatever sits between the markers with `section`.
///
/// Applying the same section twice yields the same document.
pub fn inject(document: &str, section: &str, path: &Path) -> BenchResult<String> {
    let missing = |marker: &str| BenchError::PublishMarkerMissing {
        marker: marker.to_string(),
        path: path.to_path_buf(),
    };

    let start = document.find(MARKER_START).ok_or_else(|| missing(MARKER_START))?;
    let body_start = start + MARKER_START.len();
    let end = document[body_start..]
        .find(MARKER_END)
        .map(|offset| body_start + offset)
        .ok_or_else(|| missing(MARKER_END))?;

    let mut out = String::with_capacity(document.len() + section.len());
    out.push_str(&document[..body_start]);
    out.push('\n');
    out.push_str(section);
    out.push_str(&document[end..]);
    Ok(out)
}

/// Output locations of the publish step
#[derive(Debug, Clone)]
pub struct Publisher {
    latest: PathBuf,
    summary: PathBuf,
    readme: PathBuf,
}

impl Publisher {
    pub fn new(latest: PathBuf, summary: PathBuf, readme: PathBuf) -> Self {
        Self {
            latest,
            summary,
            readme,
        }
    }

    pub fn latest_path(&self) -> &Path {
        &self.latest
    }

    /// Write latest.json and summary.md, then update the host document.
    ///
    /// The two result files are written before the host document is touched,
    /// so a marker failure still leaves them on disk for a later retry.
    pub fn publish(&self, report: &AggregatedReport) -> Result<()> {
        write_report(&self.latest, report)?;
        info!(path = %self.latest.display(), "Report written");

        let section = render(report);
        write_file(&self.summary, &section)?;
        info!(path = %self.summary.display(), "Summary written");

        self.update_readme(&section)?;
        Ok(())
    }

    /// Regenerate the summary and host document from a persisted report.
    ///
    /// Returns `false` when there is no persisted report yet.
    pub fn regenerate(&self) -> Result<bool> {
        if !self.latest.exists() {
            warn!(path = %self.latest.display(), "No results found, skipping README update");
            return Ok(false);
        }
        let report = load_report(&self.latest)?;
        let section = render(&report);
        write_file(&self.summary, &section)?;
        self.update_readme(&section)?;
        Ok(true)
    }

    fn update_readme(&self, section: &str) -> Result<()> {
        let document = match std::fs::read_to_string(&self.readme) {
            Ok(document) => document,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(BenchError::PublishMarkerMissing {
                    marker: MARKER_START.to_string(),
                    path: self.readme.clone(),
                }
                .into());
            }
            Err(e) => {
                return Err(e)
                    .with_context(|| format!("Failed to read {}", self.readme.display()))
            }
        };

        let updated = inject(&document, section, &self.readme)?;
        if updated != document {
            write_file(&self.readme, &updated)?;
        }
        info!(path = %self.readme.display(), "Host document updated");
        Ok(())
    }
}

/// Pretty-printed JSON, parent directories created as needed
pub fn write_report(path: &Path, report: &AggregatedReport) -> Result<()> {
    let json = serde_json::to_string_pretty(report).context("Failed to serialize report")?;
    write_file(path, &json)
}

pub fn load_report(path: &Path) -> Result<AggregatedReport> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("Invalid report in {}", path.display()))
}

fn write_file(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    std::fs::write(path, contents).with_context(|| format!("Failed to write {}", path.display()))
}
