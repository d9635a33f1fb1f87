// Load Generation
// Drives a fixed-duration HTTP load test against a ready candidate and
// persists the tool's raw JSON output for the aggregator.

use crate::artifacts::read_load_test;
use crate::errors::BenchError;
use crate::types::{CandidateId, LoadTestResult, LoadTestSettings};
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, info};

/// Everything a driver needs for one invocation
#[derive(Debug, Clone)]
pub struct LoadRequest<'a> {
    pub candidate: &'a CandidateId,
    pub url: String,
    pub settings: LoadTestSettings,
    /// Where the raw tool output must be written
    pub output: &'a Path,
}

/// Concurrent-connection HTTP load tool
#[async_trait]
pub trait LoadDriver: Send + Sync {
    /// Run one load test and persist its raw output
    ///
    /// # Preconditions
    /// - The candidate answers on `request.url`
    ///
    /// # Postconditions
    /// - `request.output` holds the tool's JSON document
    /// - Request errors reported by the tool are data, not a failure
    async fn drive(&self, request: &LoadRequest<'_>) -> Result<()>;
}

/// `autocannon -c <connections> -d <duration> -p <pipelining> --json <url>`
#[derive(Debug, Clone)]
pub struct Autocannon {
    program: String,
}

impl Autocannon {
    pub fn new() -> Self {
        Self::with_program("autocannon")
    }

    pub fn with_program(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    fn args(request: &LoadRequest<'_>) -> Vec<String> {
        let s = request.settings;
        vec![
            "-c".to_string(),
            s.connections.to_string(),
            "-d".to_string(),
            s.duration.to_string(),
            "-p".to_string(),
            s.pipelining.to_string(),
            "--json".to_string(),
            request.url.clone(),
        ]
    }
}

impl Default for Autocannon {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LoadDriver for Autocannon {
    async fn drive(&self, request: &LoadRequest<'_>) -> Result<()> {
        let output = std::fs::File::create(request.output)
            .with_context(|| format!("Failed to create {}", request.output.display()))?;

        debug!(
            candidate = %request.candidate,
            url = %request.url,
            connections = request.settings.connections,
            duration_s = request.settings.duration,
            "Starting load test"
        );
        let status = Command::new(&self.program)
            .args(Self::args(request))
            .stdin(Stdio::null())
            .stdout(Stdio::from(output))
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .status()
            .await
            .with_context(|| format!("Failed to run {}", self.program))?;

        if !status.success() {
            return Err(BenchError::ToolFailed {
                tool: self.program.clone(),
                reason: format!("exited with {status}"),
            }
            .into());
        }
        Ok(())
    }
}

/// Run a load test and read back its canonical result.
///
/// The result is `None` when the tool's output does not match the expected
/// schema; the raw file is kept either way.
pub async fn run_load_test(
    driver: &dyn LoadDriver,
    request: &LoadRequest<'_>,
) -> Result<Option<LoadTestResult>> {
    driver.drive(request).await?;
    let result = read_load_test(request.output);
    if let Some(result) = &result {
        info!(
            candidate = %request.candidate,
            rps = result.requests_per_sec_mean.round(),
            p95_ms = result.latency.p95,
            errors = result.error_count,
            "Load test finished"
        );
    }
    Ok(result)
}
