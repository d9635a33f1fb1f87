// Error Taxonomy
// Typed failures surfaced by the benchmark phases.
//
// Only `ToolMissing` and `PublishMarkerMissing` abort a run. Everything else is
// logged by the orchestrator and degrades to absent data.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BenchError {
    #[error("required tool `{tool}` is not installed; install it with: {install_hint}")]
    ToolMissing { tool: String, install_hint: String },

    #[error("candidate `{candidate}` did not become healthy after {attempts} attempts")]
    ServerStartFailure { candidate: String, attempts: u32 },

    #[error("candidate `{candidate}` exited before becoming healthy")]
    ServerExited { candidate: String },

    #[error("marker `{marker}` not found in {}", path.display())]
    PublishMarkerMissing { marker: String, path: PathBuf },

    #[error("`{tool}` failed: {reason}")]
    ToolFailed { tool: String, reason: String },

    #[error("unknown candidate `{0}`")]
    UnknownCandidate(String),

    #[error("configuration error: {0}")]
    Config(String),
}

impl BenchError {
    /// Whether this error must abort the whole run
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            BenchError::ToolMissing { .. }
                | BenchError::PublishMarkerMissing { .. }
                | BenchError::Config(_)
        )
    }
}

pub type BenchResult<T> = std::result::Result<T, BenchError>;
