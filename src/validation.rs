// Configuration Validation
// Runtime checks applied once, before any phase touches a process or the port.

use crate::config::BenchConfig;
use anyhow::{bail, Result};
use std::collections::{HashMap, HashSet};
use tracing::error;

/// Validation errors with detailed context
#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("Precondition failed: {condition}")]
    PreconditionFailed { condition: String, context: String },

    #[error("Invalid input: {field} - {reason}")]
    InvalidInput { field: String, reason: String },

    #[error("Duplicate candidate identifier: {id}")]
    DuplicateCandidate { id: String },
}

/// Validation context for better error messages
#[derive(Clone)]
pub struct ValidationContext {
    operation: String,
    attributes: HashMap<String, String>,
}

impl ValidationContext {
    pub fn new(operation: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
            attributes: HashMap::new(),
        }
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    pub fn validate(&self, condition: bool, message: &str) -> Result<()> {
        if !condition {
            let context = format!(
                "Operation: {}, Attributes: {:?}",
                self.operation, self.attributes
            );
            error!(context = %context, "{}", message);
            bail!(ValidationError::PreconditionFailed {
                condition: message.to_string(),
                context,
            });
        }
        Ok(())
    }
}

/// Validate an endpoint path such as `/health`
pub fn validate_endpoint(field: &str, endpoint: &str) -> Result<()> {
    if !endpoint.starts_with('/') {
        bail!(ValidationError::InvalidInput {
            field: field.to_string(),
            reason: format!("endpoint must start with '/', got {endpoint:?}"),
        });
    }
    if endpoint.chars().any(char::is_whitespace) {
        bail!(ValidationError::InvalidInput {
            field: field.to_string(),
            reason: "endpoint must not contain whitespace".to_string(),
        });
    }
    Ok(())
}

/// Validate a candidate identifier.
///
/// Identifiers end up in file names and hyperfine command names, so they are
/// restricted to ASCII alphanumerics, `-`, `_` and `.`.
pub fn validate_candidate_id(id: &str) -> Result<()> {
    if id.is_empty() {
        bail!(ValidationError::InvalidInput {
            field: "frameworks".to_string(),
            reason: "candidate identifier cannot be empty".to_string(),
        });
    }
    if !id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
    {
        bail!(ValidationError::InvalidInput {
            field: "frameworks".to_string(),
            reason: format!("candidate identifier {id:?} contains unsupported characters"),
        });
    }
    Ok(())
}

/// Validate a whole configuration
pub fn validate_config(config: &BenchConfig) -> Result<()> {
    let ctx = ValidationContext::new("validate_config")
        .with_attribute("port", config.port.to_string())
        .with_attribute("candidates", config.frameworks.len().to_string());

    ctx.validate(
        !config.frameworks.is_empty(),
        "at least one candidate is required",
    )?;
    ctx.validate(config.port != 0, "port must be non-zero")?;
    ctx.validate(!config.host.is_empty(), "host cannot be empty")?;

    validate_endpoint("healthEndpoint", &config.health_endpoint)?;
    validate_endpoint("testEndpoint", &config.test_endpoint)?;

    let mut seen = HashSet::new();
    for spec in &config.frameworks {
        let id = spec.id();
        validate_candidate_id(id)?;
        if !seen.insert(id.to_string()) {
            bail!(ValidationError::DuplicateCandidate { id: id.to_string() });
        }
    }

    ctx.validate(config.load_test.connections > 0, "loadTest.connections must be > 0")?;
    ctx.validate(config.load_test.duration > 0, "loadTest.duration must be > 0")?;
    ctx.validate(config.load_test.pipelining > 0, "loadTest.pipelining must be > 0")?;
    ctx.validate(config.build_benchmark.runs > 0, "buildBenchmark.runs must be > 0")?;
    ctx.validate(
        config.cold_start_benchmark.runs > 0,
        "coldStartBenchmark.runs must be > 0",
    )?;
    ctx.validate(config.health.max_attempts > 0, "health.maxAttempts must be > 0")?;
    ctx.validate(config.sampler.cadence_ms > 0, "sampler.cadenceMs must be > 0")?;

    for tool in &config.tools {
        ctx.validate(!tool.name.is_empty(), "tool name cannot be empty")?;
    }

    Ok(())
}
