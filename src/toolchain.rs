// Toolchain Verification
// Presence check for the external measurement tools, run before any phase.

use crate::config::ToolSpec;
use crate::errors::BenchError;
use anyhow::Result;
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, info, warn};

/// Outcome for one tool
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolStatus {
    Present { version: String },
    /// Missing at first, installed during verification
    Installed { version: String },
    /// Optional and still missing
    Unavailable,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolReport {
    pub name: String,
    pub required: bool,
    pub status: ToolStatus,
}

impl ToolReport {
    pub fn is_available(&self) -> bool {
        !matches!(self.status, ToolStatus::Unavailable)
    }
}

pub struct ToolchainVerifier {
    tools: Vec<ToolSpec>,
}

impl ToolchainVerifier {
    pub fn new(tools: Vec<ToolSpec>) -> Self {
        Self { tools }
    }

    /// Check every tool in order. A missing required tool fails immediately
    /// with `ToolMissing`; optional tools get one install attempt.
    pub async fn verify(&self) -> Result<Vec<ToolReport>> {
        let mut reports = Vec::with_capacity(self.tools.len());

        for tool in &self.tools {
            let status = match version_of(tool).await {
                Some(version) => ToolStatus::Present { version },
                None if tool.required => {
                    return Err(BenchError::ToolMissing {
                        tool: tool.name.clone(),
                        install_hint: tool
                            .install_hint
                            .clone()
                            .unwrap_or_else(|| format!("install `{}`", tool.name)),
                    }
                    .into());
                }
                None => try_install(tool).await,
            };

            match &status {
                ToolStatus::Present { version } | ToolStatus::Installed { version } => {
                    info!(tool = %tool.name, version = %version, "✓ tool available")
                }
                ToolStatus::Unavailable => {
                    warn!(tool = %tool.name, "Optional tool is not available")
                }
            }

            reports.push(ToolReport {
                name: tool.name.clone(),
                required: tool.required,
                status,
            });
        }

        Ok(reports)
    }
}

/// First line of the version command's output, `None` if it cannot run
async fn version_of(tool: &ToolSpec) -> Option<String> {
    let output = Command::new(&tool.name)
        .args(&tool.version_args)
        .stdin(Stdio::null())
        .output()
        .await
        .ok()?;

    if !output.status.success() {
        debug!(tool = %tool.name, status = %output.status, "Version command failed");
        return None;
    }

    let text = if output.stdout.is_empty() {
        output.stderr
    } else {
        output.stdout
    };
    Some(
        String::from_utf8_lossy(&text)
            .lines()
            .next()
            .unwrap_or_default()
            .trim()
            .to_string(),
    )
}

async fn try_install(tool: &ToolSpec) -> ToolStatus {
    let Some(install) = &tool.install else {
        return ToolStatus::Unavailable;
    };

    info!(tool = %tool.name, command = %install, "Installing optional tool");
    let installed = Command::new("sh")
        .arg("-c")
        .arg(install)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await;

    match installed {
        Ok(status) if status.success() => match version_of(tool).await {
            Some(version) => ToolStatus::Installed { version },
            None => ToolStatus::Unavailable,
        },
        Ok(status) => {
            warn!(tool = %tool.name, %status, "Install command failed");
            ToolStatus::Unavailable
        }
        Err(e) => {
            warn!(tool = %tool.name, error = %e, "Could not run install command");
            ToolStatus::Unavailable
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tool(name: &str, required: bool, install: Option<&str>) -> ToolSpec {
        ToolSpec {
            name: name.to_string(),
            version_args: vec!["--version".to_string()],
            required,
            install: install.map(str::to_string),
            install_hint: Some("brew install it".to_string()),
        }
    }

    #[tokio::test]
    async fn test_present_tool_reports_version() {
        let mut sh = tool("sh", true, None);
        sh.version_args = vec!["-c".to_string(), "echo 1.2.3".to_string()];
        let reports = ToolchainVerifier::new(vec![sh]).verify().await.unwrap();
        assert_eq!(
            reports[0].status,
            ToolStatus::Present {
                version: "1.2.3".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_missing_required_tool_is_fatal() {
        let err = ToolchainVerifier::new(vec![tool("no-such-tool-servbench", true, None)])
            .verify()
            .await
            .unwrap_err();
        let bench = err.downcast_ref::<BenchError>().unwrap();
        assert!(bench.is_fatal());
        assert!(err.to_string().contains("no-such-tool-servbench"));
        assert!(err.to_string().contains("brew install it"));
    }

    #[tokio::test]
    async fn test_failed_optional_install_is_not_fatal() {
        let reports = ToolchainVerifier::new(vec![tool(
            "no-such-tool-servbench",
            false,
            Some("exit 1"),
        )])
        .verify()
        .await
        .unwrap();
        assert_eq!(reports[0].status, ToolStatus::Unavailable);
        assert!(!reports[0].is_available());
    }
}
