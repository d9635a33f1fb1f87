// Build and Cold-Start Timing
// Single-shot measurement primitives and the hyperfine invocations that
// repeat them.
//
// hyperfine owns warmup, run counts and the statistics. One cold-start
// sample is one `servbench cold-start <id>` process: start the candidate,
// poll until healthy, kill it, print the elapsed milliseconds.

use crate::config::{BenchConfig, HarnessSettings};
use crate::errors::BenchError;
use crate::health::{HealthPoller, PollOutcome};
use crate::process::ProcessSupervisor;
use crate::types::Candidate;
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

pub const COLD_START_MAX_ATTEMPTS: u32 = 1000;
pub const COLD_START_INTERVAL: Duration = Duration::from_millis(10);
const COLD_START_REQUEST_TIMEOUT: Duration = Duration::from_millis(500);

/// Time from spawn to the first 2xx health answer
pub struct ColdStartTimer {
    supervisor: ProcessSupervisor,
    poller: HealthPoller,
    health_url: String,
}

impl ColdStartTimer {
    pub fn new(supervisor: ProcessSupervisor, poller: HealthPoller, health_url: String) -> Self {
        Self {
            supervisor,
            poller,
            health_url,
        }
    }

    pub fn from_config(config: &BenchConfig) -> Result<Self> {
        let poller = HealthPoller::new(
            COLD_START_MAX_ATTEMPTS,
            COLD_START_INTERVAL,
            COLD_START_REQUEST_TIMEOUT,
        )?;
        Ok(Self::new(
            ProcessSupervisor::from_config(config),
            poller,
            config.health_url(),
        ))
    }

    /// One measurement. The candidate is always killed before returning.
    pub async fn measure(&self, candidate: &Candidate) -> Result<Duration> {
        let started = Instant::now();
        let mut handle = self.supervisor.start(candidate)?;

        let outcome = self
            .poller
            .poll_with(
                &self.health_url,
                || handle.is_alive(),
                &CancellationToken::new(),
            )
            .await;
        let elapsed = started.elapsed();
        handle.kill().await?;

        match outcome {
            PollOutcome::Ready { attempts } => {
                debug!(
                    candidate = %candidate.id,
                    attempts,
                    elapsed_ms = elapsed.as_millis(),
                    "Cold start measured"
                );
                Ok(elapsed)
            }
            PollOutcome::ProcessExited { .. } => Err(BenchError::ServerExited {
                candidate: candidate.id.to_string(),
            }
            .into()),
            PollOutcome::Exhausted { attempts } | PollOutcome::Cancelled { attempts } => {
                Err(BenchError::ServerStartFailure {
                    candidate: candidate.id.to_string(),
                    attempts,
                }
                .into())
            }
        }
    }
}

/// One command in a hyperfine comparison
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HarnessCommand {
    /// `--command-name`, always the candidate id
    pub name: String,
    pub command: String,
    /// Run before every timing run of this command
    pub prepare: String,
}

/// A full hyperfine invocation for one phase
#[derive(Debug, Clone)]
pub struct HarnessPhase {
    pub name: &'static str,
    pub settings: HarnessSettings,
    pub commands: Vec<HarnessCommand>,
    pub export_json: PathBuf,
    pub export_markdown: PathBuf,
}

impl HarnessPhase {
    pub fn args(&self) -> Vec<String> {
        let mut args = vec![
            "--warmup".to_string(),
            self.settings.warmup.to_string(),
            "--runs".to_string(),
            self.settings.runs.to_string(),
            "--export-json".to_string(),
            self.export_json.display().to_string(),
            "--export-markdown".to_string(),
            self.export_markdown.display().to_string(),
        ];
        for command in &self.commands {
            args.push("--command-name".to_string());
            args.push(command.name.clone());
            args.push("--prepare".to_string());
            args.push(command.prepare.clone());
        }
        args.extend(self.commands.iter().map(|c| c.command.clone()));
        args
    }
}

/// Build phase: run the build command from the candidate root after wiping
/// its build output
pub fn build_phase(
    candidates: &[Candidate],
    settings: HarnessSettings,
    export_json: PathBuf,
    export_markdown: PathBuf,
) -> HarnessPhase {
    let commands = candidates
        .iter()
        .map(|c| HarnessCommand {
            name: c.id.to_string(),
            command: format!(
                "cd {} && {}",
                shell_quote(&c.root().display().to_string()),
                c.build_command
            ),
            prepare: format!(
                "rm -rf {}",
                shell_quote(&c.build_output_path().display().to_string())
            ),
        })
        .collect();

    HarnessPhase {
        name: "build",
        settings,
        commands,
        export_json,
        export_markdown,
    }
}

/// Cold-start phase: each sample re-invokes this executable with `cold-start`
pub fn cold_start_phase(
    candidates: &[Candidate],
    settings: HarnessSettings,
    exe: &Path,
    config_path: &Path,
    export_json: PathBuf,
    export_markdown: PathBuf,
) -> HarnessPhase {
    let invoke = format!(
        "{} --quiet --config {}",
        shell_quote(&exe.display().to_string()),
        shell_quote(&config_path.display().to_string())
    );
    let commands = candidates
        .iter()
        .map(|c| HarnessCommand {
            name: c.id.to_string(),
            command: format!("{invoke} cold-start {}", shell_quote(c.id.as_str())),
            prepare: format!("{invoke} free-port; sleep 0.5"),
        })
        .collect();

    HarnessPhase {
        name: "cold-start",
        settings,
        commands,
        export_json,
        export_markdown,
    }
}

/// The external statistical harness
#[derive(Debug, Clone)]
pub struct Hyperfine {
    program: String,
    show_output: bool,
}

impl Hyperfine {
    pub fn new(show_output: bool) -> Self {
        Self::with_program("hyperfine", show_output)
    }

    pub fn with_program(program: impl Into<String>, show_output: bool) -> Self {
        Self {
            program: program.into(),
            show_output,
        }
    }

    pub async fn run(&self, phase: &HarnessPhase) -> Result<()> {
        info!(
            phase = phase.name,
            candidates = phase.commands.len(),
            warmup = phase.settings.warmup,
            runs = phase.settings.runs,
            "Running hyperfine"
        );

        let (stdout, stderr) = if self.show_output {
            (Stdio::inherit(), Stdio::inherit())
        } else {
            (Stdio::null(), Stdio::null())
        };
        let status = Command::new(&self.program)
            .args(phase.args())
            .stdin(Stdio::null())
            .stdout(stdout)
            .stderr(stderr)
            .status()
            .await
            .with_context(|| format!("Failed to run {}", self.program))?;

        if !status.success() {
            return Err(BenchError::ToolFailed {
                tool: self.program.clone(),
                reason: format!("{} phase exited with {status}", phase.name),
            }
            .into());
        }
        Ok(())
    }
}

/// Single-quote for `sh`
pub fn shell_quote(raw: &str) -> String {
    format!("'{}'", raw.replace('\'', r"'\''"))
}
