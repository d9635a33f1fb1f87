// Benchmark Orchestrator
// Sequences every phase across every candidate and guarantees port cleanup.
//
// Phase order: verify → build → cold start → per-candidate load test →
// aggregate → publish. Only a toolchain or publish failure aborts the run;
// a candidate that fails its load test is logged and skipped. Cancellation
// skips every measurement step not yet started.

use crate::aggregate::{aggregate, ReportContext};
use crate::artifacts::RunLayout;
use crate::config::{BenchConfig, SamplerMode};
use crate::errors::BenchError;
use crate::health::{HealthPoller, PollOutcome};
use crate::load::{run_load_test, Autocannon, LoadDriver, LoadRequest};
use crate::machine;
use crate::observability::{
    get_metrics, log_operation, with_trace_id, Operation, OperationContext, PerfTimer,
};
use crate::process::{ProcessSupervisor, ServiceHandle};
use crate::publish::{write_report, Publisher};
use crate::sampler::{SamplerHandle, SysinfoProbe};
use crate::timing::{build_phase, cold_start_phase, HarnessPhase, Hyperfine};
use crate::toolchain::ToolchainVerifier;
use crate::types::{AggregatedReport, Candidate, CandidateId};
use anyhow::{Context, Result};
use chrono::Utc;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Switches that shape one run
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Configuration file, passed on to re-invocations of this binary
    pub config_path: PathBuf,
    pub skip_build: bool,
    pub skip_cold_start: bool,
    pub skip_load: bool,
    pub quiet: bool,
}

/// What a completed run produced
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub run_dir: PathBuf,
    pub report: AggregatedReport,
    /// Candidates whose load-test phase failed
    pub failed: Vec<CandidateId>,
}

pub struct Orchestrator {
    config: BenchConfig,
    options: RunOptions,
    supervisor: ProcessSupervisor,
    poller: HealthPoller,
    driver: Box<dyn LoadDriver>,
    harness: Hyperfine,
    cancel: CancellationToken,
}

impl Orchestrator {
    pub fn new(config: BenchConfig, options: RunOptions) -> Result<Self> {
        let supervisor = ProcessSupervisor::from_config(&config);
        let poller = HealthPoller::from_settings(&config.health)?;
        let harness = Hyperfine::new(!options.quiet);
        Ok(Self {
            config,
            options,
            supervisor,
            poller,
            driver: Box::new(Autocannon::new()),
            harness,
            cancel: CancellationToken::new(),
        })
    }

    pub fn with_load_driver(mut self, driver: Box<dyn LoadDriver>) -> Self {
        self.driver = driver;
        self
    }

    pub fn with_harness(mut self, harness: Hyperfine) -> Self {
        self.harness = harness;
        self
    }

    /// Token that stops the run before the next phase or candidate. Whatever
    /// was measured so far is still aggregated and published.
    pub fn cancellation(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Execute every phase. The port is released on every exit path.
    pub async fn run(&self) -> Result<RunSummary> {
        let guard = self.supervisor.port_guard();
        let result = with_trace_id("benchmark_run", self.run_phases()).await;
        let released = guard.release();
        if released > 0 {
            info!(port = self.supervisor.port(), released, "Released benchmark port");
        }
        info!(counters = %get_metrics()["operations"], "Run counters");
        result
    }

    /// True once cancelled; logs which step is being skipped
    fn stop_before(&self, step: &str) -> bool {
        let cancelled = self.cancel.is_cancelled();
        if cancelled {
            warn!(step, "Run cancelled, skipping");
        }
        cancelled
    }

    async fn run_phases(&self) -> Result<RunSummary> {
        let _timer = PerfTimer::new("benchmark run");
        let started = Utc::now();

        if !self.stop_before("toolchain check") {
            self.verify_toolchain().await?;
        }

        let layout = RunLayout::create(&self.config.results_dir, started)?;
        info!(run_dir = %layout.dir().display(), "Run directory created");
        let candidates = self.config.candidates();

        if self.options.skip_build {
            info!("Skipping build phase");
        } else if !self.stop_before("build phase") {
            let phase = build_phase(
                &candidates,
                self.config.build_benchmark,
                layout.build_json(),
                layout.build_markdown(),
            );
            self.comparative_phase(&phase).await;
        }

        if self.options.skip_cold_start {
            info!("Skipping cold-start phase");
        } else if !self.stop_before("cold-start phase") {
            match std::env::current_exe() {
                Ok(exe) => {
                    let phase = cold_start_phase(
                        &candidates,
                        self.config.cold_start_benchmark,
                        &exe,
                        &self.options.config_path,
                        layout.cold_start_json(),
                        layout.cold_start_markdown(),
                    );
                    self.comparative_phase(&phase).await;
                }
                Err(e) => error!(error = %e, "Cannot locate own executable, skipping cold start"),
            }
        }

        let mut failed = Vec::new();
        if self.options.skip_load {
            info!("Skipping load-test phase");
        } else if !self.stop_before("load-test phase") {
            failed = self.load_phase(&candidates, &layout).await;
        }

        let report = self.build_report(&candidates, &layout, started);
        write_report(&layout.report(), &report)?;

        let ctx = OperationContext::new("publish");
        let publisher = self.publisher();
        let published = publisher.publish(&report);
        log_operation(
            &ctx,
            &Operation::Publish {
                target: self.config.readme.display().to_string(),
            },
            &published,
        );
        published?;

        Ok(RunSummary {
            run_dir: layout.dir().to_path_buf(),
            report,
            failed,
        })
    }

    async fn verify_toolchain(&self) -> Result<()> {
        if self.config.tools.is_empty() {
            return Ok(());
        }
        let ctx = OperationContext::new("verify_toolchain");
        let result = ToolchainVerifier::new(self.config.tools.clone())
            .verify()
            .await
            .map(|_| ());
        log_operation(
            &ctx,
            &Operation::ToolCheck {
                tool: self
                    .config
                    .tools
                    .iter()
                    .map(|t| t.name.as_str())
                    .collect::<Vec<_>>()
                    .join(","),
            },
            &result,
        );
        result
    }

    /// A hyperfine failure degrades to absent data for the phase
    async fn comparative_phase(&self, phase: &HarnessPhase) {
        let _timer = PerfTimer::new(format!("{} phase", phase.name));
        self.supervisor.ensure_port_free().await;

        let ctx = OperationContext::new(phase.name);
        let result = self.harness.run(phase).await;
        log_operation(
            &ctx,
            &Operation::ComparativePhase {
                phase: phase.name.to_string(),
                candidates: phase.commands.len(),
            },
            &result,
        );
        if let Err(e) = result {
            warn!(phase = phase.name, error = %e, "Phase failed, its results will be absent");
        }
    }

    async fn load_phase(&self, candidates: &[Candidate], layout: &RunLayout) -> Vec<CandidateId> {
        let _timer = PerfTimer::new("load-test phase");
        let progress = self.progress_bar(candidates.len() as u64);
        let mut failed = Vec::new();

        for candidate in candidates {
            if self.stop_before("remaining load tests") {
                break;
            }
            progress.set_message(format!("Load testing {}", candidate.id));

            let mut ctx = OperationContext::new("load_test");
            ctx.add_attribute("candidate", candidate.id.as_str());
            let result = self.load_candidate(candidate, layout).await;
            log_operation(
                &ctx,
                &Operation::LoadTest {
                    candidate: candidate.id.to_string(),
                },
                &result,
            );
            if let Err(e) = result {
                warn!(candidate = %candidate.id, error = %e, "Load test skipped for candidate");
                failed.push(candidate.id.clone());
            }
            progress.inc(1);
        }

        progress.finish_with_message("Load tests complete");
        failed
    }

    /// start → wait healthy → sample + load → stop, for one candidate
    async fn load_candidate(&self, candidate: &Candidate, layout: &RunLayout) -> Result<()> {
        self.supervisor.ensure_port_free().await;

        let ctx = OperationContext::new("service_start");
        let started = self.supervisor.start(candidate);
        log_operation(
            &ctx,
            &Operation::ServiceStart {
                candidate: candidate.id.to_string(),
            },
            &started.as_ref().map(|_| ()).map_err(|e| anyhow::anyhow!("{e:#}")),
        );
        let mut handle = started?;

        let measured = self.measure_candidate(candidate, &mut handle, layout).await;
        let stopped = self.supervisor.stop(handle).await;
        measured?;
        stopped
    }

    async fn measure_candidate(
        &self,
        candidate: &Candidate,
        handle: &mut ServiceHandle,
        layout: &RunLayout,
    ) -> Result<()> {
        let ctx = OperationContext::new("health_wait");
        let outcome = self
            .poller
            .poll_with(&self.config.health_url(), || handle.is_alive(), &self.cancel)
            .await;

        let ready = match outcome {
            PollOutcome::Ready { .. } => Ok(()),
            PollOutcome::ProcessExited { .. } => Err(BenchError::ServerExited {
                candidate: candidate.id.to_string(),
            }),
            PollOutcome::Exhausted { attempts } | PollOutcome::Cancelled { attempts } => {
                Err(BenchError::ServerStartFailure {
                    candidate: candidate.id.to_string(),
                    attempts,
                })
            }
        }
        .map_err(anyhow::Error::from);
        log_operation(
            &ctx,
            &Operation::HealthWait {
                candidate: candidate.id.to_string(),
                attempts: outcome.attempts(),
            },
            &ready,
        );
        ready?;

        let resources = layout.resources(&candidate.id);
        let sampler = match self.config.sampler.mode {
            SamplerMode::Process => {
                SamplerHandle::spawn_process(handle.pid(), &self.config.sampler, &resources)?
            }
            SamplerMode::Task => {
                SamplerHandle::spawn_task(
                    handle.pid(),
                    SysinfoProbe::new(),
                    &self.config.sampler,
                    &resources,
                )
                .await?
            }
        };
        tokio::time::sleep(std::time::Duration::from_millis(self.config.sampler.warmup_ms)).await;

        let output = layout.load_test(&candidate.id);
        let request = LoadRequest {
            candidate: &candidate.id,
            url: self.config.test_url(),
            settings: self.config.load_test,
            output: &output,
        };
        let loaded = run_load_test(self.driver.as_ref(), &request).await;

        let sampling = OperationContext::new("resource_sampling");
        let sampled = sampler.stop().await;
        let samples = match &sampled {
            Ok(Some(report)) => report.samples,
            _ => 0,
        };
        log_operation(
            &sampling,
            &Operation::ResourceSampling {
                candidate: candidate.id.to_string(),
                samples,
            },
            &sampled.as_ref().map(|_| ()).map_err(|e| anyhow::anyhow!("{e:#}")),
        );

        if loaded?.is_none() {
            warn!(candidate = %candidate.id, "Load test output did not match the expected schema");
        }
        sampled.map(|_| ())
    }

    fn build_report(
        &self,
        candidates: &[Candidate],
        layout: &RunLayout,
        started: chrono::DateTime<Utc>,
    ) -> AggregatedReport {
        let ctx = OperationContext::new("aggregate");
        let report = aggregate(
            candidates,
            layout,
            ReportContext {
                machine: machine::capture(),
                load_test_settings: self.config.load_test,
                generated_at: started.to_rfc3339(),
                runtime_label: machine::runtime_label(self.config.node_version.as_deref()),
                raw_data: Some(self.config.latest_report_path().display().to_string()),
            },
        );
        log_operation(
            &ctx,
            &Operation::Aggregate {
                candidates: report.results.len(),
            },
            &Ok(()),
        );
        report
    }

    fn publisher(&self) -> Publisher {
        Publisher::new(
            self.config.latest_report_path(),
            self.config.summary_path(),
            self.config.readme.clone(),
        )
    }

    fn progress_bar(&self, len: u64) -> ProgressBar {
        if self.options.quiet {
            return ProgressBar::hidden();
        }
        let pb = ProgressBar::new(len);
        if let Ok(style) =
            ProgressStyle::default_bar().template("{spinner:.green} [{pos}/{len}] {msg}")
        {
            pb.set_style(style.tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏"));
        }
        pb
    }
}

/// Re-render and publish from the persisted report only
pub fn regenerate(config: &BenchConfig) -> Result<bool> {
    Publisher::new(
        config.latest_report_path(),
        config.summary_path(),
        config.readme.clone(),
    )
    .regenerate()
}

/// Re-aggregate an existing run directory, then publish
pub fn republish_from_artifacts(config: &BenchConfig, run_dir: PathBuf) -> Result<AggregatedReport> {
    let layout = RunLayout::open(run_dir);
    if !layout.dir().is_dir() {
        return Err(BenchError::Config(format!(
            "run directory {} does not exist",
            layout.dir().display()
        ))
        .into());
    }

    let report = aggregate(
        &config.candidates(),
        &layout,
        ReportContext {
            machine: machine::capture(),
            load_test_settings: config.load_test,
            generated_at: Utc::now().to_rfc3339(),
            runtime_label: machine::runtime_label(config.node_version.as_deref()),
            raw_data: Some(config.latest_report_path().display().to_string()),
        },
    );
    write_report(&layout.report(), &report).context("Failed to write run report")?;
    Publisher::new(
        config.latest_report_path(),
        config.summary_path(),
        config.readme.clone(),
    )
    .publish(&report)?;
    Ok(report)
}
