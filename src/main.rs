// servbench CLI - build, cold-start and load benchmarks across HTTP services
use anyhow::Result;
use clap::{Parser, Subcommand};

// Macro for conditional printing based on quiet flag
macro_rules! qprintln {
    ($quiet:expr, $($arg:tt)*) => {
        if !$quiet {
            println!($($arg)*);
        }
    };
}
use servbench::{
    init_logging_with_level, orchestrator, process, sampler, with_trace_id, BenchConfig,
    BenchError, ColdStartTimer, Orchestrator, RunOptions, DEFAULT_CONFIG_FILE,
};
use std::path::PathBuf;
use std::time::Duration;
use tracing::warn;

#[derive(Parser)]
#[command(name = "servbench")]
#[command(about = "Compare build time, cold start and load performance of HTTP services")]
#[command(version)]
struct Cli {
    /// Enable verbose logging (DEBUG level)
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    verbose: bool,

    /// Only log errors and hide progress output
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    /// Benchmark configuration file (.json, .toml, .yaml)
    #[arg(short, long, global = true, env = "SERVBENCH_CONFIG", default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// Skip the build-time phase
    #[arg(long)]
    skip_build: bool,

    /// Skip the cold-start phase
    #[arg(long)]
    skip_cold_start: bool,

    /// Skip the load-test phase
    #[arg(long)]
    skip_load: bool,

    /// Regenerate summary.md and the README section from results/latest.json
    #[arg(long, conflicts_with = "from_artifacts")]
    update_readme_only: bool,

    /// Re-aggregate an existing run directory and publish it
    #[arg(long, value_name = "DIR")]
    from_artifacts: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Measure one cold start of a candidate and print it in milliseconds
    ColdStart {
        /// Candidate identifier from the configuration
        candidate: String,
    },

    /// Sample CPU and memory of a process as JSON lines until it exits
    Monitor {
        /// Process to sample
        pid: u32,

        /// Sampling interval
        #[arg(long, default_value = "100")]
        cadence_ms: u64,
    },

    /// Kill whatever holds the benchmark port
    FreePort {
        /// Port to release (defaults to the configured port)
        #[arg(short, long)]
        port: Option<u16>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let mut cli = Cli::parse();

    let _ = init_logging_with_level(cli.verbose, cli.quiet);
    let quiet = cli.quiet;

    match cli.command.take() {
        Some(Commands::ColdStart { candidate }) => {
            let config = BenchConfig::load(&cli.config)?;
            let target = config
                .candidate(&candidate)
                .ok_or(BenchError::UnknownCandidate(candidate))?;
            let elapsed = ColdStartTimer::from_config(&config)?.measure(&target).await?;
            println!("{}", elapsed.as_millis());
            Ok(())
        }

        Some(Commands::Monitor { pid, cadence_ms }) => {
            sampler::run_monitor(pid, Duration::from_millis(cadence_ms)).await?;
            Ok(())
        }

        Some(Commands::FreePort { port }) => {
            let port = match port {
                Some(port) => port,
                None => BenchConfig::load(&cli.config)?.port,
            };
            let killed = tokio::task::spawn_blocking(move || process::release_port(port)).await?;
            qprintln!(quiet, "Released port {port} ({killed} processes killed)");
            Ok(())
        }

        None => run_benchmark(cli).await,
    }
}

async fn run_benchmark(cli: Cli) -> Result<()> {
    let quiet = cli.quiet;
    let config = BenchConfig::load(&cli.config)?;

    if cli.update_readme_only {
        qprintln!(quiet, "📝 Updating README with latest results...");
        if orchestrator::regenerate(&config)? {
            qprintln!(quiet, "✅ {} updated", config.readme.display());
        }
        return Ok(());
    }

    if let Some(run_dir) = cli.from_artifacts {
        qprintln!(quiet, "📊 Re-aggregating {}", run_dir.display());
        let report = orchestrator::republish_from_artifacts(&config, run_dir)?;
        qprintln!(
            quiet,
            "✅ Published {} candidates to {}",
            report.results.len(),
            config.summary_path().display()
        );
        return Ok(());
    }

    let options = RunOptions {
        config_path: cli.config.clone(),
        skip_build: cli.skip_build,
        skip_cold_start: cli.skip_cold_start,
        skip_load: cli.skip_load,
        quiet,
    };

    qprintln!(quiet, "🏁 servbench");
    qprintln!(
        quiet,
        "   Candidates: {}",
        config
            .candidates()
            .iter()
            .map(|c| c.id.to_string())
            .collect::<Vec<_>>()
            .join(", ")
    );

    let orchestrator = Orchestrator::new(config.clone(), options)?;
    let cancel = orchestrator.cancellation();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, finishing the current step and cleaning up");
            cancel.cancel();
        }
    });

    let summary = match with_trace_id("servbench-cli", orchestrator.run()).await {
        Ok(summary) => summary,
        Err(e) => {
            if let Some(fatal) = e.downcast_ref::<BenchError>().filter(|b| b.is_fatal()) {
                eprintln!("❌ Run aborted: {fatal}");
                if matches!(fatal, BenchError::PublishMarkerMissing { .. }) {
                    eprintln!(
                        "   Results were saved to {}; add the markers and rerun with --update-readme-only",
                        config.latest_report_path().display()
                    );
                }
            }
            return Err(e);
        }
    };

    qprintln!(quiet, "\n🎉 Benchmark complete");
    qprintln!(quiet, "   Raw results: {}", summary.run_dir.display());
    qprintln!(quiet, "   Summary:     {}", config.summary_path().display());
    if !summary.failed.is_empty() {
        qprintln!(
            quiet,
            "   ⚠️  Load test failed for: {}",
            summary
                .failed
                .iter()
                .map(|id| id.to_string())
                .collect::<Vec<_>>()
                .join(", ")
        );
    }
    Ok(())
}
