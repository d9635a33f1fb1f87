//! Fixed-cadence CPU/memory sampling of a running candidate.
//!
//! The sampler is a loop with one suspension point per tick. Each tick either
//! appends one complete JSON line to the output and flushes it, or ends the
//! stream because the process is gone. Cancellation is checked before every
//! tick, so a stop request never interrupts a half-written record.

use crate::config::SamplerSettings;
use crate::pure::stats::round2;
use crate::types::ResourceSample;
use anyhow::{Context, Result};
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid as NixPid;
use std::collections::HashMap;
use std::path::Path;
use std::process::Stdio;
use std::time::{Duration, Instant};
use sysinfo::{Pid, ProcessRefreshKind, ProcessStatus, ProcessesToUpdate, RefreshKind, System};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// One raw observation from the OS
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProbeReading {
    pub cpu_percent: f64,
    pub memory_bytes: u64,
    pub elapsed_ms: u64,
}

/// OS access used by the sampler. `None` means the process no longer exists.
pub trait ProcessProbe: Send {
    fn read(&mut self, pid: u32) -> Option<ProbeReading>;
}

/// `sysinfo`-backed probe that sums the process and all of its descendants.
///
/// Threads are not descendants: a process's CPU and RSS already cover them.
pub struct SysinfoProbe {
    system: System,
    refresh: ProcessRefreshKind,
    /// Process age at the first reading and when it was taken. `run_time()`
    /// only has whole-second resolution, so later ages are extrapolated.
    age_anchor: Option<(Pid, u64, Instant)>,
}

impl SysinfoProbe {
    pub fn new() -> Self {
        let refresh = ProcessRefreshKind::nothing()
            .with_cpu()
            .with_memory()
            .without_tasks();
        Self {
            system: System::new_with_specifics(RefreshKind::nothing().with_processes(refresh)),
            refresh,
            age_anchor: None,
        }
    }

    fn descendants(&self, root: Pid) -> Vec<Pid> {
        let mut children: HashMap<Pid, Vec<Pid>> = HashMap::new();
        for (pid, process) in self.system.processes() {
            if process.thread_kind().is_some() {
                continue;
            }
            if let Some(parent) = process.parent() {
                children.entry(parent).or_default().push(*pid);
            }
        }

        let mut tree = vec![root];
        let mut cursor = 0;
        while cursor < tree.len() {
            if let Some(kids) = children.get(&tree[cursor]) {
                tree.extend(kids.iter().copied());
            }
            cursor += 1;
        }
        tree
    }
}

impl SysinfoProbe {
    fn age_ms(&mut self, pid: Pid, run_time_secs: u64) -> u64 {
        match self.age_anchor {
            Some((anchored, base_ms, at)) if anchored == pid => {
                base_ms.saturating_add(at.elapsed().as_millis() as u64)
            }
            _ => {
                let base_ms = run_time_secs.saturating_mul(1000);
                self.age_anchor = Some((pid, base_ms, Instant::now()));
                base_ms
            }
        }
    }
}

impl Default for SysinfoProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessProbe for SysinfoProbe {
    fn read(&mut self, pid: u32) -> Option<ProbeReading> {
        self.system
            .refresh_processes_specifics(ProcessesToUpdate::All, true, self.refresh);

        let root = Pid::from_u32(pid);
        let process = self.system.process(root)?;
        if matches!(process.status(), ProcessStatus::Zombie | ProcessStatus::Dead) {
            return None;
        }
        let elapsed_ms = self.age_ms(root, process.run_time());

        let mut cpu_percent = 0.0;
        let mut memory_bytes = 0;
        for pid in self.descendants(root) {
            if let Some(process) = self.system.process(pid) {
                cpu_percent += f64::from(process.cpu_usage());
                memory_bytes += process.memory();
            }
        }

        Some(ProbeReading {
            cpu_percent,
            memory_bytes,
            elapsed_ms,
        })
    }
}

/// Why a sample stream ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SamplerExit {
    /// The sampled process disappeared; normal termination
    ProcessEnded,
    /// External stop request
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SamplerReport {
    pub exit: SamplerExit,
    pub samples: u64,
}

pub struct ResourceSampler<P> {
    probe: P,
    cadence: Duration,
}

impl<P: ProcessProbe> ResourceSampler<P> {
    pub fn new(probe: P, cadence: Duration) -> Self {
        Self {
            probe,
            cadence: cadence.max(Duration::from_millis(1)),
        }
    }

    /// Sample `pid` until it exits or `cancel` fires, writing JSON lines to `out`
    pub async fn run<W>(
        &mut self,
        pid: u32,
        out: &mut W,
        cancel: &CancellationToken,
    ) -> Result<SamplerReport>
    where
        W: AsyncWrite + Unpin,
    {
        let mut ticker = tokio::time::interval(self.cadence);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut samples = 0u64;
        let mut last_timestamp = i64::MIN;

        let exit = loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break SamplerExit::Cancelled,
                _ = ticker.tick() => {}
            }

            let Some(reading) = self.probe.read(pid) else {
                debug!(pid, samples, "Sampled process is gone, ending stream");
                break SamplerExit::ProcessEnded;
            };

            let timestamp = chrono::Utc::now().timestamp_millis().max(last_timestamp);
            last_timestamp = timestamp;
            let sample = ResourceSample {
                timestamp,
                cpu: round2(reading.cpu_percent),
                memory: round2(reading.memory_bytes as f64 / 1024.0 / 1024.0),
                elapsed: reading.elapsed_ms,
            };

            let mut line = serde_json::to_vec(&sample)?;
            line.push(b'\n');
            out.write_all(&line)
                .await
                .context("Failed to write resource sample")?;
            out.flush().await.context("Failed to flush resource sample")?;
            samples += 1;
        };

        Ok(SamplerReport { exit, samples })
    }
}

/// Body of the `monitor` subcommand: samples to stdout until the process
/// exits or SIGINT/SIGTERM arrives
pub async fn run_monitor(pid: u32, cadence: Duration) -> Result<SamplerReport> {
    let cancel = CancellationToken::new();
    let listener = cancel_on_signals(cancel.clone())?;

    let mut sampler = ResourceSampler::new(SysinfoProbe::new(), cadence);
    let mut stdout = tokio::io::stdout();
    let report = sampler.run(pid, &mut stdout, &cancel).await;

    listener.abort();
    report
}

fn cancel_on_signals(cancel: CancellationToken) -> Result<JoinHandle<()>> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut interrupt =
        signal(SignalKind::interrupt()).context("Failed to install SIGINT handler")?;
    let mut terminate =
        signal(SignalKind::terminate()).context("Failed to install SIGTERM handler")?;

    Ok(tokio::spawn(async move {
        tokio::select! {
            _ = interrupt.recv() => debug!("SIGINT received, stopping sampler"),
            _ = terminate.recv() => debug!("SIGTERM received, stopping sampler"),
        }
        cancel.cancel();
    }))
}

/// A running sampler writing to a resource stream file
pub enum SamplerHandle {
    /// `servbench monitor <pid>` child with stdout redirected to the file
    Process { child: Child },
    /// In-process task
    Task {
        cancel: CancellationToken,
        task: JoinHandle<Result<SamplerReport>>,
    },
}

impl SamplerHandle {
    /// Start a monitor subprocess from the running executable
    pub fn spawn_process(pid: u32, settings: &SamplerSettings, output: &Path) -> Result<Self> {
        let exe = std::env::current_exe().context("Failed to locate servbench executable")?;
        Self::spawn_process_with(&exe, pid, settings, output)
    }

    /// Start `<exe> monitor <pid>` with stdout redirected to `output`
    pub fn spawn_process_with(
        exe: &Path,
        pid: u32,
        settings: &SamplerSettings,
        output: &Path,
    ) -> Result<Self> {
        let file = std::fs::File::create(output)
            .with_context(|| format!("Failed to create {}", output.display()))?;

        let child = Command::new(exe)
            .arg("--quiet")
            .arg("monitor")
            .arg(pid.to_string())
            .arg("--cadence-ms")
            .arg(settings.cadence_ms.to_string())
            .stdin(Stdio::null())
            .stdout(Stdio::from(file))
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .context("Failed to start monitor process")?;

        debug!(pid, output = %output.display(), "Monitor process started");
        Ok(SamplerHandle::Process { child })
    }

    /// Start an in-process sampling task
    pub async fn spawn_task<P>(
        pid: u32,
        probe: P,
        settings: &SamplerSettings,
        output: &Path,
    ) -> Result<Self>
    where
        P: ProcessProbe + 'static,
    {
        let mut file = tokio::fs::File::create(output)
            .await
            .with_context(|| format!("Failed to create {}", output.display()))?;
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let cadence = settings.cadence();

        let task = tokio::spawn(async move {
            let mut sampler = ResourceSampler::new(probe, cadence);
            sampler.run(pid, &mut file, &token).await
        });
        Ok(SamplerHandle::Task { cancel, task })
    }

    /// Stop sampling and wait until the stream is complete on disk.
    ///
    /// The subprocess gets SIGINT and a grace period before SIGKILL. Sample
    /// counts are only known for the in-process variant.
    pub async fn stop(self) -> Result<Option<SamplerReport>> {
        match self {
            SamplerHandle::Process { mut child } => {
                if let Some(pid) = child.id() {
                    match kill(NixPid::from_raw(pid as i32), Signal::SIGINT) {
                        Ok(()) | Err(nix::errno::Errno::ESRCH) => {}
                        Err(e) => warn!(pid, error = %e, "Could not interrupt monitor"),
                    }
                }
                match tokio::time::timeout(Duration::from_secs(2), child.wait()).await {
                    Ok(status) => {
                        let status = status.context("Failed to wait for monitor")?;
                        debug!(%status, "Monitor process stopped");
                    }
                    Err(_) => {
                        warn!("Monitor ignored SIGINT, killing it");
                        child.kill().await.context("Failed to kill monitor")?;
                    }
                }
                Ok(None)
            }
            SamplerHandle::Task { cancel, task } => {
                cancel.cancel();
                let report = task.await.context("Sampler task panicked")??;
                info!(samples = report.samples, exit = ?report.exit, "Sampler stopped");
                Ok(Some(report))
            }
        }
    }
}
