//! Candidate process supervision and port ownership.
//!
//! Candidates are launched through `sh -c "exec <command>"` in a fresh process
//! group. Stopping sends SIGTERM to the whole group and escalates to SIGKILL
//! after a grace period, so wrapper launchers such as `pnpm start` cannot
//! leave an orphaned server bound to the port.
//!
//! The benchmark port is the only exclusively-owned resource. It is enforced
//! by best-effort release (`lsof -ti:<port>` + SIGKILL) before every phase and
//! after every stop, never by a lock: phases are strictly sequential.

use crate::config::BenchConfig;
use crate::types::{Candidate, CandidateId};
use anyhow::{Context, Result};
use nix::sys::signal::{kill, killpg, Signal};
use nix::unistd::Pid;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::{Child, Command};
use tracing::{debug, info, warn};

/// How long a candidate may take to exit after SIGTERM
pub const STOP_GRACE: Duration = Duration::from_secs(5);

/// Starts and stops candidates and keeps the shared port free
#[derive(Debug, Clone)]
pub struct ProcessSupervisor {
    port: u16,
    cooldown: Duration,
    stop_grace: Duration,
}

impl ProcessSupervisor {
    pub fn new(port: u16, cooldown: Duration) -> Self {
        Self {
            port,
            cooldown,
            stop_grace: STOP_GRACE,
        }
    }

    pub fn from_config(config: &BenchConfig) -> Self {
        Self::new(config.port, config.cooldown())
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Launch the candidate's start command with output discarded
    pub fn start(&self, candidate: &Candidate) -> Result<ServiceHandle> {
        let mut command = Command::new("sh");
        command
            .arg("-c")
            .arg(format!("exec {}", candidate.start_command))
            .current_dir(candidate.root())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true);
        #[cfg(unix)]
        command.process_group(0);

        let child = command.spawn().with_context(|| {
            format!(
                "Failed to start candidate {} in {}",
                candidate.id,
                candidate.root().display()
            )
        })?;
        let pid = child
            .id()
            .context("Spawned candidate has no pid (already reaped)")?;

        debug!(candidate = %candidate.id, pid, "Candidate process started");
        Ok(ServiceHandle {
            candidate: candidate.id.clone(),
            child,
            pid,
        })
    }

    /// Terminate the candidate, release the port and wait out the cooldown
    pub async fn stop(&self, mut handle: ServiceHandle) -> Result<()> {
        handle.terminate(self.stop_grace).await?;
        self.ensure_port_free().await;
        tokio::time::sleep(self.cooldown).await;
        Ok(())
    }

    /// Signal-kill whatever owns the port. Returns the number of processes signalled.
    pub async fn ensure_port_free(&self) -> usize {
        let port = self.port;
        match tokio::task::spawn_blocking(move || release_port(port)).await {
            Ok(killed) => killed,
            Err(e) => {
                warn!(port, error = %e, "Port release task failed");
                0
            }
        }
    }

    /// Scoped guarantee that the port is released when the guard goes away
    pub fn port_guard(&self) -> PortGuard {
        PortGuard {
            port: self.port,
            armed: true,
        }
    }
}

/// Handle to a running candidate
#[derive(Debug)]
pub struct ServiceHandle {
    candidate: CandidateId,
    child: Child,
    pid: u32,
}

impl ServiceHandle {
    pub fn pid(&self) -> u32 {
        self.pid
    }

    pub fn candidate(&self) -> &CandidateId {
        &self.candidate
    }

    /// Whether the process is still running; reaps it if it has exited
    pub fn is_alive(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(None))
    }

    /// SIGTERM to the process group, SIGKILL if it is still running after `grace`
    pub async fn terminate(&mut self, grace: Duration) -> Result<()> {
        if !self.is_alive() {
            return Ok(());
        }

        let group = Pid::from_raw(self.pid as i32);
        match killpg(group, Signal::SIGTERM) {
            Ok(()) | Err(nix::errno::Errno::ESRCH) => {}
            Err(e) => debug!(pid = self.pid, error = %e, "killpg SIGTERM failed"),
        }

        match tokio::time::timeout(grace, self.child.wait()).await {
            Ok(status) => {
                let status = status
                    .with_context(|| format!("Failed to reap candidate {}", self.candidate))?;
                // Leader is gone; sweep anything left in its group
                let _ = killpg(group, Signal::SIGKILL);
                debug!(candidate = %self.candidate, %status, "Candidate exited after SIGTERM");
                Ok(())
            }
            Err(_) => {
                warn!(
                    candidate = %self.candidate,
                    grace_ms = grace.as_millis(),
                    "Candidate ignored SIGTERM, killing"
                );
                self.kill().await
            }
        }
    }

    /// Forced termination of the whole process group
    pub async fn kill(&mut self) -> Result<()> {
        if !self.is_alive() {
            return Ok(());
        }

        match killpg(Pid::from_raw(self.pid as i32), Signal::SIGKILL) {
            Ok(()) | Err(nix::errno::Errno::ESRCH) => {}
            Err(e) => {
                debug!(pid = self.pid, error = %e, "killpg failed, falling back to kill");
            }
        }

        // The group signal may not have reached a child that left the group
        let _ = self.child.start_kill();
        self.child
            .wait()
            .await
            .with_context(|| format!("Failed to reap candidate {}", self.candidate))?;
        debug!(candidate = %self.candidate, pid = self.pid, "Candidate process stopped");
        Ok(())
    }
}

/// Releases the benchmark port on drop.
///
/// Drop runs the blocking release so cleanup happens on every exit path,
/// including early returns and panics.
#[derive(Debug)]
pub struct PortGuard {
    port: u16,
    armed: bool,
}

impl PortGuard {
    /// Release now and disarm
    pub fn release(mut self) -> usize {
        self.armed = false;
        release_port(self.port)
    }
}

impl Drop for PortGuard {
    fn drop(&mut self) {
        if self.armed {
            release_port(self.port);
        }
    }
}

/// PIDs listening on or connected through `port`, excluding this process
pub fn port_owners(port: u16) -> Vec<u32> {
    let output = match std::process::Command::new("lsof")
        .arg("-t")
        .arg(format!("-i:{port}"))
        .stdin(Stdio::null())
        .stderr(Stdio::null())
        .output()
    {
        Ok(output) => output,
        Err(e) => {
            debug!(port, error = %e, "lsof unavailable, skipping port owner lookup");
            return Vec::new();
        }
    };

    let own_pid = std::process::id();
    let mut pids: Vec<u32> = String::from_utf8_lossy(&output.stdout)
        .lines()
        .filter_map(|line| line.trim().parse::<u32>().ok())
        .filter(|pid| *pid != own_pid)
        .collect();
    pids.sort_unstable();
    pids.dedup();
    pids
}

/// Blocking best-effort release. No owner is not an error.
pub fn release_port(port: u16) -> usize {
    let mut killed = 0;
    for pid in port_owners(port) {
        match kill(Pid::from_raw(pid as i32), Signal::SIGKILL) {
            Ok(()) => {
                killed += 1;
                info!(port, pid, "Killed process holding port");
            }
            Err(nix::errno::Errno::ESRCH) => {}
            Err(e) => warn!(port, pid, error = %e, "Could not kill process holding port"),
        }
    }
    killed
}

/// Whether a PID currently exists
pub fn process_exists(pid: u32) -> bool {
    match kill(Pid::from_raw(pid as i32), None) {
        Ok(()) => true,
        Err(nix::errno::Errno::EPERM) => true,
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn candidate(root: PathBuf, start: &str) -> Candidate {
        Candidate {
            id: CandidateId::from("probe"),
            start_command: start.to_string(),
            build_command: "true".to_string(),
            root,
            build_output: PathBuf::from("dist"),
        }
    }

    #[tokio::test]
    async fn test_start_and_kill() -> Result<()> {
        let dir = TempDir::new()?;
        let supervisor = ProcessSupervisor::new(1, Duration::from_millis(1));
        let mut handle = supervisor.start(&candidate(dir.path().to_path_buf(), "sleep 30"))?;

        assert!(handle.is_alive());
        assert!(process_exists(handle.pid()));

        handle.kill().await?;
        assert!(!handle.is_alive());
        Ok(())
    }

    #[tokio::test]
    async fn test_terminate_lets_candidate_exit_on_sigterm() -> Result<()> {
        let dir = TempDir::new()?;
        let supervisor = ProcessSupervisor::new(1, Duration::from_millis(1));
        let mut handle = supervisor.start(&candidate(dir.path().to_path_buf(), "sleep 30"))?;

        let started = std::time::Instant::now();
        handle.terminate(Duration::from_secs(5)).await?;
        assert!(started.elapsed() < Duration::from_secs(2));
        assert!(!handle.is_alive());
        Ok(())
    }

    #[tokio::test]
    async fn test_terminate_escalates_when_sigterm_is_ignored() -> Result<()> {
        let dir = TempDir::new()?;
        let supervisor = ProcessSupervisor::new(1, Duration::from_millis(1));
        let mut handle = supervisor.start(&candidate(
            dir.path().to_path_buf(),
            "sh -c 'trap \"\" TERM; sleep 30'",
        ))?;
        tokio::time::sleep(Duration::from_millis(100)).await;

        let started = std::time::Instant::now();
        handle.terminate(Duration::from_millis(200)).await?;
        let took = started.elapsed();
        assert!(took >= Duration::from_millis(200), "exited after {took:?}");
        assert!(took < Duration::from_secs(3));
        assert!(!handle.is_alive());
        Ok(())
    }

    #[tokio::test]
    async fn test_start_uses_candidate_root() -> Result<()> {
        let dir = TempDir::new()?;
        let supervisor = ProcessSupervisor::new(1, Duration::from_millis(1));
        let mut handle =
            supervisor.start(&candidate(dir.path().to_path_buf(), "touch started.flag"))?;

        for _ in 0..100 {
            if !handle.is_alive() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(!handle.is_alive());
        assert!(dir.path().join("started.flag").exists());
        Ok(())
    }

    #[tokio::test]
    async fn test_start_fails_for_missing_root() {
        let supervisor = ProcessSupervisor::new(1, Duration::from_millis(1));
        let result = supervisor.start(&candidate(
            PathBuf::from("/definitely/not/a/real/dir"),
            "sleep 1",
        ));
        assert!(result.is_err());
    }

    #[test]
    fn test_release_never_targets_this_process() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();

        assert!(!port_owners(port).contains(&std::process::id()));
        release_port(port);
        assert!(listener.local_addr().is_ok());
    }

    #[test]
    fn test_guard_release_on_unused_port() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let supervisor = ProcessSupervisor::new(port, Duration::from_millis(1));
        assert_eq!(supervisor.port_guard().release(), 0);
        drop(supervisor.port_guard());
    }
}
