//! Resource sampler cadence, termination and cancellation under paused time

use anyhow::Result;
use servbench::sampler::{ProbeReading, ProcessProbe, ResourceSampler, SamplerExit};
use servbench::ResourceSample;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Simulated process that exists for a fixed span of (tokio) time
struct SimulatedProcess {
    born: Instant,
    lifetime: Option<Duration>,
}

impl SimulatedProcess {
    fn living_for(lifetime: Duration) -> Self {
        Self {
            born: Instant::now(),
            lifetime: Some(lifetime),
        }
    }

    fn immortal() -> Self {
        Self {
            born: Instant::now(),
            lifetime: None,
        }
    }
}

impl ProcessProbe for SimulatedProcess {
    fn read(&mut self, _pid: u32) -> Option<ProbeReading> {
        let age = self.born.elapsed();
        if self.lifetime.is_some_and(|lifetime| age >= lifetime) {
            return None;
        }
        Some(ProbeReading {
            cpu_percent: 25.0,
            memory_bytes: 48 * 1024 * 1024,
            elapsed_ms: age.as_millis() as u64,
        })
    }
}

fn parse_lines(out: &[u8]) -> Vec<ResourceSample> {
    String::from_utf8_lossy(out)
        .lines()
        .map(|line| serde_json::from_str(line).expect("every line is a complete record"))
        .collect()
}

#[tokio::test(start_paused = true)]
async fn test_one_second_process_at_100ms_cadence() -> Result<()> {
    let probe = SimulatedProcess::living_for(Duration::from_millis(1000));
    let mut sampler = ResourceSampler::new(probe, Duration::from_millis(100));
    let mut out = Vec::new();

    let started = Instant::now();
    let report = sampler.run(42, &mut out, &CancellationToken::new()).await?;
    let ran_for = started.elapsed();

    assert_eq!(report.exit, SamplerExit::ProcessEnded);
    assert!((9..=11).contains(&report.samples), "got {} samples", report.samples);
    assert!(ran_for <= Duration::from_millis(1100), "stream ended late: {ran_for:?}");

    let samples = parse_lines(&out);
    assert_eq!(samples.len() as u64, report.samples);
    assert!(samples.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
    assert!(samples.iter().all(|s| s.memory == 48.0 && s.cpu == 25.0));
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_cancellation_returns_within_one_cadence() -> Result<()> {
    let mut sampler = ResourceSampler::new(SimulatedProcess::immortal(), Duration::from_millis(100));
    let mut out = Vec::new();

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(450)).await;
        trigger.cancel();
    });

    let started = Instant::now();
    let report = sampler.run(42, &mut out, &cancel).await?;
    let ran_for = started.elapsed();

    assert_eq!(report.exit, SamplerExit::Cancelled);
    assert!(ran_for < Duration::from_millis(550), "stopped late: {ran_for:?}");
    assert_eq!(report.samples, 5);

    assert!(out.ends_with(b"\n"));
    assert_eq!(parse_lines(&out).len(), 5);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_cancelled_before_start_writes_nothing() -> Result<()> {
    let mut sampler = ResourceSampler::new(SimulatedProcess::immortal(), Duration::from_millis(100));
    let mut out = Vec::new();
    let cancel = CancellationToken::new();
    cancel.cancel();

    let report = sampler.run(42, &mut out, &cancel).await?;
    assert_eq!(report.exit, SamplerExit::Cancelled);
    assert_eq!(report.samples, 0);
    assert!(out.is_empty());
    Ok(())
}
