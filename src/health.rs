//! Readiness polling against a candidate's health endpoint.
//!
//! The poller is a bounded-retry state machine: each attempt issues one GET,
//! then either terminates or suspends for the configured interval. Every
//! failure mode (connection refused, non-2xx, request timeout) counts as
//! "not ready yet"; exhausting the budget is an outcome, never an error.

use crate::config::HealthSettings;
use anyhow::{Context, Result};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

/// Terminal result of a poll
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// Endpoint answered 2xx on this attempt
    Ready { attempts: u32 },
    /// Every attempt failed
    Exhausted { attempts: u32 },
    /// The liveness guard reported the process gone
    ProcessExited { attempts: u32 },
    Cancelled { attempts: u32 },
}

impl PollOutcome {
    pub fn is_ready(&self) -> bool {
        matches!(self, PollOutcome::Ready { .. })
    }

    pub fn attempts(&self) -> u32 {
        match *self {
            PollOutcome::Ready { attempts }
            | PollOutcome::Exhausted { attempts }
            | PollOutcome::ProcessExited { attempts }
            | PollOutcome::Cancelled { attempts } => attempts,
        }
    }
}

#[derive(Debug)]
enum PollState {
    Probing { attempt: u32 },
    Waiting { attempt: u32 },
    Done(PollOutcome),
}

/// Polls `http://host:port/endpoint` until ready or out of attempts
#[derive(Debug, Clone)]
pub struct HealthPoller {
    client: reqwest::Client,
    max_attempts: u32,
    interval: Duration,
}

impl HealthPoller {
    pub fn new(max_attempts: u32, interval: Duration, request_timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .no_proxy()
            .build()
            .context("Failed to build health check client")?;
        Ok(Self {
            client,
            max_attempts: max_attempts.max(1),
            interval,
        })
    }

    pub fn from_settings(settings: &HealthSettings) -> Result<Self> {
        Self::new(
            settings.max_attempts,
            settings.interval(),
            settings.request_timeout(),
        )
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// One GET; true only for a 2xx answer
    pub async fn probe(&self, url: &str) -> bool {
        match self.client.get(url).send().await {
            Ok(response) => {
                trace!(url, status = %response.status(), "Health probe answered");
                response.status().is_success()
            }
            Err(e) => {
                trace!(url, error = %e, "Health probe failed");
                false
            }
        }
    }

    /// Poll with no liveness guard and no cancellation
    pub async fn poll(&self, url: &str) -> bool {
        self.poll_with(url, || true, &CancellationToken::new())
            .await
            .is_ready()
    }

    /// Poll until ready, exhausted, the guard reports the process dead, or cancelled
    pub async fn poll_with<F>(
        &self,
        url: &str,
        mut alive: F,
        cancel: &CancellationToken,
    ) -> PollOutcome
    where
        F: FnMut() -> bool,
    {
        let mut state = PollState::Probing { attempt: 1 };
        loop {
            state = match state {
                PollState::Probing { attempt } => {
                    if cancel.is_cancelled() {
                        PollState::Done(PollOutcome::Cancelled {
                            attempts: attempt - 1,
                        })
                    } else if self.probe(url).await {
                        PollState::Done(PollOutcome::Ready { attempts: attempt })
                    } else if !alive() {
                        PollState::Done(PollOutcome::ProcessExited { attempts: attempt })
                    } else if attempt >= self.max_attempts {
                        PollState::Done(PollOutcome::Exhausted { attempts: attempt })
                    } else {
                        PollState::Waiting { attempt }
                    }
                }
                PollState::Waiting { attempt } => {
                    tokio::select! {
                        _ = cancel.cancelled() => {
                            PollState::Done(PollOutcome::Cancelled { attempts: attempt })
                        }
                        _ = tokio::time::sleep(self.interval) => {
                            PollState::Probing { attempt: attempt + 1 }
                        }
                    }
                }
                PollState::Done(outcome) => {
                    debug!(url, ?outcome, "Health polling finished");
                    return outcome;
                }
            };
        }
    }
}

/// URL of an endpoint on the benchmark port
pub fn endpoint_url(host: &str, port: u16, endpoint: &str) -> String {
    format!("http://{host}:{port}{endpoint}")
}
