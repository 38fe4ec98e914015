//! Readiness polling for containerized services.
//!
//! A [`HealthProbe`] answers one question, "is the service ready right now?",
//! and the [`ReadinessProber`] keeps asking it until the answer is yes or the
//! service's startup window closes.
//!
//! ```text
//!   await_healthy(service, probe, timeout)
//!         │
//!         ▼
//!   ┌──────────────┐  Ready      ┌───────────┐
//!   │ probe.check  │───────────▶│  Ok(())   │
//!   └──────────────┘             └───────────┘
//!      │ NotReady         Err(fatal)
//!      ▼                       │
//!   elapsed >= timeout? ──yes──┼──▶ TimedOut / ProbeFailed
//!      │ no                    │
//!      ▼                       │
//!   sleep(min(interval, remaining)) ─▶ loop
//! ```

mod probes;

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::time::Instant;

pub use probes::{ContainerHealthProbe, HttpProbe, SeleniumStatusProbe, TcpProbe};

/// Default interval between probe attempts.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Outcome of a single probe attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeStatus {
    /// The service is ready to serve traffic.
    Ready,
    /// Not ready yet; the detail is logged at trace level.
    NotReady(String),
}

/// A probe failure that makes further polling pointless (e.g. the container
/// exited).
#[derive(Debug, Clone, Error)]
#[error("{reason}")]
pub struct ProbeError {
    /// What went wrong.
    pub reason: String,
}

impl ProbeError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// Readiness errors. Both are fatal for environment startup.
#[derive(Debug, Error)]
pub enum ReadinessError {
    /// The service never became healthy within its window.
    #[error("Service '{service}' did not become healthy within {waited:?}")]
    TimedOut {
        /// Service name.
        service: String,
        /// How long the prober waited.
        waited: Duration,
    },

    /// The probe reported an unrecoverable condition.
    #[error("Service '{service}' failed readiness check: {source}")]
    ProbeFailed {
        /// Service name.
        service: String,
        #[source]
        source: ProbeError,
    },
}

/// A single readiness signal for a service.
#[async_trait]
pub trait HealthProbe: Send + Sync {
    /// Evaluate the signal once.
    async fn check(&self) -> Result<ProbeStatus, ProbeError>;
}

/// Polls a [`HealthProbe`] until it reports ready or a timeout elapses.
#[derive(Debug, Clone, Copy)]
pub struct ReadinessProber {
    interval: Duration,
}

impl Default for ReadinessProber {
    fn default() -> Self {
        Self::new(DEFAULT_POLL_INTERVAL)
    }
}

impl ReadinessProber {
    /// Create a prober with the given poll interval (clamped to at least 10ms).
    pub fn new(interval: Duration) -> Self {
        Self {
            interval: interval.max(Duration::from_millis(10)),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Block until `probe` reports ready.
    ///
    /// Returns [`ReadinessError::TimedOut`] only after at least `timeout` has
    /// elapsed. A fatal [`ProbeError`] ends the wait immediately. A timeout
    /// too large to represent as an instant never expires.
    pub async fn await_healthy(
        &self,
        service: &str,
        probe: &dyn HealthProbe,
        timeout: Duration,
    ) -> Result<(), ReadinessError> {
        let start = Instant::now();
        let deadline = start.checked_add(timeout);
        let mut attempts: u64 = 0;

        tracing::info!("Waiting up to {:?} for '{}' to become healthy", timeout, service);

        loop {
            attempts += 1;
            match probe.check().await {
                Ok(ProbeStatus::Ready) => {
                    tracing::info!(
                        "Service '{}' healthy after {:?} ({} attempts)",
                        service,
                        start.elapsed(),
                        attempts
                    );
                    return Ok(());
                }
                Ok(ProbeStatus::NotReady(detail)) => {
                    tracing::trace!("'{}' not ready (attempt {}): {}", service, attempts, detail);
                }
                Err(source) => {
                    tracing::error!("Readiness probe for '{}' failed: {}", service, source);
                    return Err(ReadinessError::ProbeFailed {
                        service: service.to_string(),
                        source,
                    });
                }
            }

            let now = Instant::now();
            let remaining = match deadline {
                Some(deadline) if now >= deadline => {
                    let waited = now.duration_since(start);
                    tracing::error!("Service '{}' not healthy after {:?}", service, waited);
                    return Err(ReadinessError::TimedOut {
                        service: service.to_string(),
                        waited,
                    });
                }
                Some(deadline) => deadline - now,
                None => self.interval,
            };

            tokio::time::sleep(self.interval.min(remaining)).await;
        }
    }
}
