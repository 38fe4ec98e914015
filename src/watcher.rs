//! Per-test banners and the run's pass/fail ledger.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Instant;

/// Whether any watched test failed during this run.
///
/// Shared between the [`TestWatcher`] and the
/// [`Gatekeeper`](crate::lifecycle::Gatekeeper), which hands it to the
/// recorder at teardown.
#[derive(Debug, Clone, Default)]
pub struct RunOutcome {
    failed: Arc<AtomicBool>,
    failures: Arc<AtomicU32>,
}

impl RunOutcome {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_failure(&self) {
        self.failed.store(true, Ordering::SeqCst);
        self.failures.fetch_add(1, Ordering::SeqCst);
    }

    pub fn failed(&self) -> bool {
        self.failed.load(Ordering::SeqCst)
    }

    /// Number of failed tests.
    pub fn failures(&self) -> u32 {
        self.failures.load(Ordering::SeqCst)
    }
}

/// Logs start/finish banners for tests and records failures.
#[derive(Debug, Clone)]
pub struct TestWatcher {
    base_module: Option<String>,
    outcome: RunOutcome,
}

impl TestWatcher {
    pub fn new(outcome: RunOutcome) -> Self {
        Self {
            base_module: None,
            outcome,
        }
    }

    /// Module path stripped from test names (e.g. `"my_suite::ui"`).
    pub fn with_base_module(mut self, base_module: impl Into<String>) -> Self {
        self.base_module = Some(base_module.into());
        self
    }

    pub fn outcome(&self) -> &RunOutcome {
        &self.outcome
    }

    /// Short name for a fully qualified test path.
    ///
    /// Strips the base module when the path starts with it, otherwise keeps
    /// the last `::` segment.
    pub fn test_case_name(&self, full_name: &str) -> String {
        if let Some(base) = &self.base_module
            && let Some(rest) = full_name.strip_prefix(base.as_str())
            && let Some(rest) = rest.strip_prefix("::")
            && !rest.is_empty()
        {
            return rest.to_string();
        }
        full_name
            .rsplit("::")
            .next()
            .unwrap_or(full_name)
            .to_string()
    }

    /// Log the start banner and return a guard that logs the result on drop.
    ///
    /// A guard dropped while its thread is panicking counts as a failure.
    pub fn watch(&self, full_name: &str) -> TestGuard {
        let name = self.test_case_name(full_name);
        tracing::info!("-------- Starting test: {} --------", name);
        TestGuard {
            name,
            outcome: self.outcome.clone(),
            started: Instant::now(),
        }
    }
}

/// Reports a test's result when dropped.
#[must_use = "the result is reported when the guard is dropped"]
pub struct TestGuard {
    name: String,
    outcome: RunOutcome,
    started: Instant,
}

impl TestGuard {
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Drop for TestGuard {
    fn drop(&mut self) {
        let elapsed = self.started.elapsed();
        if std::thread::panicking() {
            self.outcome.record_failure();
            tracing::error!("-------- Test failed: {} ({:?}) --------", self.name, elapsed);
        } else {
            tracing::info!("-------- Test succeeded: {} ({:?}) --------", self.name, elapsed);
        }
    }
}
