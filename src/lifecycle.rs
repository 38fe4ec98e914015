//! One environment per process.
//!
//! The [`Gatekeeper`] runs the environment factory at most once, no matter
//! how many tests call [`acquire`](Gatekeeper::acquire) concurrently, and
//! remembers a failure so later tests fail fast instead of starting another
//! stack.
//!
//! ```text
//!   Uninitialized ──acquire──▶ Initializing ──ok──▶ Initialized
//!                                   │
//!                                   └──err──▶ Failed (sticky)
//! ```
//!
//! Keep a process-wide instance in a `static`. The first successful
//! `acquire` registers a process-exit hook that tears the environment down
//! if no test called [`shutdown`](Gatekeeper::shutdown):
//!
//! ```rust,no_run
//! use std::sync::LazyLock;
//! use e2e_testbed::lifecycle::Gatekeeper;
//!
//! static ENV: LazyLock<Gatekeeper> = LazyLock::new(Gatekeeper::from_env);
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let env = ENV.acquire().await?;
//! println!("application at {}", env.base_url);
//! # Ok(())
//! # }
//! ```

use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, MutexGuard};

use tokio::sync::Mutex;

use crate::config::EnvironmentConfig;
use crate::environment::{Environment, EnvironmentController};
use crate::error::{EnvironmentError, Result};
use crate::watcher::{RunOutcome, TestWatcher};

/// Builds the controller on first use.
type ControllerFactory = Box<dyn FnOnce() -> Result<EnvironmentController> + Send>;

/// Where the gatekeeper is in its one-shot lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum GateState {
    Uninitialized = 0,
    Initializing = 1,
    Initialized = 2,
    Failed = 3,
}

impl GateState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => GateState::Initializing,
            2 => GateState::Initialized,
            3 => GateState::Failed,
            _ => GateState::Uninitialized,
        }
    }
}

#[derive(Default)]
struct Slot {
    factory: Option<ControllerFactory>,
    controller: Option<Arc<EnvironmentController>>,
    environment: Option<Arc<Environment>>,
    failure: Option<String>,
}

/// Teardown owed at process exit by a gatekeeper that started an
/// environment.
struct ExitTeardown {
    controller: Arc<EnvironmentController>,
    outcome: RunOutcome,
    torn_down: Arc<AtomicBool>,
}

impl ExitTeardown {
    async fn run(self) {
        if self.torn_down.swap(true, Ordering::SeqCst) {
            return;
        }
        tracing::info!(
            "Tearing down test environment at exit ({} failed tests)",
            self.outcome.failures()
        );
        self.controller.teardown(self.outcome.failed()).await;
    }
}

static EXIT_TEARDOWNS: std::sync::Mutex<Vec<ExitTeardown>> = std::sync::Mutex::new(Vec::new());

fn exit_teardowns() -> MutexGuard<'static, Vec<ExitTeardown>> {
    EXIT_TEARDOWNS
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Run every pending exit teardown. Called from the process-exit hook; safe
/// to call earlier, each environment is torn down at most once.
pub fn run_exit_teardowns() {
    let pending = std::mem::take(&mut *exit_teardowns());
    if pending.is_empty() {
        return;
    }
    block_on_dedicated(async move {
        for teardown in pending {
            teardown.run().await;
        }
    });
}

#[ctor::dtor]
fn teardown_at_exit() {
    run_exit_teardowns();
}

/// Drive `future` on a fresh thread and runtime, for callers outside any
/// runtime.
fn block_on_dedicated<F>(future: F)
where
    F: Future<Output = ()> + Send,
{
    std::thread::scope(|scope| {
        scope.spawn(move || {
            match tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
            {
                Ok(runtime) => runtime.block_on(future),
                Err(e) => tracing::error!("Cannot build teardown runtime: {}", e),
            }
        });
    });
}

/// Serializes environment startup and owns teardown.
pub struct Gatekeeper {
    slot: Mutex<Slot>,
    state: AtomicU8,
    torn_down: Arc<AtomicBool>,
    outcome: RunOutcome,
}

impl Gatekeeper {
    pub fn new<F>(factory: F) -> Self
    where
        F: FnOnce() -> Result<EnvironmentController> + Send + 'static,
    {
        Self {
            slot: Mutex::new(Slot {
                factory: Some(Box::new(factory)),
                ..Default::default()
            }),
            state: AtomicU8::new(GateState::Uninitialized as u8),
            torn_down: Arc::new(AtomicBool::new(false)),
            outcome: RunOutcome::new(),
        }
    }

    /// Gatekeeper over the Docker-backed environment described by the
    /// process environment (and `.env`).
    pub fn from_env() -> Self {
        Self::new(|| {
            let config = EnvironmentConfig::from_env()?;
            Ok(EnvironmentController::from_config(&config)?)
        })
    }

    pub fn state(&self) -> GateState {
        GateState::from_u8(self.state.load(Ordering::SeqCst))
    }

    fn set_state(&self, state: GateState) {
        self.state.store(state as u8, Ordering::SeqCst);
    }

    /// Ledger of test failures; decides whether recordings are kept.
    pub fn outcome(&self) -> &RunOutcome {
        &self.outcome
    }

    /// A watcher feeding this gatekeeper's ledger.
    pub fn watcher(&self) -> TestWatcher {
        TestWatcher::new(self.outcome.clone())
    }

    /// Return the shared environment, starting it on the first call.
    ///
    /// Concurrent callers wait for the first one to finish. After a failure
    /// every caller gets [`EnvironmentError::PreviouslyFailed`].
    pub async fn acquire(&self) -> Result<Arc<Environment>> {
        let mut slot = self.slot.lock().await;

        if self.torn_down.load(Ordering::SeqCst) {
            return Err(EnvironmentError::ShutDown);
        }
        if let Some(env) = &slot.environment {
            return Ok(Arc::clone(env));
        }
        if let Some(reason) = &slot.failure {
            return Err(EnvironmentError::PreviouslyFailed {
                reason: reason.clone(),
            });
        }

        let Some(factory) = slot.factory.take() else {
            return Err(EnvironmentError::PreviouslyFailed {
                reason: "environment factory already consumed".to_string(),
            });
        };

        self.set_state(GateState::Initializing);
        tracing::info!("Initializing test environment");

        let started = match factory() {
            Ok(controller) => {
                let controller = Arc::new(controller);
                let initialized = controller.initialize().await;
                initialized.map(|env| (controller, env))
            }
            Err(e) => Err(e),
        };

        match started {
            Ok((controller, env)) => {
                exit_teardowns().push(ExitTeardown {
                    controller: Arc::clone(&controller),
                    outcome: self.outcome.clone(),
                    torn_down: Arc::clone(&self.torn_down),
                });
                slot.controller = Some(controller);
                slot.environment = Some(Arc::clone(&env));
                self.set_state(GateState::Initialized);
                Ok(env)
            }
            Err(e) => {
                tracing::error!("Test environment failed to start: {}", e);
                slot.failure = Some(e.to_string());
                self.set_state(GateState::Failed);
                Err(e)
            }
        }
    }

    /// Number of process-exit teardowns pending for this gatekeeper.
    pub fn exit_teardowns_registered(&self) -> usize {
        exit_teardowns()
            .iter()
            .filter(|t| Arc::ptr_eq(&t.torn_down, &self.torn_down))
            .count()
    }

    fn take_exit_teardowns(&self) -> Vec<ExitTeardown> {
        let mut registry = exit_teardowns();
        let (mine, others): (Vec<_>, Vec<_>) = std::mem::take(&mut *registry)
            .into_iter()
            .partition(|t| Arc::ptr_eq(&t.torn_down, &self.torn_down));
        *registry = others;
        mine
    }

    /// Tear the environment down. Runs at most once; later calls are no-ops.
    pub async fn shutdown(&self) {
        drop(self.take_exit_teardowns());
        if self.torn_down.swap(true, Ordering::SeqCst) {
            return;
        }

        let controller = {
            let mut slot = self.slot.lock().await;
            slot.environment = None;
            slot.controller.take()
        };

        if let Some(controller) = controller {
            let failed = self.outcome.failed();
            tracing::info!(
                "Tearing down test environment ({} failed tests)",
                self.outcome.failures()
            );
            controller.teardown(failed).await;
        }
    }

    /// [`shutdown`](Self::shutdown) on a dedicated thread and runtime, for
    /// process-exit hooks where no runtime is running.
    pub fn shutdown_blocking(&self) {
        block_on_dedicated(self.shutdown());
    }
}

impl Drop for Gatekeeper {
    fn drop(&mut self) {
        if self.state() == GateState::Initialized && !self.torn_down.load(Ordering::SeqCst) {
            tracing::warn!("Gatekeeper dropped without shutdown(), containers may remain running");
        }
    }
}
