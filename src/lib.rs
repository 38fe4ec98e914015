//! Disposable end-to-end test environment.
//!
//! Starts the application stack from a compose file, starts a Selenium
//! browser container next to it, and hands tests a browser session already
//! pointed at the application. One environment is shared by every test in
//! the process through a [`lifecycle::Gatekeeper`].

pub mod config;
pub mod docker;
pub mod environment;
pub mod error;
pub mod lifecycle;
pub mod logging;
pub mod readiness;
pub mod sidecar;
pub mod testing;
pub mod topology;
pub mod watcher;
pub mod webdriver;

pub use environment::{Environment, EnvironmentController};
pub use error::{ConfigError, EnvironmentError};
pub use lifecycle::{GateState, Gatekeeper};
