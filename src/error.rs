//! Top-level error types.

use std::path::PathBuf;

use thiserror::Error;

use crate::readiness::ReadinessError;
use crate::sidecar::SidecarError;
use crate::topology::TopologyError;
use crate::webdriver::WebDriverError;

/// Configuration errors. Always fatal, never retried.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Browser selection is not one of the supported kinds.
    #[error("Unsupported browser type: '{value}' (expected 'chrome' or 'firefox')")]
    UnsupportedBrowser {
        /// The offending value.
        value: String,
    },

    /// A service referenced by the environment has no descriptor, or the
    /// compose file does not declare it.
    #[error("Missing service descriptor for '{service}': {hint}")]
    MissingService {
        /// Service name.
        service: String,
        /// What to fix.
        hint: String,
    },

    /// A variable is set but cannot be parsed.
    #[error("Invalid value for {key}: {message}")]
    InvalidValue {
        /// Variable name.
        key: String,
        /// Parse failure.
        message: String,
    },

    /// The compose file could not be read or parsed.
    #[error("Compose file {path}: {reason}")]
    ComposeFile {
        /// Path of the compose file.
        path: PathBuf,
        /// Reason for failure.
        reason: String,
    },

    /// The working directory could not be determined.
    #[error("Cannot determine working directory: {0}")]
    WorkingDir(#[from] std::io::Error),
}

/// Errors surfaced by environment initialization.
///
/// Every variant aborts the run: the environment is shared process-wide, so a
/// failed initialization leaves nothing a later test can use.
#[derive(Debug, Error)]
pub enum EnvironmentError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Container topology failed: {0}")]
    Topology(#[from] TopologyError),

    #[error("Browser sidecar failed: {0}")]
    Sidecar(#[from] SidecarError),

    #[error("Browser session failed: {0}")]
    WebDriver(#[from] WebDriverError),

    #[error(transparent)]
    Readiness(#[from] ReadinessError),

    /// An earlier initialization attempt failed in this process.
    #[error("Environment initialization already failed in this process: {reason}")]
    PreviouslyFailed {
        /// Message of the original failure.
        reason: String,
    },

    /// The environment was torn down; it is never restarted.
    #[error("Environment has been shut down")]
    ShutDown,
}

/// Result type for environment operations.
pub type Result<T> = std::result::Result<T, EnvironmentError>;
