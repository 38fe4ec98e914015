//! Error types for the container topology.

use thiserror::Error;

use crate::readiness::ReadinessError;

/// Result type for topology operations.
pub type Result<T> = std::result::Result<T, TopologyError>;

/// Errors raised by a [`ContainerTopology`](super::ContainerTopology).
#[derive(Debug, Error)]
pub enum TopologyError {
    /// Docker is not reachable.
    #[error("Docker not available: {reason}")]
    DockerNotAvailable {
        /// Reason why Docker is unavailable.
        reason: String,
    },

    /// A `docker compose` invocation failed.
    #[error("docker compose {command} failed: {reason}")]
    ComposeFailed {
        /// Subcommand that failed (`pull`, `up`, `down`).
        command: String,
        /// Captured stderr or spawn error.
        reason: String,
    },

    /// `compose up` finished but a declared service has no container.
    #[error("No container found for service '{service}' in project '{project}'")]
    ContainerNotFound {
        /// Service name.
        service: String,
        /// Compose project name.
        project: String,
    },

    /// A service did not become healthy.
    #[error(transparent)]
    Readiness(#[from] ReadinessError),

    /// Port lookup before `start()` completed.
    #[error("Port for service '{service}' queried before the topology started")]
    NotStarted {
        /// Service name.
        service: String,
    },

    /// The service does not publish the requested port.
    #[error("Service '{service}' does not expose port {port}")]
    PortNotExposed {
        /// Service name.
        service: String,
        /// Internal port.
        port: u16,
    },

    /// Docker API call failed.
    #[error("Docker API error: {0}")]
    Docker(#[from] bollard::errors::Error),
}
