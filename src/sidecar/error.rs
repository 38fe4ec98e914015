//! Error types for the browser sidecar.

use thiserror::Error;

use crate::readiness::ReadinessError;

/// Result type for sidecar operations.
pub type Result<T> = std::result::Result<T, SidecarError>;

/// Errors that can occur while managing the browser sidecar.
#[derive(Debug, Error)]
pub enum SidecarError {
    /// Docker is not available.
    #[error("Docker not available: {reason}")]
    DockerNotAvailable {
        /// Reason why Docker is unavailable.
        reason: String,
    },

    /// Failed to pull the image.
    #[error("Failed to pull image '{image}': {reason}")]
    ImagePullFailed {
        /// Image name.
        image: String,
        /// Reason for failure.
        reason: String,
    },

    /// Failed to create or attach the shared network.
    #[error("Failed to prepare network '{network}': {reason}")]
    NetworkFailed {
        /// Network name.
        network: String,
        /// Reason for failure.
        reason: String,
    },

    /// Failed to create the container.
    #[error("Failed to create container '{name}': {reason}")]
    ContainerCreationFailed {
        /// Container name.
        name: String,
        /// Reason for failure.
        reason: String,
    },

    /// Failed to start the container.
    #[error("Failed to start container '{name}': {reason}")]
    ContainerStartFailed {
        /// Container name.
        name: String,
        /// Reason for failure.
        reason: String,
    },

    /// Docker did not publish an expected port.
    #[error("Container '{name}' has no host binding for port {port}")]
    PortNotPublished {
        /// Container name.
        name: String,
        /// Container port.
        port: u16,
    },

    /// The driver never reported ready.
    #[error(transparent)]
    Readiness(#[from] ReadinessError),

    /// A previous start attempt failed; the sidecar is not retried.
    #[error("Browser sidecar '{name}' failed to start earlier in this run")]
    PreviouslyFailed {
        /// Container name.
        name: String,
    },

    /// I/O error (results directories, recordings).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
