//! Multi-service application stack under test.
//!
//! The stack is described by a compose file and driven through the
//! [`ContainerTopology`] trait so the environment controller can be exercised
//! against fakes (see [`crate::testing::StubTopology`]).

pub mod compose;
pub mod descriptor;
pub mod error;

use async_trait::async_trait;

pub use compose::ComposeTopology;
pub use descriptor::{HealthCheck, ServiceDescriptor};
pub use error::{Result, TopologyError};

/// Lifecycle state of one service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceState {
    /// Not started yet.
    NotStarted,
    /// Containers are up, waiting for health.
    Starting,
    /// Reported healthy.
    Healthy,
    /// Failed to start or never became healthy.
    Failed,
    /// Stopped and removed.
    Stopped,
}

/// The application stack as seen by the environment controller.
#[async_trait]
pub trait ContainerTopology: Send + Sync {
    /// Descriptor for `service`, if declared.
    fn descriptor(&self, service: &str) -> Option<&ServiceDescriptor>;

    /// Start every service and block until each declared health check passes.
    ///
    /// Not idempotent on its own; callers go through the
    /// [`Gatekeeper`](crate::lifecycle::Gatekeeper).
    async fn start(&self) -> Result<()>;

    /// Host port published for `service`'s `internal_port`.
    ///
    /// Fails with [`TopologyError::NotStarted`] before `start()` completes.
    async fn resolved_port(&self, service: &str, internal_port: u16) -> Result<u16>;

    /// Stop and remove every service.
    async fn stop(&self);
}
