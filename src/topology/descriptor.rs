//! Static declarations of the services in a topology.

use std::time::Duration;

/// How a service signals readiness.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum HealthCheck {
    /// No health check (ready once the container is up).
    None,
    /// Docker-reported health status of the container's HEALTHCHECK.
    #[default]
    Runtime,
    /// HTTP GET against the published port.
    Http {
        /// Path to check (e.g. "/health").
        path: String,
    },
    /// TCP connect against the published port.
    Tcp,
}

impl HealthCheck {
    pub fn is_none(&self) -> bool {
        matches!(self, HealthCheck::None)
    }
}

/// A service in the composition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceDescriptor {
    /// Compose service name.
    pub name: String,
    /// Port the service listens on inside its container.
    pub internal_port: u16,
    /// Readiness signal.
    pub health_check: HealthCheck,
    /// Upper bound on time-to-healthy.
    pub startup_timeout: Duration,
}

impl ServiceDescriptor {
    pub fn new(name: impl Into<String>, internal_port: u16) -> Self {
        Self {
            name: name.into(),
            internal_port,
            health_check: HealthCheck::default(),
            startup_timeout: Duration::from_secs(60 * 60),
        }
    }

    pub fn with_health_check(mut self, health_check: HealthCheck) -> Self {
        self.health_check = health_check;
        self
    }

    pub fn with_startup_timeout(mut self, timeout: Duration) -> Self {
        self.startup_timeout = timeout;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_runtime_health_and_an_hour() {
        let d = ServiceDescriptor::new("myappl", 8080);
        assert_eq!(d.health_check, HealthCheck::Runtime);
        assert_eq!(d.startup_timeout, Duration::from_secs(3600));
    }

    #[test]
    fn builder_overrides() {
        let d = ServiceDescriptor::new("api", 80)
            .with_health_check(HealthCheck::Http {
                path: "/health".to_string(),
            })
            .with_startup_timeout(Duration::from_secs(30));
        assert!(!d.health_check.is_none());
        assert_eq!(d.startup_timeout, Duration::from_secs(30));
    }
}
