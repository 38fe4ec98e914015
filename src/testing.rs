//! In-process fakes for the environment's runtime dependencies.
//!
//! Provides:
//! - [`StubTopology`]: a container topology with fixed published ports
//! - [`StubSidecar`]: a browser sidecar that never touches Docker
//! - [`StubBrowser`] / [`StubSession`]: a WebDriver endpoint that records
//!   navigation
//! - [`StubProbe`]: a health probe that turns ready after N checks
//!
//! # Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use e2e_testbed::config::{BrowserKind, DEFAULT_HOST_BRIDGE};
//! use e2e_testbed::environment::EnvironmentController;
//! use e2e_testbed::testing::{StubBrowser, StubSidecar, StubTopology};
//! use e2e_testbed::topology::ServiceDescriptor;
//!
//! # async fn example() -> e2e_testbed::error::Result<()> {
//! let topology = Arc::new(StubTopology::new().with_service(ServiceDescriptor::new("myappl", 8080), 54321));
//! let controller = EnvironmentController::new(
//!     topology,
//!     Arc::new(StubSidecar::new(BrowserKind::Chrome)),
//!     Arc::new(StubBrowser::new()),
//!     DEFAULT_HOST_BRIDGE,
//!     "myappl",
//!     8080,
//! );
//! let env = controller.initialize().await?;
//! assert_eq!(env.base_url, "http://172.17.0.1:54321/");
//! # Ok(())
//! # }
//! ```

use std::collections::HashMap;
use std::io;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;

use crate::config::BrowserKind;
use crate::readiness::{HealthProbe, ProbeError, ProbeStatus, ReadinessProber};
use crate::sidecar::{self, BrowserSidecar, Capabilities, DriverEndpoint, SidecarError};
use crate::topology::{self, ContainerTopology, ServiceDescriptor, TopologyError};
use crate::webdriver::{self, BrowserSession, RemoteBrowser, WebDriverError};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// A probe that reports ready after a fixed number of checks.
pub struct StubProbe {
    ready_after: Option<u32>,
    checks: AtomicU32,
}

impl StubProbe {
    /// Ready on the `n`th check (1 = immediately).
    pub fn ready_after(n: u32) -> Self {
        Self {
            ready_after: Some(n),
            checks: AtomicU32::new(0),
        }
    }

    /// Never ready.
    pub fn never_ready() -> Self {
        Self {
            ready_after: None,
            checks: AtomicU32::new(0),
        }
    }

    pub fn checks(&self) -> u32 {
        self.checks.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl HealthProbe for StubProbe {
    async fn check(&self) -> Result<ProbeStatus, ProbeError> {
        let n = self.checks.fetch_add(1, Ordering::Relaxed) + 1;
        match self.ready_after {
            Some(limit) if n >= limit => Ok(ProbeStatus::Ready),
            _ => Ok(ProbeStatus::NotReady(format!("check {}", n))),
        }
    }
}

/// A topology whose services are "published" on fixed host ports.
///
/// Supports:
/// - Start/stop counting via [`starts()`](Self::starts) and [`stops()`](Self::stops)
/// - A readiness probe polled for every service on start
/// - Runtime failure toggling via [`set_failing()`](Self::set_failing)
pub struct StubTopology {
    services: Vec<ServiceDescriptor>,
    ports: HashMap<(String, u16), u16>,
    probe: Option<Arc<dyn HealthProbe>>,
    prober: ReadinessProber,
    start_count: AtomicU32,
    stop_count: AtomicU32,
    started: AtomicBool,
    should_fail: AtomicBool,
}

impl Default for StubTopology {
    fn default() -> Self {
        Self::new()
    }
}

impl StubTopology {
    pub fn new() -> Self {
        Self {
            services: Vec::new(),
            ports: HashMap::new(),
            probe: None,
            prober: ReadinessProber::new(Duration::from_millis(100)),
            start_count: AtomicU32::new(0),
            stop_count: AtomicU32::new(0),
            started: AtomicBool::new(false),
            should_fail: AtomicBool::new(false),
        }
    }

    /// Declare a service whose internal port is published on `host_port`.
    pub fn with_service(mut self, descriptor: ServiceDescriptor, host_port: u16) -> Self {
        self.ports
            .insert((descriptor.name.clone(), descriptor.internal_port), host_port);
        self.services.push(descriptor);
        self
    }

    /// Poll `probe` for every service during `start()`.
    pub fn with_probe(mut self, probe: Arc<dyn HealthProbe>) -> Self {
        self.probe = Some(probe);
        self
    }

    pub fn with_prober(mut self, prober: ReadinessProber) -> Self {
        self.prober = prober;
        self
    }

    pub fn starts(&self) -> u32 {
        self.start_count.load(Ordering::Relaxed)
    }

    pub fn stops(&self) -> u32 {
        self.stop_count.load(Ordering::Relaxed)
    }

    pub fn is_running(&self) -> bool {
        self.started.load(Ordering::Relaxed)
    }

    pub fn set_failing(&self, fail: bool) {
        self.should_fail.store(fail, Ordering::Relaxed);
    }
}

#[async_trait]
impl ContainerTopology for StubTopology {
    fn descriptor(&self, service: &str) -> Option<&ServiceDescriptor> {
        self.services.iter().find(|s| s.name == service)
    }

    async fn start(&self) -> topology::Result<()> {
        self.start_count.fetch_add(1, Ordering::Relaxed);
        if self.should_fail.load(Ordering::Relaxed) {
            return Err(TopologyError::ComposeFailed {
                command: "up".to_string(),
                reason: "stub failure".to_string(),
            });
        }

        if let Some(probe) = &self.probe {
            for service in &self.services {
                self.prober
                    .await_healthy(&service.name, probe.as_ref(), service.startup_timeout)
                    .await?;
            }
        }

        self.started.store(true, Ordering::Relaxed);
        Ok(())
    }

    async fn resolved_port(&self, service: &str, internal_port: u16) -> topology::Result<u16> {
        if !self.started.load(Ordering::Relaxed) {
            return Err(TopologyError::NotStarted {
                service: service.to_string(),
            });
        }
        self.ports
            .get(&(service.to_string(), internal_port))
            .copied()
            .ok_or_else(|| TopologyError::PortNotExposed {
                service: service.to_string(),
                port: internal_port,
            })
    }

    async fn stop(&self) {
        self.stop_count.fetch_add(1, Ordering::Relaxed);
        self.started.store(false, Ordering::Relaxed);
    }
}

/// A browser sidecar that is "ready" immediately.
pub struct StubSidecar {
    browser: BrowserKind,
    capabilities: Capabilities,
    endpoint: DriverEndpoint,
    vnc_address: Option<String>,
    start_count: AtomicU32,
    stop_count: AtomicU32,
    stopped_failed: AtomicBool,
    started: AtomicBool,
    should_fail: AtomicBool,
}

impl StubSidecar {
    pub fn new(browser: BrowserKind) -> Self {
        Self {
            browser,
            capabilities: Capabilities::configure(browser, Path::new("/work")),
            endpoint: DriverEndpoint::new("127.0.0.1", sidecar::DRIVER_PORT),
            vnc_address: Some(sidecar::config::vnc_address("127.0.0.1", sidecar::VNC_PORT)),
            start_count: AtomicU32::new(0),
            stop_count: AtomicU32::new(0),
            stopped_failed: AtomicBool::new(false),
            started: AtomicBool::new(false),
            should_fail: AtomicBool::new(false),
        }
    }

    /// Report no VNC address.
    pub fn without_diagnostics(mut self) -> Self {
        self.vnc_address = None;
        self
    }

    pub fn starts(&self) -> u32 {
        self.start_count.load(Ordering::Relaxed)
    }

    pub fn stops(&self) -> u32 {
        self.stop_count.load(Ordering::Relaxed)
    }

    /// Outcome passed to the last `stop()`.
    pub fn stopped_failed(&self) -> bool {
        self.stopped_failed.load(Ordering::Relaxed)
    }

    pub fn set_failing(&self, fail: bool) {
        self.should_fail.store(fail, Ordering::Relaxed);
    }
}

#[async_trait]
impl BrowserSidecar for StubSidecar {
    fn browser(&self) -> BrowserKind {
        self.browser
    }

    fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    async fn start(&self) -> sidecar::Result<DriverEndpoint> {
        self.start_count.fetch_add(1, Ordering::Relaxed);
        if self.should_fail.load(Ordering::Relaxed) {
            return Err(SidecarError::ContainerStartFailed {
                name: format!("stub-{}", self.browser),
                reason: "stub failure".to_string(),
            });
        }
        self.started.store(true, Ordering::Relaxed);
        Ok(self.endpoint.clone())
    }

    async fn diagnostic_address(&self) -> Option<String> {
        if self.started.load(Ordering::Relaxed) {
            self.vnc_address.clone()
        } else {
            None
        }
    }

    async fn stop(&self, failed: bool) {
        self.stop_count.fetch_add(1, Ordering::Relaxed);
        self.stopped_failed.store(failed, Ordering::Relaxed);
        self.started.store(false, Ordering::Relaxed);
    }
}

/// How a [`StubSession`] fails navigation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StubNavigationError {
    /// The page loads but the driver resets the socket while answering.
    SocketReset,
    /// The driver reports a WebDriver error.
    Protocol,
}

/// A session that records what it was asked to do.
pub struct StubSession {
    id: String,
    current_url: Mutex<String>,
    navigations: Mutex<Vec<String>>,
    maximize_count: AtomicU32,
    closed: AtomicBool,
    navigation_error: Option<StubNavigationError>,
}

impl StubSession {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            current_url: Mutex::new("about:blank".to_string()),
            navigations: Mutex::new(Vec::new()),
            maximize_count: AtomicU32::new(0),
            closed: AtomicBool::new(false),
            navigation_error: None,
        }
    }

    pub fn with_navigation_error(mut self, kind: StubNavigationError) -> Self {
        self.navigation_error = Some(kind);
        self
    }

    /// Every URL passed to `navigate`, in order.
    pub fn navigations(&self) -> Vec<String> {
        lock(&self.navigations).clone()
    }

    pub fn maximizes(&self) -> u32 {
        self.maximize_count.load(Ordering::Relaxed)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl BrowserSession for StubSession {
    fn id(&self) -> &str {
        &self.id
    }

    async fn maximize_window(&self) -> webdriver::Result<()> {
        self.maximize_count.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    async fn navigate(&self, url: &str) -> webdriver::Result<()> {
        lock(&self.navigations).push(url.to_string());
        match self.navigation_error {
            None => {
                *lock(&self.current_url) = url.to_string();
                Ok(())
            }
            Some(StubNavigationError::SocketReset) => {
                *lock(&self.current_url) = url.to_string();
                Err(WebDriverError::transport(
                    "navigate",
                    io::Error::new(io::ErrorKind::ConnectionReset, "connection reset by peer"),
                ))
            }
            Some(StubNavigationError::Protocol) => Err(WebDriverError::Protocol {
                command: "navigate".to_string(),
                error: "unknown error".to_string(),
                message: format!("net::ERR_CONNECTION_REFUSED at {}", url),
            }),
        }
    }

    async fn current_url(&self) -> webdriver::Result<String> {
        Ok(lock(&self.current_url).clone())
    }

    async fn close(&self) -> webdriver::Result<()> {
        self.closed.store(true, Ordering::Relaxed);
        Ok(())
    }
}

/// A remote browser that hands out one shared [`StubSession`].
pub struct StubBrowser {
    session: Arc<StubSession>,
    open_count: AtomicU32,
    endpoints: Mutex<Vec<DriverEndpoint>>,
    capabilities: Mutex<Vec<Capabilities>>,
    should_fail: AtomicBool,
}

impl Default for StubBrowser {
    fn default() -> Self {
        Self::new()
    }
}

impl StubBrowser {
    pub fn new() -> Self {
        Self::with_session(StubSession::new("stub-session"))
    }

    pub fn with_session(session: StubSession) -> Self {
        Self {
            session: Arc::new(session),
            open_count: AtomicU32::new(0),
            endpoints: Mutex::new(Vec::new()),
            capabilities: Mutex::new(Vec::new()),
            should_fail: AtomicBool::new(false),
        }
    }

    pub fn session(&self) -> Arc<StubSession> {
        Arc::clone(&self.session)
    }

    pub fn opens(&self) -> u32 {
        self.open_count.load(Ordering::Relaxed)
    }

    /// Endpoints sessions were requested from.
    pub fn endpoints(&self) -> Vec<DriverEndpoint> {
        lock(&self.endpoints).clone()
    }

    /// Capabilities of the last session request.
    pub fn last_capabilities(&self) -> Option<Capabilities> {
        lock(&self.capabilities).last().cloned()
    }

    pub fn set_failing(&self, fail: bool) {
        self.should_fail.store(fail, Ordering::Relaxed);
    }
}

#[async_trait]
impl RemoteBrowser for StubBrowser {
    async fn open_session(
        &self,
        endpoint: &DriverEndpoint,
        capabilities: &Capabilities,
    ) -> webdriver::Result<Arc<dyn BrowserSession>> {
        self.open_count.fetch_add(1, Ordering::Relaxed);
        lock(&self.endpoints).push(endpoint.clone());
        lock(&self.capabilities).push(capabilities.clone());
        if self.should_fail.load(Ordering::Relaxed) {
            return Err(WebDriverError::Protocol {
                command: "new_session".to_string(),
                error: "session not created".to_string(),
                message: "stub failure".to_string(),
            });
        }
        Ok(self.session.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn stub_probe_turns_ready() {
        let probe = StubProbe::ready_after(3);
        assert!(matches!(probe.check().await, Ok(ProbeStatus::NotReady(_))));
        assert!(matches!(probe.check().await, Ok(ProbeStatus::NotReady(_))));
        assert_eq!(probe.check().await.unwrap(), ProbeStatus::Ready);
        assert_eq!(probe.checks(), 3);
    }

    #[tokio::test]
    async fn stub_topology_ports() {
        let topology = StubTopology::new().with_service(ServiceDescriptor::new("myappl", 8080), 54321);
        assert!(matches!(
            topology.resolved_port("myappl", 8080).await,
            Err(TopologyError::NotStarted { .. })
        ));
        topology.start().await.unwrap();
        assert_eq!(topology.resolved_port("myappl", 8080).await.unwrap(), 54321);
        assert!(matches!(
            topology.resolved_port("myappl", 9090).await,
            Err(TopologyError::PortNotExposed { port: 9090, .. })
        ));
    }

    #[tokio::test]
    async fn stub_session_socket_reset_still_navigates() {
        let session = StubSession::new("s").with_navigation_error(StubNavigationError::SocketReset);
        let err = session.navigate("http://172.17.0.1:1/").await.unwrap_err();
        assert!(err.is_socket_teardown());
        assert_eq!(session.current_url().await.unwrap(), "http://172.17.0.1:1/");
    }
}
