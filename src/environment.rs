//! Brings up the application stack and the browser, and points the browser
//! at the application.
//!
//! ```text
//!   initialize()
//!      │
//!      ├─▶ topology.start()          (compose up, wait healthy)
//!      ├─▶ sidecar.start()           (selenium, wait /status)
//!      ├─▶ resolved_port(app, port)  ─▶ http://<host_bridge>:<port>/
//!      ├─▶ open_session(endpoint, capabilities)
//!      ├─▶ maximize + navigate(base_url)
//!      ▼
//!   Arc<Environment>
//! ```

use std::fmt;
use std::net::IpAddr;
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::config::{BrowserKind, EnvironmentConfig};
use crate::error::{ConfigError, Result};
use crate::sidecar::{BrowserSidecar, BrowserSidecarConfig, BrowserSidecarManager, DriverEndpoint};
use crate::topology::{ComposeTopology, ContainerTopology, ServiceDescriptor};
use crate::webdriver::{BrowserSession, RemoteBrowser, WebDriverClient, WebDriverError};

/// A running environment: the application URL and a browser session
/// already pointed at it.
pub struct Environment {
    /// `http://<host_bridge>:<port>/`
    pub base_url: String,
    /// The shared browser session.
    pub session: Arc<dyn BrowserSession>,
    /// VNC address for watching the browser, if the sidecar publishes one.
    pub diagnostic_address: Option<String>,
    /// Driver endpoint, for tests that want their own client.
    pub driver_endpoint: DriverEndpoint,
    /// Browser the session runs in.
    pub browser: BrowserKind,
}

impl fmt::Debug for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Environment")
            .field("base_url", &self.base_url)
            .field("session", &self.session.id())
            .field("diagnostic_address", &self.diagnostic_address)
            .field("driver_endpoint", &self.driver_endpoint)
            .field("browser", &self.browser)
            .finish()
    }
}

/// Application URL as seen from inside the browser container.
pub fn base_url(host_bridge: IpAddr, port: u16) -> String {
    format!("http://{}:{}/", host_bridge, port)
}

/// Orchestrates topology, sidecar and session into an [`Environment`].
pub struct EnvironmentController {
    topology: Arc<dyn ContainerTopology>,
    sidecar: Arc<dyn BrowserSidecar>,
    driver: Arc<dyn RemoteBrowser>,
    host_bridge: IpAddr,
    app_service: String,
    app_port: u16,
    environment: Mutex<Option<Arc<Environment>>>,
}

impl EnvironmentController {
    pub fn new(
        topology: Arc<dyn ContainerTopology>,
        sidecar: Arc<dyn BrowserSidecar>,
        driver: Arc<dyn RemoteBrowser>,
        host_bridge: IpAddr,
        app_service: impl Into<String>,
        app_port: u16,
    ) -> Self {
        Self {
            topology,
            sidecar,
            driver,
            host_bridge,
            app_service: app_service.into(),
            app_port,
            environment: Mutex::new(None),
        }
    }

    /// Wire the Docker-backed topology, sidecar and WebDriver client.
    pub fn from_config(config: &EnvironmentConfig) -> std::result::Result<Self, ConfigError> {
        let compose_file = if config.compose_file.is_absolute() {
            config.compose_file.clone()
        } else {
            config.working_dir.join(&config.compose_file)
        };

        let app = ServiceDescriptor::new(config.app_service.clone(), config.app_port)
            .with_startup_timeout(config.app_startup_timeout);
        let topology = ComposeTopology::new(compose_file, vec![app])?
            .with_env(config.forwarded_env.clone())
            .keep_on_shutdown(config.keep_containers);
        let sidecar = BrowserSidecarManager::new(BrowserSidecarConfig::from_environment(config));

        Ok(Self::new(
            Arc::new(topology),
            Arc::new(sidecar),
            Arc::new(WebDriverClient::new()),
            config.host_bridge,
            config.app_service.clone(),
            config.app_port,
        ))
    }

    /// Start everything and return the environment.
    ///
    /// Idempotent: after the first success the same `Arc` is returned without
    /// touching the containers or the browser again. Components that started
    /// before a failure are stopped before the error is returned.
    pub async fn initialize(&self) -> Result<Arc<Environment>> {
        let mut slot = self.environment.lock().await;
        if let Some(env) = slot.as_ref() {
            return Ok(Arc::clone(env));
        }

        let env = Arc::new(self.start().await?);
        *slot = Some(Arc::clone(&env));
        Ok(env)
    }

    async fn start(&self) -> Result<Environment> {
        if self.topology.descriptor(&self.app_service).is_none() {
            return Err(ConfigError::MissingService {
                service: self.app_service.clone(),
                hint: "declare it in the container topology".to_string(),
            }
            .into());
        }

        if let Err(e) = self.topology.start().await {
            self.topology.stop().await;
            return Err(e.into());
        }

        let driver_endpoint = match self.sidecar.start().await {
            Ok(endpoint) => endpoint,
            Err(e) => {
                self.stop_components(true).await;
                return Err(e.into());
            }
        };

        match self.connect(driver_endpoint).await {
            Ok(env) => Ok(env),
            Err(e) => {
                self.stop_components(true).await;
                Err(e)
            }
        }
    }

    /// Resolve the application URL, open the session and navigate.
    async fn connect(&self, driver_endpoint: DriverEndpoint) -> Result<Environment> {
        let port = self
            .topology
            .resolved_port(&self.app_service, self.app_port)
            .await?;
        let base_url = base_url(self.host_bridge, port);

        let session = self
            .driver
            .open_session(&driver_endpoint, self.sidecar.capabilities())
            .await?;

        let diagnostic_address = self.sidecar.diagnostic_address().await;
        if let Some(address) = &diagnostic_address {
            log_banner(&format!("Watch the browser with a VNC client at {}", address));
        }

        if let Err(e) = self.point_browser(session.as_ref(), &base_url).await {
            if let Err(close_err) = session.close().await {
                tracing::debug!("Closing session after failed navigation: {}", close_err);
            }
            return Err(e.into());
        }
        log_banner(&format!("Surfed to the server at {}", base_url));

        tracing::info!(
            "Environment ready: {} session {} at {}",
            self.sidecar.browser(),
            session.id(),
            base_url
        );
        log_banner("Started Environment successfully");

        Ok(Environment {
            base_url,
            session,
            diagnostic_address,
            driver_endpoint,
            browser: self.sidecar.browser(),
        })
    }

    async fn point_browser(
        &self,
        session: &dyn BrowserSession,
        base_url: &str,
    ) -> std::result::Result<(), WebDriverError> {
        tolerate_socket_teardown("maximize window", session.maximize_window().await)?;
        tracing::info!("Navigating to {}", base_url);
        tolerate_socket_teardown("navigate", session.navigate(base_url).await)
    }

    /// The environment, if `initialize` succeeded.
    pub async fn environment(&self) -> Option<Arc<Environment>> {
        self.environment.lock().await.clone()
    }

    /// Close the session and stop the sidecar and the topology.
    pub async fn teardown(&self, failed: bool) {
        if let Some(env) = self.environment.lock().await.take()
            && let Err(e) = env.session.close().await
        {
            tracing::warn!("Failed to close browser session {}: {}", env.session.id(), e);
        }
        self.stop_components(failed).await;
    }

    async fn stop_components(&self, failed: bool) {
        self.sidecar.stop(failed).await;
        self.topology.stop().await;
    }
}

const BANNER_RULE: &str = "==========================================================";

fn banner_lines(message: &str) -> [&str; 3] {
    [BANNER_RULE, message, BANNER_RULE]
}

fn log_banner(message: &str) {
    for line in banner_lines(message) {
        tracing::info!("{}", line);
    }
}

/// Downgrade a socket teardown mid-response to a warning.
fn tolerate_socket_teardown(
    step: &str,
    result: std::result::Result<(), WebDriverError>,
) -> std::result::Result<(), WebDriverError> {
    match result {
        Ok(()) => Ok(()),
        Err(e) if e.is_socket_teardown() => {
            tracing::warn!("Ignoring connection reset during {}: {}", step, e);
            Ok(())
        }
        Err(e) => {
            tracing::error!("Browser failed to {}: {}", step, e);
            Err(e)
        }
    }
}
