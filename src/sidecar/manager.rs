//! Browser sidecar lifecycle management using Docker.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use bollard::Docker;
use bollard::container::{
    Config, CreateContainerOptions, NetworkingConfig, RemoveContainerOptions,
    StartContainerOptions, StopContainerOptions,
};
use bollard::image::CreateImageOptions;
use bollard::models::{EndpointSettings, HostConfig, PortBinding};
use bollard::network::{CreateNetworkOptions, InspectNetworkOptions};
use futures::StreamExt;
use tokio::sync::RwLock;

use crate::config::BrowserKind;
use crate::docker::{connect_docker, inspect, published_port};
use crate::readiness::{ReadinessProber, SeleniumStatusProbe};
use crate::sidecar::BrowserSidecar;
use crate::sidecar::capabilities::Capabilities;
use crate::sidecar::config::{
    BrowserSidecarConfig, DRIVER_PORT, DriverEndpoint, RECORDER_IMAGE, VNC_PORT, vnc_address,
};
use crate::sidecar::error::{Result, SidecarError};
use crate::sidecar::recording::RecordingPlan;

/// Host interface the sidecar ports are published on.
const PUBLISH_HOST: &str = "127.0.0.1";

/// Seconds the recorder gets to flush its video before being killed.
const RECORDER_STOP_GRACE_SECS: i64 = 10;

/// State of the browser sidecar.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SidecarState {
    /// Not started yet.
    NotStarted,
    /// Currently starting up.
    Starting,
    /// Running and the driver reports ready.
    Ready,
    /// Stopped or removed.
    Stopped,
    /// Failed to start.
    Failed,
}

/// Manages the Selenium standalone container (and its recorder).
///
/// Pulls the image on every start, joins the shared network under
/// [`NETWORK_ALIAS`](super::config::NETWORK_ALIAS), publishes the driver and
/// VNC ports on dynamic host ports and waits for `/status` to report ready.
pub struct BrowserSidecarManager {
    config: BrowserSidecarConfig,
    run_id: String,
    docker: RwLock<Option<Docker>>,
    container_id: RwLock<Option<String>>,
    recorder_id: RwLock<Option<String>>,
    endpoint: RwLock<Option<DriverEndpoint>>,
    vnc_port: RwLock<Option<u16>>,
    state: RwLock<SidecarState>,
    initialized: AtomicBool,
    recording: RecordingPlan,
    prober: ReadinessProber,
}

impl BrowserSidecarManager {
    /// Create a new sidecar manager.
    pub fn new(config: BrowserSidecarConfig) -> Self {
        let run_id = uuid::Uuid::new_v4().simple().to_string()[..12].to_string();
        let recording = RecordingPlan::new(config.recording, config.results_dir.clone());
        let prober = ReadinessProber::new(config.health_poll_interval);
        Self {
            config,
            run_id,
            docker: RwLock::new(None),
            container_id: RwLock::new(None),
            recorder_id: RwLock::new(None),
            endpoint: RwLock::new(None),
            vnc_port: RwLock::new(None),
            state: RwLock::new(SidecarState::NotStarted),
            initialized: AtomicBool::new(false),
            recording,
            prober,
        }
    }

    /// Get the current state.
    pub async fn state(&self) -> SidecarState {
        *self.state.read().await
    }

    /// Get the container ID if running.
    pub async fn container_id(&self) -> Option<String> {
        self.container_id.read().await.clone()
    }

    /// Get the configuration.
    pub fn config(&self) -> &BrowserSidecarConfig {
        &self.config
    }

    pub fn container_name(&self) -> String {
        self.config.container_name(&self.run_id)
    }

    /// Initialize connection to Docker.
    async fn initialize(&self) -> Result<Docker> {
        if self.initialized.load(Ordering::SeqCst)
            && let Some(docker) = self.docker.read().await.clone()
        {
            return Ok(docker);
        }

        let docker = connect_docker()
            .await
            .map_err(|e| SidecarError::DockerNotAvailable {
                reason: e.to_string(),
            })?;

        *self.docker.write().await = Some(docker.clone());
        self.initialized.store(true, Ordering::SeqCst);

        tracing::debug!("Browser sidecar '{}' connected to Docker", self.container_name());
        Ok(docker)
    }

    /// Start the container and wait for the driver.
    /// Caller must have already set state to `Starting`.
    async fn do_start(&self) -> Result<DriverEndpoint> {
        let docker = self.initialize().await?;
        let container_name = self.container_name();

        tokio::fs::create_dir_all(&self.config.results_dir).await?;
        tokio::fs::create_dir_all(&self.config.download_dir).await?;

        self.pull_image(&docker, &self.config.image).await?;
        self.ensure_network(&docker).await?;

        let container_id = self.create_container(&docker).await?;
        *self.container_id.write().await = Some(container_id.clone());

        docker
            .start_container(&container_id, None::<StartContainerOptions<String>>)
            .await
            .map_err(|e| SidecarError::ContainerStartFailed {
                name: container_name.clone(),
                reason: e.to_string(),
            })?;

        tracing::info!("Started browser container: {}", container_name);

        let info = inspect(&docker, &container_id).await.map_err(|e| {
            SidecarError::ContainerStartFailed {
                name: container_name.clone(),
                reason: e.to_string(),
            }
        })?;
        let driver_port =
            published_port(&info, DRIVER_PORT).ok_or_else(|| SidecarError::PortNotPublished {
                name: container_name.clone(),
                port: DRIVER_PORT,
            })?;
        *self.vnc_port.write().await = published_port(&info, VNC_PORT);

        let endpoint = DriverEndpoint::new(PUBLISH_HOST, driver_port);
        let probe = SeleniumStatusProbe::new(&endpoint.url());
        self.prober
            .await_healthy(&container_name, &probe, self.config.startup_timeout)
            .await?;

        if self.recording.is_enabled() {
            // A missing recording never fails the run.
            if let Err(e) = self.start_recorder(&docker).await {
                tracing::warn!("Session recording disabled: {}", e);
            }
        }

        *self.endpoint.write().await = Some(endpoint.clone());
        tracing::info!("Browser sidecar '{}' ready at {}", container_name, endpoint.url());

        Ok(endpoint)
    }

    /// Pull a Docker image, even if a copy exists locally.
    async fn pull_image(&self, docker: &Docker, image: &str) -> Result<()> {
        tracing::info!("Pulling image: {}", image);

        let options = CreateImageOptions {
            from_image: image.to_string(),
            ..Default::default()
        };

        let mut stream = docker.create_image(Some(options), None, None);

        while let Some(result) = stream.next().await {
            match result {
                Ok(info) => {
                    if let Some(status) = info.status {
                        tracing::trace!("Pull status: {}", status);
                    }
                }
                Err(e) => {
                    return Err(SidecarError::ImagePullFailed {
                        image: image.to_string(),
                        reason: e.to_string(),
                    });
                }
            }
        }

        tracing::info!("Pulled image: {}", image);
        Ok(())
    }

    /// Create the shared network unless it already exists.
    async fn ensure_network(&self, docker: &Docker) -> Result<()> {
        let network = &self.config.network;
        if docker
            .inspect_network(network, None::<InspectNetworkOptions<String>>)
            .await
            .is_ok()
        {
            tracing::debug!("Network '{}' exists", network);
            return Ok(());
        }

        docker
            .create_network(CreateNetworkOptions {
                name: network.clone(),
                driver: "bridge".to_string(),
                ..Default::default()
            })
            .await
            .map_err(|e| SidecarError::NetworkFailed {
                network: network.clone(),
                reason: e.to_string(),
            })?;

        tracing::info!("Created network: {}", network);
        Ok(())
    }

    /// Endpoint settings attaching a container to the shared network.
    fn networking(&self, aliases: Vec<String>) -> NetworkingConfig<String> {
        let settings = EndpointSettings {
            aliases: Some(aliases),
            ..Default::default()
        };
        NetworkingConfig {
            endpoints_config: HashMap::from([(self.config.network.clone(), settings)]),
        }
    }

    /// Create the Selenium container.
    async fn create_container(&self, docker: &Docker) -> Result<String> {
        let container_name = self.container_name();

        // Empty host port lets Docker pick a free one
        let mut port_bindings = HashMap::new();
        let mut exposed_ports = HashMap::new();
        for port in [DRIVER_PORT, VNC_PORT] {
            let key = format!("{}/tcp", port);
            port_bindings.insert(
                key.clone(),
                Some(vec![PortBinding {
                    host_ip: Some(PUBLISH_HOST.to_string()),
                    host_port: Some(String::new()),
                }]),
            );
            exposed_ports.insert(key, HashMap::new());
        }

        let binds = self.config.binds();
        let host_config = HostConfig {
            port_bindings: Some(port_bindings),
            binds: if binds.is_empty() { None } else { Some(binds) },
            network_mode: Some(self.config.network.clone()),
            shm_size: Some(self.config.shm_size),
            auto_remove: Some(false),
            ..Default::default()
        };

        let config = Config {
            image: Some(self.config.image.clone()),
            env: Some(self.config.container_env()),
            exposed_ports: Some(exposed_ports),
            host_config: Some(host_config),
            networking_config: Some(self.networking(vec![self.config.network_alias.clone()])),
            ..Default::default()
        };

        let options = CreateContainerOptions {
            name: container_name.clone(),
            ..Default::default()
        };

        let response = docker
            .create_container(Some(options), config)
            .await
            .map_err(|e| SidecarError::ContainerCreationFailed {
                name: container_name.clone(),
                reason: e.to_string(),
            })?;

        Ok(response.id)
    }

    /// Start the `selenium/video` recorder against the browser's display.
    async fn start_recorder(&self, docker: &Docker) -> Result<()> {
        let name = self.config.recorder_name(&self.run_id);
        self.pull_image(docker, RECORDER_IMAGE).await?;

        let host_config = HostConfig {
            binds: Some(vec![format!("{}:/videos", self.config.results_dir.display())]),
            network_mode: Some(self.config.network.clone()),
            auto_remove: Some(false),
            ..Default::default()
        };

        let config = Config {
            image: Some(RECORDER_IMAGE.to_string()),
            env: Some(vec![
                format!("DISPLAY_CONTAINER_NAME={}", self.config.network_alias),
                format!("SE_VIDEO_FILE_NAME={}", self.recording.working_file_name()),
                format!("FILE_NAME={}", self.recording.working_file_name()),
            ]),
            host_config: Some(host_config),
            networking_config: Some(self.networking(Vec::new())),
            ..Default::default()
        };

        let id = docker
            .create_container(
                Some(CreateContainerOptions {
                    name: name.clone(),
                    ..Default::default()
                }),
                config,
            )
            .await
            .map_err(|e| SidecarError::ContainerCreationFailed {
                name: name.clone(),
                reason: e.to_string(),
            })?
            .id;
        *self.recorder_id.write().await = Some(id.clone());

        docker
            .start_container(&id, None::<StartContainerOptions<String>>)
            .await
            .map_err(|e| SidecarError::ContainerStartFailed {
                name: name.clone(),
                reason: e.to_string(),
            })?;

        tracing::info!(
            "Recording session to {}",
            self.recording.working_path().display()
        );
        Ok(())
    }

    /// Stop the recorder so the video is flushed, then keep or discard it.
    async fn stop_recorder(&self, docker: &Docker, failed: bool) {
        let Some(id) = self.recorder_id.write().await.take() else {
            return;
        };

        let _ = docker
            .stop_container(
                &id,
                Some(StopContainerOptions {
                    t: RECORDER_STOP_GRACE_SECS,
                }),
            )
            .await;
        if let Err(e) = remove_container(docker, &id).await {
            tracing::warn!("Failed to remove recorder container {}: {}", id, e);
        }

        if let Err(e) = self.recording.finalize(failed) {
            tracing::warn!(
                "Could not finalize recording in {}: {}",
                self.recording.dir().display(),
                e
            );
        }
    }
}

async fn remove_container(docker: &Docker, id: &str) -> std::result::Result<(), bollard::errors::Error> {
    docker
        .remove_container(
            id,
            Some(RemoveContainerOptions {
                force: true,
                v: true,
                ..Default::default()
            }),
        )
        .await
}

#[async_trait]
impl BrowserSidecar for BrowserSidecarManager {
    fn browser(&self) -> BrowserKind {
        self.config.browser
    }

    fn capabilities(&self) -> &Capabilities {
        &self.config.capabilities
    }

    async fn start(&self) -> Result<DriverEndpoint> {
        // Check-and-set under one write lock
        {
            let mut state = self.state.write().await;
            match *state {
                SidecarState::Ready => {
                    if let Some(endpoint) = self.endpoint.read().await.clone() {
                        return Ok(endpoint);
                    }
                    *state = SidecarState::Starting;
                }
                SidecarState::Failed => {
                    return Err(SidecarError::PreviouslyFailed {
                        name: self.container_name(),
                    });
                }
                SidecarState::Starting => {
                    return Err(SidecarError::ContainerStartFailed {
                        name: self.container_name(),
                        reason: "start already in progress".to_string(),
                    });
                }
                SidecarState::NotStarted | SidecarState::Stopped => {
                    *state = SidecarState::Starting;
                }
            }
        }

        match self.do_start().await {
            Ok(endpoint) => {
                *self.state.write().await = SidecarState::Ready;
                Ok(endpoint)
            }
            Err(e) => {
                *self.state.write().await = SidecarState::Failed;
                Err(e)
            }
        }
    }

    async fn diagnostic_address(&self) -> Option<String> {
        self.vnc_port
            .read()
            .await
            .map(|port| vnc_address(PUBLISH_HOST, port))
    }

    async fn stop(&self, failed: bool) {
        let docker = self.docker.read().await.clone();
        let container_id = self.container_id.read().await.clone();

        if let Some(docker) = docker.as_ref() {
            self.stop_recorder(docker, failed).await;
        }

        if let (Some(docker), Some(id)) = (docker, container_id) {
            if !self.config.keep_on_shutdown {
                tracing::info!("Stopping browser container: {}", self.container_name());
                match remove_container(&docker, &id).await {
                    Ok(()) => {
                        *self.container_id.write().await = None;
                        tracing::info!("Stopped browser container: {}", self.container_name());
                    }
                    Err(e) => tracing::warn!(
                        "Failed to remove browser container '{}': {}",
                        self.container_name(),
                        e
                    ),
                }
            } else {
                tracing::info!(
                    "Keeping browser container running (KEEP_CONTAINERS): {}",
                    self.container_name()
                );
            }
        }

        *self.endpoint.write().await = None;
        *self.vnc_port.write().await = None;
        *self.state.write().await = SidecarState::Stopped;
        self.initialized.store(false, Ordering::SeqCst);
    }
}

impl Drop for BrowserSidecarManager {
    fn drop(&mut self) {
        if self.initialized.load(Ordering::SeqCst) {
            tracing::warn!(
                "BrowserSidecarManager '{}' dropped without stop(), container may remain running",
                self.config.container_name(&self.run_id)
            );
        }
    }
}
