//! Compose-backed topology.
//!
//! `docker compose` brings the stack up and down; the Docker API (through
//! `bollard`) locates each service's container by its compose labels, reads
//! health status, and resolves published ports.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bollard::Docker;
use tokio::process::Command;
use tokio::sync::RwLock;

use crate::docker::{connect_docker, find_compose_container, inspect, published_port};
use crate::error::ConfigError;
use crate::readiness::{ContainerHealthProbe, HealthProbe, HttpProbe, ReadinessProber, TcpProbe};
use crate::topology::descriptor::{HealthCheck, ServiceDescriptor};
use crate::topology::error::{Result, TopologyError};
use crate::topology::{ContainerTopology, ServiceState};

/// Service names declared under `services:` in a compose document.
pub fn compose_services(yaml: &str) -> std::result::Result<HashSet<String>, String> {
    let doc: serde_yml::Value = serde_yml::from_str(yaml).map_err(|e| e.to_string())?;
    let services = doc
        .get("services")
        .and_then(|s| s.as_mapping())
        .ok_or_else(|| "no 'services' mapping".to_string())?;
    Ok(services
        .keys()
        .filter_map(|k| k.as_str().map(str::to_string))
        .collect())
}

/// A compose stack started as a uniquely named project.
pub struct ComposeTopology {
    compose_file: PathBuf,
    project: String,
    env: Vec<(String, String)>,
    services: Vec<ServiceDescriptor>,
    prober: ReadinessProber,
    pull: bool,
    keep_on_shutdown: bool,
    docker: RwLock<Option<Docker>>,
    /// (service, internal port) -> host port; `None` until started.
    ports: RwLock<Option<HashMap<(String, u16), u16>>>,
    states: RwLock<HashMap<String, ServiceState>>,
}

impl ComposeTopology {
    /// Create a topology for `compose_file`.
    ///
    /// Every descriptor must name a service the file declares.
    pub fn new(
        compose_file: impl Into<PathBuf>,
        services: Vec<ServiceDescriptor>,
    ) -> std::result::Result<Self, ConfigError> {
        let compose_file = compose_file.into();
        let declared = Self::read_services(&compose_file)?;

        for service in &services {
            if !declared.contains(&service.name) {
                return Err(ConfigError::MissingService {
                    service: service.name.clone(),
                    hint: format!("not declared in {}", compose_file.display()),
                });
            }
        }

        let states = services
            .iter()
            .map(|s| (s.name.clone(), ServiceState::NotStarted))
            .collect();
        let suffix = uuid::Uuid::new_v4().simple().to_string();

        Ok(Self {
            compose_file,
            project: format!("e2e{}", &suffix[..12]),
            env: Vec::new(),
            services,
            prober: ReadinessProber::default(),
            pull: true,
            keep_on_shutdown: false,
            docker: RwLock::new(None),
            ports: RwLock::new(None),
            states: RwLock::new(states),
        })
    }

    fn read_services(path: &Path) -> std::result::Result<HashSet<String>, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ComposeFile {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        compose_services(&content).map_err(|reason| ConfigError::ComposeFile {
            path: path.to_path_buf(),
            reason,
        })
    }

    /// Variables passed to `docker compose` for interpolation.
    pub fn with_env(mut self, env: Vec<(String, String)>) -> Self {
        self.env = env;
        self
    }

    /// Pull images before `up` (default: true).
    pub fn with_pull(mut self, pull: bool) -> Self {
        self.pull = pull;
        self
    }

    pub fn with_prober(mut self, prober: ReadinessProber) -> Self {
        self.prober = prober;
        self
    }

    /// Leave the stack running on `stop()`.
    pub fn keep_on_shutdown(mut self, keep: bool) -> Self {
        self.keep_on_shutdown = keep;
        self
    }

    /// Compose project name.
    pub fn project(&self) -> &str {
        &self.project
    }

    /// Current state of `service`.
    pub async fn service_state(&self, service: &str) -> Option<ServiceState> {
        self.states.read().await.get(service).copied()
    }

    async fn set_state(&self, service: &str, state: ServiceState) {
        self.states.write().await.insert(service.to_string(), state);
    }

    async fn set_all(&self, state: ServiceState) {
        for s in self.states.write().await.values_mut() {
            *s = state;
        }
    }

    async fn compose(&self, args: &[&str]) -> Result<()> {
        let command = args.first().copied().unwrap_or_default().to_string();
        tracing::debug!(
            "docker compose -f {} -p {} {}",
            self.compose_file.display(),
            self.project,
            args.join(" ")
        );

        let output = Command::new("docker")
            .arg("compose")
            .arg("-f")
            .arg(&self.compose_file)
            .arg("-p")
            .arg(&self.project)
            .args(args)
            .envs(self.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .output()
            .await
            .map_err(|e| TopologyError::ComposeFailed {
                command: command.clone(),
                reason: e.to_string(),
            })?;

        if !output.status.success() {
            return Err(TopologyError::ComposeFailed {
                command,
                reason: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(())
    }

    fn probe_for(
        &self,
        docker: &Docker,
        container: &str,
        service: &ServiceDescriptor,
        host_port: Option<u16>,
    ) -> Result<Option<Box<dyn HealthProbe>>> {
        let port_for = |service: &ServiceDescriptor| {
            host_port.ok_or_else(|| TopologyError::PortNotExposed {
                service: service.name.clone(),
                port: service.internal_port,
            })
        };

        let probe: Box<dyn HealthProbe> = match &service.health_check {
            HealthCheck::None => return Ok(None),
            HealthCheck::Runtime => Box::new(ContainerHealthProbe::new(docker.clone(), container)),
            HealthCheck::Http { path } => Box::new(HttpProbe::new(format!(
                "http://127.0.0.1:{}/{}",
                port_for(service)?,
                path.trim_start_matches('/')
            ))),
            HealthCheck::Tcp => Box::new(TcpProbe::new(format!("127.0.0.1:{}", port_for(service)?))),
        };
        Ok(Some(probe))
    }

    async fn start_services(&self, docker: &Docker) -> Result<HashMap<(String, u16), u16>> {
        if self.pull {
            self.compose(&["pull", "--quiet"]).await?;
        }
        self.compose(&["up", "-d"]).await?;

        let mut ports = HashMap::new();
        for service in &self.services {
            let container = find_compose_container(docker, &self.project, &service.name)
                .await?
                .ok_or_else(|| TopologyError::ContainerNotFound {
                    service: service.name.clone(),
                    project: self.project.clone(),
                })?;

            let host_port = published_port(&inspect(docker, &container).await?, service.internal_port);

            if let Some(probe) = self.probe_for(docker, &container, service, host_port)? {
                if let Err(e) = self
                    .prober
                    .await_healthy(&service.name, probe.as_ref(), service.startup_timeout)
                    .await
                {
                    self.set_state(&service.name, ServiceState::Failed).await;
                    return Err(e.into());
                }
            }

            // Ports can be re-bound while a restarting container comes up healthy
            let host_port = published_port(&inspect(docker, &container).await?, service.internal_port)
                .or(host_port);
            if let Some(port) = host_port {
                ports.insert((service.name.clone(), service.internal_port), port);
            }

            self.set_state(&service.name, ServiceState::Healthy).await;
            tracing::info!(
                "Service '{}' ready ({} -> host port {:?})",
                service.name,
                service.internal_port,
                host_port
            );
        }
        Ok(ports)
    }
}

#[async_trait]
impl ContainerTopology for ComposeTopology {
    fn descriptor(&self, service: &str) -> Option<&ServiceDescriptor> {
        self.services.iter().find(|s| s.name == service)
    }

    async fn start(&self) -> Result<()> {
        let docker = connect_docker()
            .await
            .map_err(|e| TopologyError::DockerNotAvailable {
                reason: e.to_string(),
            })?;
        *self.docker.write().await = Some(docker.clone());

        tracing::info!(
            "Starting compose project '{}' from {}",
            self.project,
            self.compose_file.display()
        );
        self.set_all(ServiceState::Starting).await;

        match self.start_services(&docker).await {
            Ok(ports) => {
                *self.ports.write().await = Some(ports);
                Ok(())
            }
            Err(e) => {
                for s in self.states.write().await.values_mut() {
                    if *s == ServiceState::Starting {
                        *s = ServiceState::Failed;
                    }
                }
                Err(e)
            }
        }
    }

    async fn resolved_port(&self, service: &str, internal_port: u16) -> Result<u16> {
        let ports = self.ports.read().await;
        let ports = ports.as_ref().ok_or_else(|| TopologyError::NotStarted {
            service: service.to_string(),
        })?;
        ports
            .get(&(service.to_string(), internal_port))
            .copied()
            .ok_or_else(|| TopologyError::PortNotExposed {
                service: service.to_string(),
                port: internal_port,
            })
    }

    async fn stop(&self) {
        *self.ports.write().await = None;

        if self.docker.read().await.is_none() {
            return;
        }

        if self.keep_on_shutdown {
            tracing::info!(
                "Keeping compose project running (keep_on_shutdown=true): {}",
                self.project
            );
            return;
        }

        tracing::info!("Stopping compose project '{}'", self.project);
        if let Err(e) = self.compose(&["down", "-v", "--remove-orphans"]).await {
            tracing::warn!("Failed to stop compose project '{}': {}", self.project, e);
        }
        self.set_all(ServiceState::Stopped).await;
        *self.docker.write().await = None;
    }
}
