//! Docker Engine helpers shared by the topology and the browser sidecar.

use std::collections::HashMap;

use bollard::Docker;
use bollard::container::{InspectContainerOptions, ListContainersOptions};
use bollard::models::ContainerInspectResponse;

/// Label set by `docker compose` on every project container.
pub const COMPOSE_PROJECT_LABEL: &str = "com.docker.compose.project";
/// Label carrying the compose service name.
pub const COMPOSE_SERVICE_LABEL: &str = "com.docker.compose.service";
/// Label carrying the replica index (1-based).
pub const COMPOSE_NUMBER_LABEL: &str = "com.docker.compose.container-number";

/// Connect to the local Docker daemon and verify it responds.
pub async fn connect_docker() -> Result<Docker, bollard::errors::Error> {
    let docker = Docker::connect_with_local_defaults()?;
    docker.ping().await?;
    Ok(docker)
}

/// Find the container backing `service` (replica 1) in a compose project.
pub async fn find_compose_container(
    docker: &Docker,
    project: &str,
    service: &str,
) -> Result<Option<String>, bollard::errors::Error> {
    let mut filters = HashMap::new();
    filters.insert(
        "label".to_string(),
        vec![
            format!("{}={}", COMPOSE_PROJECT_LABEL, project),
            format!("{}={}", COMPOSE_SERVICE_LABEL, service),
            format!("{}=1", COMPOSE_NUMBER_LABEL),
        ],
    );

    let containers = docker
        .list_containers(Some(ListContainersOptions::<String> {
            all: true,
            filters,
            ..Default::default()
        }))
        .await?;

    Ok(containers.into_iter().find_map(|c| c.id))
}

/// Inspect a container.
pub async fn inspect(
    docker: &Docker,
    container: &str,
) -> Result<ContainerInspectResponse, bollard::errors::Error> {
    docker
        .inspect_container(container, None::<InspectContainerOptions>)
        .await
}

/// Host port published for `internal_port/tcp`, if any.
///
/// Docker reports one binding per host interface; the first non-zero port
/// wins.
pub fn published_port(info: &ContainerInspectResponse, internal_port: u16) -> Option<u16> {
    let key = format!("{}/tcp", internal_port);
    info.network_settings
        .as_ref()?
        .ports
        .as_ref()?
        .get(&key)?
        .as_ref()?
        .iter()
        .filter_map(|binding| binding.host_port.as_deref())
        .filter_map(|port| port.parse::<u16>().ok())
        .find(|port| *port != 0)
}

#[cfg(test)]
mod tests {
    use bollard::models::{NetworkSettings, PortBinding};

    use super::*;

    fn with_ports(ports: HashMap<String, Option<Vec<PortBinding>>>) -> ContainerInspectResponse {
        ContainerInspectResponse {
            network_settings: Some(NetworkSettings {
                ports: Some(ports),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    #[test]
    fn published_port_reads_first_binding() {
        let mut ports = HashMap::new();
        ports.insert(
            "8080/tcp".to_string(),
            Some(vec![
                PortBinding {
                    host_ip: Some("0.0.0.0".to_string()),
                    host_port: Some("54321".to_string()),
                },
                PortBinding {
                    host_ip: Some("::".to_string()),
                    host_port: Some("54321".to_string()),
                },
            ]),
        );
        assert_eq!(published_port(&with_ports(ports), 8080), Some(54321));
    }

    #[test]
    fn unpublished_port_is_none() {
        let mut ports = HashMap::new();
        ports.insert("8080/tcp".to_string(), None);
        let info = with_ports(ports);
        assert_eq!(published_port(&info, 8080), None);
        assert_eq!(published_port(&info, 9090), None);
        assert_eq!(published_port(&ContainerInspectResponse::default(), 8080), None);
    }
}
