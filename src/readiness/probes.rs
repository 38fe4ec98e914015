use std::time::Duration;

use async_trait::async_trait;
use bollard::Docker;
use bollard::models::{ContainerStateStatusEnum, HealthStatusEnum};
use serde::Deserialize;
use tokio::net::TcpStream;

use crate::readiness::{HealthProbe, ProbeError, ProbeStatus};

fn http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(5))
        .build()
        .unwrap_or_else(|_| reqwest::Client::new())
}

/// Ready when a GET returns a 2xx status.
pub struct HttpProbe {
    url: String,
    client: reqwest::Client,
}

impl HttpProbe {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            client: http_client(),
        }
    }
}

#[async_trait]
impl HealthProbe for HttpProbe {
    async fn check(&self) -> Result<ProbeStatus, ProbeError> {
        match self.client.get(&self.url).send().await {
            Ok(resp) if resp.status().is_success() => Ok(ProbeStatus::Ready),
            Ok(resp) => Ok(ProbeStatus::NotReady(format!("{} returned {}", self.url, resp.status()))),
            // Connection refused is expected while the service boots
            Err(e) => Ok(ProbeStatus::NotReady(e.to_string())),
        }
    }
}

/// Ready when a TCP connection succeeds.
pub struct TcpProbe {
    addr: String,
}

impl TcpProbe {
    pub fn new(addr: impl Into<String>) -> Self {
        Self { addr: addr.into() }
    }
}

#[async_trait]
impl HealthProbe for TcpProbe {
    async fn check(&self) -> Result<ProbeStatus, ProbeError> {
        match tokio::time::timeout(Duration::from_secs(2), TcpStream::connect(&self.addr)).await {
            Ok(Ok(_)) => Ok(ProbeStatus::Ready),
            Ok(Err(e)) => Ok(ProbeStatus::NotReady(e.to_string())),
            Err(_) => Ok(ProbeStatus::NotReady(format!("connect to {} timed out", self.addr))),
        }
    }
}

/// Ready when Docker reports the container healthy.
///
/// Containers without a HEALTHCHECK are ready as soon as they run. An exited
/// or dead container is a fatal error.
pub struct ContainerHealthProbe {
    docker: Docker,
    container: String,
}

impl ContainerHealthProbe {
    pub fn new(docker: Docker, container: impl Into<String>) -> Self {
        Self {
            docker,
            container: container.into(),
        }
    }
}

#[async_trait]
impl HealthProbe for ContainerHealthProbe {
    async fn check(&self) -> Result<ProbeStatus, ProbeError> {
        let info = match crate::docker::inspect(&self.docker, &self.container).await {
            Ok(info) => info,
            Err(e) => return classify_inspect_error(&self.container, &e),
        };

        let Some(state) = info.state else {
            return Ok(ProbeStatus::NotReady("no container state reported".to_string()));
        };

        if state.running != Some(true) {
            return match state.status {
                Some(ContainerStateStatusEnum::EXITED) | Some(ContainerStateStatusEnum::DEAD) => {
                    Err(ProbeError::new(format!(
                        "container {} stopped (exit code {})",
                        self.container,
                        state.exit_code.unwrap_or(-1)
                    )))
                }
                other => Ok(ProbeStatus::NotReady(format!("container status {:?}", other))),
            };
        }

        match state.health.and_then(|h| h.status) {
            Some(HealthStatusEnum::HEALTHY) => Ok(ProbeStatus::Ready),
            Some(HealthStatusEnum::STARTING) => Ok(ProbeStatus::NotReady("health: starting".to_string())),
            Some(HealthStatusEnum::UNHEALTHY) => {
                Ok(ProbeStatus::NotReady("health: unhealthy".to_string()))
            }
            // No HEALTHCHECK declared
            _ => Ok(ProbeStatus::Ready),
        }
    }
}

/// A missing container will not come back; other inspect errors are retried.
fn classify_inspect_error(
    container: &str,
    error: &bollard::errors::Error,
) -> Result<ProbeStatus, ProbeError> {
    match error {
        bollard::errors::Error::DockerResponseServerError {
            status_code: 404, ..
        } => Err(ProbeError::new(format!("container {} no longer exists", container))),
        other => Ok(ProbeStatus::NotReady(other.to_string())),
    }
}

#[derive(Debug, Deserialize)]
struct StatusResponse {
    value: StatusValue,
}

#[derive(Debug, Deserialize)]
struct StatusValue {
    ready: bool,
    #[serde(default)]
    message: String,
}

/// Ready when a WebDriver `/status` endpoint reports `value.ready == true`.
pub struct SeleniumStatusProbe {
    url: String,
    client: reqwest::Client,
}

impl SeleniumStatusProbe {
    /// `driver_url` is the WebDriver base URL (e.g. `http://127.0.0.1:4444/wd/hub`).
    pub fn new(driver_url: &str) -> Self {
        Self {
            url: format!("{}/status", driver_url.trim_end_matches('/')),
            client: http_client(),
        }
    }
}

#[async_trait]
impl HealthProbe for SeleniumStatusProbe {
    async fn check(&self) -> Result<ProbeStatus, ProbeError> {
        let resp = match self.client.get(&self.url).send().await {
            Ok(resp) => resp,
            Err(e) => return Ok(ProbeStatus::NotReady(e.to_string())),
        };
        if !resp.status().is_success() {
            return Ok(ProbeStatus::NotReady(format!("status {}", resp.status())));
        }
        match resp.json::<StatusResponse>().await {
            Ok(body) if body.value.ready => Ok(ProbeStatus::Ready),
            Ok(body) => Ok(ProbeStatus::NotReady(body.value.message)),
            Err(e) => Ok(ProbeStatus::NotReady(format!("unreadable status: {e}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    use super::*;

    /// Serve one canned HTTP response per connection.
    async fn serve(body: &'static str, status: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            while let Ok((mut stream, _)) = listener.accept().await {
                let mut buf = [0u8; 1024];
                let _ = stream.read(&mut buf).await;
                let response = format!(
                    "HTTP/1.1 {status}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                    body.len()
                );
                let _ = stream.write_all(response.as_bytes()).await;
            }
        });
        format!("http://{addr}")
    }

    #[tokio::test]
    async fn http_probe_ready_on_2xx() {
        let url = serve("{}", "200 OK").await;
        assert_eq!(HttpProbe::new(url).check().await.unwrap(), ProbeStatus::Ready);
    }

    #[tokio::test]
    async fn http_probe_not_ready_on_503() {
        let url = serve("{}", "503 Service Unavailable").await;
        assert!(matches!(
            HttpProbe::new(url).check().await.unwrap(),
            ProbeStatus::NotReady(_)
        ));
    }

    #[tokio::test]
    async fn tcp_probe_refused_is_not_ready() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        assert_eq!(TcpProbe::new(addr.to_string()).check().await.unwrap(), ProbeStatus::Ready);
        drop(listener);
        assert!(matches!(
            TcpProbe::new(addr.to_string()).check().await.unwrap(),
            ProbeStatus::NotReady(_)
        ));
    }

    #[tokio::test]
    async fn selenium_status_probe_reads_ready_flag() {
        let url = serve(r#"{"value":{"ready":true,"message":"Selenium Grid ready."}}"#, "200 OK").await;
        assert_eq!(SeleniumStatusProbe::new(&url).check().await.unwrap(), ProbeStatus::Ready);

        let url = serve(r#"{"value":{"ready":false,"message":"warming up"}}"#, "200 OK").await;
        assert_eq!(
            SeleniumStatusProbe::new(&url).check().await.unwrap(),
            ProbeStatus::NotReady("warming up".to_string())
        );
    }

    #[test]
    fn missing_container_is_fatal() {
        let gone = bollard::errors::Error::DockerResponseServerError {
            status_code: 404,
            message: "No such container: myappl-1".to_string(),
        };
        let err = classify_inspect_error("myappl-1", &gone).unwrap_err();
        assert!(err.reason.contains("myappl-1"));
    }

    #[test]
    fn daemon_hiccup_is_retried() {
        let busy = bollard::errors::Error::DockerResponseServerError {
            status_code: 500,
            message: "server busy".to_string(),
        };
        assert!(matches!(
            classify_inspect_error("myappl-1", &busy),
            Ok(ProbeStatus::NotReady(_))
        ));
    }
}
