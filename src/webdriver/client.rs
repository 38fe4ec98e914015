use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Method;
use serde_json::{Value, json};
use url::Url;

use crate::sidecar::{Capabilities, DriverEndpoint};
use crate::webdriver::error::{Result, WebDriverError};
use crate::webdriver::session::{WebDriverSession, send_command};
use crate::webdriver::{BrowserSession, RemoteBrowser};

/// Session creation can queue behind a cold browser start.
const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(300);

/// Opens W3C WebDriver sessions over HTTP.
#[derive(Clone)]
pub struct WebDriverClient {
    http: reqwest::Client,
}

impl Default for WebDriverClient {
    fn default() -> Self {
        Self::new()
    }
}

impl WebDriverClient {
    pub fn new() -> Self {
        Self::with_timeout(DEFAULT_COMMAND_TIMEOUT)
    }

    /// Client whose commands give up after `timeout`.
    pub fn with_timeout(timeout: Duration) -> Self {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self { http }
    }

    /// Parse an endpoint URL, ensuring a trailing slash so relative joins
    /// stay under its path.
    pub(crate) fn endpoint_url(raw: &str) -> Result<Url> {
        let with_slash = if raw.ends_with('/') {
            raw.to_string()
        } else {
            format!("{}/", raw)
        };
        Url::parse(&with_slash).map_err(|e| WebDriverError::InvalidEndpoint {
            url: raw.to_string(),
            reason: e.to_string(),
        })
    }
}

/// Pull the session id out of a new-session `value` (`{"sessionId": ..}`).
fn session_id(value: &Value) -> Option<String> {
    value
        .get("sessionId")
        .and_then(Value::as_str)
        .map(str::to_string)
}

#[async_trait]
impl RemoteBrowser for WebDriverClient {
    async fn open_session(
        &self,
        endpoint: &DriverEndpoint,
        capabilities: &Capabilities,
    ) -> Result<Arc<dyn BrowserSession>> {
        let base = Self::endpoint_url(&endpoint.url())?;
        let url = base.join("session").map_err(|e| WebDriverError::InvalidEndpoint {
            url: base.to_string(),
            reason: e.to_string(),
        })?;

        tracing::info!(
            "Opening {} session at {}",
            capabilities.browser_name().unwrap_or("browser"),
            endpoint.url()
        );

        let body = json!({
            "capabilities": {
                "alwaysMatch": capabilities.as_json(),
            }
        });
        let value = send_command(&self.http, Method::POST, url, "new_session", Some(body)).await?;

        let id = session_id(&value).ok_or_else(|| WebDriverError::MalformedResponse {
            command: "new_session".to_string(),
            reason: "missing sessionId".to_string(),
        })?;

        tracing::info!("WebDriver session {} opened", id);
        Ok(Arc::new(WebDriverSession::new(self.http.clone(), &base, id)?))
    }
}
