use async_trait::async_trait;
use reqwest::Method;
use serde_json::{Value, json};
use url::Url;

use crate::webdriver::BrowserSession;
use crate::webdriver::error::{Result, WebDriverError};

/// Send a WebDriver command and unwrap the `value` field of the response.
pub(crate) async fn send_command(
    http: &reqwest::Client,
    method: Method,
    url: Url,
    command: &str,
    body: Option<Value>,
) -> Result<Value> {
    tracing::trace!("WebDriver {} {} {}", command, method, url);

    let mut request = http.request(method, url);
    if let Some(body) = body {
        request = request.json(&body);
    }

    let transport = |source: reqwest::Error| WebDriverError::transport(command, source);

    let response = request.send().await.map_err(transport)?;
    let status = response.status();
    let body: Value = response.json().await.map_err(transport)?;
    let value = body.get("value").cloned().unwrap_or(Value::Null);

    if !status.is_success() || value.get("error").is_some() {
        return Err(WebDriverError::Protocol {
            command: command.to_string(),
            error: value
                .get("error")
                .and_then(Value::as_str)
                .unwrap_or("unknown error")
                .to_string(),
            message: value
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or_else(|| status.canonical_reason().unwrap_or_default())
                .to_string(),
        });
    }

    Ok(value)
}

/// A session opened by [`WebDriverClient`](super::WebDriverClient).
pub struct WebDriverSession {
    http: reqwest::Client,
    /// `<endpoint>/session/<id>/`
    base: Url,
    id: String,
}

impl WebDriverSession {
    pub(crate) fn new(http: reqwest::Client, endpoint: &Url, id: String) -> Result<Self> {
        let base = endpoint
            .join(&format!("session/{}/", id))
            .map_err(|e| WebDriverError::InvalidEndpoint {
                url: endpoint.to_string(),
                reason: e.to_string(),
            })?;
        Ok(Self { http, base, id })
    }

    fn url(&self, path: &str) -> Result<Url> {
        self.base.join(path).map_err(|e| WebDriverError::InvalidEndpoint {
            url: self.base.to_string(),
            reason: e.to_string(),
        })
    }
}

#[async_trait]
impl BrowserSession for WebDriverSession {
    fn id(&self) -> &str {
        &self.id
    }

    async fn maximize_window(&self) -> Result<()> {
        send_command(
            &self.http,
            Method::POST,
            self.url("window/maximize")?,
            "maximize",
            Some(json!({})),
        )
        .await?;
        Ok(())
    }

    async fn navigate(&self, url: &str) -> Result<()> {
        send_command(
            &self.http,
            Method::POST,
            self.url("url")?,
            "navigate",
            Some(json!({ "url": url })),
        )
        .await?;
        Ok(())
    }

    async fn current_url(&self) -> Result<String> {
        let value = send_command(&self.http, Method::GET, self.url("url")?, "current_url", None).await?;
        value
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| WebDriverError::MalformedResponse {
                command: "current_url".to_string(),
                reason: format!("expected a string, got {}", value),
            })
    }

    async fn close(&self) -> Result<()> {
        // DELETE /session/<id> (no trailing slash)
        let url = self.url(&format!("../{}", self.id))?;
        send_command(&self.http, Method::DELETE, url, "close", None).await?;
        tracing::debug!("Closed WebDriver session {}", self.id);
        Ok(())
    }
}
