//! Minimal W3C WebDriver client.
//!
//! Only the commands the environment needs are implemented: new session,
//! maximize, navigate, current URL, and delete session. Test code that wants
//! a richer API can open its own client against
//! [`Environment::driver_endpoint`](crate::environment::Environment::driver_endpoint).

pub mod client;
pub mod error;
pub mod session;

use std::sync::Arc;

use async_trait::async_trait;

use crate::sidecar::{Capabilities, DriverEndpoint};

pub use client::WebDriverClient;
pub use error::{Result, WebDriverError};
pub use session::WebDriverSession;

/// An open browser session.
///
/// One logical client: concurrent navigation from several tests must be
/// serialized by the caller.
#[async_trait]
pub trait BrowserSession: Send + Sync {
    /// Remote session id.
    fn id(&self) -> &str;

    async fn maximize_window(&self) -> Result<()>;

    async fn navigate(&self, url: &str) -> Result<()>;

    async fn current_url(&self) -> Result<String>;

    /// End the remote session.
    async fn close(&self) -> Result<()>;
}

/// Opens sessions against a driver endpoint.
#[async_trait]
pub trait RemoteBrowser: Send + Sync {
    async fn open_session(
        &self,
        endpoint: &DriverEndpoint,
        capabilities: &Capabilities,
    ) -> Result<Arc<dyn BrowserSession>>;
}
