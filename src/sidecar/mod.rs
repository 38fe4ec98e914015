//! Docker sidecar running the remote browser.
//!
//! The sidecar is a Selenium standalone container that the tests drive over
//! WebDriver. It lives on a shared Docker network next to the application
//! stack and reaches the application through published host ports.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────────────┐
//! │                        BrowserSidecarManager                           │
//! │                                                                        │
//! │   start()                                                              │
//! │      │                                                                 │
//! │      ▼                                                                 │
//! │   ┌──────────────┐     ┌──────────────┐     ┌───────────────────────┐  │
//! │   │ Pull Image   │────▶│ Ensure       │────▶│ Create & Start        │  │
//! │   │ (always)     │     │ Network      │     │ (4444, 5900 dynamic)  │  │
//! │   └──────────────┘     └──────────────┘     └───────────────────────┘  │
//! │                                                    │                   │
//! │                                                    ▼                   │
//! │                        ┌──────────────┐     ┌───────────────────────┐  │
//! │                        │ Recorder     │◀────│ Poll /wd/hub/status   │  │
//! │                        │ (optional)   │     │                       │  │
//! │                        └──────────────┘     └───────────────────────┘  │
//! └───────────────────────────────────────────────────────────────────────┘
//! ```

pub mod capabilities;
pub mod config;
pub mod error;
pub mod manager;
pub mod recording;

use async_trait::async_trait;

use crate::config::BrowserKind;

pub use capabilities::Capabilities;
pub use config::{BrowserSidecarConfig, DRIVER_PORT, DriverEndpoint, VNC_PORT};
pub use error::{Result, SidecarError};
pub use manager::{BrowserSidecarManager, SidecarState};
pub use recording::RecordingPlan;

/// The browser container as seen by the environment controller.
#[async_trait]
pub trait BrowserSidecar: Send + Sync {
    fn browser(&self) -> BrowserKind;

    /// Capabilities sessions against this sidecar are opened with.
    fn capabilities(&self) -> &Capabilities;

    /// Start the container and block until the driver reports ready.
    async fn start(&self) -> Result<DriverEndpoint>;

    /// Live-view address for a human, once started.
    async fn diagnostic_address(&self) -> Option<String>;

    /// Stop the container. `failed` tells the recorder whether any test failed.
    async fn stop(&self, failed: bool);
}
