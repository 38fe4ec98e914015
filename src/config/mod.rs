//! Environment configuration resolved from process variables.
//!
//! `.env` files are honoured through `dotenvy`; real environment variables
//! take precedence over values from the file.

mod browser;
pub(crate) mod helpers;

use std::net::{IpAddr, Ipv4Addr};
use std::path::PathBuf;
use std::time::Duration;

pub use browser::{BrowserKind, RecordingMode};

use crate::config::helpers::{optional_env, parse_bool_env, parse_optional_env};
use crate::error::ConfigError;

/// Gateway of Docker's default bridge network.
pub const DEFAULT_HOST_BRIDGE: IpAddr = IpAddr::V4(Ipv4Addr::new(172, 17, 0, 1));

/// Host variables forwarded into the compose environment.
pub const FORWARDED_ENV_VARS: [&str; 3] = ["CONF_PATH", "CONF_FOLDER", "DOCKER_TAG"];

/// Resolved configuration for one test run.
#[derive(Debug, Clone)]
pub struct EnvironmentConfig {
    /// Browser run by the sidecar.
    pub browser: BrowserKind,
    /// Compose file describing the application stack.
    pub compose_file: PathBuf,
    /// Compose service name of the application under test.
    pub app_service: String,
    /// Internal port the application listens on.
    pub app_port: u16,
    /// Address the browser sidecar uses to reach published host ports.
    pub host_bridge: IpAddr,
    /// Whitelisted host variables passed to `docker compose`.
    pub forwarded_env: Vec<(String, String)>,
    /// How long the application may take to report healthy.
    pub app_startup_timeout: Duration,
    /// How long the browser sidecar may take to report ready.
    pub browser_startup_timeout: Duration,
    /// Recording policy for browser sessions.
    pub recording: RecordingMode,
    /// Leave containers running after shutdown (debugging only).
    pub keep_containers: bool,
    /// Docker network shared by the sidecar and its recorder.
    pub network: String,
    /// Base directory for `results/`.
    pub working_dir: PathBuf,
}

impl EnvironmentConfig {
    /// Resolve from the process environment, loading `.env` first.
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        let working_dir = std::env::current_dir()?;
        Self::resolve_from(|key| std::env::var(key).ok(), working_dir)
    }

    /// Resolve using an arbitrary variable lookup.
    pub fn resolve_from<F>(lookup: F, working_dir: PathBuf) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let browser = match optional_env(&lookup, "BROWSER_TO_USE") {
            Some(raw) => raw.parse()?,
            None => BrowserKind::default(),
        };

        let recording = match optional_env(&lookup, "RECORDING_MODE") {
            Some(raw) => raw.parse().map_err(|e| ConfigError::InvalidValue {
                key: "RECORDING_MODE".to_string(),
                message: e,
            })?,
            None => RecordingMode::default(),
        };

        let forwarded_env = FORWARDED_ENV_VARS
            .iter()
            .filter_map(|key| optional_env(&lookup, key).map(|v| (key.to_string(), v)))
            .collect();

        Ok(Self {
            browser,
            compose_file: optional_env(&lookup, "COMPOSE_FILE")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("tests/resources/compose-test.yml")),
            app_service: optional_env(&lookup, "APP_SERVICE").unwrap_or_else(|| "myappl".to_string()),
            app_port: parse_optional_env(&lookup, "APP_PORT", 8080)?,
            host_bridge: parse_optional_env(&lookup, "HOST_BRIDGE_IP", DEFAULT_HOST_BRIDGE)?,
            forwarded_env,
            app_startup_timeout: Duration::from_secs(parse_optional_env(
                &lookup,
                "APP_STARTUP_TIMEOUT_SECS",
                60 * 60,
            )?),
            browser_startup_timeout: Duration::from_secs(parse_optional_env(
                &lookup,
                "BROWSER_STARTUP_TIMEOUT_SECS",
                20 * 60,
            )?),
            recording,
            keep_containers: parse_bool_env(&lookup, "KEEP_CONTAINERS", false)?,
            network: optional_env(&lookup, "SELENIUM_NETWORK")
                .unwrap_or_else(|| "e2e-shared".to_string()),
            working_dir,
        })
    }

    /// `<working-dir>/results`, where recordings land.
    pub fn results_dir(&self) -> PathBuf {
        self.working_dir.join("results")
    }

    /// `<working-dir>/results/temp`, Chrome's download directory.
    pub fn download_dir(&self) -> PathBuf {
        self.results_dir().join("temp")
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use pretty_assertions::assert_eq;

    use super::*;

    fn resolve(vars: &[(&str, &str)]) -> Result<EnvironmentConfig, ConfigError> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        EnvironmentConfig::resolve_from(|k| map.get(k).cloned(), PathBuf::from("/work"))
    }

    #[test]
    fn defaults() {
        let config = resolve(&[]).unwrap();
        assert_eq!(config.browser, BrowserKind::Chrome);
        assert_eq!(config.app_service, "myappl");
        assert_eq!(config.app_port, 8080);
        assert_eq!(config.host_bridge.to_string(), "172.17.0.1");
        assert_eq!(config.app_startup_timeout, Duration::from_secs(3600));
        assert_eq!(config.browser_startup_timeout, Duration::from_secs(1200));
        assert_eq!(config.recording, RecordingMode::RecordFailing);
        assert!(config.forwarded_env.is_empty());
        assert_eq!(config.download_dir(), PathBuf::from("/work/results/temp"));
    }

    #[test]
    fn forwards_only_whitelisted_vars() {
        let config = resolve(&[
            ("DOCKER_TAG", "1.2.3"),
            ("CONF_PATH", "/etc/app"),
            ("UNRELATED", "x"),
        ])
        .unwrap();
        assert_eq!(
            config.forwarded_env,
            vec![
                ("CONF_PATH".to_string(), "/etc/app".to_string()),
                ("DOCKER_TAG".to_string(), "1.2.3".to_string()),
            ]
        );
    }

    #[test]
    fn unsupported_browser_is_fatal() {
        let err = resolve(&[("BROWSER_TO_USE", "opera")]).unwrap_err();
        assert!(matches!(err, ConfigError::UnsupportedBrowser { ref value } if value == "opera"));
    }

    #[test]
    fn host_bridge_is_injectable() {
        let config = resolve(&[("HOST_BRIDGE_IP", "192.168.65.254")]).unwrap();
        assert_eq!(config.host_bridge.to_string(), "192.168.65.254");
        assert!(resolve(&[("HOST_BRIDGE_IP", "not-an-ip")]).is_err());
    }

    #[test]
    fn huge_startup_timeout_is_accepted() {
        let secs = u64::MAX.to_string();
        let config = resolve(&[("APP_STARTUP_TIMEOUT_SECS", secs.as_str())]).unwrap();
        assert_eq!(config.app_startup_timeout, Duration::from_secs(u64::MAX));
    }
}
