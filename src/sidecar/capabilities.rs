//! WebDriver capability sets per browser kind.

use std::path::{Path, PathBuf};

use serde::Serialize;
use serde_json::{Map, Value, json};

use crate::config::BrowserKind;
use crate::error::ConfigError;

const POPUPS_PREF: &str = "profile.default_content_settings.popups";
const DOWNLOAD_DIR_PREF: &str = "download.default_directory";

/// Capabilities a session is opened with (`alwaysMatch` object).
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Capabilities(Map<String, Value>);

impl Capabilities {
    /// Build the capability set for `browser`.
    ///
    /// Chrome blocks no popups, downloads into `<working_dir>/results/temp`
    /// and accepts self-signed certificates. Firefox uses defaults.
    pub fn configure(browser: BrowserKind, working_dir: &Path) -> Self {
        let mut caps = Map::new();
        caps.insert("browserName".to_string(), json!(browser.as_str()));

        match browser {
            BrowserKind::Chrome => {
                let download_dir = working_dir.join("results").join("temp");
                caps.insert(
                    "goog:chromeOptions".to_string(),
                    json!({
                        "prefs": {
                            POPUPS_PREF: 0,
                            DOWNLOAD_DIR_PREF: download_dir.to_string_lossy(),
                        }
                    }),
                );
                caps.insert("acceptInsecureCerts".to_string(), json!(true));
            }
            BrowserKind::Firefox => {}
        }

        Self(caps)
    }

    /// Parse a raw browser name and configure it; unknown names are a
    /// configuration error naming the value.
    pub fn for_browser_name(raw: &str, working_dir: &Path) -> Result<Self, ConfigError> {
        Ok(Self::configure(raw.parse()?, working_dir))
    }

    pub fn browser_name(&self) -> Option<&str> {
        self.0.get("browserName").and_then(Value::as_str)
    }

    fn chrome_pref(&self, key: &str) -> Option<&Value> {
        self.0.get("goog:chromeOptions")?.get("prefs")?.get(key)
    }

    /// Chrome's download directory, if overridden.
    pub fn download_directory(&self) -> Option<PathBuf> {
        self.chrome_pref(DOWNLOAD_DIR_PREF)
            .and_then(Value::as_str)
            .map(PathBuf::from)
    }

    /// Whether popup blocking is disabled.
    pub fn popups_disabled(&self) -> bool {
        self.chrome_pref(POPUPS_PREF).and_then(Value::as_i64) == Some(0)
    }

    pub fn accepts_insecure_certs(&self) -> bool {
        self.0
            .get("acceptInsecureCerts")
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    pub fn as_json(&self) -> Value {
        Value::Object(self.0.clone())
    }
}
