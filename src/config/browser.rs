use crate::error::ConfigError;

/// Which browser the sidecar runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BrowserKind {
    /// Google Chrome (default).
    #[default]
    Chrome,
    /// Mozilla Firefox.
    Firefox,
}

impl BrowserKind {
    /// Name used in WebDriver capabilities and image tags.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Chrome => "chrome",
            Self::Firefox => "firefox",
        }
    }

    /// Selenium standalone image for this browser.
    pub fn standalone_image(&self) -> &'static str {
        match self {
            Self::Chrome => "selenium/standalone-chrome:latest",
            Self::Firefox => "selenium/standalone-firefox:latest",
        }
    }
}

impl std::fmt::Display for BrowserKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for BrowserKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "chrome" => Ok(Self::Chrome),
            "firefox" => Ok(Self::Firefox),
            _ => Err(ConfigError::UnsupportedBrowser {
                value: s.to_string(),
            }),
        }
    }
}

/// When session recordings are kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RecordingMode {
    /// No recorder container is started.
    Skip,
    /// Keep every recording.
    RecordAll,
    /// Keep recordings only for failed runs (default).
    #[default]
    RecordFailing,
}

impl RecordingMode {
    /// Whether a recording of a run with the given outcome is kept.
    pub fn keeps(&self, failed: bool) -> bool {
        match self {
            Self::Skip => false,
            Self::RecordAll => true,
            Self::RecordFailing => failed,
        }
    }
}

impl std::fmt::Display for RecordingMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Skip => write!(f, "skip"),
            Self::RecordAll => write!(f, "record_all"),
            Self::RecordFailing => write!(f, "record_failing"),
        }
    }
}

impl std::str::FromStr for RecordingMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "skip" | "off" | "none" => Ok(Self::Skip),
            "record_all" | "all" => Ok(Self::RecordAll),
            "record_failing" | "failing" => Ok(Self::RecordFailing),
            _ => Err(format!(
                "invalid recording mode '{}', expected 'skip', 'record_all' or 'record_failing'",
                s
            )),
        }
    }
}
