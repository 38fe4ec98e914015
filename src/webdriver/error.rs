//! Error types for the WebDriver client.

use std::error::Error as StdError;
use std::io;

use thiserror::Error;

/// Result type for WebDriver operations.
pub type Result<T> = std::result::Result<T, WebDriverError>;

/// Errors talking to a remote WebDriver endpoint.
#[derive(Debug, Error)]
pub enum WebDriverError {
    /// The endpoint URL is unusable.
    #[error("Invalid WebDriver endpoint '{url}': {reason}")]
    InvalidEndpoint {
        /// Offending URL.
        url: String,
        /// Parse failure.
        reason: String,
    },

    /// The HTTP exchange itself failed.
    #[error("WebDriver {command} failed: {source}")]
    Transport {
        /// Command being sent (e.g. "navigate").
        command: String,
        #[source]
        source: Box<dyn StdError + Send + Sync>,
    },

    /// The remote end answered with a WebDriver error object.
    #[error("WebDriver {command} returned '{error}': {message}")]
    Protocol {
        /// Command being sent.
        command: String,
        /// W3C error code.
        error: String,
        /// Human-readable message.
        message: String,
    },

    /// The response did not have the expected shape.
    #[error("Malformed WebDriver response to {command}: {reason}")]
    MalformedResponse {
        /// Command being sent.
        command: String,
        /// What was missing.
        reason: String,
    },
}

impl WebDriverError {
    pub fn transport(
        command: impl Into<String>,
        source: impl Into<Box<dyn StdError + Send + Sync>>,
    ) -> Self {
        WebDriverError::Transport {
            command: command.into(),
            source: source.into(),
        }
    }

    /// True only when the transport saw the peer reset the socket.
    ///
    /// Some browser/driver pairs tear the connection down while answering an
    /// otherwise successful navigation. That single case is reported as a
    /// warning; every other failure stays fatal.
    pub fn is_socket_teardown(&self) -> bool {
        match self {
            WebDriverError::Transport { source, .. } => is_connection_reset(source.as_ref()),
            _ => false,
        }
    }
}

/// Walk an error's source chain looking for a peer reset or broken pipe.
pub(crate) fn is_connection_reset(err: &(dyn StdError + 'static)) -> bool {
    let mut current = Some(err);
    while let Some(e) = current {
        if let Some(io_err) = e.downcast_ref::<io::Error>()
            && matches!(
                io_err.kind(),
                io::ErrorKind::ConnectionReset | io::ErrorKind::BrokenPipe
            )
        {
            return true;
        }
        current = e.source();
    }
    false
}
