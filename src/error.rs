//! Error types for gamegrab

use thiserror::Error;

/// Result type for gamegrab operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for gamegrab
#[derive(Debug, Error)]
pub enum Error {
    /// Request rejected before any browser work
    #[error("{0}")]
    Validation(String),

    /// Requested catalog script does not exist
    #[error("Unknown script '{0}'")]
    UnknownScript(String),

    /// Failed to launch Chrome
    #[error("Failed to launch Chrome: {0}")]
    Launch(String),

    /// Chrome not found
    #[error("Chrome not found")]
    ChromeNotFound,

    /// Transport error
    #[error("Transport error: {context}")]
    Transport {
        context: String,
        #[source]
        source: Option<std::io::Error>,
    },

    /// CDP protocol error
    #[error("CDP error in {method}: {message} (code {code})")]
    Cdp {
        method: String,
        code: i64,
        message: String,
    },

    /// Navigation error reported by the browser
    #[error("Navigation error: {0}")]
    Navigation(String),

    /// Navigation did not settle in time
    #[error("Navigation timeout: {url} did not settle within {timeout_ms}ms")]
    NavigationTimeout { url: String, timeout_ms: u64 },

    /// Exception thrown while evaluating JavaScript
    #[error("JavaScript error: {0}")]
    JavaScript(String),

    /// Caller-supplied script failed to parse or threw
    #[error("Injected script failed: {0}")]
    InjectedScript(String),

    /// Timeout
    #[error("Timeout: {0}")]
    Timeout(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration could not be loaded
    #[error("Config error: {0}")]
    Config(String),
}

impl Error {
    /// Create a validation error
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Create a transport error with context
    pub fn transport(context: impl Into<String>) -> Self {
        Self::Transport {
            context: context.into(),
            source: None,
        }
    }

    /// Create a transport error with IO source
    pub fn transport_io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Transport {
            context: context.into(),
            source: Some(source),
        }
    }

    /// Create a CDP error with full context
    pub fn cdp(method: impl Into<String>, code: i64, message: impl Into<String>) -> Self {
        Self::Cdp {
            method: method.into(),
            code,
            message: message.into(),
        }
    }

    /// Whether the caller is at fault (maps to HTTP 400)
    pub fn is_client_error(&self) -> bool {
        matches!(self, Error::Validation(_) | Error::UnknownScript(_))
    }

    /// Whether this error came from a timeout
    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::NavigationTimeout { .. } | Error::Timeout(_))
    }

    /// Re-label a JavaScript failure as a fault in caller-supplied code
    pub fn into_injected(self) -> Self {
        match self {
            Error::JavaScript(message) => Error::InjectedScript(message),
            other => other,
        }
    }
}
