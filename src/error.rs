//! Error types for the screenshot service

use thiserror::Error;

/// Result type alias for service operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while rendering or caching a capture
#[derive(Error, Debug)]
pub enum Error {
    /// Failed to launch or initialize the engine
    #[error("Engine initialization failed: {0}")]
    InitializationError(String),

    /// Navigation did not finish within the bound
    #[error("Navigation timed out after {0}ms")]
    Timeout(u64),

    /// DNS or connection failure reported by the engine
    #[error("Unreachable target: {0}")]
    Unreachable(String),

    /// Navigation failed for any other reason
    #[error("Failed to load URL: {0}")]
    LoadError(String),

    /// Capture attempted before initialization or after shutdown
    #[error("Rendering engine is not available")]
    EngineUnavailable,

    /// Failed to render or capture content
    #[error("Rendering failed: {0}")]
    RenderError(String),

    /// Failed to execute in-page script
    #[error("Script execution failed: {0}")]
    ScriptError(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    ConfigError(String),

    /// CDP-specific error
    #[cfg(feature = "cdp")]
    #[error("CDP error: {0}")]
    CdpError(String),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

/// Coarse classification used at the service boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NavigationTimeout,
    UnreachableTarget,
    EngineUnavailable,
    Internal,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Timeout(_) => ErrorKind::NavigationTimeout,
            Error::Unreachable(_) => ErrorKind::UnreachableTarget,
            Error::EngineUnavailable => ErrorKind::EngineUnavailable,
            _ => ErrorKind::Internal,
        }
    }

    /// Classify a navigation failure reported by the engine as text.
    ///
    /// Network-level failures carry a `net::ERR_*` code; the driver reports a
    /// missed load event as an event that "never came".
    pub fn from_navigation_failure(url: &str, timeout_ms: u64, message: &str) -> Self {
        if message.contains("net::ERR_") {
            Error::Unreachable(format!("{}: {}", url, message))
        } else if message.contains("never came") || message.to_ascii_lowercase().contains("timed out") {
            Error::Timeout(timeout_ms)
        } else {
            Error::LoadError(format!("{}: {}", url, message))
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::ScriptError(format!("Unexpected script result: {}", err))
    }
}

#[cfg(feature = "cdp")]
impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Error::CdpError(err.to_string())
    }
}
