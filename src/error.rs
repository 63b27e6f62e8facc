use thiserror::Error;

/// Error types for configurator probing
#[derive(Error, Debug)]
pub enum ProbeError {
    // Configuration errors
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    // Browser driver errors
    #[error("Browser driver error: {message}")]
    Driver { message: String },

    #[error("Element no longer attached: {label}")]
    ElementDetached { label: String },

    #[error("Navigation failed: {url}")]
    Navigation { url: String },

    #[error("Step '{step}' timed out after {timeout_ms}ms")]
    StepTimeout { step: String, timeout_ms: u64 },

    // Network errors
    #[error("Network error: {message}")]
    Network { message: String },

    #[error("HTTP request failed: {url} - {status}")]
    HttpRequest { url: String, status: u16 },

    // Data errors
    #[error("Parse error: {message}")]
    Parse { message: String },
}

impl ProbeError {
    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Configuration { message: message.into() }
    }

    /// Create a browser driver error
    pub fn driver(message: impl Into<String>) -> Self {
        Self::Driver { message: message.into() }
    }

    /// Create a network error
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network { message: message.into() }
    }

    /// Create a parse error
    pub fn parse(message: impl Into<String>) -> Self {
        Self::Parse { message: message.into() }
    }

    /// Whether the failure is local to one step and the pass may continue
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Driver { .. }
            | Self::ElementDetached { .. }
            | Self::StepTimeout { .. }
            | Self::Network { .. }
            | Self::HttpRequest { .. }
            | Self::Parse { .. } => true,

            Self::Configuration { .. } | Self::Navigation { .. } => false,
        }
    }

    /// Get error category for logging
    pub fn category(&self) -> &'static str {
        match self {
            Self::Configuration { .. } => "configuration",
            Self::Driver { .. } | Self::ElementDetached { .. } | Self::Navigation { .. } => "browser",
            Self::StepTimeout { .. } => "timeout",
            Self::Network { .. } | Self::HttpRequest { .. } => "network",
            Self::Parse { .. } => "parse",
        }
    }
}

/// Result type alias for probing operations
pub type ProbeResult<T> = std::result::Result<T, ProbeError>;

impl From<reqwest::Error> for ProbeError {
    fn from(err: reqwest::Error) -> Self {
        match (err.url(), err.status()) {
            (Some(url), Some(status)) => Self::HttpRequest {
                url: url.to_string(),
                status: status.as_u16(),
            },
            _ => Self::network(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for ProbeError {
    fn from(err: serde_json::Error) -> Self {
        Self::parse(err.to_string())
    }
}
