use std::fmt;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SparqlError {
    #[error("Query timed out after {}s", .0.as_secs_f64())]
    Timeout(Duration),

    #[error("Endpoint error{}: {message}", .status.map(|s| format!(" (HTTP {s})")).unwrap_or_default())]
    EndpointError {
        status: Option<u16>,
        message: String,
    },

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Cache unavailable: {0}")]
    CacheUnavailable(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl SparqlError {
    /// Upstream error without an HTTP status (e.g. a malformed body)
    pub fn endpoint(message: impl Into<String>) -> Self {
        SparqlError::EndpointError {
            status: None,
            message: message.into(),
        }
    }

    /// Upstream error carrying the HTTP status it was answered with
    pub fn endpoint_status(status: u16, message: impl Into<String>) -> Self {
        SparqlError::EndpointError {
            status: Some(status),
            message: message.into(),
        }
    }

    pub fn kind(&self) -> FailureKind {
        match self {
            SparqlError::Timeout(_) => FailureKind::Timeout,
            SparqlError::EndpointError { .. } => FailureKind::EndpointError,
            SparqlError::NetworkError(_) => FailureKind::NetworkError,
            SparqlError::CacheUnavailable(_) => FailureKind::CacheUnavailable,
            SparqlError::InvalidInput(_) => FailureKind::InvalidInput,
            SparqlError::Config(_) => FailureKind::Config,
            SparqlError::Serialization(_) => FailureKind::Serialization,
        }
    }

    /// Whether the same request may succeed if simply tried again later
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            SparqlError::Timeout(_) | SparqlError::NetworkError(_) | SparqlError::CacheUnavailable(_)
        )
    }
}

impl From<serde_json::Error> for SparqlError {
    fn from(err: serde_json::Error) -> Self {
        SparqlError::Serialization(err.to_string())
    }
}

/// Classification of a failed execution, independent of its detail text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    Timeout,
    EndpointError,
    NetworkError,
    CacheUnavailable,
    InvalidInput,
    Config,
    Serialization,
}

impl FailureKind {
    /// Caller-facing hint for rendering the failure
    pub fn user_message(&self) -> &'static str {
        match self {
            FailureKind::Timeout => {
                "The query took too long to execute. Try a narrower query or add a LIMIT."
            }
            FailureKind::EndpointError => {
                "The SPARQL service rejected the query. Check the query syntax and try again."
            }
            FailureKind::NetworkError => {
                "Unable to reach the SPARQL service. Check your connection and try again."
            }
            FailureKind::CacheUnavailable => "The result cache is currently unavailable.",
            FailureKind::InvalidInput => "Only read-only queries are supported.",
            FailureKind::Config => "The service is misconfigured.",
            FailureKind::Serialization => "A cached result could not be decoded.",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FailureKind::Timeout => "timeout",
            FailureKind::EndpointError => "endpoint_error",
            FailureKind::NetworkError => "network_error",
            FailureKind::CacheUnavailable => "cache_unavailable",
            FailureKind::InvalidInput => "invalid_input",
            FailureKind::Config => "config",
            FailureKind::Serialization => "serialization",
        };
        f.write_str(name)
    }
}

pub type Result<T> = std::result::Result<T, SparqlError>;
