//! Error types for storekeeper-core and the collaborator traits.

use std::path::PathBuf;

use thiserror::Error;

/// All errors that can arise while building a [`crate::config::Config`].
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Underlying I/O failure (file not found, permission denied, etc.).
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// YAML parse error on load: includes file path and line context from serde_yaml.
    #[error("failed to parse config at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// A required variable was absent or empty.
    #[error("missing environment variable {0}")]
    MissingVar(String),

    /// A variable was present but could not be interpreted.
    #[error("invalid value for {key}: '{value}' ({reason})")]
    InvalidValue {
        key: String,
        value: String,
        reason: String,
    },
}

/// Errors surfaced by a [`crate::ports::StorePlatform`] implementation.
#[derive(Debug, Error)]
pub enum PlatformError {
    /// The platform rejected the request for rate-limit reasons.
    #[error("request throttled by the store platform")]
    Throttled,

    /// Top-level GraphQL errors (not per-field user errors).
    #[error("GraphQL error: {}", .0.join("; "))]
    GraphQl(Vec<String>),

    /// Non-2xx HTTP status.
    #[error("store platform returned HTTP {status}: {body}")]
    Http { status: u16, body: String },

    /// Transport-level failure (network, DNS, TLS, timeout).
    #[error("request failed: {0}")]
    Request(String),

    /// The response could not be decoded into the expected shape.
    #[error("unexpected response shape: {0}")]
    Decode(String),
}

impl PlatformError {
    pub fn is_throttled(&self) -> bool {
        matches!(self, PlatformError::Throttled)
    }
}

/// Errors surfaced by a [`crate::ports::AvailabilityService`] implementation.
#[derive(Debug, Error)]
pub enum AvailabilityError {
    #[error("availability service returned HTTP {status}: {body}")]
    Http { status: u16, body: String },

    /// The service answered with an error message instead of results.
    #[error("availability service error: {0}")]
    Service(String),

    #[error("request failed: {0}")]
    Request(String),

    #[error("unexpected response shape: {0}")]
    Decode(String),
}

/// Errors surfaced by an [`crate::ports::AuditBackend`] implementation.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("audit backend returned HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("request failed: {0}")]
    Request(String),

    #[error("unexpected response shape: {0}")]
    Decode(String),

    /// Authentication against the backend failed (token exchange, bad key).
    #[error("audit backend authentication failed: {0}")]
    Auth(String),

    /// The backend does not implement this operation.
    #[error("operation not supported by the {backend} backend: {operation}")]
    Unsupported {
        backend: &'static str,
        operation: &'static str,
    },
}

/// Convenience constructor for [`ConfigError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> ConfigError {
    ConfigError::Io {
        path: path.into(),
        source,
    }
}
