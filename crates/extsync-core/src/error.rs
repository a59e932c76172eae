//! Error types for the sync engine.
//!
//! Errors fall into four families: transport (network, rate limits, missing
//! remote resources), structural (malformed JSON, front-matter or manifests),
//! reconciliation (ids that do not line up with the registry) and
//! persistence (failed writes to the registry store, cache or mirror files).

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for extsync.
#[derive(Debug, Error)]
pub enum SyncError {
    // Transport errors
    #[error("Network error: {message}")]
    Network {
        message: String,
        #[source]
        source: Option<reqwest::Error>,
    },

    #[error("Request timeout after {0:?}")]
    Timeout(std::time::Duration),

    #[error("Rate limited by {service}{}", rate_limit_hint(.authenticated))]
    RateLimited {
        service: String,
        /// Whether the request carried an authentication token.
        authenticated: bool,
    },

    #[error("Not found: {what}")]
    NotFound { what: String },

    #[error("GitHub API error: {message}")]
    GitHubApi {
        message: String,
        status_code: Option<u16>,
    },

    // Structural errors
    #[error("JSON error: {message}")]
    Json {
        message: String,
        #[source]
        source: Option<serde_json::Error>,
    },

    #[error("Front-matter error in {path:?}: {message}")]
    FrontMatter { message: String, path: Option<PathBuf> },

    #[error("Manifest is missing required field `{field}`")]
    InvalidManifest { field: String },

    #[error("Release is missing required asset `{asset}`")]
    MissingAsset { asset: String },

    // Reconciliation errors
    #[error("Unknown extension: {id}")]
    UnknownExtension { id: String },

    #[error("Extension already registered: {id}")]
    DuplicateExtension { id: String },

    #[error("Unknown tag: {id}")]
    UnknownTag { id: String },

    #[error("Tag {id} is still assigned to at least one extension")]
    TagInUse { id: String },

    // Persistence errors
    #[error("IO error at {path:?}: {message}")]
    Io {
        message: String,
        path: Option<PathBuf>,
        #[source]
        source: Option<std::io::Error>,
    },

    // Host runtime errors
    #[error("Host {operation} failed: {message}")]
    Host { operation: String, message: String },

    // Configuration and validation errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Validation error for {field}: {message}")]
    Validation { field: String, message: String },

    #[error("Not a repository identifier: {input}")]
    InvalidRepository { input: String },

    #[error("Operation cancelled")]
    Cancelled,
}

fn rate_limit_hint(authenticated: &bool) -> &'static str {
    if *authenticated {
        ""
    } else {
        " (configure a GitHub token to raise the limit)"
    }
}

/// Result type alias for extsync operations.
pub type Result<T> = std::result::Result<T, SyncError>;

/// Coarse failure classes reported to callers of user-initiated
/// install and update actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureCategory {
    RateLimited { authenticated: bool },
    NotFound,
    Generic,
}

impl From<std::io::Error> for SyncError {
    fn from(err: std::io::Error) -> Self {
        SyncError::Io {
            message: err.to_string(),
            path: None,
            source: Some(err),
        }
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> Self {
        SyncError::Json {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl From<serde_yaml::Error> for SyncError {
    fn from(err: serde_yaml::Error) -> Self {
        SyncError::FrontMatter {
            message: err.to_string(),
            path: None,
        }
    }
}

impl From<reqwest::Error> for SyncError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            SyncError::Timeout(std::time::Duration::from_secs(0))
        } else {
            SyncError::Network {
                message: err.to_string(),
                source: Some(err),
            }
        }
    }
}

impl SyncError {
    /// Create an IO error with path context.
    pub fn io_with_path(err: std::io::Error, path: impl Into<PathBuf>) -> Self {
        SyncError::Io {
            message: err.to_string(),
            path: Some(path.into()),
            source: Some(err),
        }
    }

    /// Create a host error for the named operation.
    pub fn host(operation: &str, message: impl Into<String>) -> Self {
        SyncError::Host {
            operation: operation.to_string(),
            message: message.into(),
        }
    }

    /// Classify this error for an explicit install/update action.
    pub fn category(&self) -> FailureCategory {
        match self {
            SyncError::RateLimited { authenticated, .. } => FailureCategory::RateLimited {
                authenticated: *authenticated,
            },
            SyncError::NotFound { .. } | SyncError::MissingAsset { .. } => {
                FailureCategory::NotFound
            }
            SyncError::GitHubApi {
                status_code: Some(404),
                ..
            } => FailureCategory::NotFound,
            _ => FailureCategory::Generic,
        }
    }

    /// Check if this error should trigger a retry.
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::Network { .. } | SyncError::Timeout(_) => true,
            SyncError::GitHubApi {
                status_code: Some(code),
                ..
            } => matches!(code, 408 | 500 | 502 | 503 | 504),
            _ => false,
        }
    }
}
