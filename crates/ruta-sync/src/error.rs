//! # Sync Error Types
//!
//! Error types for sync operations.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Sync Error Categories                             │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────┐ │
//! │  │  Configuration  │  │    Network      │  │     Remote              │ │
//! │  │                 │  │  (recoverable)  │  │                         │ │
//! │  │  InvalidConfig  │  │  Network        │  │  Remote (HTTP status)   │ │
//! │  │  MissingDeviceId│  │  Timeout        │  │  RemoteRejection        │ │
//! │  │  InvalidUrl     │  │                 │  │  Serialization          │ │
//! │  └─────────────────┘  └─────────────────┘  └─────────────────────────┘ │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────┐ │
//! │  │     Store       │  │     Asset       │  │      Domain             │ │
//! │  │    (FATAL)      │  │   (isolated)    │  │                         │ │
//! │  │  disk, schema,  │  │  one image      │  │  Validation             │ │
//! │  │  corruption     │  │  failed         │  │  NotFound               │ │
//! │  └─────────────────┘  └─────────────────┘  └─────────────────────────┘ │
//! │                                                                         │
//! │  A sync run returns Err only for Store. Everything else lands in the   │
//! │  run report's error list.                                              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use ruta_core::{CoreError, ValidationError};
use ruta_db::DbError;
use thiserror::Error;

/// Result type alias for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Sync error type covering all possible sync failures.
#[derive(Debug, Error)]
pub enum SyncError {
    // =========================================================================
    // Configuration Errors
    // =========================================================================
    /// Invalid sync configuration.
    #[error("Invalid sync configuration: {0}")]
    InvalidConfig(String),

    /// Missing device ID.
    #[error("Device ID not configured")]
    MissingDeviceId,

    /// Invalid remote URL.
    #[error("Invalid remote URL: {0}")]
    InvalidUrl(String),

    /// Failed to load config file.
    #[error("Failed to load config: {0}")]
    ConfigLoadFailed(String),

    /// Failed to save config file.
    #[error("Failed to save config: {0}")]
    ConfigSaveFailed(String),

    // =========================================================================
    // Store Errors
    // =========================================================================
    /// The local store failed. Continuing could lose the outbound queue.
    #[error("Local store error: {0}")]
    Store(String),

    // =========================================================================
    // Network Errors
    // =========================================================================
    /// The remote system could not be reached.
    #[error("Network error: {0}")]
    Network(String),

    /// A request did not complete in time.
    #[error("Request timed out after {0} seconds")]
    Timeout(u64),

    /// The remote system answered with an error status.
    #[error("Remote system returned HTTP {status}: {message}")]
    Remote { status: u16, message: String },

    /// The remote system refused one pushed order.
    #[error("Order {local_id} rejected: {reason}")]
    RemoteRejection { local_id: String, reason: String },

    /// A payload could not be encoded or decoded.
    #[error("Serialization failed: {0}")]
    Serialization(String),

    // =========================================================================
    // Asset Errors
    // =========================================================================
    /// A product image could not be cached.
    #[error(transparent)]
    Asset(#[from] AssetError),

    // =========================================================================
    // Domain Errors
    // =========================================================================
    /// Input rejected before it reached the store.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Entity not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A single image download or cache operation failed.
#[derive(Debug, Error)]
pub enum AssetError {
    /// Non-2xx response.
    #[error("HTTP {status} downloading {url}")]
    Status { url: String, status: u16 },

    /// The request itself failed (connect, timeout, body).
    #[error("Download of {url} failed: {reason}")]
    Request { url: String, reason: String },

    /// Writing, renaming or deleting a cached file failed.
    #[error("I/O error on {path}: {reason}")]
    Io { path: String, reason: String },

    /// The entity id cannot be used as a file name.
    #[error("Invalid asset id: {0}")]
    InvalidId(String),
}

// =============================================================================
// Error Conversions
// =============================================================================

impl From<DbError> for SyncError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::NotFound { entity, id } => SyncError::NotFound(format!("{entity} {id}")),
            DbError::UniqueViolation { .. } => SyncError::Validation(err.to_string()),
            other => SyncError::Store(other.to_string()),
        }
    }
}

impl From<CoreError> for SyncError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::ProductNotFound(_)
            | CoreError::CustomerNotFound(_)
            | CoreError::OrderNotFound(_)
            | CoreError::CartLineNotFound(_) => SyncError::NotFound(err.to_string()),
            other => SyncError::Validation(other.to_string()),
        }
    }
}

impl From<ValidationError> for SyncError {
    fn from(err: ValidationError) -> Self {
        SyncError::Validation(err.to_string())
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> Self {
        SyncError::Serialization(err.to_string())
    }
}

impl From<url::ParseError> for SyncError {
    fn from(err: url::ParseError) -> Self {
        SyncError::InvalidUrl(err.to_string())
    }
}

impl From<reqwest::Error> for SyncError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            SyncError::Serialization(err.to_string())
        } else if let Some(status) = err.status() {
            SyncError::Remote {
                status: status.as_u16(),
                message: err.to_string(),
            }
        } else {
            SyncError::Network(err.to_string())
        }
    }
}

impl From<std::io::Error> for SyncError {
    fn from(err: std::io::Error) -> Self {
        SyncError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::de::Error> for SyncError {
    fn from(err: toml::de::Error) -> Self {
        SyncError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::ser::Error> for SyncError {
    fn from(err: toml::ser::Error) -> Self {
        SyncError::ConfigSaveFailed(err.to_string())
    }
}

// =============================================================================
// Error Categorization
// =============================================================================

impl SyncError {
    /// Returns true if the device's own data integrity is in question.
    pub fn is_fatal(&self) -> bool {
        matches!(self, SyncError::Store(_))
    }

    /// Returns true if repeating the operation later can succeed.
    ///
    /// ## Retryable Errors
    /// - Network failures and timeouts
    /// - 5xx and 429 responses
    /// - Per-order rejections (the order stays queued)
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::Network(_) | SyncError::Timeout(_) | SyncError::RemoteRejection { .. } => true,
            SyncError::Remote { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }

    /// Returns true if this error indicates a configuration problem.
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            SyncError::InvalidConfig(_)
                | SyncError::MissingDeviceId
                | SyncError::InvalidUrl(_)
                | SyncError::ConfigLoadFailed(_)
                | SyncError::ConfigSaveFailed(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_store_errors_are_fatal() {
        assert!(SyncError::Store("disk full".into()).is_fatal());
        assert!(!SyncError::Network("unreachable".into()).is_fatal());
        assert!(!SyncError::Asset(AssetError::InvalidId("../x".into())).is_fatal());
    }

    #[test]
    fn test_retryable_errors() {
        assert!(SyncError::Network("connection refused".into()).is_retryable());
        assert!(SyncError::Timeout(30).is_retryable());
        assert!(SyncError::Remote { status: 503, message: "down".into() }.is_retryable());
        assert!(SyncError::RemoteRejection {
            local_id: "local_1_abc".into(),
            reason: "customer blocked".into(),
        }
        .is_retryable());

        assert!(!SyncError::Remote { status: 400, message: "bad".into() }.is_retryable());
        assert!(!SyncError::InvalidConfig("bad config".into()).is_retryable());
        assert!(!SyncError::Store("corrupt".into()).is_retryable());
    }

    #[test]
    fn test_db_error_mapping() {
        let not_found: SyncError = DbError::not_found("Cart line", "c-1").into();
        assert!(matches!(not_found, SyncError::NotFound(_)));

        let store: SyncError = DbError::QueryFailed("disk I/O error".into()).into();
        assert!(store.is_fatal());
    }

    #[test]
    fn test_error_display() {
        let err = SyncError::RemoteRejection {
            local_id: "local_1700000000000_abcdef0123".into(),
            reason: "unknown customer".into(),
        };
        assert!(err.to_string().contains("local_1700000000000_abcdef0123"));
        assert!(err.to_string().contains("unknown customer"));
    }
}
