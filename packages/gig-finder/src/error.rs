//! Typed errors for the gig-finder library.
//!
//! Uses `thiserror` for library errors (not `anyhow`) so that callers can
//! tell a storage failure apart from a bad input file or a bad setting.
//!
//! Policy outcomes such as a rejected record, a duplicate observation within
//! a run, or a sweep guard that no longer holds are *not* errors; they are
//! returned as values by the pipeline.

use thiserror::Error;

/// Top-level error for operations that touch more than one concern.
#[derive(Debug, Error)]
pub enum Error {
    /// Storage gateway failed
    #[error("storage error: {0}")]
    Store(#[from] StoreError),

    /// Record source failed
    #[error("source error: {0}")]
    Source(#[from] SourceError),

    /// Invalid or missing configuration
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
}

/// Errors returned by a [`JobStore`](crate::traits::store::JobStore).
#[derive(Debug, Error)]
pub enum StoreError {
    /// The backend (database driver, connection, lock) failed
    #[error("storage backend error: {0}")]
    Backend(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// A stored document could not be decoded
    #[error("corrupt document {id}: {reason}")]
    Corrupt { id: String, reason: String },

    /// Collection name is not usable as a table name
    #[error("invalid collection name: {name}")]
    InvalidCollection { name: String },

    /// Document could not be encoded
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    /// Wrap any backend error.
    pub fn backend(err: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Self::Backend(err.into())
    }

    /// Whether retrying the same call may succeed.
    ///
    /// Only backend failures are transient; a corrupt document or a bad
    /// collection name fails the same way every time.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Backend(_))
    }
}

/// Errors produced while reading raw records from a crawler export.
#[derive(Debug, Error)]
pub enum SourceError {
    /// Reading the underlying file failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A line could not be parsed as a record
    #[error("malformed record on line {line}: {source}")]
    Parse {
        line: usize,
        #[source]
        source: serde_json::Error,
    },
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A required setting is absent
    #[error("missing setting: {key}")]
    Missing { key: String },

    /// A setting has an unusable value
    #[error("invalid value for {key}: {reason}")]
    Invalid { key: String, reason: String },
}

impl ConfigError {
    pub(crate) fn invalid(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key: key.into(),
            reason: reason.into(),
        }
    }
}

/// Result type alias for library operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Result type alias for storage operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Result type alias for record sources.
pub type SourceResult<T> = std::result::Result<T, SourceError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_errors_are_transient() {
        assert!(StoreError::backend("connection reset").is_transient());
        assert!(!StoreError::Corrupt {
            id: "x".into(),
            reason: "bad json".into()
        }
        .is_transient());
        assert!(!StoreError::InvalidCollection {
            name: "drop table".into()
        }
        .is_transient());
    }

    #[test]
    fn test_error_messages() {
        let err = ConfigError::invalid("GIG_RUN_DATE", "expected YYYY-MM-DD");
        assert_eq!(
            err.to_string(),
            "invalid value for GIG_RUN_DATE: expected YYYY-MM-DD"
        );

        let err: Error = StoreError::backend("timeout").into();
        assert_eq!(err.to_string(), "storage error: storage backend error: timeout");

        let err: Error = ConfigError::Missing {
            key: "DATABASE_URL".into(),
        }
        .into();
        assert_eq!(err.to_string(), "config error: missing setting: DATABASE_URL");
    }
}
