//! Storage implementations for job entities.
//!
//! Available backends:
//! - `MemoryStore` - In-memory storage (always available)
//! - `SqliteStore` - SQLite file-based storage (requires `sqlite` feature)
//! - `PostgresStore` - PostgreSQL storage (requires `postgres` feature)
//! - `RetryingStore` - Retries transient failures of any other backend

use regex::Regex;
use std::sync::LazyLock;

use crate::error::{StoreError, StoreResult};

pub mod memory;
pub mod retrying;

#[cfg(feature = "sqlite")]
pub mod sqlite;

#[cfg(feature = "postgres")]
pub mod postgres;

pub use memory::MemoryStore;
pub use retrying::RetryingStore;

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteStore;

#[cfg(feature = "postgres")]
pub use postgres::PostgresStore;

static COLLECTION_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]{0,62}$").unwrap());

/// Check that a collection name can be used verbatim as a table name.
#[cfg_attr(not(any(feature = "sqlite", feature = "postgres")), allow(dead_code))]
pub(crate) fn validate_collection(name: &str) -> StoreResult<&str> {
    if COLLECTION_NAME.is_match(name) {
        Ok(name)
    } else {
        Err(StoreError::InvalidCollection {
            name: name.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collection_names() {
        assert!(validate_collection("freelancer").is_ok());
        assert!(validate_collection("jobs_2024").is_ok());
        assert!(validate_collection("2024_jobs").is_err());
        assert!(validate_collection("jobs; DROP TABLE x").is_err());
        assert!(validate_collection("").is_err());
    }
}
