//! Incremental Job Posting Ingestion
//!
//! Takes job postings scraped from a freelance marketplace, cleans and
//! enriches them, and keeps one entity per posting in a document store,
//! with an append-only history of how its tracked fields changed between
//! crawl runs. Postings that stop appearing are closed at the end of each
//! run.
//!
//! # Usage
//!
//! ```rust,ignore
//! use gig_finder::{CrawlRun, JsonLinesSource, RunConfig, SqliteStore};
//!
//! let config = RunConfig::from_env()?;
//! let store = SqliteStore::new("sqlite:./gigs.db", &config.collection).await?;
//! let source = JsonLinesSource::new("crawl.jsonl");
//!
//! let report = CrawlRun::new(&store, &config).execute_source(&source).await;
//! println!("{} created, {} changed", report.created, report.changed);
//! ```
//!
//! # Modules
//!
//! - [`types`] - Raw records, entities, change records and run configuration
//! - [`traits`] - Record source and storage gateway abstractions
//! - [`pipeline`] - Normalize, transform, track history, sweep
//! - [`stores`] - Storage implementations (MemoryStore, SqliteStore, ...)
//! - [`sources`] - Record sources (JsonLinesSource)
//! - [`testing`] - Mock implementations for testing

pub mod error;
pub mod pipeline;
pub mod sources;
pub mod stores;
pub mod testing;
pub mod traits;
pub mod types;

// Re-export core types at crate root
pub use error::{ConfigError, Error, Result, SourceError, SourceResult, StoreError, StoreResult};
pub use traits::{
    source::JobSource,
    store::{JobStore, Mutation, Precondition, ScanFilter, ScanPage, UpdateOutcome},
};
pub use types::{
    config::RunConfig,
    entity::{ChangeRecord, JobDetails, JobEntity, Projection, TrackedField, TrackedFields, STATUS_ENDED},
    record::{FieldValue, JobRecord, RawRecord, RawValue},
};

// Re-export pipeline components
pub use pipeline::{
    // Field handling
    clean_string, normalize, transform, JobPosting, RejectReason, Transformed,
    // History
    HistoryTracker, Tracked,
    // Runs
    CrawlRun, LifecycleSweeper, RecordOutcome, RunReport, SweepReport,
};

// Re-export stores
pub use stores::{MemoryStore, RetryingStore};

#[cfg(feature = "sqlite")]
pub use stores::SqliteStore;

#[cfg(feature = "postgres")]
pub use stores::PostgresStore;

pub use sources::JsonLinesSource;
