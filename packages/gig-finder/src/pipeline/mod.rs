//! The incremental ingestion pipeline.
//!
//! - `normalize` - whitespace cleanup of raw crawler fields
//! - `transform` - typed fields derived from scraped strings, private
//!   listings rejected
//! - `history` - new / changed / unchanged / duplicate decision and change
//!   records
//! - `sweep` - closes entities that stopped appearing
//! - `run` - drives one crawl run end to end

pub mod history;
pub mod normalize;
pub mod run;
pub mod sweep;
pub mod transform;

pub use history::{diff, HistoryTracker, Tracked};
pub use normalize::{clean_string, normalize, normalize_value};
pub use run::{CrawlRun, RecordOutcome, RunReport};
pub use sweep::{LifecycleSweeper, SweepReport};
pub use transform::{transform, JobPosting, PriceRange, RejectReason, Transformed};
