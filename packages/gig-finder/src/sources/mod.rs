//! Record sources.
//!
//! - `JsonLinesSource` - crawler output exported as JSON lines

pub mod jsonl;

pub use jsonl::JsonLinesSource;
