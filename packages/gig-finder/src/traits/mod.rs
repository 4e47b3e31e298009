//! Core trait abstractions.
//!
//! These traits define the interfaces the pipeline consumes: where raw
//! records come from and where entities are kept.

pub mod source;
pub mod store;
