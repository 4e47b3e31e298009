//! Record source trait - the boundary with the crawler.
//!
//! Page traversal and HTML field extraction happen outside this crate. A
//! `JobSource` hands over what the crawler produced, one raw record at a
//! time, in crawl order.

use futures::stream::BoxStream;

use crate::error::SourceResult;
use crate::types::record::RawRecord;

/// Produces the raw records of one crawl.
pub trait JobSource: Send + Sync {
    /// Stream every record of the crawl.
    ///
    /// An `Err` item means the source could not continue; records after it
    /// were never observed.
    fn records(&self) -> BoxStream<'_, SourceResult<RawRecord>>;
}
