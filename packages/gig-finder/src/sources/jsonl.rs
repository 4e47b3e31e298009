//! JSON lines source - reads a crawler's feed export.
//!
//! One JSON object per line, each with an `_id` holding the site-relative
//! path. Blank lines are ignored.

use async_stream::stream;
use futures::stream::BoxStream;
use std::path::{Path, PathBuf};
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, warn};

use crate::error::SourceError;
use crate::traits::source::JobSource;
use crate::types::record::RawRecord;

/// Streams raw records from a JSON lines file.
pub struct JsonLinesSource {
    path: PathBuf,
    strict: bool,
}

impl JsonLinesSource {
    /// Read records from `path`. Malformed lines are logged and skipped.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            strict: false,
        }
    }

    /// Stop at the first malformed line with [`SourceError::Parse`] instead
    /// of skipping it.
    pub fn strict(mut self) -> Self {
        self.strict = true;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl JobSource for JsonLinesSource {
    fn records(&self) -> BoxStream<'_, Result<RawRecord, SourceError>> {
        Box::pin(stream! {
            let file = match File::open(&self.path).await {
                Ok(f) => f,
                Err(e) => {
                    yield Err(SourceError::Io(e));
                    return;
                }
            };

            let mut lines = BufReader::new(file).lines();
            let mut line_no = 0usize;

            loop {
                let line = match lines.next_line().await {
                    Ok(Some(line)) => line,
                    Ok(None) => break,
                    Err(e) => {
                        yield Err(SourceError::Io(e));
                        return;
                    }
                };
                line_no += 1;

                if line.trim().is_empty() {
                    continue;
                }

                match serde_json::from_str::<RawRecord>(&line) {
                    Ok(record) => yield Ok(record),
                    Err(source) => {
                        let err = SourceError::Parse { line: line_no, source };
                        if self.strict {
                            yield Err(err);
                            return;
                        }
                        warn!(path = %self.path.display(), error = %err, "Skipping malformed record");
                    }
                }
            }

            debug!(path = %self.path.display(), lines = line_no, "Finished reading records");
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::record::RawValue;
    use futures::StreamExt;
    use std::io::Write;

    fn write_lines(lines: &[&str]) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        for line in lines {
            writeln!(file, "{}", line).unwrap();
        }
        file
    }

    #[tokio::test]
    async fn test_reads_records_in_order() {
        let file = write_lines(&[
            r#"{"_id": "/projects/a", "title": " Scraper ", "price": "$30 - $250"}"#,
            "",
            r#"{"_id": "/projects/b", "tags": ["Python", "SQL"], "offers": null}"#,
        ]);

        let source = JsonLinesSource::new(file.path());
        let records: Vec<_> = source.records().collect().await;

        assert_eq!(records.len(), 2);
        let first = records[0].as_ref().unwrap();
        assert_eq!(first.id, "/projects/a");
        assert_eq!(first.get("title"), Some(&RawValue::from(" Scraper ")));
        let second = records[1].as_ref().unwrap();
        assert_eq!(second.get("offers"), Some(&RawValue::Null));
    }

    #[tokio::test]
    async fn test_odd_values_do_not_reject_the_line() {
        let file = write_lines(&[
            r#"{"_id": "/projects/a", "tags": ["Python", 1.5, {"k": 1}]}"#,
            r#"{"_id": "/projects/b", "extra": {"nested": true}, "rating": 4.8}"#,
        ]);

        let records: Vec<_> = JsonLinesSource::new(file.path()).strict().records().collect().await;

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].as_ref().unwrap().id, "/projects/a");
        assert_eq!(records[1].as_ref().unwrap().id, "/projects/b");
    }

    #[tokio::test]
    async fn test_skips_malformed_lines() {
        let file = write_lines(&[
            r#"{"_id": "/projects/a"}"#,
            "{not json",
            r#"{"title": "no id"}"#,
            r#"{"_id": "/projects/b"}"#,
        ]);

        let records: Vec<_> = JsonLinesSource::new(file.path()).records().collect().await;

        let ids: Vec<_> = records
            .iter()
            .map(|r| r.as_ref().unwrap().id.as_str())
            .collect();
        assert_eq!(ids, vec!["/projects/a", "/projects/b"]);
    }

    #[tokio::test]
    async fn test_strict_stops_at_malformed_line() {
        let file = write_lines(&[r#"{"_id": "/projects/a"}"#, "{not json", r#"{"_id": "/projects/b"}"#]);

        let records: Vec<_> = JsonLinesSource::new(file.path())
            .strict()
            .records()
            .collect()
            .await;

        assert_eq!(records.len(), 2);
        assert!(matches!(records[1], Err(SourceError::Parse { line: 2, .. })));
    }

    #[tokio::test]
    async fn test_missing_file() {
        let records: Vec<_> = JsonLinesSource::new("/nonexistent/gigs.jsonl")
            .records()
            .collect()
            .await;

        assert_eq!(records.len(), 1);
        assert!(matches!(records[0], Err(SourceError::Io(_))));
    }
}
