//! Crawl run - normalize → transform → track → upsert for every record,
//! then sweep.

use futures::{Stream, StreamExt};
use tracing::{debug, info, warn};

use crate::error::{SourceResult, StoreResult};
use crate::pipeline::history::{HistoryTracker, Tracked};
use crate::pipeline::normalize::{clean_string, normalize};
use crate::pipeline::sweep::{LifecycleSweeper, SweepReport};
use crate::pipeline::transform::{transform, RejectReason, Transformed};
use crate::traits::{source::JobSource, store::JobStore};
use crate::types::config::RunConfig;
use crate::types::record::RawRecord;

/// What happened to one record.
#[derive(Debug, Clone, PartialEq)]
pub enum RecordOutcome {
    /// New entity written
    Created { id: String },

    /// Existing entity rewritten; `changed` when history grew
    Updated { id: String, changed: bool },

    /// Already processed in this run
    Duplicate { id: String },

    /// Dropped by the transformer
    Rejected { id: String, reason: RejectReason },
}

/// Counts for one crawl run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunReport {
    /// Records received from the source
    pub records_seen: usize,

    /// New entities
    pub created: usize,

    /// Existing entities with at least one tracked change
    pub changed: usize,

    /// Existing entities with no tracked change
    pub unchanged: usize,

    /// Repeat observations within the run
    pub duplicates: usize,

    /// Records dropped by the transformer
    pub rejected: usize,

    /// Absolute ids whose lookup or write failed
    pub failed_ids: Vec<String>,

    /// Errors reported by the source
    pub source_errors: usize,

    /// Lifecycle sweep summary, if the sweep ran
    pub sweep: Option<SweepReport>,

    /// Why the sweep stopped early, if it did
    pub sweep_error: Option<String>,
}

impl RunReport {
    /// Check if the run was fully successful.
    pub fn is_success(&self) -> bool {
        self.failed_ids.is_empty()
            && self.source_errors == 0
            && self.sweep_error.is_none()
            && self.sweep.as_ref().map_or(true, SweepReport::is_success)
    }

    /// Existing entities rewritten, changed or not.
    pub fn updated(&self) -> usize {
        self.changed + self.unchanged
    }

    fn record(&mut self, outcome: &RecordOutcome) {
        match outcome {
            RecordOutcome::Created { .. } => self.created += 1,
            RecordOutcome::Updated { changed: true, .. } => self.changed += 1,
            RecordOutcome::Updated { changed: false, .. } => self.unchanged += 1,
            RecordOutcome::Duplicate { .. } => self.duplicates += 1,
            RecordOutcome::Rejected { .. } => self.rejected += 1,
        }
    }
}

/// One crawl run against a store.
///
/// Records are processed strictly one at a time; the sweep only runs after
/// the last record has been written.
pub struct CrawlRun<'a, S: JobStore> {
    store: &'a S,
    config: &'a RunConfig,
}

impl<'a, S: JobStore> CrawlRun<'a, S> {
    pub fn new(store: &'a S, config: &'a RunConfig) -> Self {
        Self { store, config }
    }

    /// Process one raw record through the whole pipeline.
    pub async fn process_record(&self, raw: RawRecord) -> StoreResult<RecordOutcome> {
        let record = normalize(raw);
        let relative_id = record.id.clone();

        let posting = match transform(record, &self.config.base_url, self.config.run_date) {
            Transformed::Accepted(posting) => posting,
            Transformed::Rejected(reason) => {
                info!(id = %relative_id, %reason, "Rejected private or incomplete listing");
                return Ok(RecordOutcome::Rejected {
                    id: relative_id,
                    reason,
                });
            }
        };

        let id = posting.id.clone();
        let tracker = HistoryTracker::new(self.store, &self.config.tracked_fields);

        let outcome = match tracker.track(posting).await? {
            Tracked::DuplicateInRun => return Ok(RecordOutcome::Duplicate { id }),
            Tracked::Created(entity) => {
                self.store.upsert(&entity).await?;
                RecordOutcome::Created { id }
            }
            Tracked::Updated { entity, changed } => {
                self.store.upsert(&entity).await?;
                RecordOutcome::Updated { id, changed }
            }
        };

        debug!(?outcome, "Record processed");
        Ok(outcome)
    }

    /// Process every record of a stream without sweeping.
    ///
    /// A storage failure on one record is logged and the loop moves on.
    pub async fn process_stream<St>(&self, records: St) -> RunReport
    where
        St: Stream<Item = SourceResult<RawRecord>>,
    {
        let mut report = RunReport::default();
        futures::pin_mut!(records);

        while let Some(item) = records.next().await {
            let raw = match item {
                Ok(raw) => raw,
                Err(e) => {
                    warn!(error = %e, "Record source failed");
                    report.source_errors += 1;
                    continue;
                }
            };

            report.records_seen += 1;
            let id = format!("{}{}", self.config.base_url, clean_string(&raw.id));

            match self.process_record(raw).await {
                Ok(outcome) => report.record(&outcome),
                Err(e) => {
                    warn!(id = %id, error = %e, "Failed to process record");
                    report.failed_ids.push(id);
                }
            }
        }

        report
    }

    /// Close every entity not seen in this run.
    pub async fn sweep(&self, spared: &[String]) -> StoreResult<SweepReport> {
        LifecycleSweeper::new(self.store, self.config.run_date)
            .with_page_size(self.config.scan_page_size)
            .with_spared(spared.iter().cloned())
            .sweep()
            .await
    }

    /// Run the whole crawl: process every record, then sweep.
    ///
    /// The sweep is skipped when the source failed, since entities after
    /// the failure were never observed and must not be ended.
    pub async fn execute<St>(&self, records: St) -> RunReport
    where
        St: Stream<Item = SourceResult<RawRecord>>,
    {
        info!(
            run_date = %self.config.run_date,
            collection = %self.config.collection,
            "Starting crawl run"
        );

        let mut report = self.process_stream(records).await;

        if report.source_errors > 0 {
            warn!(
                "Skipping sweep: source reported {} error(s)",
                report.source_errors
            );
        } else {
            match self.sweep(&report.failed_ids).await {
                Ok(sweep) => report.sweep = Some(sweep),
                Err(e) => {
                    warn!(error = %e, "Sweep aborted");
                    report.sweep_error = Some(e.to_string());
                }
            }
        }

        info!(
            "Run complete: {} seen, {} created, {} changed, {} unchanged, {} duplicate, {} rejected, {} failed",
            report.records_seen,
            report.created,
            report.changed,
            report.unchanged,
            report.duplicates,
            report.rejected,
            report.failed_ids.len()
        );

        report
    }

    /// Run the crawl from a [`JobSource`].
    pub async fn execute_source<J: JobSource>(&self, source: &J) -> RunReport {
        self.execute(source.records()).await
    }
}
