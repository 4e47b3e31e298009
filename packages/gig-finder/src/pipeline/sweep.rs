//! Lifecycle sweep - closes entities that stopped appearing in crawls.
//!
//! Runs once at the end of a crawl run. Every entity that is not `Ended`
//! and was not seen on the run date is transitioned to `Ended`, with the
//! previous status recorded in its history.

use chrono::NaiveDate;
use std::collections::HashSet;
use tracing::{debug, info, warn};

use crate::error::StoreResult;
use crate::traits::store::{JobStore, Mutation, Precondition, ScanFilter, UpdateOutcome};
use crate::types::config::DEFAULT_SCAN_PAGE_SIZE;
use crate::types::entity::Projection;

/// Summary of one sweep.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SweepReport {
    /// Stale entities returned by the scan
    pub scanned: usize,

    /// Entities transitioned to `Ended`
    pub ended: usize,

    /// Entities whose guard no longer held at write time
    pub skipped: usize,

    /// Entities left alone because they were observed this run even though
    /// their write failed
    pub spared: usize,

    /// Entities whose update failed or whose stored document is unreadable
    pub failed_ids: Vec<String>,
}

impl SweepReport {
    /// Whether every stale entity was handled.
    pub fn is_success(&self) -> bool {
        self.failed_ids.is_empty()
    }
}

/// Closes stale entities at the end of a run.
pub struct LifecycleSweeper<'a, S: JobStore> {
    store: &'a S,
    run_date: NaiveDate,
    page_size: usize,
    spared: HashSet<String>,
}

impl<'a, S: JobStore> LifecycleSweeper<'a, S> {
    pub fn new(store: &'a S, run_date: NaiveDate) -> Self {
        Self {
            store,
            run_date,
            page_size: DEFAULT_SCAN_PAGE_SIZE,
            spared: HashSet::new(),
        }
    }

    /// Set the scan page size.
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Ids observed in this run whose write failed.
    ///
    /// Their stored `last_seen_at` is stale, but they were not absent from
    /// the crawl, so they must not be ended.
    pub fn with_spared(mut self, ids: impl IntoIterator<Item = String>) -> Self {
        self.spared.extend(ids);
        self
    }

    /// Sweep every stale entity, page by page.
    ///
    /// A failed update or an undecodable document is logged and the sweep
    /// moves on. A failed scan ends the sweep with an error, since the
    /// remaining pages are unknown.
    pub async fn sweep(&self) -> StoreResult<SweepReport> {
        let filter = ScanFilter::stale(self.run_date);
        let precondition = Precondition::not_ended();
        let mutation = Mutation::end(self.run_date);

        let mut report = SweepReport::default();
        let mut after: Option<String> = None;

        info!(run_date = %self.run_date, "Sweeping entities not seen in this run");

        loop {
            let page = self
                .store
                .scan_page(&filter, Projection::SWEEP, after.as_deref(), self.page_size)
                .await?;

            for entity in &page.entities {
                report.scanned += 1;

                if self.spared.contains(&entity.id) {
                    debug!(id = %entity.id, "Sparing entity observed this run");
                    report.spared += 1;
                    continue;
                }

                match self
                    .store
                    .conditional_update(&entity.id, &precondition, &mutation)
                    .await
                {
                    Ok(UpdateOutcome::Applied) => {
                        debug!(
                            id = %entity.id,
                            previous_status = ?entity.tracked.status_text(),
                            "Entity ended"
                        );
                        report.ended += 1;
                    }
                    Ok(UpdateOutcome::Skipped) => {
                        debug!(id = %entity.id, "Entity already ended or gone");
                        report.skipped += 1;
                    }
                    Err(e) => {
                        warn!(id = %entity.id, error = %e, "Failed to end entity");
                        report.failed_ids.push(entity.id.clone());
                    }
                }
            }

            report.scanned += page.corrupt_ids.len();
            report.failed_ids.extend(page.corrupt_ids);

            match page.next_cursor {
                Some(cursor) => after = Some(cursor),
                None => break,
            }
        }

        info!(
            "Sweep complete: {} scanned, {} ended, {} skipped, {} spared, {} failed",
            report.scanned,
            report.ended,
            report.skipped,
            report.spared,
            report.failed_ids.len()
        );

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stores::MemoryStore;
    use crate::testing::FlakyStore;
    use crate::types::entity::{JobEntity, TrackedField};
    use crate::types::record::FieldValue;
    use serde_json::json;

    fn date(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    fn entity(id: &str, status: &str, last_seen: &str) -> JobEntity {
        let mut entity = JobEntity::new(id);
        entity.tracked.status = Some(FieldValue::from(status));
        entity.created_at = Some(date(last_seen));
        entity.last_seen_at = Some(date(last_seen));
        entity
    }

    #[tokio::test]
    async fn test_sweep_ends_stale_entities() {
        let store = MemoryStore::new();
        store.upsert(&entity("stale", "Active", "2024-03-01")).await.unwrap();
        store.upsert(&entity("ended", "Ended", "2024-02-01")).await.unwrap();
        store.upsert(&entity("fresh", "Active", "2024-03-02")).await.unwrap();

        let report = LifecycleSweeper::new(&store, date("2024-03-02"))
            .sweep()
            .await
            .unwrap();

        assert_eq!(report.scanned, 1);
        assert_eq!(report.ended, 1);
        assert!(report.is_success());

        let stale = store.get("stale").await.unwrap().unwrap();
        assert!(stale.is_ended());
        assert_eq!(stale.history.len(), 1);
        assert_eq!(stale.history[0].modified_at, date("2024-03-02"));
        assert_eq!(
            stale.history[0].previous(TrackedField::Status),
            Some(&json!("Active"))
        );

        let ended = store.get("ended").await.unwrap().unwrap();
        assert!(ended.history.is_empty());

        let fresh = store.get("fresh").await.unwrap().unwrap();
        assert_eq!(fresh.tracked.status_text(), Some("Active"));
    }

    #[tokio::test]
    async fn test_sweep_pages_through_everything() {
        let store = MemoryStore::new();
        for i in 0..7 {
            store
                .upsert(&entity(&format!("job-{}", i), "Active", "2024-03-01"))
                .await
                .unwrap();
        }

        let report = LifecycleSweeper::new(&store, date("2024-03-02"))
            .with_page_size(3)
            .sweep()
            .await
            .unwrap();

        assert_eq!(report.scanned, 7);
        assert_eq!(report.ended, 7);
    }

    #[tokio::test]
    async fn test_sweep_continues_after_update_failure() {
        let store = FlakyStore::new(MemoryStore::new()).fail_id("job-b");
        for id in ["job-a", "job-b", "job-c"] {
            store.inner().upsert(&entity(id, "Active", "2024-03-01")).await.unwrap();
        }

        let report = LifecycleSweeper::new(&store, date("2024-03-02"))
            .sweep()
            .await
            .unwrap();

        assert_eq!(report.ended, 2);
        assert_eq!(report.failed_ids, vec!["job-b".to_string()]);
        assert!(!report.is_success());

        let failed = store.inner().get("job-b").await.unwrap().unwrap();
        assert!(!failed.is_ended());
    }

    #[tokio::test]
    async fn test_sweep_spares_observed_ids() {
        let store = MemoryStore::new();
        store.upsert(&entity("seen", "Active", "2024-03-01")).await.unwrap();

        let report = LifecycleSweeper::new(&store, date("2024-03-02"))
            .with_spared(["seen".to_string()])
            .sweep()
            .await
            .unwrap();

        assert_eq!(report.spared, 1);
        assert_eq!(report.ended, 0);
        assert!(!store.get("seen").await.unwrap().unwrap().is_ended());
    }

    #[tokio::test]
    async fn test_sweep_is_idempotent() {
        let store = MemoryStore::new();
        store.upsert(&entity("stale", "Active", "2024-03-01")).await.unwrap();

        let sweeper = LifecycleSweeper::new(&store, date("2024-03-02"));
        sweeper.sweep().await.unwrap();
        let second = sweeper.sweep().await.unwrap();

        assert_eq!(second.scanned, 0);
        assert_eq!(store.get("stale").await.unwrap().unwrap().history.len(), 1);
    }

    #[tokio::test]
    async fn test_scan_failure_is_an_error() {
        let store = FlakyStore::new(MemoryStore::new()).fail_scans();
        let result = LifecycleSweeper::new(&store, date("2024-03-02")).sweep().await;
        assert!(result.is_err());
    }
}
