//! Storage gateway for job entities.
//!
//! The pipeline only needs four capabilities from a document store:
//! - point lookup with projection
//! - create-or-replace keyed by `_id`
//! - a guarded update, used to close entities atomically
//! - a filtered, paginated scan over the collection
//!
//! Every call returns a typed [`StoreResult`]; callers decide per entity
//! whether a failure is fatal (it never is inside a run).

use async_trait::async_trait;
use chrono::NaiveDate;
use indexmap::IndexMap;
use serde_json::Value;
use tracing::warn;

use crate::error::StoreResult;
use crate::types::entity::{ChangeRecord, JobEntity, Projection, TrackedField, STATUS_ENDED};
use crate::types::record::FieldValue;

/// Entity store used by the history tracker and the lifecycle sweep.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Get an entity by id, keeping only the projected field groups.
    async fn get_projected(&self, id: &str, projection: Projection) -> StoreResult<Option<JobEntity>>;

    /// Create the entity, or replace the stored one with the same id.
    ///
    /// The history tracker merges the stored document before calling this.
    async fn upsert(&self, entity: &JobEntity) -> StoreResult<()>;

    /// Apply `mutation` only if the entity exists and `precondition` holds
    /// at the moment of the write.
    async fn conditional_update(
        &self,
        id: &str,
        precondition: &Precondition,
        mutation: &Mutation,
    ) -> StoreResult<UpdateOutcome>;

    /// Fetch one page of entities matching `filter`, ordered by id.
    ///
    /// `after` is the cursor returned by the previous page.
    async fn scan_page(
        &self,
        filter: &ScanFilter,
        projection: Projection,
        after: Option<&str>,
        limit: usize,
    ) -> StoreResult<ScanPage>;

    /// Get a whole entity.
    async fn get(&self, id: &str) -> StoreResult<Option<JobEntity>> {
        self.get_projected(id, Projection::ALL).await
    }

    /// Scan every page matching `filter` and collect the results.
    async fn scan_excluding(
        &self,
        filter: &ScanFilter,
        projection: Projection,
        page_size: usize,
    ) -> StoreResult<Vec<JobEntity>> {
        let mut entities = Vec::new();
        let mut after: Option<String> = None;

        loop {
            let page = self
                .scan_page(filter, projection, after.as_deref(), page_size)
                .await?;
            entities.extend(page.entities);

            match page.next_cursor {
                Some(cursor) => after = Some(cursor),
                None => break,
            }
        }

        Ok(entities)
    }
}

/// Selects entities whose status and last-seen date both differ from the
/// given values. Missing values count as different.
#[derive(Debug, Clone, PartialEq)]
pub struct ScanFilter {
    pub status_not: String,
    pub last_seen_not: NaiveDate,
}

impl ScanFilter {
    pub fn new(status_not: impl Into<String>, last_seen_not: NaiveDate) -> Self {
        Self {
            status_not: status_not.into(),
            last_seen_not,
        }
    }

    /// Entities not ended and not seen on `run_date`.
    pub fn stale(run_date: NaiveDate) -> Self {
        Self::new(STATUS_ENDED, run_date)
    }

    pub fn matches(&self, entity: &JobEntity) -> bool {
        entity.tracked.status_text() != Some(self.status_not.as_str())
            && entity.last_seen_at != Some(self.last_seen_not)
    }
}

/// One page of a scan.
#[derive(Debug, Clone, Default)]
pub struct ScanPage {
    pub entities: Vec<JobEntity>,

    /// Ids of matching rows whose stored document could not be decoded
    pub corrupt_ids: Vec<String>,

    /// Cursor for the next page, `None` once the scan is exhausted
    pub next_cursor: Option<String>,
}

impl ScanPage {
    /// Build a page, deriving the cursor from the last id when the page
    /// came back full.
    pub fn from_entities(entities: Vec<JobEntity>, limit: usize) -> Self {
        let next_cursor = if entities.len() >= limit {
            entities.last().map(|e| e.id.clone())
        } else {
            None
        };
        Self {
            entities,
            corrupt_ids: Vec::new(),
            next_cursor,
        }
    }

    /// Build a page from rows decoded one at a time.
    ///
    /// Rows that failed to decode are logged and reported in
    /// `corrupt_ids`. The cursor comes from the last row id either way, so
    /// a corrupt row at the end of a page does not stall the scan.
    pub fn from_decoded(rows: Vec<(String, StoreResult<JobEntity>)>, limit: usize) -> Self {
        let next_cursor = if rows.len() >= limit {
            rows.last().map(|(id, _)| id.clone())
        } else {
            None
        };

        let mut page = Self {
            next_cursor,
            ..Default::default()
        };
        for (id, decoded) in rows {
            match decoded {
                Ok(entity) => page.entities.push(entity),
                Err(e) => {
                    warn!(id = %id, error = %e, "Skipping undecodable document");
                    page.corrupt_ids.push(id);
                }
            }
        }
        page
    }
}

/// Guard evaluated against the stored entity at write time.
#[derive(Debug, Clone, PartialEq)]
pub enum Precondition {
    /// Stored status is anything but this value (or absent)
    StatusNot(String),
}

impl Precondition {
    pub fn not_ended() -> Self {
        Self::StatusNot(STATUS_ENDED.to_string())
    }

    pub fn holds(&self, entity: &JobEntity) -> bool {
        match self {
            Self::StatusNot(status) => entity.tracked.status_text() != Some(status.as_str()),
        }
    }
}

/// Change applied by a conditional update.
#[derive(Debug, Clone, PartialEq)]
pub enum Mutation {
    /// Set `status` and record its previous value in history
    TransitionStatus { to: String, modified_at: NaiveDate },
}

impl Mutation {
    pub fn end(modified_at: NaiveDate) -> Self {
        Self::TransitionStatus {
            to: STATUS_ENDED.to_string(),
            modified_at,
        }
    }

    /// Apply the mutation to a loaded entity.
    pub fn apply(&self, entity: &mut JobEntity) {
        match self {
            Self::TransitionStatus { to, modified_at } => {
                let previous = entity
                    .tracked
                    .value_of(TrackedField::Status)
                    .unwrap_or(Value::Null);
                entity.tracked.status = Some(FieldValue::Text(to.clone()));
                entity.history.push(ChangeRecord::new(
                    *modified_at,
                    IndexMap::from([(TrackedField::Status, previous)]),
                ));
            }
        }
    }
}

/// Result of a conditional update that did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// The mutation was written
    Applied,
    /// The entity is gone or the precondition no longer holds
    Skipped,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn date(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    fn entity(id: &str, status: Option<&str>, last_seen: Option<&str>) -> JobEntity {
        let mut entity = JobEntity::new(id);
        entity.tracked.status = status.map(FieldValue::from);
        entity.last_seen_at = last_seen.map(date);
        entity
    }

    #[test]
    fn test_stale_filter() {
        let filter = ScanFilter::stale(date("2024-02-02"));

        assert!(filter.matches(&entity("a", Some("Active"), Some("2024-02-01"))));
        assert!(filter.matches(&entity("b", None, None)));
        assert!(!filter.matches(&entity("c", Some("Ended"), Some("2024-02-01"))));
        assert!(!filter.matches(&entity("d", Some("Active"), Some("2024-02-02"))));
    }

    #[test]
    fn test_precondition_not_ended() {
        let guard = Precondition::not_ended();
        assert!(guard.holds(&entity("a", Some("Active"), None)));
        assert!(guard.holds(&entity("a", None, None)));
        assert!(!guard.holds(&entity("a", Some("Ended"), None)));
    }

    #[test]
    fn test_end_mutation_records_previous_status() {
        let mut target = entity("a", Some("Active"), Some("2024-02-01"));
        Mutation::end(date("2024-02-02")).apply(&mut target);

        assert!(target.is_ended());
        assert_eq!(target.history.len(), 1);
        assert_eq!(target.history[0].modified_at, date("2024-02-02"));
        assert_eq!(
            target.history[0].previous(TrackedField::Status),
            Some(&json!("Active"))
        );
        // last_seen_at is untouched by the sweep
        assert_eq!(target.last_seen_at, Some(date("2024-02-01")));
    }

    #[test]
    fn test_scan_page_cursor() {
        let full = ScanPage::from_entities(vec![JobEntity::new("a"), JobEntity::new("b")], 2);
        assert_eq!(full.next_cursor.as_deref(), Some("b"));

        let partial = ScanPage::from_entities(vec![JobEntity::new("a")], 2);
        assert!(partial.next_cursor.is_none());
    }

    #[test]
    fn test_decoded_page_reports_corrupt_rows() {
        let corrupt = || crate::error::StoreError::Corrupt {
            id: "b".to_string(),
            reason: "expected value".to_string(),
        };

        let page = ScanPage::from_decoded(
            vec![
                ("a".to_string(), Ok(JobEntity::new("a"))),
                ("b".to_string(), Err(corrupt())),
            ],
            2,
        );

        assert_eq!(page.entities.len(), 1);
        assert_eq!(page.corrupt_ids, vec!["b".to_string()]);
        assert_eq!(page.next_cursor.as_deref(), Some("b"));
    }
}
