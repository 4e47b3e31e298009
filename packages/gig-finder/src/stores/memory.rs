//! In-memory storage implementation for testing and development.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::error::{StoreError, StoreResult};
use crate::traits::store::{JobStore, Mutation, Precondition, ScanFilter, ScanPage, UpdateOutcome};
use crate::types::entity::{JobEntity, Projection};

/// In-memory job store.
///
/// Entities are kept ordered by id so scans paginate the same way the SQL
/// backends do. Not suitable for production as data is lost on restart.
pub struct MemoryStore {
    entities: RwLock<BTreeMap<String, JobEntity>>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    /// Create a new empty memory store.
    pub fn new() -> Self {
        Self {
            entities: RwLock::new(BTreeMap::new()),
        }
    }

    /// Number of stored entities.
    pub fn len(&self) -> usize {
        self.entities.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Clear all stored data.
    pub fn clear(&self) -> StoreResult<()> {
        self.write()?.clear();
        Ok(())
    }

    fn read(&self) -> StoreResult<RwLockReadGuard<'_, BTreeMap<String, JobEntity>>> {
        self.entities
            .read()
            .map_err(|_| StoreError::backend("memory store lock poisoned"))
    }

    fn write(&self) -> StoreResult<RwLockWriteGuard<'_, BTreeMap<String, JobEntity>>> {
        self.entities
            .write()
            .map_err(|_| StoreError::backend("memory store lock poisoned"))
    }
}

#[async_trait]
impl JobStore for MemoryStore {
    async fn get_projected(&self, id: &str, projection: Projection) -> StoreResult<Option<JobEntity>> {
        Ok(self
            .read()?
            .get(id)
            .cloned()
            .map(|entity| entity.project(projection)))
    }

    async fn upsert(&self, entity: &JobEntity) -> StoreResult<()> {
        self.write()?.insert(entity.id.clone(), entity.clone());
        Ok(())
    }

    async fn conditional_update(
        &self,
        id: &str,
        precondition: &Precondition,
        mutation: &Mutation,
    ) -> StoreResult<UpdateOutcome> {
        let mut entities = self.write()?;

        match entities.get_mut(id) {
            Some(entity) if precondition.holds(entity) => {
                mutation.apply(entity);
                Ok(UpdateOutcome::Applied)
            }
            _ => Ok(UpdateOutcome::Skipped),
        }
    }

    async fn scan_page(
        &self,
        filter: &ScanFilter,
        projection: Projection,
        after: Option<&str>,
        limit: usize,
    ) -> StoreResult<ScanPage> {
        let entities = self.read()?;

        let lower = match after {
            Some(cursor) => Bound::Excluded(cursor.to_string()),
            None => Bound::Unbounded,
        };

        let page: Vec<JobEntity> = entities
            .range((lower, Bound::Unbounded))
            .map(|(_, entity)| entity)
            .filter(|entity| filter.matches(entity))
            .take(limit)
            .map(|entity| entity.clone().project(projection))
            .collect();

        Ok(ScanPage::from_entities(page, limit))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::record::FieldValue;
    use chrono::NaiveDate;

    fn date(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    fn entity(id: &str, status: &str, last_seen: &str) -> JobEntity {
        let mut entity = JobEntity::new(id);
        entity.tracked.status = Some(FieldValue::from(status));
        entity.last_seen_at = Some(date(last_seen));
        entity.details.title = Some(FieldValue::from("A title"));
        entity
    }

    #[tokio::test]
    async fn test_upsert_replaces() {
        let store = MemoryStore::new();
        store.upsert(&entity("a", "Active", "2024-01-01")).await.unwrap();
        store.upsert(&entity("a", "Closed", "2024-01-02")).await.unwrap();

        assert_eq!(store.len(), 1);
        let stored = store.get("a").await.unwrap().unwrap();
        assert_eq!(stored.tracked.status_text(), Some("Closed"));
    }

    #[tokio::test]
    async fn test_projection_drops_details() {
        let store = MemoryStore::new();
        store.upsert(&entity("a", "Active", "2024-01-01")).await.unwrap();

        let projected = store
            .get_projected("a", Projection::SWEEP)
            .await
            .unwrap()
            .unwrap();
        assert!(projected.details.title.is_none());
        assert_eq!(projected.tracked.status_text(), Some("Active"));
        assert!(store.get_projected("missing", Projection::ALL).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_conditional_update_guard() {
        let store = MemoryStore::new();
        store.upsert(&entity("a", "Ended", "2024-01-01")).await.unwrap();
        store.upsert(&entity("b", "Active", "2024-01-01")).await.unwrap();

        let guard = Precondition::not_ended();
        let end = Mutation::end(date("2024-01-02"));

        assert_eq!(
            store.conditional_update("a", &guard, &end).await.unwrap(),
            UpdateOutcome::Skipped
        );
        assert_eq!(
            store.conditional_update("b", &guard, &end).await.unwrap(),
            UpdateOutcome::Applied
        );
        assert_eq!(
            store.conditional_update("missing", &guard, &end).await.unwrap(),
            UpdateOutcome::Skipped
        );
        assert!(store.get("a").await.unwrap().unwrap().history.is_empty());
        assert!(store.get("b").await.unwrap().unwrap().is_ended());
    }

    #[tokio::test]
    async fn test_scan_pages_in_id_order() {
        let store = MemoryStore::new();
        for id in ["e", "a", "c", "b", "d"] {
            store.upsert(&entity(id, "Active", "2024-01-01")).await.unwrap();
        }
        store.upsert(&entity("f", "Ended", "2024-01-01")).await.unwrap();

        let all = store
            .scan_excluding(&ScanFilter::stale(date("2024-01-02")), Projection::SWEEP, 2)
            .await
            .unwrap();
        let ids: Vec<_> = all.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c", "d", "e"]);
    }
}
