//! SQLite storage implementation.
//!
//! A file-based storage backend using SQLite. Good for:
//! - Local crawls
//! - Single-machine deployments
//! - Testing with persistent data
//!
//! Each collection is one table. The whole entity is kept as a JSON
//! document; `status` and `last_seen_at` are mirrored into their own
//! columns so the sweep filter and the conditional update run in SQL.

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;
use tracing::{debug, info, instrument};

use crate::error::{StoreError, StoreResult};
use crate::stores::validate_collection;
use crate::traits::store::{JobStore, Mutation, Precondition, ScanFilter, ScanPage, UpdateOutcome};
use crate::types::config::{required_env, DATABASE_URL_ENV};
use crate::types::entity::{JobEntity, Projection};

/// SQLite-based job store.
pub struct SqliteStore {
    pool: SqlitePool,
    table: String,
}

impl SqliteStore {
    /// Create a new SQLite store with the given connection URL.
    ///
    /// # Example URLs
    /// - `sqlite::memory:` - In-memory database (ephemeral)
    /// - `sqlite:./gigs.db` - File-based database, created if missing
    pub async fn new(database_url: &str, collection: &str) -> StoreResult<Self> {
        let options = SqliteConnectOptions::from_str(database_url)
            .map_err(StoreError::backend)?
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(StoreError::backend)?;

        Self::from_pool(pool, collection).await
    }

    /// Connect to the database named by `DATABASE_URL`.
    pub async fn from_env(collection: &str) -> crate::Result<Self> {
        let database_url = required_env(DATABASE_URL_ENV)?;
        Ok(Self::new(&database_url, collection).await?)
    }

    /// Create an in-memory SQLite store (for testing).
    ///
    /// Limited to one connection: every connection to `:memory:` opens its
    /// own empty database.
    pub async fn in_memory(collection: &str) -> StoreResult<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .map_err(StoreError::backend)?;

        Self::from_pool(pool, collection).await
    }

    /// Create a store from an existing pool.
    pub async fn from_pool(pool: SqlitePool, collection: &str) -> StoreResult<Self> {
        let table = validate_collection(collection)?.to_string();
        let store = Self { pool, table };
        store.run_migrations().await?;
        Ok(store)
    }

    /// Run database migrations.
    async fn run_migrations(&self) -> StoreResult<()> {
        sqlx::query(&format!(
            r#"
            CREATE TABLE IF NOT EXISTS {table} (
                id TEXT PRIMARY KEY,
                status TEXT,
                last_seen_at TEXT,
                document TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_{table}_sweep ON {table}(status, last_seen_at);
            "#,
            table = self.table
        ))
        .execute(&self.pool)
        .await
        .map_err(StoreError::backend)?;

        info!(table = %self.table, "SQLite job table ready");
        Ok(())
    }

    /// Get the underlying connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Number of stored entities.
    pub async fn count(&self) -> StoreResult<i64> {
        sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {}", self.table))
            .fetch_one(&self.pool)
            .await
            .map_err(StoreError::backend)
    }
}

fn decode(id: &str, document: &str) -> StoreResult<JobEntity> {
    serde_json::from_str(document).map_err(|e| StoreError::Corrupt {
        id: id.to_string(),
        reason: e.to_string(),
    })
}

fn last_seen_column(entity: &JobEntity) -> Option<String> {
    entity.last_seen_at.map(|d| d.to_string())
}

#[async_trait]
impl JobStore for SqliteStore {
    #[instrument(skip(self), fields(table = %self.table))]
    async fn get_projected(&self, id: &str, projection: Projection) -> StoreResult<Option<JobEntity>> {
        let document: Option<String> =
            sqlx::query_scalar(&format!("SELECT document FROM {} WHERE id = ?", self.table))
                .bind(id)
                .fetch_optional(&self.pool)
                .await
                .map_err(StoreError::backend)?;

        document
            .map(|doc| decode(id, &doc).map(|entity| entity.project(projection)))
            .transpose()
    }

    #[instrument(skip(self, entity), fields(table = %self.table, id = %entity.id))]
    async fn upsert(&self, entity: &JobEntity) -> StoreResult<()> {
        let document = serde_json::to_string(entity)?;

        sqlx::query(&format!(
            r#"
            INSERT INTO {} (id, status, last_seen_at, document)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                status = excluded.status,
                last_seen_at = excluded.last_seen_at,
                document = excluded.document
            "#,
            self.table
        ))
        .bind(&entity.id)
        .bind(entity.tracked.status_text())
        .bind(last_seen_column(entity))
        .bind(&document)
        .execute(&self.pool)
        .await
        .map_err(StoreError::backend)?;

        Ok(())
    }

    #[instrument(skip(self, precondition, mutation), fields(table = %self.table))]
    async fn conditional_update(
        &self,
        id: &str,
        precondition: &Precondition,
        mutation: &Mutation,
    ) -> StoreResult<UpdateOutcome> {
        let mut tx = self.pool.begin().await.map_err(StoreError::backend)?;

        let document: Option<String> =
            sqlx::query_scalar(&format!("SELECT document FROM {} WHERE id = ?", self.table))
                .bind(id)
                .fetch_optional(&mut *tx)
                .await
                .map_err(StoreError::backend)?;

        let Some(document) = document else {
            debug!("Entity is gone");
            return Ok(UpdateOutcome::Skipped);
        };

        let mut entity = decode(id, &document)?;
        if !precondition.holds(&entity) {
            return Ok(UpdateOutcome::Skipped);
        }
        mutation.apply(&mut entity);

        // The guard is repeated in SQL so the write only lands if it still holds.
        let Precondition::StatusNot(guard_status) = precondition;
        let result = sqlx::query(&format!(
            r#"
            UPDATE {}
            SET status = ?, last_seen_at = ?, document = ?
            WHERE id = ? AND (status IS NULL OR status != ?)
            "#,
            self.table
        ))
        .bind(entity.tracked.status_text())
        .bind(last_seen_column(&entity))
        .bind(serde_json::to_string(&entity)?)
        .bind(id)
        .bind(guard_status)
        .execute(&mut *tx)
        .await
        .map_err(StoreError::backend)?;

        tx.commit().await.map_err(StoreError::backend)?;

        if result.rows_affected() == 0 {
            Ok(UpdateOutcome::Skipped)
        } else {
            Ok(UpdateOutcome::Applied)
        }
    }

    #[instrument(skip(self, filter), fields(table = %self.table))]
    async fn scan_page(
        &self,
        filter: &ScanFilter,
        projection: Projection,
        after: Option<&str>,
        limit: usize,
    ) -> StoreResult<ScanPage> {
        let rows: Vec<(String, String)> = sqlx::query_as(&format!(
            r#"
            SELECT id, document FROM {}
            WHERE (status IS NULL OR status != ?)
              AND (last_seen_at IS NULL OR last_seen_at != ?)
              AND id > ?
            ORDER BY id
            LIMIT ?
            "#,
            self.table
        ))
        .bind(&filter.status_not)
        .bind(filter.last_seen_not.to_string())
        .bind(after.unwrap_or(""))
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(StoreError::backend)?;

        let decoded = rows
            .into_iter()
            .map(|(id, doc)| {
                let entity = decode(&id, &doc).map(|entity| entity.project(projection));
                (id, entity)
            })
            .collect();

        let page = ScanPage::from_decoded(decoded, limit);
        debug!(
            count = page.entities.len(),
            corrupt = page.corrupt_ids.len(),
            "Scanned page"
        );
        Ok(page)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::entity::TrackedField;
    use crate::types::record::FieldValue;
    use chrono::NaiveDate;
    use serde_json::json;

    async fn test_store() -> SqliteStore {
        SqliteStore::in_memory("freelancer").await.unwrap()
    }

    fn date(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    fn entity(id: &str, status: &str, last_seen: &str) -> JobEntity {
        let mut entity = JobEntity::new(id);
        entity.tracked.status = Some(FieldValue::from(status));
        entity.created_at = Some(date(last_seen));
        entity.last_seen_at = Some(date(last_seen));
        entity.details.title = Some(FieldValue::from("Scraper"));
        entity
    }

    #[tokio::test]
    async fn test_rejects_bad_collection() {
        let result = SqliteStore::in_memory("jobs; --").await;
        assert!(matches!(result, Err(StoreError::InvalidCollection { .. })));
    }

    #[tokio::test]
    async fn test_upsert_and_get() {
        let store = test_store().await;
        let original = entity("https://www.freelancer.com/projects/a", "Active", "2024-01-01");

        store.upsert(&original).await.unwrap();
        let stored = store.get(&original.id).await.unwrap().unwrap();
        assert_eq!(stored, original);

        let mut replaced = original.clone();
        replaced.tracked.status = Some(FieldValue::from("Closed"));
        store.upsert(&replaced).await.unwrap();

        assert_eq!(store.count().await.unwrap(), 1);
        let stored = store
            .get_projected(&original.id, Projection::SWEEP)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.tracked.status_text(), Some("Closed"));
        assert!(stored.details.title.is_none());
    }

    #[tokio::test]
    async fn test_conditional_update() {
        let store = test_store().await;
        store.upsert(&entity("a", "Active", "2024-01-01")).await.unwrap();
        store.upsert(&entity("b", "Ended", "2024-01-01")).await.unwrap();

        let guard = Precondition::not_ended();
        let end = Mutation::end(date("2024-01-05"));

        assert_eq!(
            store.conditional_update("a", &guard, &end).await.unwrap(),
            UpdateOutcome::Applied
        );
        assert_eq!(
            store.conditional_update("a", &guard, &end).await.unwrap(),
            UpdateOutcome::Skipped
        );
        assert_eq!(
            store.conditional_update("b", &guard, &end).await.unwrap(),
            UpdateOutcome::Skipped
        );
        assert_eq!(
            store.conditional_update("missing", &guard, &end).await.unwrap(),
            UpdateOutcome::Skipped
        );

        let a = store.get("a").await.unwrap().unwrap();
        assert!(a.is_ended());
        assert_eq!(a.last_seen_at, Some(date("2024-01-01")));
        assert_eq!(a.history.len(), 1);
        assert_eq!(a.history[0].previous(TrackedField::Status), Some(&json!("Active")));
    }

    #[tokio::test]
    async fn test_scan_filters_and_paginates() {
        let store = test_store().await;
        for id in ["d", "a", "c", "b"] {
            store.upsert(&entity(id, "Active", "2024-01-01")).await.unwrap();
        }
        store.upsert(&entity("e", "Ended", "2024-01-01")).await.unwrap();
        store.upsert(&entity("f", "Active", "2024-01-02")).await.unwrap();

        let filter = ScanFilter::stale(date("2024-01-02"));

        let first = store.scan_page(&filter, Projection::SWEEP, None, 3).await.unwrap();
        let ids: Vec<_> = first.entities.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
        assert_eq!(first.next_cursor.as_deref(), Some("c"));

        let second = store
            .scan_page(&filter, Projection::SWEEP, first.next_cursor.as_deref(), 3)
            .await
            .unwrap();
        let ids: Vec<_> = second.entities.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["d"]);
        assert!(second.next_cursor.is_none());
        assert!(second.entities[0].details.title.is_none());
    }

    #[tokio::test]
    async fn test_corrupt_document() {
        let store = test_store().await;
        sqlx::query("INSERT INTO freelancer (id, status, last_seen_at, document) VALUES ('x', NULL, NULL, 'not json')")
            .execute(store.pool())
            .await
            .unwrap();

        let result = store.get("x").await;
        assert!(matches!(result, Err(StoreError::Corrupt { .. })));
    }

    #[tokio::test]
    async fn test_sweep_survives_corrupt_document() {
        use crate::pipeline::sweep::LifecycleSweeper;

        let store = test_store().await;
        sqlx::query("INSERT INTO freelancer (id, status, last_seen_at, document) VALUES ('a_bad', 'Active', '2024-01-01', '{\"_id\": 5')")
            .execute(store.pool())
            .await
            .unwrap();
        store.upsert(&entity("b_good", "Active", "2024-01-01")).await.unwrap();

        let page = store
            .scan_page(&ScanFilter::stale(date("2024-01-02")), Projection::SWEEP, None, 10)
            .await
            .unwrap();
        assert_eq!(page.corrupt_ids, vec!["a_bad".to_string()]);
        assert_eq!(page.entities.len(), 1);

        let report = LifecycleSweeper::new(&store, date("2024-01-02"))
            .with_page_size(1)
            .sweep()
            .await
            .unwrap();

        assert_eq!(report.ended, 1);
        assert_eq!(report.failed_ids, vec!["a_bad".to_string()]);
        assert!(store.get("b_good").await.unwrap().unwrap().is_ended());
    }
}
