//! Retrying store wrapper.
//!
//! Wraps any JobStore and retries calls that failed with a transient
//! error, backing off exponentially between attempts.

use async_trait::async_trait;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

use crate::error::StoreResult;
use crate::traits::store::{JobStore, Mutation, Precondition, ScanFilter, ScanPage, UpdateOutcome};
use crate::types::entity::{JobEntity, Projection};

/// Default number of attempts per call, including the first one.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Default delay before the first retry.
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(200);

/// A store wrapper that retries transient failures.
///
/// Non-transient errors (corrupt documents, bad collection names) are
/// returned immediately. Retrying a conditional update is safe: its guard
/// turns a repeat of an applied write into a skip.
pub struct RetryingStore<S: JobStore> {
    inner: S,
    max_attempts: u32,
    base_delay: Duration,
}

impl<S: JobStore> RetryingStore<S> {
    /// Create a retrying store.
    ///
    /// # Arguments
    /// * `inner` - The underlying store to wrap
    /// * `max_attempts` - Attempts per call, at least one
    /// * `base_delay` - Delay before the first retry, doubled each time
    pub fn new(inner: S, max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            inner,
            max_attempts: max_attempts.max(1),
            base_delay,
        }
    }

    /// Wrap a store with the default policy.
    pub fn with_defaults(inner: S) -> Self {
        Self::new(inner, DEFAULT_MAX_ATTEMPTS, DEFAULT_BASE_DELAY)
    }

    /// The wrapped store.
    pub fn inner(&self) -> &S {
        &self.inner
    }

    async fn with_retry<T, F, Fut>(&self, operation: &str, mut call: F) -> StoreResult<T>
    where
        F: FnMut() -> Fut + Send,
        Fut: Future<Output = StoreResult<T>> + Send,
        T: Send,
    {
        let mut attempt = 1;
        loop {
            match call().await {
                Err(e) if e.is_transient() && attempt < self.max_attempts => {
                    let delay = self.base_delay * 2u32.saturating_pow(attempt - 1);
                    warn!(
                        operation,
                        attempt,
                        max_attempts = self.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Transient storage failure, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                result => return result,
            }
        }
    }
}

#[async_trait]
impl<S: JobStore> JobStore for RetryingStore<S> {
    async fn get_projected(&self, id: &str, projection: Projection) -> StoreResult<Option<JobEntity>> {
        self.with_retry("get", || self.inner.get_projected(id, projection))
            .await
    }

    async fn upsert(&self, entity: &JobEntity) -> StoreResult<()> {
        self.with_retry("upsert", || self.inner.upsert(entity)).await
    }

    async fn conditional_update(
        &self,
        id: &str,
        precondition: &Precondition,
        mutation: &Mutation,
    ) -> StoreResult<UpdateOutcome> {
        self.with_retry("conditional_update", || {
            self.inner.conditional_update(id, precondition, mutation)
        })
        .await
    }

    async fn scan_page(
        &self,
        filter: &ScanFilter,
        projection: Projection,
        after: Option<&str>,
        limit: usize,
    ) -> StoreResult<ScanPage> {
        self.with_retry("scan_page", || {
            self.inner.scan_page(filter, projection, after, limit)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;
    use crate::stores::MemoryStore;
    use crate::testing::FlakyStore;

    fn retrying<S: JobStore>(inner: S, attempts: u32) -> RetryingStore<S> {
        RetryingStore::new(inner, attempts, Duration::from_millis(1))
    }

    #[tokio::test]
    async fn test_recovers_from_transient_failures() {
        let store = retrying(FlakyStore::new(MemoryStore::new()).fail_times(2), 3);

        store.upsert(&JobEntity::new("a")).await.unwrap();

        assert_eq!(store.inner().calls().len(), 3);
        assert_eq!(store.inner().inner().len(), 1);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_attempts() {
        let store = retrying(FlakyStore::new(MemoryStore::new()).fail_id("a"), 3);

        let result = store.get("a").await;

        assert!(matches!(result, Err(StoreError::Backend(_))));
        assert_eq!(store.inner().calls().len(), 3);
    }

    #[tokio::test]
    async fn test_single_attempt_is_not_retried() {
        let store = retrying(FlakyStore::new(MemoryStore::new()).fail_times(1), 0);

        assert!(store.get("a").await.is_err());
        assert_eq!(store.inner().calls().len(), 1);
    }
}
