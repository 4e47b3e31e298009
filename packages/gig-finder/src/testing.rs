//! Testing utilities including mock implementations.
//!
//! These are useful for exercising crawl runs without a crawler or a real
//! database, and for injecting storage failures.

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use std::collections::HashSet;
use std::sync::{Arc, RwLock};

use crate::error::{SourceError, SourceResult, StoreError, StoreResult};
use crate::traits::{
    source::JobSource,
    store::{JobStore, Mutation, Precondition, ScanFilter, ScanPage, UpdateOutcome},
};
use crate::types::entity::{JobEntity, Projection};
use crate::types::record::RawRecord;

/// A store wrapper that fails on demand.
///
/// Every call is recorded. Failures are [`StoreError::Backend`], so they
/// count as transient.
pub struct FlakyStore<S: JobStore> {
    inner: S,

    /// Ids whose reads and writes always fail
    fail_ids: Arc<RwLock<HashSet<String>>>,

    /// Whether scans fail
    fail_scans: bool,

    /// Remaining calls that fail regardless of id
    fail_remaining: Arc<RwLock<usize>>,

    /// Call tracking
    calls: Arc<RwLock<Vec<StoreCall>>>,
}

/// Record of a call made to the flaky store.
#[derive(Debug, Clone, PartialEq)]
pub enum StoreCall {
    Get { id: String },
    Upsert { id: String },
    ConditionalUpdate { id: String },
    Scan { after: Option<String> },
}

impl<S: JobStore> FlakyStore<S> {
    /// Wrap a store; nothing fails until configured.
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            fail_ids: Arc::new(RwLock::new(HashSet::new())),
            fail_scans: false,
            fail_remaining: Arc::new(RwLock::new(0)),
            calls: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Fail every call touching this id.
    pub fn fail_id(self, id: impl Into<String>) -> Self {
        self.fail_ids.write().unwrap().insert(id.into());
        self
    }

    /// Fail every scan.
    pub fn fail_scans(mut self) -> Self {
        self.fail_scans = true;
        self
    }

    /// Fail the next `n` calls, whatever they are.
    pub fn fail_times(self, n: usize) -> Self {
        *self.fail_remaining.write().unwrap() = n;
        self
    }

    /// The wrapped store.
    pub fn inner(&self) -> &S {
        &self.inner
    }

    /// Get all calls made to this store.
    pub fn calls(&self) -> Vec<StoreCall> {
        self.calls.read().unwrap().clone()
    }

    fn check(&self, call: StoreCall) -> StoreResult<()> {
        let id = match &call {
            StoreCall::Get { id } | StoreCall::Upsert { id } | StoreCall::ConditionalUpdate { id } => {
                Some(id.clone())
            }
            StoreCall::Scan { .. } => None,
        };
        let is_scan = id.is_none();
        self.calls.write().unwrap().push(call);

        {
            let mut remaining = self.fail_remaining.write().unwrap();
            if *remaining > 0 {
                *remaining -= 1;
                return Err(StoreError::backend("Mock transient failure"));
            }
        }

        if is_scan && self.fail_scans {
            return Err(StoreError::backend("Mock scan failure"));
        }

        if let Some(id) = id {
            if self.fail_ids.read().unwrap().contains(&id) {
                return Err(StoreError::backend(format!("Mock failure for {}", id)));
            }
        }

        Ok(())
    }
}

#[async_trait]
impl<S: JobStore> JobStore for FlakyStore<S> {
    async fn get_projected(&self, id: &str, projection: Projection) -> StoreResult<Option<JobEntity>> {
        self.check(StoreCall::Get { id: id.to_string() })?;
        self.inner.get_projected(id, projection).await
    }

    async fn upsert(&self, entity: &JobEntity) -> StoreResult<()> {
        self.check(StoreCall::Upsert {
            id: entity.id.clone(),
        })?;
        self.inner.upsert(entity).await
    }

    async fn conditional_update(
        &self,
        id: &str,
        precondition: &Precondition,
        mutation: &Mutation,
    ) -> StoreResult<UpdateOutcome> {
        self.check(StoreCall::ConditionalUpdate { id: id.to_string() })?;
        self.inner.conditional_update(id, precondition, mutation).await
    }

    async fn scan_page(
        &self,
        filter: &ScanFilter,
        projection: Projection,
        after: Option<&str>,
        limit: usize,
    ) -> StoreResult<ScanPage> {
        self.check(StoreCall::Scan {
            after: after.map(str::to_string),
        })?;
        self.inner.scan_page(filter, projection, after, limit).await
    }
}

/// A mock record source for testing.
///
/// Yields predefined records in order, optionally followed by a failure.
#[derive(Default)]
pub struct MockSource {
    records: Vec<RawRecord>,

    /// Fail after yielding this many records
    fail_after: Option<usize>,
}

impl MockSource {
    /// Create a new empty mock source.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a record.
    pub fn with_record(mut self, record: RawRecord) -> Self {
        self.records.push(record);
        self
    }

    /// Add multiple records.
    pub fn with_records(mut self, records: impl IntoIterator<Item = RawRecord>) -> Self {
        self.records.extend(records);
        self
    }

    /// Stop with an error after `n` records.
    pub fn fail_after(mut self, n: usize) -> Self {
        self.fail_after = Some(n);
        self
    }
}

impl JobSource for MockSource {
    fn records(&self) -> BoxStream<'_, SourceResult<RawRecord>> {
        let take = self.fail_after.unwrap_or(self.records.len());
        let mut items: Vec<SourceResult<RawRecord>> =
            self.records.iter().take(take).cloned().map(Ok).collect();

        if self.fail_after.is_some() {
            items.push(Err(SourceError::Io(std::io::Error::new(
                std::io::ErrorKind::ConnectionReset,
                "Mock source failure",
            ))));
        }

        stream::iter(items).boxed()
    }
}
