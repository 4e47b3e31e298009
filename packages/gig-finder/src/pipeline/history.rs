//! History tracker - decides whether a posting is new, unchanged, modified
//! or already seen in this run, and maintains the entity's change history.

use indexmap::IndexMap;
use serde_json::Value;
use tracing::debug;

use crate::error::StoreResult;
use crate::pipeline::transform::JobPosting;
use crate::traits::store::JobStore;
use crate::types::entity::{ChangeRecord, JobEntity, Projection, TrackedField, TrackedFields};

/// Outcome of tracking one posting.
#[derive(Debug, Clone, PartialEq)]
pub enum Tracked {
    /// First observation; the entity is ready to insert
    Created(JobEntity),

    /// Seen in an earlier run; `changed` is true when a change record was
    /// appended to the history
    Updated { entity: JobEntity, changed: bool },

    /// Already processed earlier in this run; nothing should be written
    DuplicateInRun,
}

impl Tracked {
    /// The entity to upsert, unless this is a duplicate.
    pub fn into_entity(self) -> Option<JobEntity> {
        match self {
            Self::Created(entity) | Self::Updated { entity, .. } => Some(entity),
            Self::DuplicateInRun => None,
        }
    }
}

/// Diff two sets of tracked fields.
///
/// Every field in `fields` that is present in `incoming` and differs from
/// `stored` maps to its *stored* value (null when it was absent).
pub fn diff(
    stored: &TrackedFields,
    incoming: &TrackedFields,
    fields: &[TrackedField],
) -> IndexMap<TrackedField, Value> {
    let mut changes = IndexMap::new();

    for &field in fields {
        let Some(new_value) = incoming.value_of(field) else {
            continue;
        };
        let old_value = stored.value_of(field).unwrap_or(Value::Null);
        if old_value != new_value {
            changes.insert(field, old_value);
        }
    }

    changes
}

/// Merges incoming postings with their stored versions.
pub struct HistoryTracker<'a, S: JobStore> {
    store: &'a S,
    tracked_fields: &'a [TrackedField],
}

impl<'a, S: JobStore> HistoryTracker<'a, S> {
    pub fn new(store: &'a S, tracked_fields: &'a [TrackedField]) -> Self {
        Self {
            store,
            tracked_fields,
        }
    }

    /// Prepare a posting for upsert.
    ///
    /// The posting's `last_seen_at` is the run date. Fields the posting
    /// does not carry keep their stored value, so the returned entity is
    /// the merged document.
    pub async fn track(&self, mut posting: JobPosting) -> StoreResult<Tracked> {
        let run_date = posting.last_seen_at;

        let Some(stored) = self
            .store
            .get_projected(&posting.id, Projection::ALL)
            .await?
        else {
            debug!(id = %posting.id, "First observation");
            return Ok(Tracked::Created(posting.into_entity(run_date, Vec::new())));
        };

        if stored.last_seen_at == Some(run_date) {
            debug!(id = %posting.id, "Already processed in this run");
            return Ok(Tracked::DuplicateInRun);
        }

        let changes = diff(&stored.tracked, &posting.tracked, self.tracked_fields);
        let changed = !changes.is_empty();

        let mut history = stored.history;
        if changed {
            debug!(
                id = %posting.id,
                fields = ?changes.keys().collect::<Vec<_>>(),
                "Tracked fields changed"
            );
            history.push(ChangeRecord::new(run_date, changes));
        }

        posting.tracked.fill_missing(&stored.tracked);
        posting.details.fill_missing(&stored.details);

        // Entities written before created_at existed get the current run date.
        let created_at = stored.created_at.unwrap_or(run_date);

        Ok(Tracked::Updated {
            entity: posting.into_entity(created_at, history),
            changed,
        })
    }
}
