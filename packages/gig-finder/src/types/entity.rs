//! Persisted job entities and their change history.

use chrono::NaiveDate;
use indexmap::IndexMap;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

use crate::error::ConfigError;
use crate::types::record::FieldValue;

/// Terminal status set by the lifecycle sweep.
pub const STATUS_ENDED: &str = "Ended";

/// Business fields eligible for change tracking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackedField {
    Status,
    PriceMin,
    PriceMax,
    Offers,
    IsCompetition,
    IsHourly,
    Types,
    VerifiedPayment,
    Tags,
}

impl TrackedField {
    /// Every tracked field, in document order.
    pub const ALL: [TrackedField; 9] = [
        Self::Status,
        Self::PriceMin,
        Self::PriceMax,
        Self::Offers,
        Self::IsCompetition,
        Self::IsHourly,
        Self::Types,
        Self::VerifiedPayment,
        Self::Tags,
    ];

    /// Stored field name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Status => "status",
            Self::PriceMin => "price_min",
            Self::PriceMax => "price_max",
            Self::Offers => "offers",
            Self::IsCompetition => "is_competition",
            Self::IsHourly => "is_hourly",
            Self::Types => "types",
            Self::VerifiedPayment => "verified_payment",
            Self::Tags => "tags",
        }
    }
}

impl fmt::Display for TrackedField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TrackedField {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|field| field.as_str() == s)
            .ok_or_else(|| ConfigError::invalid("tracked_fields", format!("unknown field '{}'", s)))
    }
}

/// The tracked business fields of a job.
///
/// Derived fields (`price_min`, `price_max`, `offers`, `is_competition`,
/// `is_hourly`) are always written, as `null` when they could not be
/// derived. Scraped fields are omitted when the crawler did not emit them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackedFields {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<FieldValue>,
    pub price_min: Option<Decimal>,
    pub price_max: Option<Decimal>,
    pub offers: Option<i64>,
    pub is_competition: Option<bool>,
    pub is_hourly: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub types: Option<FieldValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verified_payment: Option<FieldValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<FieldValue>,
}

impl TrackedFields {
    /// Value of a field for diffing.
    ///
    /// `None` means the field is absent; `Some(Value::Null)` means it is
    /// present with a null value. Derived fields are always present.
    pub fn value_of(&self, field: TrackedField) -> Option<Value> {
        fn scraped(value: &Option<FieldValue>) -> Option<Value> {
            value.as_ref().map(Value::from)
        }

        match field {
            TrackedField::Status => scraped(&self.status),
            TrackedField::PriceMin => Some(decimal_value(self.price_min)),
            TrackedField::PriceMax => Some(decimal_value(self.price_max)),
            TrackedField::Offers => Some(self.offers.map_or(Value::Null, Value::from)),
            TrackedField::IsCompetition => Some(self.is_competition.map_or(Value::Null, Value::Bool)),
            TrackedField::IsHourly => Some(self.is_hourly.map_or(Value::Null, Value::Bool)),
            TrackedField::Types => scraped(&self.types),
            TrackedField::VerifiedPayment => scraped(&self.verified_payment),
            TrackedField::Tags => scraped(&self.tags),
        }
    }

    /// Status as plain text, when it is text.
    pub fn status_text(&self) -> Option<&str> {
        self.status.as_ref().and_then(FieldValue::as_text)
    }

    /// Fill scraped fields this observation did not carry from `stored`.
    ///
    /// Derived fields are recomputed on every observation and keep their
    /// incoming value, null included.
    pub fn fill_missing(&mut self, stored: &TrackedFields) {
        fill(&mut self.status, &stored.status);
        fill(&mut self.types, &stored.types);
        fill(&mut self.verified_payment, &stored.verified_payment);
        fill(&mut self.tags, &stored.tags);
    }
}

fn fill(slot: &mut Option<FieldValue>, stored: &Option<FieldValue>) {
    if slot.is_none() {
        slot.clone_from(stored);
    }
}

// Decimals are stored as strings so currency amounts round-trip exactly.
fn decimal_value(value: Option<Decimal>) -> Value {
    value.map_or(Value::Null, |d| Value::String(d.to_string()))
}

/// Stored but never diffed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JobDetails {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<FieldValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<FieldValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub link: Option<FieldValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tag_links: Option<FieldValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub paid_when: Option<FieldValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub posted_when: Option<FieldValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deadline: Option<FieldValue>,
}

impl JobDetails {
    /// Fill fields this observation did not carry from `stored`.
    pub fn fill_missing(&mut self, stored: &JobDetails) {
        fill(&mut self.title, &stored.title);
        fill(&mut self.description, &stored.description);
        fill(&mut self.link, &stored.link);
        fill(&mut self.tag_links, &stored.tag_links);
        fill(&mut self.paid_when, &stored.paid_when);
        fill(&mut self.posted_when, &stored.posted_when);
        fill(&mut self.deadline, &stored.deadline);
    }
}

/// One entry of an entity's history.
///
/// `changes` maps each field that changed to the value it had *before*
/// the change, so history replays backwards from the current state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeRecord {
    pub modified_at: NaiveDate,
    pub changes: IndexMap<TrackedField, Value>,
}

impl ChangeRecord {
    pub fn new(modified_at: NaiveDate, changes: IndexMap<TrackedField, Value>) -> Self {
        Self {
            modified_at,
            changes,
        }
    }

    /// Previous value recorded for a field, if the field changed.
    pub fn previous(&self, field: TrackedField) -> Option<&Value> {
        self.changes.get(&field)
    }
}

/// A persisted job posting, keyed by its absolute URL.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobEntity {
    /// `base_url + site-relative path`
    #[serde(rename = "_id")]
    pub id: String,

    /// Run date of the first observation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<NaiveDate>,

    /// Run date of the latest observation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_seen_at: Option<NaiveDate>,

    /// Append-only, oldest first
    #[serde(default)]
    pub history: Vec<ChangeRecord>,

    #[serde(flatten)]
    pub tracked: TrackedFields,

    #[serde(flatten)]
    pub details: JobDetails,
}

impl JobEntity {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }

    /// Whether the lifecycle sweep has closed this entity.
    pub fn is_ended(&self) -> bool {
        self.tracked.status_text() == Some(STATUS_ENDED)
    }

    /// Keep only the field groups selected by `projection`.
    pub fn project(mut self, projection: Projection) -> Self {
        if !projection.timestamps {
            self.created_at = None;
            self.last_seen_at = None;
        }
        if !projection.history {
            self.history = Vec::new();
        }
        if !projection.tracked {
            self.tracked = TrackedFields::default();
        }
        if !projection.details {
            self.details = JobDetails::default();
        }
        self
    }
}

/// Field groups to load from the store. `_id` is always included.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Projection {
    pub tracked: bool,
    pub details: bool,
    pub history: bool,
    pub timestamps: bool,
}

impl Projection {
    /// The whole document.
    pub const ALL: Projection = Projection {
        tracked: true,
        details: true,
        history: true,
        timestamps: true,
    };

    /// What the lifecycle sweep needs to pick stale entities.
    pub const SWEEP: Projection = Projection {
        tracked: true,
        details: false,
        history: false,
        timestamps: true,
    };
}
