//! Record types - raw crawler output and the cleaned job record.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// A value as emitted by the crawler, before any cleaning.
///
/// Lists may contain anything the extraction step produced; only their
/// string elements survive normalization. Floats, objects and integers
/// outside `i64` land in `Other` so one odd value never rejects a record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawValue {
    Null,
    Flag(bool),
    Integer(i64),
    Text(String),
    List(Vec<RawValue>),
    Other(serde_json::Value),
}

impl From<&str> for RawValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for RawValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<i64> for RawValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<bool> for RawValue {
    fn from(value: bool) -> Self {
        Self::Flag(value)
    }
}

impl From<Vec<&str>> for RawValue {
    fn from(values: Vec<&str>) -> Self {
        Self::List(values.into_iter().map(RawValue::from).collect())
    }
}

impl<T: Into<RawValue>> From<Option<T>> for RawValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}

/// One scraped job as the crawler hands it over.
///
/// `id` is the site-relative path of the job page; every other key is kept
/// in crawl order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawRecord {
    /// Site-relative path captured during crawling
    #[serde(rename = "_id")]
    pub id: String,

    /// Every other scraped key
    #[serde(flatten)]
    pub fields: IndexMap<String, RawValue>,
}

impl RawRecord {
    /// Create a record with no fields.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            fields: IndexMap::new(),
        }
    }

    /// Set a field.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<RawValue>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    /// Get a field by name.
    pub fn get(&self, key: &str) -> Option<&RawValue> {
        self.fields.get(key)
    }
}

/// A cleaned field value.
///
/// Absent and null values are represented by `Option::None` on the owning
/// field, never by a variant here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Flag(bool),
    Integer(i64),
    Text(String),
    List(Vec<String>),
}

impl FieldValue {
    /// Borrow the text of a `Text` value.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            _ => None,
        }
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<&FieldValue> for serde_json::Value {
    fn from(value: &FieldValue) -> Self {
        match value {
            FieldValue::Flag(flag) => Self::Bool(*flag),
            FieldValue::Integer(n) => Self::from(*n),
            FieldValue::Text(text) => Self::String(text.clone()),
            FieldValue::List(items) => {
                Self::Array(items.iter().cloned().map(Self::String).collect())
            }
        }
    }
}

/// A normalized job record with every known field spelled out.
///
/// Produced by the normalizer from a [`RawRecord`]; keys the crawler emits
/// that are not listed here are dropped at that boundary.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    /// Site-relative path of the job page
    #[serde(rename = "_id")]
    pub id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link: Option<FieldValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<FieldValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<FieldValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<FieldValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<FieldValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag_links: Option<FieldValue>,

    /// Raw price text, e.g. `"$30 - $250"`, `"$15 / hr"` or `"N/A"`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<FieldValue>,

    /// Raw offer text, e.g. `"12 bids"` or `"4 entries"`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offers: Option<FieldValue>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub types: Option<FieldValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verified_payment: Option<FieldValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paid_when: Option<FieldValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub posted_when: Option<FieldValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deadline: Option<FieldValue>,
}

impl JobRecord {
    /// Create a record with only an id.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }

    /// Assign a field by its scraped key.
    ///
    /// Returns `false` when the key is not a known job field.
    pub fn set(&mut self, key: &str, value: FieldValue) -> bool {
        let slot = match key {
            "link" => &mut self.link,
            "title" => &mut self.title,
            "description" => &mut self.description,
            "status" => &mut self.status,
            "tags" => &mut self.tags,
            "tag_links" => &mut self.tag_links,
            "price" => &mut self.price,
            "offers" => &mut self.offers,
            "types" => &mut self.types,
            "verified_payment" => &mut self.verified_payment,
            "paid_when" => &mut self.paid_when,
            "posted_when" => &mut self.posted_when,
            "deadline" => &mut self.deadline,
            _ => return false,
        };
        *slot = Some(value);
        true
    }

    /// Builder form of [`set`](Self::set); unknown keys are ignored.
    pub fn with(mut self, key: &str, value: impl Into<FieldValue>) -> Self {
        self.set(key, value.into());
        self
    }
}
