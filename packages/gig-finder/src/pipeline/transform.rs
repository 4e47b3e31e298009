//! Record transformer - derives typed fields from the scraped strings.
//!
//! Turns a normalized [`JobRecord`] into a [`JobPosting`] ready for the
//! history tracker, or rejects it when the listing is private.

use chrono::NaiveDate;
use regex::Regex;
use rust_decimal::Decimal;
use std::str::FromStr;
use std::sync::LazyLock;

use crate::types::entity::{ChangeRecord, JobDetails, JobEntity, TrackedFields};
use crate::types::record::{FieldValue, JobRecord};

/// Price text shown for listings that hide their budget.
pub const PRICE_UNAVAILABLE: &str = "N/A";

/// `$<digits>` optionally followed by `- $<digits>`.
static PRICE_RANGE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$\s*(\d[\d,]*)(?:\s*-\s*\$\s*(\d[\d,]*))?").unwrap()
});

static HOURLY: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s*/\s*hr").unwrap());

static DIGITS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\d+").unwrap());

/// Why a record was dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// Neither a price nor an offer count was scraped
    NoPriceOrOffers,
    /// The price is the unavailable marker
    PriceUnavailable,
}

impl std::fmt::Display for RejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoPriceOrOffers => f.write_str("no price or offers"),
            Self::PriceUnavailable => f.write_str("price unavailable"),
        }
    }
}

/// Result of transforming one record.
#[derive(Debug, Clone, PartialEq)]
pub enum Transformed {
    Accepted(JobPosting),
    Rejected(RejectReason),
}

/// A transformed job, keyed by its absolute id and stamped with the run
/// date, but not yet merged with what is stored.
#[derive(Debug, Clone, PartialEq)]
pub struct JobPosting {
    pub id: String,
    pub last_seen_at: NaiveDate,
    pub tracked: TrackedFields,
    pub details: JobDetails,
}

impl JobPosting {
    /// Attach the carried-forward fields and produce the entity to write.
    pub fn into_entity(self, created_at: NaiveDate, history: Vec<ChangeRecord>) -> JobEntity {
        JobEntity {
            id: self.id,
            created_at: Some(created_at),
            last_seen_at: Some(self.last_seen_at),
            history,
            tracked: self.tracked,
            details: self.details,
        }
    }
}

/// Parsed price range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PriceRange {
    pub min: Option<Decimal>,
    pub max: Option<Decimal>,
    pub is_hourly: bool,
}

/// Parse a raw price such as `"$30 - $250"` or `"$15 / hr"`.
///
/// Text that does not match yields `None` bounds rather than an error.
pub fn parse_price(price: &str) -> PriceRange {
    let is_hourly = HOURLY.is_match(price);

    let Some(captures) = PRICE_RANGE.captures(price) else {
        return PriceRange {
            is_hourly,
            ..Default::default()
        };
    };

    let min = captures.get(1).and_then(|m| parse_amount(m.as_str()));
    let max = captures
        .get(2)
        .and_then(|m| parse_amount(m.as_str()))
        .or(min);

    PriceRange { min, max, is_hourly }
}

fn parse_amount(digits: &str) -> Option<Decimal> {
    Decimal::from_str(&digits.replace(',', "")).ok()
}

/// First run of digits in an offer string such as `"12 bids"`.
pub fn parse_offer_count(offers: &str) -> Option<i64> {
    DIGITS.find(offers).and_then(|m| m.as_str().parse().ok())
}

/// Whether an offer string describes contest entries rather than bids.
pub fn is_competition(offers: &str) -> bool {
    offers.contains("entries")
}

/// Transform a normalized record.
///
/// The raw `price` and `offers` strings are replaced by the derived
/// `price_min`, `price_max`, `is_hourly`, `offers` and `is_competition`.
pub fn transform(record: JobRecord, base_url: &str, run_date: NaiveDate) -> Transformed {
    if record.offers.is_none() && record.price.is_none() {
        return Transformed::Rejected(RejectReason::NoPriceOrOffers);
    }
    if record.price.as_ref().and_then(FieldValue::as_text) == Some(PRICE_UNAVAILABLE) {
        return Transformed::Rejected(RejectReason::PriceUnavailable);
    }

    let offers_text = record.offers.as_ref().and_then(FieldValue::as_text);
    let price = record
        .price
        .as_ref()
        .and_then(FieldValue::as_text)
        .map(parse_price)
        .unwrap_or_default();

    let tracked = TrackedFields {
        status: record.status,
        price_min: price.min,
        price_max: price.max,
        offers: offers_text.and_then(parse_offer_count),
        is_competition: Some(offers_text.is_some_and(is_competition)),
        is_hourly: Some(price.is_hourly),
        types: record.types,
        verified_payment: record.verified_payment,
        tags: record.tags,
    };

    let details = JobDetails {
        title: record.title,
        description: record.description,
        link: record.link,
        tag_links: record.tag_links,
        paid_when: record.paid_when,
        posted_when: record.posted_when,
        deadline: record.deadline,
    };

    Transformed::Accepted(JobPosting {
        id: format!("{}{}", base_url, record.id),
        last_seen_at: run_date,
        tracked,
        details,
    })
}
