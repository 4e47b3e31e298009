//! Configuration for a crawl run.

use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::env::{self, VarError};

use crate::error::ConfigError;
use crate::types::entity::TrackedField;

/// Site origin prepended to every crawled path.
pub const DEFAULT_BASE_URL: &str = "https://www.freelancer.com";

/// Collection (table) the jobs are written to.
pub const DEFAULT_COLLECTION: &str = "freelancer";

/// Entities fetched per page by the lifecycle sweep.
pub const DEFAULT_SCAN_PAGE_SIZE: usize = 500;

/// Environment variable holding the store connection URL.
pub const DATABASE_URL_ENV: &str = "DATABASE_URL";

/// Everything one crawl run needs to know about its environment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    /// Prefix joined with each record's site-relative path to form `_id`.
    pub base_url: String,

    /// Target collection/table name.
    pub collection: String,

    /// Reference date shared by every record of the run.
    ///
    /// "Seen this run" checks compare against this value exactly.
    pub run_date: NaiveDate,

    /// Fields diffed by the history tracker.
    pub tracked_fields: Vec<TrackedField>,

    /// Page size used when scanning for stale entities.
    pub scan_page_size: usize,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            collection: DEFAULT_COLLECTION.to_string(),
            run_date: Utc::now().date_naive(),
            tracked_fields: TrackedField::ALL.to_vec(),
            scan_page_size: DEFAULT_SCAN_PAGE_SIZE,
        }
    }
}

impl RunConfig {
    /// Create a config for a run on the given date.
    pub fn new(run_date: NaiveDate) -> Self {
        Self {
            run_date,
            ..Default::default()
        }
    }

    /// Load configuration from environment variables.
    ///
    /// Reads a `.env` file first if one is present. Every setting is
    /// optional and falls back to its default:
    ///
    /// - `GIG_BASE_URL`
    /// - `GIG_COLLECTION`
    /// - `GIG_RUN_DATE` (`YYYY-MM-DD`, defaults to today in UTC)
    /// - `GIG_TRACKED_FIELDS` (comma separated field names)
    /// - `GIG_SCAN_PAGE_SIZE`
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();

        let mut config = Self::default();

        if let Ok(base_url) = env::var("GIG_BASE_URL") {
            config.base_url = base_url;
        }
        if let Ok(collection) = env::var("GIG_COLLECTION") {
            config.collection = collection;
        }
        if let Ok(date) = env::var("GIG_RUN_DATE") {
            config.run_date = parse_run_date(&date)?;
        }
        if let Ok(fields) = env::var("GIG_TRACKED_FIELDS") {
            config.tracked_fields = parse_tracked_fields(&fields)?;
        }
        if let Ok(size) = env::var("GIG_SCAN_PAGE_SIZE") {
            config.scan_page_size = size
                .parse()
                .map_err(|_| ConfigError::invalid("GIG_SCAN_PAGE_SIZE", "expected a positive integer"))?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Set the base URL.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Set the collection name.
    pub fn with_collection(mut self, collection: impl Into<String>) -> Self {
        self.collection = collection.into();
        self
    }

    /// Set the run reference date.
    pub fn with_run_date(mut self, run_date: NaiveDate) -> Self {
        self.run_date = run_date;
        self
    }

    /// Restrict the tracked fields.
    pub fn with_tracked_fields(mut self, fields: impl IntoIterator<Item = TrackedField>) -> Self {
        self.tracked_fields = fields.into_iter().collect();
        self
    }

    /// Set the sweep page size.
    pub fn with_scan_page_size(mut self, size: usize) -> Self {
        self.scan_page_size = size;
        self
    }

    /// Check settings that would otherwise fail deep inside a run.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.base_url.is_empty() {
            return Err(ConfigError::invalid("base_url", "must not be empty"));
        }
        if self.scan_page_size == 0 {
            return Err(ConfigError::invalid("scan_page_size", "must be greater than zero"));
        }
        Ok(())
    }
}

/// Read a setting that has no default.
pub fn required_env(key: &str) -> Result<String, ConfigError> {
    match env::var(key) {
        Ok(value) if value.trim().is_empty() => Err(ConfigError::invalid(key, "must not be empty")),
        Ok(value) => Ok(value),
        Err(VarError::NotPresent) => Err(ConfigError::Missing { key: key.to_string() }),
        Err(VarError::NotUnicode(_)) => Err(ConfigError::invalid(key, "not valid unicode")),
    }
}

/// Parse a `YYYY-MM-DD` run date.
pub fn parse_run_date(value: &str) -> Result<NaiveDate, ConfigError> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d")
        .map_err(|e| ConfigError::invalid("GIG_RUN_DATE", format!("expected YYYY-MM-DD: {}", e)))
}

/// Parse a comma separated list of tracked field names.
pub fn parse_tracked_fields(value: &str) -> Result<Vec<TrackedField>, ConfigError> {
    value
        .split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::parse)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = RunConfig::default();
        assert_eq!(config.base_url, DEFAULT_BASE_URL);
        assert_eq!(config.collection, "freelancer");
        assert_eq!(config.tracked_fields.len(), 9);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder() {
        let date = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        let config = RunConfig::new(date)
            .with_base_url("https://www.br.freelancer.com")
            .with_collection("jobs")
            .with_tracked_fields([TrackedField::Status])
            .with_scan_page_size(10);

        assert_eq!(config.run_date, date);
        assert_eq!(config.base_url, "https://www.br.freelancer.com");
        assert_eq!(config.collection, "jobs");
        assert_eq!(config.tracked_fields, vec![TrackedField::Status]);
        assert_eq!(config.scan_page_size, 10);
    }

    #[test]
    fn test_validate_rejects_zero_page_size() {
        let config = RunConfig::default().with_scan_page_size(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_required_env_missing() {
        let result = required_env("GIG_FINDER_NEVER_SET_IN_TESTS");
        assert!(matches!(
            result,
            Err(ConfigError::Missing { ref key }) if key == "GIG_FINDER_NEVER_SET_IN_TESTS"
        ));
    }

    #[test]
    fn test_parse_run_date() {
        assert_eq!(
            parse_run_date("2024-06-30").unwrap(),
            NaiveDate::from_ymd_opt(2024, 6, 30).unwrap()
        );
        assert!(parse_run_date("30/06/2024").is_err());
    }

    #[test]
    fn test_parse_tracked_fields() {
        let fields = parse_tracked_fields("status, price_min,,tags").unwrap();
        assert_eq!(
            fields,
            vec![TrackedField::Status, TrackedField::PriceMin, TrackedField::Tags]
        );
        assert!(parse_tracked_fields("status,budget").is_err());
    }
}
