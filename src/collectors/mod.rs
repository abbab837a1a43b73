// Collector module.
// Defines the trait every external job source implements, the options a run
// passes to them, and the registry that turns config into collectors.

pub mod arbeitnow;
pub mod paging;
pub mod runner;
pub mod scheduler;
pub mod ycombinator;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::AppError;
use crate::models::job::NormalizedJob;

use self::arbeitnow::{ArbeitnowClient, ArbeitnowNormalizer};
use self::paging::PagedCollector;
use self::ycombinator::{YCombinatorClient, YCombinatorNormalizer};

/// How far back a run looks when no cutoff is configured.
pub const DEFAULT_LOOKBACK_DAYS: i64 = 30;

/// Limits and filters for one run. Shared read-only by every collector.
#[derive(Debug, Clone, Default)]
pub struct FetchOptions {
    /// Maximum pages per source, 0 for unbounded.
    pub max_pages: usize,
    /// Maximum jobs per source, 0 for unbounded.
    pub max_jobs: usize,
    /// Postings older than this are not fetched.
    pub cutoff: Option<DateTime<Utc>>,
    pub location: Option<String>,
    /// Passed through verbatim as query parameters.
    pub extra_params: BTreeMap<String, String>,
}

impl FetchOptions {
    /// The configured cutoff, or [`DEFAULT_LOOKBACK_DAYS`] before `now`.
    pub fn effective_cutoff(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        self.cutoff
            .unwrap_or_else(|| now - chrono::Duration::days(DEFAULT_LOOKBACK_DAYS))
    }

    /// `extra_params` without the paging keys the clients set themselves.
    pub fn extra_query(&self) -> impl Iterator<Item = (&str, &str)> {
        self.extra_params
            .iter()
            .filter(|(key, _)| !is_reserved_param(key))
            .map(|(key, value)| (key.as_str(), value.as_str()))
    }
}

/// Query keys that carry the page cursor.
pub const RESERVED_PARAMS: &[&str] = &["offset", "page"];

pub fn is_reserved_param(key: &str) -> bool {
    RESERVED_PARAMS
        .iter()
        .any(|reserved| reserved.eq_ignore_ascii_case(key.trim()))
}

/// Trait that all job collectors must implement.
/// Each collector fetches postings from one external source and returns them
/// normalized, ready for a [`crate::sink::JobSink`].
#[async_trait]
pub trait JobCollector: Send + Sync {
    /// Short identifier used in logs and run reports.
    fn name(&self) -> &str;

    /// Fetch up to `max_jobs` normalized jobs newer than the cutoff.
    async fn fetch_jobs(&self, options: &FetchOptions) -> Result<Vec<NormalizedJob>, AppError>;
}

/// Connection settings for one source, fixed at construction.
#[derive(Debug, Clone)]
pub struct SourceSettings {
    pub base_url: String,
    pub api_key: Option<String>,
    pub request_timeout: Duration,
    /// Pause between consecutive page requests.
    pub page_delay: Duration,
}

/// Names accepted by [`build_collectors`].
pub const KNOWN_COLLECTORS: &[&str] = &[ycombinator::NAME, arbeitnow::NAME];

/// Build the collectors named in `names`, in that order.
/// Unknown names are rejected; a source missing its credentials is skipped
/// with a warning.
pub fn build_collectors(
    names: &[String],
    rapidapi_key: Option<&str>,
    request_timeout: Duration,
    page_delay: Duration,
) -> Result<Vec<Arc<dyn JobCollector>>, AppError> {
    let mut collectors: Vec<Arc<dyn JobCollector>> = Vec::with_capacity(names.len());

    for name in names {
        match name.trim() {
            ycombinator::NAME => {
                let Some(key) = rapidapi_key.filter(|k| !k.is_empty()) else {
                    tracing::warn!("No RapidAPI key configured, skipping '{name}'");
                    continue;
                };
                let settings = SourceSettings {
                    base_url: ycombinator::BASE_URL.to_string(),
                    api_key: Some(key.to_string()),
                    request_timeout,
                    page_delay,
                };
                let client = YCombinatorClient::new(settings)?;
                collectors.push(Arc::new(PagedCollector::new(client, YCombinatorNormalizer)));
            }
            arbeitnow::NAME => {
                let settings = SourceSettings {
                    base_url: arbeitnow::BASE_URL.to_string(),
                    api_key: None,
                    request_timeout,
                    page_delay,
                };
                let client = ArbeitnowClient::new(settings)?;
                collectors.push(Arc::new(PagedCollector::new(client, ArbeitnowNormalizer)));
            }
            other => {
                return Err(AppError::NotFound(format!(
                    "Unknown collector '{other}', expected one of: {}",
                    KNOWN_COLLECTORS.join(", ")
                )));
            }
        }
    }

    tracing::info!(count = collectors.len(), "Collectors initialized");
    Ok(collectors)
}
