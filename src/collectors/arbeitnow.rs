use std::time::Duration;

use async_trait::async_trait;
use chrono::DateTime;
use serde::Deserialize;
use serde_json::Value;

use crate::collectors::paging::{Normalizer, PageCursor, SourceClient};
use crate::collectors::{FetchOptions, SourceSettings};
use crate::error::AppError;
use crate::models::job::{ExperienceLevel, JobType, NormalizedJob, WorkMode};

pub const NAME: &str = "arbeitnow";
pub const BASE_URL: &str = "https://www.arbeitnow.com";
const LISTING_PATH: &str = "/api/job-board-api";
const PAGE_SIZE: usize = 100;

const DEFAULT_COUNTRY: &str = "DE";

/// Arbeitnow's public job board API, paged by page number.
pub struct ArbeitnowClient {
    client: reqwest::Client,
    settings: SourceSettings,
}

impl ArbeitnowClient {
    pub fn new(settings: SourceSettings) -> Result<Self, AppError> {
        let client = reqwest::Client::builder()
            .timeout(settings.request_timeout)
            .user_agent(concat!("jobaggregator/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| AppError::Internal(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self { client, settings })
    }
}

#[derive(Debug, Deserialize)]
struct ArbeitnowPage {
    data: Vec<Value>,
}

#[async_trait]
impl SourceClient for ArbeitnowClient {
    fn name(&self) -> &str {
        NAME
    }

    fn page_size(&self) -> usize {
        PAGE_SIZE
    }

    fn first_cursor(&self) -> PageCursor {
        PageCursor::Page(1)
    }

    fn page_delay(&self) -> Duration {
        self.settings.page_delay
    }

    async fn fetch_page(
        &self,
        cursor: PageCursor,
        options: &FetchOptions,
    ) -> Result<Vec<Value>, AppError> {
        let page = match cursor {
            PageCursor::Page(n) => n,
            PageCursor::Offset(n) => (n / PAGE_SIZE) as u32 + 1,
        };

        let mut query: Vec<(&str, String)> = vec![("page", page.to_string())];
        if let Some(location) = options.location.as_deref().filter(|l| !l.is_empty()) {
            query.push(("location", location.to_string()));
        }
        for (key, value) in options.extra_query() {
            query.push((key, value.to_string()));
        }

        let url = format!("{}{LISTING_PATH}", self.settings.base_url.trim_end_matches('/'));
        let resp = self
            .client
            .get(&url)
            .query(&query)
            .header("Accept", "application/json")
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(AppError::Upstream {
                source_name: NAME.to_string(),
                status: resp.status(),
            });
        }

        let body: ArbeitnowPage = resp.json().await.map_err(|e| AppError::Decode {
            source_name: NAME.to_string(),
            message: e.to_string(),
        })?;
        Ok(body.data)
    }
}

#[derive(Debug, Deserialize)]
struct ArbeitnowJob {
    slug: Option<String>,
    company_name: Option<String>,
    title: Option<String>,
    description: Option<String>,
    remote: Option<bool>,
    url: Option<String>,
    tags: Option<Vec<String>>,
    job_types: Option<Vec<String>>,
    location: Option<String>,
    created_at: Option<i64>,
}

/// Maps one Arbeitnow record. Tags become skills; `job_types` carries both
/// the employment type and, for some postings, the seniority.
pub struct ArbeitnowNormalizer;

impl Normalizer for ArbeitnowNormalizer {
    fn normalize(&self, raw: &Value) -> Result<NormalizedJob, AppError> {
        let job = ArbeitnowJob::deserialize(raw)
            .map_err(|e| AppError::InvalidRecord(format!("{NAME}: {e}")))?;

        let slug = required(job.slug, "slug")?;
        let title = required(job.title, "title")?;
        let company_name = required(job.company_name, "company_name")?;

        let job_types = job.job_types.unwrap_or_default();
        let remote = job.remote.unwrap_or(false);

        Ok(NormalizedJob {
            external_job_id: Some(slug.clone()),
            slug: Some(slug),
            title,
            company_name,
            description: job.description.filter(|d| !d.trim().is_empty()),
            job_type: JobType::from_keywords(&job_types),
            work_mode: WorkMode::from_remote_flag(remote),
            experience_level: job_types
                .iter()
                .find_map(|t| ExperienceLevel::from_keyword(t)),
            education_level: None,
            salary_min: None,
            salary_max: None,
            salary_currency: None,
            country_iso: DEFAULT_COUNTRY.to_string(),
            city: job
                .location
                .map(|l| l.trim().to_string())
                .filter(|l| !l.is_empty()),
            is_remote: job.remote,
            visa_sponsorship: None,
            skills: job.tags.unwrap_or_default(),
            category: None,
            posted_at: job
                .created_at
                .filter(|ts| *ts > 0)
                .and_then(|ts| DateTime::from_timestamp(ts, 0)),
            application_url: job.url.filter(|u| !u.trim().is_empty()),
            source: NAME.to_string(),
            tags: vec![NAME.to_string()],
            industry: None,
            department: None,
        })
    }
}

fn required(value: Option<String>, field: &str) -> Result<String, AppError> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| AppError::InvalidRecord(format!("{NAME}: missing '{field}'")))
}
