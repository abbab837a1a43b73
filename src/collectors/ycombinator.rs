use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Deserialize;
use serde_json::Value;

use crate::collectors::paging::{Normalizer, PageCursor, SourceClient};
use crate::collectors::{FetchOptions, SourceSettings};
use crate::error::AppError;
use crate::models::job::{Currency, JobType, NormalizedJob, WorkMode, slugify};

pub const NAME: &str = "ycombinator";
pub const BASE_URL: &str = "https://free-y-combinator-jobs-api.p.rapidapi.com";
const RAPIDAPI_HOST: &str = "free-y-combinator-jobs-api.p.rapidapi.com";
const LISTING_PATH: &str = "/active-jb-7d";
const PAGE_SIZE: usize = 50;

const SOURCE_LABEL: &str = "Y Combinator";
const DEFAULT_COUNTRY: &str = "US";
const DEFAULT_CURRENCY: Currency = Currency::Usd;
const CATEGORY: &str = "Technology";

/// Y Combinator job listings via RapidAPI, paged by record offset.
pub struct YCombinatorClient {
    client: reqwest::Client,
    settings: SourceSettings,
}

impl YCombinatorClient {
    pub fn new(settings: SourceSettings) -> Result<Self, AppError> {
        let client = reqwest::Client::builder()
            .timeout(settings.request_timeout)
            .build()
            .map_err(|e| AppError::Internal(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self { client, settings })
    }
}

#[async_trait]
impl SourceClient for YCombinatorClient {
    fn name(&self) -> &str {
        NAME
    }

    fn page_size(&self) -> usize {
        PAGE_SIZE
    }

    fn first_cursor(&self) -> PageCursor {
        PageCursor::Offset(0)
    }

    fn page_delay(&self) -> Duration {
        self.settings.page_delay
    }

    async fn fetch_page(
        &self,
        cursor: PageCursor,
        options: &FetchOptions,
    ) -> Result<Vec<Value>, AppError> {
        let offset = match cursor {
            PageCursor::Offset(n) => n,
            PageCursor::Page(n) => (n.saturating_sub(1) as usize) * PAGE_SIZE,
        };

        let mut query: Vec<(&str, String)> = vec![("offset", offset.to_string())];
        if let Some(location) = options.location.as_deref().filter(|l| !l.is_empty()) {
            query.push(("location_filter", location.to_string()));
        }
        for (key, value) in options.extra_query() {
            query.push((key, value.to_string()));
        }

        let url = format!("{}{LISTING_PATH}", self.settings.base_url.trim_end_matches('/'));
        let mut request = self
            .client
            .get(&url)
            .query(&query)
            .header("Accept", "application/json")
            .header("X-RapidAPI-Host", RAPIDAPI_HOST);
        if let Some(key) = &self.settings.api_key {
            request = request.header("X-RapidAPI-Key", key);
        }

        let resp = request.send().await?;
        if !resp.status().is_success() {
            return Err(AppError::Upstream {
                source_name: NAME.to_string(),
                status: resp.status(),
            });
        }

        let body: Value = resp.json().await.map_err(|e| AppError::Decode {
            source_name: NAME.to_string(),
            message: e.to_string(),
        })?;

        match body {
            Value::Array(records) => Ok(records),
            other => Err(AppError::Decode {
                source_name: NAME.to_string(),
                message: format!("expected a JSON array, got {}", json_kind(&other)),
            }),
        }
    }
}

fn json_kind(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[derive(Debug, Deserialize)]
struct YcJob {
    id: Option<String>,
    title: Option<String>,
    organization: Option<String>,
    date_posted: Option<String>,
    url: Option<String>,
    locations_raw: Option<Vec<YcLocation>>,
    salary_raw: Option<YcSalary>,
    employment_type: Option<Vec<String>>,
    remote_derived: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct YcLocation {
    address: Option<YcAddress>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct YcAddress {
    address_locality: Option<String>,
    address_country: Option<String>,
}

#[derive(Debug, Deserialize)]
struct YcSalary {
    currency: Option<String>,
    value: Option<YcSalaryValue>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct YcSalaryValue {
    min_value: Option<f64>,
    max_value: Option<f64>,
}

/// Maps one RapidAPI Y Combinator record.
pub struct YCombinatorNormalizer;

impl Normalizer for YCombinatorNormalizer {
    fn normalize(&self, raw: &Value) -> Result<NormalizedJob, AppError> {
        let yc = YcJob::deserialize(raw)
            .map_err(|e| AppError::InvalidRecord(format!("{NAME}: {e}")))?;

        let id = required(yc.id, "id")?;
        let title = required(yc.title, "title")?;
        let company_name = required(yc.organization, "organization")?;

        let job_type = JobType::from_keywords(yc.employment_type.as_deref().unwrap_or_default());
        let remote = yc.remote_derived.unwrap_or(false);

        let address = yc
            .locations_raw
            .as_deref()
            .and_then(|l| l.first())
            .and_then(|l| l.address.as_ref());
        let city = address.and_then(|a| non_empty(a.address_locality.as_deref()));
        let country_iso = address
            .and_then(|a| non_empty(a.address_country.as_deref()))
            .unwrap_or_else(|| DEFAULT_COUNTRY.to_string());

        let (salary_min, salary_max, salary_currency) = match &yc.salary_raw {
            Some(salary) => {
                let value = salary.value.as_ref();
                let min = positive(value.and_then(|v| v.min_value));
                let max = positive(value.and_then(|v| v.max_value));
                let code = salary.currency.as_deref().and_then(Currency::from_code);
                let currency = if min.is_some() || max.is_some() || code.is_some() {
                    Some(code.unwrap_or(DEFAULT_CURRENCY))
                } else {
                    None
                };
                (min, max, currency)
            }
            None => (None, None, None),
        };

        let slug = match slugify(&title) {
            base if base.is_empty() => id.clone(),
            base => format!("{base}-{id}"),
        };

        Ok(NormalizedJob {
            external_job_id: Some(id),
            slug: Some(slug),
            title,
            company_name,
            description: None,
            job_type,
            work_mode: WorkMode::from_remote_flag(remote),
            experience_level: None,
            education_level: None,
            salary_min,
            salary_max,
            salary_currency,
            country_iso,
            city,
            is_remote: yc.remote_derived,
            visa_sponsorship: None,
            skills: Vec::new(),
            category: Some(CATEGORY.to_string()),
            posted_at: yc.date_posted.as_deref().and_then(parse_posted_date),
            application_url: non_empty(yc.url.as_deref()),
            source: SOURCE_LABEL.to_string(),
            tags: vec!["startup".to_string(), "ycombinator".to_string()],
            industry: Some(CATEGORY.to_string()),
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

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(String::from)
}

fn positive(value: Option<f64>) -> Option<i32> {
    value.filter(|v| *v > 0.0).map(|v| v as i32)
}

/// RFC 3339, or a zone-less ISO timestamp taken as UTC.
fn parse_posted_date(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    DateTime::parse_from_rfc3339(s)
        .map(|d| d.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
                .ok()
                .map(|n| n.and_utc())
        })
}
