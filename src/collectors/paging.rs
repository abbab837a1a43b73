//! Uniform pagination over a source's page endpoint.
//!
//! A [`SourceClient`] knows how to fetch one page of raw records for a given
//! cursor; a [`Normalizer`] turns one raw record into a [`NormalizedJob`].
//! [`PagedCollector`] pairs the two and runs the shared paging loop: page
//! limits, job limits, cutoff-date early termination and pacing.

use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::collectors::{FetchOptions, JobCollector};
use crate::error::AppError;
use crate::models::job::NormalizedJob;

/// Stop scanning a source after this many raw records, whatever the limits say.
pub const MAX_RECORDS_SCANNED: usize = 10_000;

/// Source-specific position in a paginated listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageCursor {
    /// Number of records to skip.
    Offset(usize),
    /// 1-based page number.
    Page(u32),
}

impl PageCursor {
    /// The cursor for the page after one that returned `fetched` records.
    pub fn advance(self, fetched: usize) -> PageCursor {
        match self {
            PageCursor::Offset(n) => PageCursor::Offset(n + fetched),
            PageCursor::Page(n) => PageCursor::Page(n + 1),
        }
    }
}

/// One external API's page endpoint.
#[async_trait]
pub trait SourceClient: Send + Sync {
    fn name(&self) -> &str;

    /// Records per full page. A shorter page means the listing is exhausted.
    fn page_size(&self) -> usize;

    fn first_cursor(&self) -> PageCursor;

    /// Pause before each page request after the first.
    fn page_delay(&self) -> Duration;

    /// Fetch the raw records of one page. Non-2xx responses, transport
    /// failures and payloads that are not a list of records are errors.
    async fn fetch_page(
        &self,
        cursor: PageCursor,
        options: &FetchOptions,
    ) -> Result<Vec<Value>, AppError>;
}

/// Maps one raw record of a source into the internal representation.
/// Must be pure: the same record always yields the same job.
pub trait Normalizer: Send + Sync {
    fn normalize(&self, raw: &Value) -> Result<NormalizedJob, AppError>;
}

/// Jobs kept from one page, and whether paging should go on.
#[derive(Debug, Default)]
pub struct PageResult {
    pub jobs: Vec<NormalizedJob>,
    pub more: bool,
}

/// A [`SourceClient`] and its [`Normalizer`] behind the [`JobCollector`] contract.
pub struct PagedCollector<C, N> {
    client: C,
    normalizer: N,
    scan_limit: usize,
}

impl<C: SourceClient, N: Normalizer> PagedCollector<C, N> {
    pub fn new(client: C, normalizer: N) -> Self {
        Self {
            client,
            normalizer,
            scan_limit: MAX_RECORDS_SCANNED,
        }
    }

    /// Override the raw-record scan cap (default [`MAX_RECORDS_SCANNED`]).
    pub fn with_scan_limit(mut self, limit: usize) -> Self {
        self.scan_limit = limit;
        self
    }

    /// Normalize one page in order. Invalid records are skipped; the first
    /// record posted before `cutoff` ends the page and paging altogether.
    /// Records without a usable posting date are kept and stamped with `now`.
    pub fn process_page(
        &self,
        records: &[Value],
        cutoff: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> PageResult {
        if records.is_empty() {
            return PageResult::default();
        }

        let mut jobs = Vec::with_capacity(records.len());
        for (index, raw) in records.iter().enumerate() {
            let mut job = match self.normalizer.normalize(raw) {
                Ok(job) => job,
                Err(e) => {
                    tracing::warn!(
                        collector = self.client.name(),
                        index,
                        "Skipping record: {e}"
                    );
                    continue;
                }
            };

            match job.posted_at {
                Some(posted) if posted < cutoff => {
                    tracing::debug!(
                        collector = self.client.name(),
                        %posted,
                        %cutoff,
                        "Reached postings older than cutoff"
                    );
                    return PageResult { jobs, more: false };
                }
                Some(_) => {}
                None => job.posted_at = Some(now),
            }

            jobs.push(job);
        }

        PageResult { jobs, more: true }
    }
}

#[async_trait]
impl<C: SourceClient, N: Normalizer> JobCollector for PagedCollector<C, N> {
    fn name(&self) -> &str {
        self.client.name()
    }

    async fn fetch_jobs(&self, options: &FetchOptions) -> Result<Vec<NormalizedJob>, AppError> {
        let name = self.client.name();
        let now = Utc::now();
        let cutoff = options.effective_cutoff(now);
        let page_size = self.client.page_size();

        let mut jobs: Vec<NormalizedJob> = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();
        let mut cursor = self.client.first_cursor();
        let mut pages = 0usize;
        let mut scanned = 0usize;

        tracing::info!(collector = name, %cutoff, "Fetching jobs");

        loop {
            if options.max_pages > 0 && pages >= options.max_pages {
                break;
            }
            if options.max_jobs > 0 && jobs.len() >= options.max_jobs {
                break;
            }
            if scanned >= self.scan_limit {
                tracing::warn!(collector = name, scanned, "Scan limit reached, stopping");
                break;
            }

            let delay = self.client.page_delay();
            if pages > 0 && !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }

            let records = self.client.fetch_page(cursor, options).await?;
            pages += 1;
            scanned += records.len();

            let page = self.process_page(&records, cutoff, now);
            let kept = page.jobs.len();
            for job in page.jobs {
                if let Some(id) = &job.external_job_id
                    && !seen.insert(id.clone())
                {
                    continue;
                }
                jobs.push(job);
            }
            if options.max_jobs > 0 && jobs.len() > options.max_jobs {
                jobs.truncate(options.max_jobs);
            }

            tracing::debug!(
                collector = name,
                page = pages,
                ?cursor,
                records = records.len(),
                kept,
                "Fetched page"
            );

            if !page.more || records.len() < page_size {
                break;
            }
            cursor = cursor.advance(records.len());
        }

        tracing::info!(collector = name, pages, jobs = jobs.len(), "Fetch finished");
        Ok(jobs)
    }
}
