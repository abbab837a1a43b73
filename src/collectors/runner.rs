use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::Instrument;
use uuid::Uuid;

use crate::collectors::{FetchOptions, JobCollector};
use crate::error::AppError;
use crate::models::job::NormalizedJob;
use crate::sink::JobSink;

/// What one collector achieved during a run.
#[derive(Debug)]
pub struct SourceOutcome {
    pub source_name: String,
    pub jobs_fetched: usize,
    pub jobs_saved: usize,
    pub error: Option<AppError>,
}

/// Serializable view of a [`SourceOutcome`].
#[derive(Debug, Clone, Serialize)]
pub struct SourceSummary {
    pub source_name: String,
    pub jobs_fetched: usize,
    pub jobs_saved: usize,
    pub error: Option<String>,
}

impl From<&SourceOutcome> for SourceSummary {
    fn from(outcome: &SourceOutcome) -> Self {
        SourceSummary {
            source_name: outcome.source_name.clone(),
            jobs_fetched: outcome.jobs_fetched,
            jobs_saved: outcome.jobs_saved,
            error: outcome.error.as_ref().map(ToString::to_string),
        }
    }
}

/// Result of one run across every registered collector.
///
/// `total_saved` and `first_error` are meaningful together: a run can save
/// jobs from healthy sources and still report a failing one.
#[derive(Debug)]
pub struct RunResult {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub duration: Duration,
    pub total_saved: usize,
    /// First fetch failure in completion order, wrapped with its collector name.
    pub first_error: Option<AppError>,
    /// Per-source summaries in completion order.
    pub sources: Vec<SourceSummary>,
}

/// Runs every collector concurrently and feeds their jobs to the sink.
pub struct Runner {
    collectors: Vec<Arc<dyn JobCollector>>,
    sink: Arc<dyn JobSink>,
}

impl Runner {
    pub fn new(collectors: Vec<Arc<dyn JobCollector>>, sink: Arc<dyn JobSink>) -> Self {
        Self { collectors, sink }
    }

    pub fn collector_names(&self) -> Vec<String> {
        self.collectors.iter().map(|c| c.name().to_string()).collect()
    }

    /// One task per collector; each reports a single [`SourceOutcome`] on a
    /// channel and this task is the only one that touches the totals.
    pub async fn run(&self, options: FetchOptions) -> RunResult {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        let clock = Instant::now();
        let span = tracing::info_span!("run", %run_id);

        async {
            tracing::info!(collectors = self.collectors.len(), "Starting aggregation run");

            let options = Arc::new(options);
            let (tx, mut rx) = mpsc::channel::<SourceOutcome>(self.collectors.len().max(1));
            let mut handles = Vec::with_capacity(self.collectors.len());

            for collector in &self.collectors {
                let collector = Arc::clone(collector);
                let sink = Arc::clone(&self.sink);
                let options = Arc::clone(&options);
                let tx = tx.clone();
                let name = collector.name().to_string();
                let task = async move {
                    let outcome = collect_source(collector.as_ref(), sink.as_ref(), &options).await;
                    // The receiver lives until every sender is gone.
                    let _ = tx.send(outcome).await;
                }
                .instrument(tracing::info_span!("collector", collector = %name));
                handles.push((name, tokio::spawn(task)));
            }
            drop(tx);

            let mut total_saved = 0usize;
            let mut first_error: Option<AppError> = None;
            let mut sources = Vec::with_capacity(self.collectors.len());

            let mut record = |mut outcome: SourceOutcome| {
                sources.push(SourceSummary::from(&outcome));
                total_saved += outcome.jobs_saved;
                if let Some(error) = outcome.error.take() {
                    let error = AppError::collector(&outcome.source_name, error);
                    if first_error.is_none() {
                        first_error = Some(error);
                    } else {
                        tracing::debug!("Additional collector failure: {error}");
                    }
                }
            };

            while let Some(outcome) = rx.recv().await {
                record(outcome);
            }

            // A task that panicked never reported; account for it here.
            for (name, handle) in handles {
                if let Err(e) = handle.await
                    && e.is_panic()
                {
                    tracing::error!(collector = %name, "Collector task panicked");
                    record(SourceOutcome {
                        source_name: name,
                        jobs_fetched: 0,
                        jobs_saved: 0,
                        error: Some(AppError::Internal("collector task panicked".to_string())),
                    });
                }
            }

            RunResult {
                run_id,
                started_at,
                duration: clock.elapsed(),
                total_saved,
                first_error,
                sources,
            }
        }
        .instrument(span)
        .await
    }
}

async fn collect_source(
    collector: &dyn JobCollector,
    sink: &dyn JobSink,
    options: &FetchOptions,
) -> SourceOutcome {
    let source_name = collector.name().to_string();

    let jobs = match collector.fetch_jobs(options).await {
        Ok(jobs) => jobs,
        Err(e) => {
            tracing::error!("Failed to fetch jobs: {e}");
            return SourceOutcome {
                source_name,
                jobs_fetched: 0,
                jobs_saved: 0,
                error: Some(e),
            };
        }
    };

    let jobs_fetched = jobs.len();
    let jobs_saved = save_jobs(sink, jobs).await;
    tracing::info!(
        fetched = jobs_fetched,
        saved = jobs_saved,
        failed = jobs_fetched - jobs_saved,
        "Processed jobs from collector"
    );

    SourceOutcome {
        source_name,
        jobs_fetched,
        jobs_saved,
        error: None,
    }
}

/// Hand jobs to the sink one at a time. Failures are logged and skipped.
async fn save_jobs(sink: &dyn JobSink, jobs: Vec<NormalizedJob>) -> usize {
    let mut saved = 0;
    for job in jobs {
        let title = job.title.clone();
        match sink.create_job(job).await {
            Ok(_) => saved += 1,
            Err(e) => tracing::warn!(job_title = %title, "Failed to save job: {e}"),
        }
    }
    saved
}
