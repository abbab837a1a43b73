use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{Notify, RwLock};
use tokio::time::{Instant, MissedTickBehavior};
use uuid::Uuid;

use crate::collectors::FetchOptions;
use crate::collectors::runner::{RunResult, Runner, SourceSummary};
use crate::error::AppError;

/// Recipe for the [`FetchOptions`] of each scheduled run. The cutoff is
/// recomputed at every run so a long-lived process keeps a sliding window.
#[derive(Debug, Clone, Default)]
pub struct FetchPlan {
    pub max_pages: usize,
    pub max_jobs: usize,
    pub posted_within: Option<chrono::Duration>,
    pub location: Option<String>,
    pub extra_params: BTreeMap<String, String>,
}

impl FetchPlan {
    pub fn options_at(&self, now: DateTime<Utc>) -> FetchOptions {
        FetchOptions {
            max_pages: self.max_pages,
            max_jobs: self.max_jobs,
            cutoff: self.posted_within.map(|window| now - window),
            location: self.location.clone(),
            extra_params: self.extra_params.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ScheduleConfig {
    pub interval: Duration,
    pub run_timeout: Duration,
    /// Fire the first repeating tick at the next UTC midnight.
    pub align_to_midnight: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Completed,
    TimedOut,
    Failed,
}

/// Last-run record exposed on the ops endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: Option<Uuid>,
    pub state: RunState,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub total_saved: usize,
    pub first_error: Option<String>,
    pub sources: Vec<SourceSummary>,
}

impl RunReport {
    fn from_outcome(
        started_at: DateTime<Utc>,
        outcome: &Result<RunResult, AppError>,
    ) -> RunReport {
        let finished_at = Utc::now();
        match outcome {
            Ok(result) => RunReport {
                run_id: Some(result.run_id),
                state: RunState::Completed,
                started_at: result.started_at,
                finished_at,
                duration_ms: result.duration.as_millis() as u64,
                total_saved: result.total_saved,
                first_error: result.first_error.as_ref().map(ToString::to_string),
                sources: result.sources.clone(),
            },
            Err(e) => RunReport {
                run_id: None,
                state: if matches!(e, AppError::DeadlineExceeded(_)) {
                    RunState::TimedOut
                } else {
                    RunState::Failed
                },
                started_at,
                finished_at,
                duration_ms: (finished_at - started_at)
                    .to_std()
                    .unwrap_or_default()
                    .as_millis() as u64,
                total_saved: 0,
                first_error: Some(e.to_string()),
                sources: Vec::new(),
            },
        }
    }
}

/// State shared between the scheduler and the ops endpoints.
#[derive(Default)]
pub struct RunStatus {
    latest: RwLock<Option<RunReport>>,
    running: AtomicBool,
    trigger: Notify,
}

impl RunStatus {
    pub async fn latest(&self) -> Option<RunReport> {
        self.latest.read().await.clone()
    }

    pub async fn set_latest(&self, report: RunReport) {
        *self.latest.write().await = Some(report);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Ask the scheduler loop for an immediate run.
    pub fn request_run(&self) {
        self.trigger.notify_one();
    }
}

/// Run the aggregation as its own task and stop waiting after `deadline`.
///
/// On timeout the task is detached, not aborted: in-flight requests finish
/// on their own and their saves still land.
pub async fn run_with_deadline(
    runner: Arc<Runner>,
    options: FetchOptions,
    deadline: Duration,
) -> Result<RunResult, AppError> {
    race_deadline(async move { runner.run(options).await }, deadline).await
}

async fn race_deadline<F>(run: F, deadline: Duration) -> Result<RunResult, AppError>
where
    F: Future<Output = RunResult> + Send + 'static,
{
    match tokio::time::timeout(deadline, tokio::spawn(run)).await {
        Ok(Ok(result)) => Ok(result),
        Ok(Err(e)) => Err(AppError::Internal(format!("Aggregation task failed: {e}"))),
        Err(_) => Err(AppError::DeadlineExceeded(deadline)),
    }
}

/// Clears the in-flight flag when the run task ends, panics included.
struct RunningGuard(Arc<RunStatus>);

impl Drop for RunningGuard {
    fn drop(&mut self) {
        self.0.running.store(false, Ordering::SeqCst);
    }
}

/// Emit the closing log line of a run.
pub fn log_outcome(outcome: &Result<RunResult, AppError>) {
    match outcome {
        Ok(result) => match &result.first_error {
            Some(error) => tracing::error!(
                run_id = %result.run_id,
                jobs_processed = result.total_saved,
                duration = ?result.duration,
                %error,
                "Aggregation completed with errors"
            ),
            None => tracing::info!(
                run_id = %result.run_id,
                jobs_processed = result.total_saved,
                duration = ?result.duration,
                "Aggregation completed successfully"
            ),
        },
        Err(error) => tracing::error!(%error, "Aggregation did not complete"),
    }
}

/// Time left until the next UTC midnight.
pub fn until_next_midnight(now: DateTime<Utc>) -> Duration {
    let next = (now.date_naive() + chrono::Days::new(1))
        .and_hms_opt(0, 0, 0)
        .map(|n| n.and_utc());
    next.and_then(|n| (n - now).to_std().ok())
        .unwrap_or_default()
}

pub struct Scheduler {
    runner: Arc<Runner>,
    plan: FetchPlan,
    config: ScheduleConfig,
    status: Arc<RunStatus>,
}

impl Scheduler {
    pub fn new(
        runner: Arc<Runner>,
        plan: FetchPlan,
        config: ScheduleConfig,
        status: Arc<RunStatus>,
    ) -> Self {
        Self {
            runner,
            plan,
            config,
            status,
        }
    }

    /// Start a run in the background unless one is still in flight.
    /// Returns whether a run was started.
    pub fn start_run(&self) -> bool {
        if self.status.running.swap(true, Ordering::SeqCst) {
            tracing::warn!("Previous aggregation still running, skipping this trigger");
            return false;
        }

        let runner = Arc::clone(&self.runner);
        let status = Arc::clone(&self.status);
        let started_at = Utc::now();
        let options = self.plan.options_at(started_at);
        let deadline = self.config.run_timeout;

        let guard = RunningGuard(Arc::clone(&status));

        tokio::spawn(async move {
            let run = async move {
                let _guard = guard;
                runner.run(options).await
            };
            let outcome = race_deadline(run, deadline).await;

            log_outcome(&outcome);
            status
                .set_latest(RunReport::from_outcome(started_at, &outcome))
                .await;
        });
        true
    }

    /// Run once now, then on every interval tick or manual trigger until
    /// `shutdown` resolves.
    pub async fn run<F>(self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        tracing::info!(
            collectors = ?self.runner.collector_names(),
            interval = ?self.config.interval,
            "Running initial job aggregation"
        );
        self.start_run();

        let first_tick = if self.config.align_to_midnight {
            until_next_midnight(Utc::now())
        } else {
            self.config.interval
        };
        let mut ticker = tokio::time::interval_at(Instant::now() + first_tick, self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!(first_tick_in = ?first_tick, "Scheduler started");

        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                biased;
                _ = &mut shutdown => {
                    tracing::info!("Shutdown signal received, stopping scheduler");
                    break;
                }
                _ = ticker.tick() => {
                    tracing::info!("Scheduled aggregation triggered");
                    self.start_run();
                }
                _ = self.status.trigger.notified() => {
                    tracing::info!("Manual aggregation triggered");
                    self.start_run();
                }
            }
        }
    }
}
