use async_trait::async_trait;
use sqlx::PgPool;

use crate::error::AppError;
use crate::models::category::Category;
use crate::models::company::Company;
use crate::models::job::{Job, NormalizedJob};
use crate::models::skill::Skill;

/// Persistence capability the runner hands normalized jobs to.
///
/// Implementations must tolerate the same posting arriving again on a later
/// run; the runner does not deduplicate against storage.
#[async_trait]
pub trait JobSink: Send + Sync {
    /// Store one job and return its saved identifier.
    async fn create_job(&self, job: NormalizedJob) -> Result<i32, AppError>;
}

/// Required-field and range checks applied before anything touches storage.
pub fn validate(job: &NormalizedJob) -> Result<(), AppError> {
    if job.title.trim().is_empty() {
        return Err(AppError::Validation("title is required".to_string()));
    }
    if job.company_name.trim().is_empty() {
        return Err(AppError::Validation("company name is required".to_string()));
    }
    if job.country_iso.trim().is_empty() {
        return Err(AppError::Validation("country is required".to_string()));
    }
    if let (Some(min), Some(max)) = (job.salary_min, job.salary_max)
        && min > max
    {
        return Err(AppError::Validation(format!(
            "salary_min {min} exceeds salary_max {max}"
        )));
    }
    Ok(())
}

/// Postgres-backed sink. Each job is written in its own transaction so one
/// bad row never takes others down with it.
#[derive(Clone)]
pub struct PgJobSink {
    pool: PgPool,
}

impl PgJobSink {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl JobSink for PgJobSink {
    async fn create_job(&self, job: NormalizedJob) -> Result<i32, AppError> {
        validate(&job)?;

        let mut tx = self.pool.begin().await?;

        let company = Company::find_or_create(&mut tx, &job.company_name).await?;

        let category_id = match job.category.as_deref().map(str::trim) {
            Some(name) if !name.is_empty() => {
                Some(Category::find_or_create(&mut tx, name).await?.id)
            }
            _ => None,
        };

        let (job_id, inserted) = Job::upsert(&mut tx, &job, company.id, category_id).await?;

        let mut skill_ids = Vec::with_capacity(job.skills.len());
        for name in job.skills.iter().filter(|s| !s.trim().is_empty()) {
            skill_ids.push(Skill::find_or_create(&mut tx, name).await?.id);
        }
        Job::set_skills(&mut tx, job_id, &skill_ids).await?;

        tx.commit().await?;

        tracing::debug!(
            job_id,
            inserted,
            source = %job.source,
            external_id = job.external_job_id.as_deref().unwrap_or(""),
            "stored job"
        );
        Ok(job_id)
    }
}
