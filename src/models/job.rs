use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgConnection;

use crate::error::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobType {
    FullTime,
    PartTime,
    Contract,
    Internship,
    Temporary,
}

impl JobType {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobType::FullTime => "full_time",
            JobType::PartTime => "part_time",
            JobType::Contract => "contract",
            JobType::Internship => "internship",
            JobType::Temporary => "temporary",
        }
    }

    /// Recognize an employment-type keyword such as `FULL_TIME`, `part time`
    /// or `Contractor`. Returns `None` for anything unrecognized.
    pub fn from_keyword(raw: &str) -> Option<JobType> {
        let s = raw.trim().to_lowercase();
        if s.contains("intern") || s.contains("praktikum") {
            Some(JobType::Internship)
        } else if s.contains("full") || s.contains("vollzeit") {
            Some(JobType::FullTime)
        } else if s.contains("part") || s.contains("teilzeit") {
            Some(JobType::PartTime)
        } else if s.contains("contract") || s.contains("freelance") {
            Some(JobType::Contract)
        } else if s.contains("temp") {
            Some(JobType::Temporary)
        } else {
            None
        }
    }

    /// First recognized keyword wins; full-time when nothing is recognized.
    pub fn from_keywords<S: AsRef<str>>(keywords: &[S]) -> JobType {
        keywords
            .iter()
            .find_map(|k| JobType::from_keyword(k.as_ref()))
            .unwrap_or(JobType::FullTime)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkMode {
    Remote,
    Onsite,
    Hybrid,
}

impl WorkMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkMode::Remote => "remote",
            WorkMode::Onsite => "onsite",
            WorkMode::Hybrid => "hybrid",
        }
    }

    pub fn from_remote_flag(remote: bool) -> WorkMode {
        if remote {
            WorkMode::Remote
        } else {
            WorkMode::Onsite
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExperienceLevel {
    Entry,
    Mid,
    Senior,
    Lead,
    Executive,
}

impl ExperienceLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExperienceLevel::Entry => "entry",
            ExperienceLevel::Mid => "mid",
            ExperienceLevel::Senior => "senior",
            ExperienceLevel::Lead => "lead",
            ExperienceLevel::Executive => "executive",
        }
    }

    pub fn from_keyword(raw: &str) -> Option<ExperienceLevel> {
        let s = raw.trim().to_lowercase();
        if s.contains("entry")
            || s.contains("berufseinstieg")
            || s.contains("einsteiger")
            || s.contains("junior")
        {
            Some(ExperienceLevel::Entry)
        } else if s.contains("experienced") || s.contains("berufserfahren") {
            Some(ExperienceLevel::Mid)
        } else if s.contains("senior") {
            Some(ExperienceLevel::Senior)
        } else if s.contains("mid") {
            Some(ExperienceLevel::Mid)
        } else if s.contains("lead") || s.contains("manager") || s.contains("führung") {
            Some(ExperienceLevel::Lead)
        } else if s.contains("executive") {
            Some(ExperienceLevel::Executive)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Currency {
    #[serde(rename = "USD")]
    Usd,
    #[serde(rename = "EUR")]
    Eur,
    #[serde(rename = "GBP")]
    Gbp,
    #[serde(rename = "INR")]
    Inr,
    #[serde(rename = "CAD")]
    Cad,
    #[serde(rename = "AUD")]
    Aud,
    #[serde(rename = "JPY")]
    Jpy,
    #[serde(rename = "SGD")]
    Sgd,
}

impl Currency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Currency::Usd => "USD",
            Currency::Eur => "EUR",
            Currency::Gbp => "GBP",
            Currency::Inr => "INR",
            Currency::Cad => "CAD",
            Currency::Aud => "AUD",
            Currency::Jpy => "JPY",
            Currency::Sgd => "SGD",
        }
    }

    pub fn from_code(code: &str) -> Option<Currency> {
        match code.trim().to_uppercase().as_str() {
            "USD" => Some(Currency::Usd),
            "EUR" => Some(Currency::Eur),
            "GBP" => Some(Currency::Gbp),
            "INR" => Some(Currency::Inr),
            "CAD" => Some(Currency::Cad),
            "AUD" => Some(Currency::Aud),
            "JPY" => Some(Currency::Jpy),
            "SGD" => Some(Currency::Sgd),
            _ => None,
        }
    }
}

/// Source-agnostic job posting produced by a collector's normalizer.
///
/// `title`, `company_name`, `job_type` and `work_mode` are always set;
/// everything a source does not provide stays `None` or empty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedJob {
    pub external_job_id: Option<String>,
    pub slug: Option<String>,
    pub title: String,
    pub company_name: String,
    pub description: Option<String>,
    pub job_type: JobType,
    pub work_mode: WorkMode,
    pub experience_level: Option<ExperienceLevel>,
    pub education_level: Option<String>,
    pub salary_min: Option<i32>,
    pub salary_max: Option<i32>,
    pub salary_currency: Option<Currency>,
    pub country_iso: String,
    pub city: Option<String>,
    pub is_remote: Option<bool>,
    pub visa_sponsorship: Option<bool>,
    pub skills: Vec<String>,
    pub category: Option<String>,
    pub posted_at: Option<DateTime<Utc>>,
    pub application_url: Option<String>,
    pub source: String,
    pub tags: Vec<String>,
    pub industry: Option<String>,
    pub department: Option<String>,
}

/// Lowercase slug with single dashes between words. Letters and digits of
/// any script are kept; everything else separates words.
pub fn slugify(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut pending_dash = false;
    for c in s.chars() {
        if c.is_alphanumeric() {
            if pending_dash && !out.is_empty() {
                out.push('-');
            }
            pending_dash = false;
            out.extend(c.to_lowercase());
        } else {
            pending_dash = true;
        }
    }
    out
}

pub struct Job;

impl Job {
    /// Insert or update a job keyed on `(source, external_job_id)`.
    /// Returns the row id and whether a new row was inserted.
    pub async fn upsert(
        conn: &mut PgConnection,
        job: &NormalizedJob,
        company_id: i32,
        category_id: Option<i32>,
    ) -> Result<(i32, bool), AppError> {
        let row: (i32, bool) = sqlx::query_as(
            "INSERT INTO jobs (company_id, category_id, external_job_id, slug, title, description, job_type, work_mode, experience_level, education_level, salary_min, salary_max, salary_currency, country_iso, city, is_remote, visa_sponsorship, posted_at, application_url, source, tags, industry, department)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19, $20, $21, $22, $23)
             ON CONFLICT (source, external_job_id) DO UPDATE SET
                 company_id = EXCLUDED.company_id,
                 category_id = EXCLUDED.category_id,
                 slug = EXCLUDED.slug,
                 title = EXCLUDED.title,
                 description = EXCLUDED.description,
                 job_type = EXCLUDED.job_type,
                 work_mode = EXCLUDED.work_mode,
                 experience_level = EXCLUDED.experience_level,
                 education_level = EXCLUDED.education_level,
                 salary_min = EXCLUDED.salary_min,
                 salary_max = EXCLUDED.salary_max,
                 salary_currency = EXCLUDED.salary_currency,
                 country_iso = EXCLUDED.country_iso,
                 city = EXCLUDED.city,
                 is_remote = EXCLUDED.is_remote,
                 visa_sponsorship = EXCLUDED.visa_sponsorship,
                 posted_at = EXCLUDED.posted_at,
                 application_url = EXCLUDED.application_url,
                 tags = EXCLUDED.tags,
                 industry = EXCLUDED.industry,
                 department = EXCLUDED.department,
                 is_active = TRUE,
                 updated_at = NOW()
             RETURNING id, (xmax = 0) AS inserted",
        )
        .bind(company_id)
        .bind(category_id)
        .bind(&job.external_job_id)
        .bind(&job.slug)
        .bind(&job.title)
        .bind(&job.description)
        .bind(job.job_type.as_str())
        .bind(job.work_mode.as_str())
        .bind(job.experience_level.map(|l| l.as_str()))
        .bind(&job.education_level)
        .bind(job.salary_min)
        .bind(job.salary_max)
        .bind(job.salary_currency.map(|c| c.as_str()))
        .bind(&job.country_iso)
        .bind(&job.city)
        .bind(job.is_remote)
        .bind(job.visa_sponsorship)
        .bind(job.posted_at)
        .bind(&job.application_url)
        .bind(&job.source)
        .bind(&job.tags)
        .bind(&job.industry)
        .bind(&job.department)
        .fetch_one(&mut *conn)
        .await?;
        Ok(row)
    }

    /// Replace the skill links of a job.
    pub async fn set_skills(
        conn: &mut PgConnection,
        job_id: i32,
        skill_ids: &[i32],
    ) -> Result<(), AppError> {
        sqlx::query("DELETE FROM job_skills WHERE job_id = $1")
            .bind(job_id)
            .execute(&mut *conn)
            .await?;
        sqlx::query(
            "INSERT INTO job_skills (job_id, skill_id) SELECT $1, UNNEST($2::int4[]) ON CONFLICT DO NOTHING",
        )
        .bind(job_id)
        .bind(skill_ids)
        .execute(&mut *conn)
        .await?;
        Ok(())
    }
}
