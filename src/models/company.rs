use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::PgConnection;

use crate::error::AppError;

#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct Company {
    pub id: i32,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Company {
    /// Resolve a company by exact name, creating it on first sight.
    pub async fn find_or_create(conn: &mut PgConnection, name: &str) -> Result<Company, AppError> {
        let company = sqlx::query_as::<_, Company>(
            "INSERT INTO companies (name) VALUES ($1)
             ON CONFLICT (name) DO UPDATE SET updated_at = companies.updated_at
             RETURNING *",
        )
        .bind(name.trim())
        .fetch_one(&mut *conn)
        .await?;
        Ok(company)
    }
}
