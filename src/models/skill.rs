use sqlx::PgConnection;

use crate::error::AppError;

#[derive(Debug, sqlx::FromRow)]
pub struct Skill {
    pub id: i32,
    pub name: String,
}

impl Skill {
    /// Skills are stored lowercased so "Rust" and "rust" share one row.
    pub async fn find_or_create(conn: &mut PgConnection, name: &str) -> Result<Skill, AppError> {
        let skill = sqlx::query_as::<_, Skill>(
            "INSERT INTO skills (name) VALUES (LOWER($1))
             ON CONFLICT (name) DO UPDATE SET name = EXCLUDED.name
             RETURNING id, name",
        )
        .bind(name.trim())
        .fetch_one(&mut *conn)
        .await?;
        Ok(skill)
    }
}
