use sqlx::PgConnection;

use crate::error::AppError;

#[derive(Debug, sqlx::FromRow)]
pub struct Category {
    pub id: i32,
    pub name: String,
}

impl Category {
    pub async fn find_or_create(conn: &mut PgConnection, name: &str) -> Result<Category, AppError> {
        let category = sqlx::query_as::<_, Category>(
            "INSERT INTO categories (name) VALUES ($1)
             ON CONFLICT (name) DO UPDATE SET name = EXCLUDED.name
             RETURNING id, name",
        )
        .bind(name.trim())
        .fetch_one(&mut *conn)
        .await?;
        Ok(category)
    }
}
