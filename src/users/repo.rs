use anyhow::Context;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use time::OffsetDateTime;
use uuid::Uuid;

/// A user known by their messaging-channel identity. Created idempotently on
/// first contact, never deleted.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: Uuid,
    pub external_id: String,
    pub display_name: Option<String>,
    pub created_at: OffsetDateTime,
}

pub async fn upsert_by_external_id(
    db: &PgPool,
    external_id: &str,
    display_name: Option<&str>,
) -> anyhow::Result<User> {
    let user = sqlx::query_as::<_, User>(
        r#"
        INSERT INTO users (external_id, display_name)
        VALUES ($1, $2)
        ON CONFLICT (external_id)
        DO UPDATE SET display_name = COALESCE(EXCLUDED.display_name, users.display_name)
        RETURNING id, external_id, display_name, created_at
        "#,
    )
    .bind(external_id)
    .bind(display_name)
    .fetch_one(db)
    .await
    .context("upsert user")?;
    Ok(user)
}

pub async fn find_by_external_id(db: &PgPool, external_id: &str) -> anyhow::Result<Option<User>> {
    let user = sqlx::query_as::<_, User>(
        r#"
        SELECT id, external_id, display_name, created_at
        FROM users
        WHERE external_id = $1
        "#,
    )
    .bind(external_id)
    .fetch_optional(db)
    .await
    .context("find user by external id")?;
    Ok(user)
}
