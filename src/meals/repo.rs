use anyhow::Context;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::nutrition::NutritionFacts;

/// One logged dish, as stored. Append-only: never updated or deleted.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct MealRecord {
    pub id: Uuid,
    pub user_id: Uuid,
    pub taken_at: OffsetDateTime,
    pub image_url: String,
    pub dish_name: String,
    pub portion: String,
    pub confidence: f64,
    pub kcal: f64,
    pub protein_g: f64,
    pub carbs_g: f64,
    pub fat_g: f64,
    pub source: String,
    pub raw_ai: serde_json::Value,
    pub created_at: OffsetDateTime,
}

/// A record about to be written. All rows from one photo share `taken_at`
/// and `image_url`.
#[derive(Debug)]
pub struct NewMealRecord {
    pub user_id: Uuid,
    pub taken_at: OffsetDateTime,
    pub image_url: String,
    pub dish_name: String,
    pub portion: String,
    pub confidence: f64,
    pub nutrition: NutritionFacts,
    pub raw_ai: serde_json::Value,
}

/// Insert every record in one transaction, preserving slice order. All rows
/// for one photo become visible together or not at all.
pub async fn insert_all(db: &PgPool, records: &[NewMealRecord]) -> anyhow::Result<Vec<Uuid>> {
    let mut tx = db.begin().await.context("begin tx")?;
    let mut ids = Vec::with_capacity(records.len());
    for record in records {
        let id = Uuid::new_v4();
        sqlx::query(
            r#"
            INSERT INTO meal_records
                (id, user_id, taken_at, image_url, dish_name, portion, confidence,
                 kcal, protein_g, carbs_g, fat_g, source, raw_ai)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            "#,
        )
        .bind(id)
        .bind(record.user_id)
        .bind(record.taken_at)
        .bind(&record.image_url)
        .bind(&record.dish_name)
        .bind(&record.portion)
        .bind(record.confidence)
        .bind(record.nutrition.kcal)
        .bind(record.nutrition.protein_g)
        .bind(record.nutrition.carbs_g)
        .bind(record.nutrition.fat_g)
        .bind(record.nutrition.source.as_tag())
        .bind(&record.raw_ai)
        .execute(&mut *tx)
        .await
        .with_context(|| format!("insert meal record {}", record.dish_name))?;
        ids.push(id);
    }
    tx.commit().await.context("commit tx")?;
    Ok(ids)
}

/// Records for one user within `[start, end]`, ascending by capture time.
pub async fn list_between(
    db: &PgPool,
    user_id: Uuid,
    start: OffsetDateTime,
    end: OffsetDateTime,
) -> anyhow::Result<Vec<MealRecord>> {
    let rows = sqlx::query_as::<_, MealRecord>(
        r#"
        SELECT id, user_id, taken_at, image_url, dish_name, portion, confidence,
               kcal, protein_g, carbs_g, fat_g, source, raw_ai, created_at
        FROM meal_records
        WHERE user_id = $1 AND taken_at >= $2 AND taken_at <= $3
        ORDER BY taken_at ASC
        "#,
    )
    .bind(user_id)
    .bind(start)
    .bind(end)
    .fetch_all(db)
    .await
    .context("list meal records in window")?;
    Ok(rows)
}
