use std::cmp::Ordering;
use std::collections::HashMap;

use chrono::{NaiveDate, Utc};
use sqlx::SqlitePool;
use thiserror::Error;
use uuid::Uuid;

use crate::models::{FoodLogRow, UserRow};
use shared::{
    FoodLog, FoodLogWithUser, NutritionFacts, NutritionReport, NutritionTotals,
    UserNutritionSummary,
};

#[derive(Debug, Error)]
pub enum FoodLogError {
    #[error("Food log entry not found")]
    NotFound,
    #[error("User is not a member of this household")]
    NotAMember,
    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),
}

/// Record a food entry for a user within a household. Nutrition fields are
/// stored exactly as estimated; absent fields stay NULL so "estimate
/// unavailable" is never conflated with an estimated zero.
pub async fn record_entry(
    pool: &SqlitePool,
    user_id: &Uuid,
    household_id: &Uuid,
    food_name: &str,
    portion_size: &str,
    nutrition: &NutritionFacts,
) -> Result<FoodLog, FoodLogError> {
    let is_member = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM household_memberships WHERE household_id = ? AND user_id = ?",
    )
    .bind(household_id.to_string())
    .bind(user_id.to_string())
    .fetch_one(pool)
    .await?;

    if is_member == 0 {
        return Err(FoodLogError::NotAMember);
    }

    let id = Uuid::new_v4();
    let now = Utc::now();

    sqlx::query(
        r#"
        INSERT INTO food_logs (id, household_id, user_id, food_name, portion_size,
                               calories, protein, carbohydrates, fiber, fat, sugar, logged_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(id.to_string())
    .bind(household_id.to_string())
    .bind(user_id.to_string())
    .bind(food_name)
    .bind(portion_size)
    .bind(nutrition.calories)
    .bind(nutrition.protein)
    .bind(nutrition.carbohydrates)
    .bind(nutrition.fiber)
    .bind(nutrition.fat)
    .bind(nutrition.sugar)
    .bind(now)
    .execute(pool)
    .await?;

    Ok(FoodLog {
        id,
        household_id: *household_id,
        user_id: *user_id,
        food_name: food_name.to_string(),
        portion_size: portion_size.to_string(),
        nutrition: *nutrition,
        logged_at: now,
    })
}

pub async fn get_entry(pool: &SqlitePool, log_id: &Uuid) -> Result<Option<FoodLog>, FoodLogError> {
    let row: Option<FoodLogRow> = sqlx::query_as("SELECT * FROM food_logs WHERE id = ?")
        .bind(log_id.to_string())
        .fetch_optional(pool)
        .await?;

    Ok(row.map(|r| r.to_shared()))
}

/// Food logs are deleted independently; nothing else references them.
pub async fn delete_entry(pool: &SqlitePool, log_id: &Uuid) -> Result<(), FoodLogError> {
    let result = sqlx::query("DELETE FROM food_logs WHERE id = ?")
        .bind(log_id.to_string())
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(FoodLogError::NotFound);
    }

    Ok(())
}

pub async fn list_entries(
    pool: &SqlitePool,
    household_id: &Uuid,
) -> Result<Vec<FoodLogWithUser>, FoodLogError> {
    let rows: Vec<FoodLogRow> = sqlx::query_as(
        "SELECT * FROM food_logs WHERE household_id = ? ORDER BY logged_at DESC",
    )
    .bind(household_id.to_string())
    .fetch_all(pool)
    .await?;

    let mut result = Vec::new();
    for row in rows {
        let user: UserRow = sqlx::query_as("SELECT * FROM users WHERE id = ?")
            .bind(&row.user_id)
            .fetch_one(pool)
            .await?;

        result.push(FoodLogWithUser {
            log: row.to_shared(),
            user: user.to_shared(),
        });
    }

    Ok(result)
}

/// Summed nutrition over a set of households and an inclusive date range
/// (`[start 00:00:00, end 23:59:59.999999]` UTC). Absent estimates count as
/// zero in sums; per-user summaries are ordered by descending calories.
pub async fn aggregate(
    pool: &SqlitePool,
    household_ids: &[Uuid],
    start_date: NaiveDate,
    end_date: NaiveDate,
) -> Result<NutritionReport, FoodLogError> {
    let range_start = start_date.and_hms_opt(0, 0, 0).unwrap().and_utc();
    let range_end = end_date
        .and_hms_micro_opt(23, 59, 59, 999_999)
        .unwrap()
        .and_utc();

    let mut totals = NutritionTotals::default();
    let mut by_user: HashMap<String, NutritionTotals> = HashMap::new();

    for household_id in household_ids {
        let rows: Vec<FoodLogRow> = sqlx::query_as(
            r#"
            SELECT * FROM food_logs
            WHERE household_id = ? AND logged_at >= ? AND logged_at <= ?
            "#,
        )
        .bind(household_id.to_string())
        .bind(range_start)
        .bind(range_end)
        .fetch_all(pool)
        .await?;

        for row in rows {
            let facts = row.nutrition();
            totals.add(&facts);
            by_user.entry(row.user_id.clone()).or_default().add(&facts);
        }
    }

    let mut per_user = Vec::new();
    for (user_id, user_totals) in by_user {
        let user: UserRow = sqlx::query_as("SELECT * FROM users WHERE id = ?")
            .bind(&user_id)
            .fetch_one(pool)
            .await?;

        per_user.push(UserNutritionSummary {
            user: user.to_shared(),
            totals: user_totals,
        });
    }

    per_user.sort_by(|a, b| {
        b.totals
            .calories
            .partial_cmp(&a.totals.calories)
            .unwrap_or(Ordering::Equal)
    });

    Ok(NutritionReport {
        start_date,
        end_date,
        totals,
        per_user,
    })
}
