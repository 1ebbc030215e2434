use chrono::Utc;
use sqlx::SqlitePool;
use thiserror::Error;
use uuid::Uuid;

use crate::models::{HouseholdRow, MembershipRow, UserRow};
use shared::{Household, HouseholdMembership, MemberWithUser, User};

#[derive(Debug, Error)]
pub enum HouseholdError {
    #[error("Household not found")]
    NotFound,
    #[error("A household with this name already exists")]
    NameTaken,
    #[error("User is already a member of this household")]
    AlreadyMember,
    #[error("User is not a member of this household")]
    NotAMember,
    #[error("Household would be left without an admin")]
    LastAdmin,
    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),
}

/// Insert a membership as part of a caller-owned transaction, flagged
/// primary iff the user had no memberships before. Every code path that
/// creates memberships goes through here so the primary-flag invariant is
/// enforced in one place.
pub(crate) async fn enroll(
    tx: &mut sqlx::SqliteConnection,
    household_id: &Uuid,
    user_id: &Uuid,
) -> Result<HouseholdMembership, sqlx::Error> {
    let membership_count = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM household_memberships WHERE user_id = ?",
    )
    .bind(user_id.to_string())
    .fetch_one(&mut *tx)
    .await?;

    let now = Utc::now();
    let is_primary = membership_count == 0;

    sqlx::query(
        r#"
        INSERT INTO household_memberships (user_id, household_id, is_primary, joined_at)
        VALUES (?, ?, ?, ?)
        "#,
    )
    .bind(user_id.to_string())
    .bind(household_id.to_string())
    .bind(is_primary)
    .bind(now)
    .execute(&mut *tx)
    .await?;

    Ok(HouseholdMembership {
        household_id: *household_id,
        user_id: *user_id,
        is_primary,
        joined_at: now,
    })
}

/// Create a household and enroll the creator.
pub async fn create_household(
    pool: &SqlitePool,
    creator_id: &Uuid,
    name: &str,
) -> Result<Household, HouseholdError> {
    let existing = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM households WHERE name = ?")
        .bind(name)
        .fetch_one(pool)
        .await?;

    if existing > 0 {
        return Err(HouseholdError::NameTaken);
    }

    let id = Uuid::new_v4();
    let now = Utc::now();

    let mut tx = pool.begin().await?;

    sqlx::query("INSERT INTO households (id, name, created_at) VALUES (?, ?, ?)")
        .bind(id.to_string())
        .bind(name)
        .bind(now)
        .execute(&mut *tx)
        .await?;

    enroll(&mut tx, &id, creator_id).await?;

    tx.commit().await?;

    Ok(Household {
        id,
        name: name.to_string(),
        created_at: now,
    })
}

/// Enroll a user in a household. The new membership is flagged primary iff
/// the user had no memberships before.
pub async fn add_member(
    pool: &SqlitePool,
    household_id: &Uuid,
    user_id: &Uuid,
) -> Result<HouseholdMembership, HouseholdError> {
    let mut tx = pool.begin().await?;

    let existing = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM household_memberships WHERE household_id = ? AND user_id = ?",
    )
    .bind(household_id.to_string())
    .bind(user_id.to_string())
    .fetch_one(&mut *tx)
    .await?;

    if existing > 0 {
        return Err(HouseholdError::AlreadyMember);
    }

    let membership = enroll(&mut tx, household_id, user_id).await?;

    tx.commit().await?;

    Ok(membership)
}

/// Remove a user from a household.
///
/// Fails when the household would retain members but no admin (admin status
/// is the remaining members' user-level role). If the removed membership was
/// the user's primary and they belong to other households, one of those is
/// promoted to primary.
pub async fn remove_member(
    pool: &SqlitePool,
    household_id: &Uuid,
    user_id: &Uuid,
) -> Result<(), HouseholdError> {
    let membership: MembershipRow = sqlx::query_as(
        "SELECT * FROM household_memberships WHERE household_id = ? AND user_id = ?",
    )
    .bind(household_id.to_string())
    .bind(user_id.to_string())
    .fetch_optional(pool)
    .await?
    .ok_or(HouseholdError::NotAMember)?;

    let remaining = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM household_memberships WHERE household_id = ? AND user_id != ?",
    )
    .bind(household_id.to_string())
    .bind(user_id.to_string())
    .fetch_one(pool)
    .await?;

    let remaining_admins = sqlx::query_scalar::<_, i64>(
        r#"
        SELECT COUNT(*) FROM household_memberships m
        JOIN users u ON m.user_id = u.id
        WHERE m.household_id = ? AND m.user_id != ? AND u.role = 'admin'
        "#,
    )
    .bind(household_id.to_string())
    .bind(user_id.to_string())
    .fetch_one(pool)
    .await?;

    if remaining > 0 && remaining_admins == 0 {
        return Err(HouseholdError::LastAdmin);
    }

    let mut tx = pool.begin().await?;

    sqlx::query("DELETE FROM household_memberships WHERE household_id = ? AND user_id = ?")
        .bind(household_id.to_string())
        .bind(user_id.to_string())
        .execute(&mut *tx)
        .await?;

    if membership.is_primary {
        let next: Option<MembershipRow> = sqlx::query_as(
            r#"
            SELECT * FROM household_memberships
            WHERE user_id = ?
            ORDER BY joined_at ASC, household_id ASC
            LIMIT 1
            "#,
        )
        .bind(user_id.to_string())
        .fetch_optional(&mut *tx)
        .await?;

        if let Some(next) = next {
            sqlx::query(
                "UPDATE household_memberships SET is_primary = TRUE WHERE user_id = ? AND household_id = ?",
            )
            .bind(&next.user_id)
            .bind(&next.household_id)
            .execute(&mut *tx)
            .await?;
        }
    }

    tx.commit().await?;

    Ok(())
}

/// Make the given household the user's primary one, clearing any previous
/// primary flag in the same transaction.
pub async fn set_primary(
    pool: &SqlitePool,
    household_id: &Uuid,
    user_id: &Uuid,
) -> Result<HouseholdMembership, HouseholdError> {
    let membership: MembershipRow = sqlx::query_as(
        "SELECT * FROM household_memberships WHERE household_id = ? AND user_id = ?",
    )
    .bind(household_id.to_string())
    .bind(user_id.to_string())
    .fetch_optional(pool)
    .await?
    .ok_or(HouseholdError::NotAMember)?;

    let mut tx = pool.begin().await?;

    sqlx::query("UPDATE household_memberships SET is_primary = FALSE WHERE user_id = ? AND is_primary = TRUE")
        .bind(user_id.to_string())
        .execute(&mut *tx)
        .await?;

    sqlx::query(
        "UPDATE household_memberships SET is_primary = TRUE WHERE user_id = ? AND household_id = ?",
    )
    .bind(user_id.to_string())
    .bind(household_id.to_string())
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    Ok(HouseholdMembership {
        household_id: *household_id,
        user_id: *user_id,
        is_primary: true,
        joined_at: membership.joined_at,
    })
}

/// The household a user sees by default. Falls back to the oldest membership
/// when no primary flag is set (self-healing for inconsistent data).
pub async fn get_primary_household(
    pool: &SqlitePool,
    user_id: &Uuid,
) -> Result<Option<Household>, HouseholdError> {
    let primary: Option<HouseholdRow> = sqlx::query_as(
        r#"
        SELECT h.* FROM households h
        JOIN household_memberships m ON h.id = m.household_id
        WHERE m.user_id = ? AND m.is_primary = TRUE
        "#,
    )
    .bind(user_id.to_string())
    .fetch_optional(pool)
    .await?;

    if let Some(household) = primary {
        return Ok(Some(household.to_shared()));
    }

    let fallback: Option<HouseholdRow> = sqlx::query_as(
        r#"
        SELECT h.* FROM households h
        JOIN household_memberships m ON h.id = m.household_id
        WHERE m.user_id = ?
        ORDER BY m.joined_at ASC, m.household_id ASC
        LIMIT 1
        "#,
    )
    .bind(user_id.to_string())
    .fetch_optional(pool)
    .await?;

    Ok(fallback.map(|h| h.to_shared()))
}

/// Authorization predicate: may `acting` act on `target`'s data within the
/// given household? The target must hold a membership there; acting on
/// someone else additionally requires the admin role and at least one
/// household shared with the target.
pub async fn can_act_on(
    pool: &SqlitePool,
    acting: &User,
    target_user_id: &Uuid,
    household_id: &Uuid,
) -> Result<bool, HouseholdError> {
    if !is_member(pool, household_id, target_user_id).await? {
        return Ok(false);
    }

    if acting.id == *target_user_id {
        return Ok(true);
    }

    if !acting.role.is_admin() {
        return Ok(false);
    }

    let shared_households = sqlx::query_scalar::<_, i64>(
        r#"
        SELECT COUNT(*) FROM household_memberships a
        JOIN household_memberships b ON a.household_id = b.household_id
        WHERE a.user_id = ? AND b.user_id = ?
        "#,
    )
    .bind(acting.id.to_string())
    .bind(target_user_id.to_string())
    .fetch_one(pool)
    .await?;

    Ok(shared_households > 0)
}

pub async fn get_household(
    pool: &SqlitePool,
    household_id: &Uuid,
) -> Result<Option<Household>, HouseholdError> {
    let household: Option<HouseholdRow> = sqlx::query_as("SELECT * FROM households WHERE id = ?")
        .bind(household_id.to_string())
        .fetch_optional(pool)
        .await?;

    Ok(household.map(|h| h.to_shared()))
}

pub async fn list_user_households(
    pool: &SqlitePool,
    user_id: &Uuid,
) -> Result<Vec<Household>, HouseholdError> {
    let households: Vec<HouseholdRow> = sqlx::query_as(
        r#"
        SELECT h.* FROM households h
        JOIN household_memberships m ON h.id = m.household_id
        WHERE m.user_id = ?
        ORDER BY m.joined_at ASC
        "#,
    )
    .bind(user_id.to_string())
    .fetch_all(pool)
    .await?;

    Ok(households.into_iter().map(|h| h.to_shared()).collect())
}

pub async fn is_member(
    pool: &SqlitePool,
    household_id: &Uuid,
    user_id: &Uuid,
) -> Result<bool, HouseholdError> {
    let count = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM household_memberships WHERE household_id = ? AND user_id = ?",
    )
    .bind(household_id.to_string())
    .bind(user_id.to_string())
    .fetch_one(pool)
    .await?;

    Ok(count > 0)
}

pub async fn list_members(
    pool: &SqlitePool,
    household_id: &Uuid,
) -> Result<Vec<MemberWithUser>, HouseholdError> {
    let memberships: Vec<MembershipRow> = sqlx::query_as(
        "SELECT * FROM household_memberships WHERE household_id = ? ORDER BY joined_at ASC",
    )
    .bind(household_id.to_string())
    .fetch_all(pool)
    .await?;

    let mut result = Vec::new();
    for m in memberships {
        let user: UserRow = sqlx::query_as("SELECT * FROM users WHERE id = ?")
            .bind(&m.user_id)
            .fetch_one(pool)
            .await?;

        result.push(MemberWithUser {
            membership: m.to_shared(),
            user: user.to_shared(),
        });
    }

    Ok(result)
}

pub async fn update_household(
    pool: &SqlitePool,
    household_id: &Uuid,
    name: &str,
) -> Result<Household, HouseholdError> {
    let household: HouseholdRow = sqlx::query_as("SELECT * FROM households WHERE id = ?")
        .bind(household_id.to_string())
        .fetch_optional(pool)
        .await?
        .ok_or(HouseholdError::NotFound)?;

    let taken = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM households WHERE name = ? AND id != ?",
    )
    .bind(name)
    .bind(household_id.to_string())
    .fetch_one(pool)
    .await?;

    if taken > 0 {
        return Err(HouseholdError::NameTaken);
    }

    sqlx::query("UPDATE households SET name = ? WHERE id = ?")
        .bind(name)
        .bind(household_id.to_string())
        .execute(pool)
        .await?;

    Ok(Household {
        id: Uuid::parse_str(&household.id).unwrap(),
        name: name.to_string(),
        created_at: household.created_at,
    })
}

/// Delete a household along with its memberships, invitations, and food
/// logs, in one transaction.
pub async fn delete_household(
    pool: &SqlitePool,
    household_id: &Uuid,
) -> Result<(), HouseholdError> {
    let mut tx = pool.begin().await?;

    sqlx::query("DELETE FROM food_logs WHERE household_id = ?")
        .bind(household_id.to_string())
        .execute(&mut *tx)
        .await?;

    sqlx::query("DELETE FROM household_invitations WHERE household_id = ?")
        .bind(household_id.to_string())
        .execute(&mut *tx)
        .await?;

    sqlx::query("DELETE FROM household_memberships WHERE household_id = ?")
        .bind(household_id.to_string())
        .execute(&mut *tx)
        .await?;

    let result = sqlx::query("DELETE FROM households WHERE id = ?")
        .bind(household_id.to_string())
        .execute(&mut *tx)
        .await?;

    if result.rows_affected() == 0 {
        return Err(HouseholdError::NotFound);
    }

    tx.commit().await?;

    Ok(())
}
