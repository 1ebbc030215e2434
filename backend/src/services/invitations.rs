use chrono::{Duration, Utc};
use sqlx::SqlitePool;
use thiserror::Error;
use uuid::Uuid;

use crate::models::{HouseholdRow, InvitationRow};
use crate::services::{auth, households};
use shared::{HouseholdMembership, Invitation, InvitationStatus, InvitationWithHousehold, User};

const INVITATION_EXPIRY_DAYS: i64 = 7;

#[derive(Debug, Error)]
pub enum InvitationError {
    #[error("Invitation not found")]
    NotFound,
    #[error("Household not found")]
    HouseholdNotFound,
    #[error("You cannot invite yourself")]
    SelfInvite,
    #[error("This user already belongs to a household")]
    AlreadyPlaced,
    #[error("Invitation has expired")]
    Expired,
    #[error("Invitation is not for this user")]
    NotForUser,
    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),
}

/// Invite an email address to a household.
///
/// Re-inviting while an unexpired invitation is pending returns that
/// invitation unchanged, so repeated invites never mint new codes. When
/// `block_placed_users` is set, an email belonging to a user who already has
/// any household membership is rejected.
pub async fn invite(
    pool: &SqlitePool,
    household_id: &Uuid,
    email: &str,
    inviter: &User,
    block_placed_users: bool,
) -> Result<Invitation, InvitationError> {
    let household_exists =
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM households WHERE id = ?")
            .bind(household_id.to_string())
            .fetch_one(pool)
            .await?;
    if household_exists == 0 {
        return Err(InvitationError::HouseholdNotFound);
    }

    if email.to_lowercase() == inviter.email.to_lowercase() {
        return Err(InvitationError::SelfInvite);
    }

    let now = Utc::now();

    let existing_pending: Option<InvitationRow> = sqlx::query_as(
        r#"
        SELECT * FROM household_invitations
        WHERE household_id = ? AND LOWER(email) = LOWER(?) AND status = 'pending'
        ORDER BY created_at DESC
        LIMIT 1
        "#,
    )
    .bind(household_id.to_string())
    .bind(email)
    .fetch_optional(pool)
    .await?;

    if let Some(pending) = existing_pending {
        let invitation = pending.to_shared();
        if !invitation.is_expired(now) {
            return Ok(invitation);
        }
        // An expired pending invitation is dead; fall through and issue a
        // fresh one.
    }

    if block_placed_users {
        let placed = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*) FROM household_memberships m
            JOIN users u ON m.user_id = u.id
            WHERE LOWER(u.email) = LOWER(?)
            "#,
        )
        .bind(email)
        .fetch_one(pool)
        .await?;

        if placed > 0 {
            return Err(InvitationError::AlreadyPlaced);
        }
    }

    let id = Uuid::new_v4();
    let code = auth::generate_token();
    let expires_at = now + Duration::days(INVITATION_EXPIRY_DAYS);

    sqlx::query(
        r#"
        INSERT INTO household_invitations (id, household_id, email, code, status, created_at, expires_at)
        VALUES (?, ?, ?, ?, 'pending', ?, ?)
        "#,
    )
    .bind(id.to_string())
    .bind(household_id.to_string())
    .bind(email)
    .bind(&code)
    .bind(now)
    .bind(expires_at)
    .execute(pool)
    .await?;

    Ok(Invitation {
        id,
        household_id: *household_id,
        email: email.to_string(),
        code,
        status: InvitationStatus::Pending,
        created_at: now,
        expires_at,
        responded_at: None,
    })
}

/// Accept an invitation by its emailed code.
pub async fn resolve_by_code(
    pool: &SqlitePool,
    code: &str,
    acting_user: &User,
) -> Result<HouseholdMembership, InvitationError> {
    let invitation: InvitationRow = sqlx::query_as(
        "SELECT * FROM household_invitations WHERE code = ? AND status = 'pending'",
    )
    .bind(code)
    .fetch_optional(pool)
    .await?
    .ok_or(InvitationError::NotFound)?;

    let invitation = invitation.to_shared();
    check_resolvable(&invitation, acting_user)?;

    accept_pending(pool, &invitation, acting_user).await
}

/// Accept or reject an invitation by id. Returns the membership on accept,
/// `None` on reject. Rejection is terminal: a rejected invitation no longer
/// matches and can never be accepted afterwards.
pub async fn resolve_by_id(
    pool: &SqlitePool,
    invitation_id: &Uuid,
    acting_user: &User,
    accept: bool,
) -> Result<Option<HouseholdMembership>, InvitationError> {
    let invitation: InvitationRow = sqlx::query_as(
        "SELECT * FROM household_invitations WHERE id = ? AND status = 'pending'",
    )
    .bind(invitation_id.to_string())
    .fetch_optional(pool)
    .await?
    .ok_or(InvitationError::NotFound)?;

    let invitation = invitation.to_shared();
    check_resolvable(&invitation, acting_user)?;

    if accept {
        let membership = accept_pending(pool, &invitation, acting_user).await?;
        Ok(Some(membership))
    } else {
        sqlx::query(
            "UPDATE household_invitations SET status = 'rejected', responded_at = ? WHERE id = ?",
        )
        .bind(Utc::now())
        .bind(invitation.id.to_string())
        .execute(pool)
        .await?;

        Ok(None)
    }
}

/// Expiry and addressee checks shared by both resolution paths.
fn check_resolvable(invitation: &Invitation, acting_user: &User) -> Result<(), InvitationError> {
    if invitation.is_expired(Utc::now()) {
        return Err(InvitationError::Expired);
    }

    if invitation.email.to_lowercase() != acting_user.email.to_lowercase() {
        return Err(InvitationError::NotForUser);
    }

    Ok(())
}

/// Mark the invitation accepted and create the membership in one
/// transaction. Accepting while already a member is an idempotent success.
async fn accept_pending(
    pool: &SqlitePool,
    invitation: &Invitation,
    acting_user: &User,
) -> Result<HouseholdMembership, InvitationError> {
    let now = Utc::now();
    let mut tx = pool.begin().await?;

    sqlx::query(
        "UPDATE household_invitations SET status = 'accepted', responded_at = ? WHERE id = ?",
    )
    .bind(now)
    .bind(invitation.id.to_string())
    .execute(&mut *tx)
    .await?;

    let existing: Option<crate::models::MembershipRow> = sqlx::query_as(
        "SELECT * FROM household_memberships WHERE household_id = ? AND user_id = ?",
    )
    .bind(invitation.household_id.to_string())
    .bind(acting_user.id.to_string())
    .fetch_optional(&mut *tx)
    .await?;

    if let Some(existing) = existing {
        tx.commit().await?;
        return Ok(existing.to_shared());
    }

    let membership =
        households::enroll(&mut tx, &invitation.household_id, &acting_user.id).await?;

    tx.commit().await?;

    Ok(membership)
}

/// Pending, unexpired invitations addressed to an email.
pub async fn list_user_invitations(
    pool: &SqlitePool,
    email: &str,
) -> Result<Vec<InvitationWithHousehold>, InvitationError> {
    let invitations: Vec<InvitationRow> = sqlx::query_as(
        r#"
        SELECT * FROM household_invitations
        WHERE LOWER(email) = LOWER(?) AND status = 'pending' AND expires_at > ?
        ORDER BY created_at DESC
        "#,
    )
    .bind(email)
    .bind(Utc::now())
    .fetch_all(pool)
    .await?;

    let mut result = Vec::new();
    for inv in invitations {
        let household: HouseholdRow = sqlx::query_as("SELECT * FROM households WHERE id = ?")
            .bind(&inv.household_id)
            .fetch_one(pool)
            .await?;

        result.push(InvitationWithHousehold {
            invitation: inv.to_shared(),
            household: household.to_shared(),
        });
    }

    Ok(result)
}

/// Pending, unexpired invitations issued by a household.
pub async fn list_household_invitations(
    pool: &SqlitePool,
    household_id: &Uuid,
) -> Result<Vec<Invitation>, InvitationError> {
    let invitations: Vec<InvitationRow> = sqlx::query_as(
        r#"
        SELECT * FROM household_invitations
        WHERE household_id = ? AND status = 'pending' AND expires_at > ?
        ORDER BY created_at DESC
        "#,
    )
    .bind(household_id.to_string())
    .bind(Utc::now())
    .fetch_all(pool)
    .await?;

    Ok(invitations.into_iter().map(|i| i.to_shared()).collect())
}

/// Revoke a pending invitation (household-admin side).
pub async fn cancel_invitation(
    pool: &SqlitePool,
    invitation_id: &Uuid,
) -> Result<(), InvitationError> {
    let result =
        sqlx::query("DELETE FROM household_invitations WHERE id = ? AND status = 'pending'")
            .bind(invitation_id.to_string())
            .execute(pool)
            .await?;

    if result.rows_affected() == 0 {
        return Err(InvitationError::NotFound);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::households;
    use shared::Role;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn test_pool() -> SqlitePool {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        sqlx::migrate!("./migrations").run(&pool).await.unwrap();
        pool
    }

    async fn insert_user(pool: &SqlitePool, name: &str, email: &str, role: Role) -> User {
        let id = Uuid::new_v4();
        sqlx::query(
            r#"
            INSERT INTO users (id, name, email, password_hash, role, is_email_verified, created_at)
            VALUES (?, ?, ?, 'hash', ?, TRUE, ?)
            "#,
        )
        .bind(id.to_string())
        .bind(name)
        .bind(email)
        .bind(role.as_str())
        .bind(Utc::now())
        .execute(pool)
        .await
        .unwrap();

        auth::get_user_by_id(pool, &id).await.unwrap().unwrap()
    }

    async fn invitation_status(pool: &SqlitePool, id: &Uuid) -> String {
        sqlx::query_scalar("SELECT status FROM household_invitations WHERE id = ?")
            .bind(id.to_string())
            .fetch_one(pool)
            .await
            .unwrap()
    }

    #[test]
    fn test_invitation_expiry_days() {
        assert_eq!(INVITATION_EXPIRY_DAYS, 7);
    }

    #[tokio::test]
    async fn test_invite_is_idempotent_while_pending() {
        let pool = test_pool().await;
        let admin = insert_user(&pool, "Ada", "ada@example.com", Role::Admin).await;
        let home = households::create_household(&pool, &admin.id, "Home")
            .await
            .unwrap();

        let first = invite(&pool, &home.id, "b@example.com", &admin, true)
            .await
            .unwrap();
        let second = invite(&pool, &home.id, "b@example.com", &admin, true)
            .await
            .unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(first.code, second.code);
    }

    #[tokio::test]
    async fn test_self_invite_is_forbidden() {
        let pool = test_pool().await;
        let admin = insert_user(&pool, "Ada", "ada@example.com", Role::Admin).await;
        let home = households::create_household(&pool, &admin.id, "Home")
            .await
            .unwrap();

        let result = invite(&pool, &home.id, "Ada@Example.com", &admin, true).await;
        assert!(matches!(result, Err(InvitationError::SelfInvite)));
    }

    #[tokio::test]
    async fn test_invite_blocks_users_with_any_household() {
        let pool = test_pool().await;
        let admin = insert_user(&pool, "Ada", "ada@example.com", Role::Admin).await;
        let placed = insert_user(&pool, "Bob", "bob@example.com", Role::Member).await;

        let home = households::create_household(&pool, &admin.id, "Home")
            .await
            .unwrap();
        // Bob already lives elsewhere
        let elsewhere = households::create_household(&pool, &admin.id, "Elsewhere")
            .await
            .unwrap();
        households::add_member(&pool, &elsewhere.id, &placed.id)
            .await
            .unwrap();

        let blocked = invite(&pool, &home.id, "bob@example.com", &admin, true).await;
        assert!(matches!(blocked, Err(InvitationError::AlreadyPlaced)));

        // With the policy disabled the invite goes through
        let allowed = invite(&pool, &home.id, "bob@example.com", &admin, false).await;
        assert!(allowed.is_ok());
    }

    #[tokio::test]
    async fn test_invite_allows_registered_user_without_households() {
        let pool = test_pool().await;
        let admin = insert_user(&pool, "Ada", "ada@example.com", Role::Admin).await;
        insert_user(&pool, "Bob", "bob@example.com", Role::Member).await;

        let home = households::create_household(&pool, &admin.id, "Home")
            .await
            .unwrap();

        let invitation = invite(&pool, &home.id, "bob@example.com", &admin, true)
            .await
            .unwrap();
        assert_eq!(invitation.status, InvitationStatus::Pending);
    }

    #[tokio::test]
    async fn test_accept_by_code_creates_primary_membership() {
        let pool = test_pool().await;
        let admin = insert_user(&pool, "Ada", "ada@example.com", Role::Admin).await;
        let home = households::create_household(&pool, &admin.id, "Home")
            .await
            .unwrap();

        let invitation = invite(&pool, &home.id, "b@example.com", &admin, true)
            .await
            .unwrap();

        // b registers after being invited
        let invitee = insert_user(&pool, "Bea", "b@example.com", Role::Member).await;

        let membership = resolve_by_code(&pool, &invitation.code, &invitee)
            .await
            .unwrap();

        assert_eq!(membership.household_id, home.id);
        assert!(membership.is_primary);
        assert_eq!(invitation_status(&pool, &invitation.id).await, "accepted");

        // A second invite after acceptance is blocked: Bea is placed now
        let again = invite(&pool, &home.id, "b@example.com", &admin, true).await;
        assert!(matches!(again, Err(InvitationError::AlreadyPlaced)));
    }

    #[tokio::test]
    async fn test_invite_scenario_pending_reinvite_returns_original() {
        let pool = test_pool().await;
        let admin = insert_user(&pool, "Ada", "ada@example.com", Role::Admin).await;
        let home = households::create_household(&pool, &admin.id, "Home")
            .await
            .unwrap();

        let original = invite(&pool, &home.id, "b@example.com", &admin, true)
            .await
            .unwrap();
        let invitee = insert_user(&pool, "Bea", "b@example.com", Role::Member).await;
        resolve_by_code(&pool, &original.code, &invitee)
            .await
            .unwrap();

        // While another invitation is pending for c, re-inviting keeps it
        let first = invite(&pool, &home.id, "c@example.com", &admin, true)
            .await
            .unwrap();
        let second = invite(&pool, &home.id, "c@example.com", &admin, true)
            .await
            .unwrap();
        assert_eq!(first.code, second.code);
    }

    #[tokio::test]
    async fn test_expired_invitation_cannot_be_resolved() {
        let pool = test_pool().await;
        let admin = insert_user(&pool, "Ada", "ada@example.com", Role::Admin).await;
        let home = households::create_household(&pool, &admin.id, "Home")
            .await
            .unwrap();

        let invitation = invite(&pool, &home.id, "b@example.com", &admin, true)
            .await
            .unwrap();
        sqlx::query("UPDATE household_invitations SET expires_at = ? WHERE id = ?")
            .bind(Utc::now() - Duration::days(1))
            .bind(invitation.id.to_string())
            .execute(&pool)
            .await
            .unwrap();

        let invitee = insert_user(&pool, "Bea", "b@example.com", Role::Member).await;

        let by_code = resolve_by_code(&pool, &invitation.code, &invitee).await;
        assert!(matches!(by_code, Err(InvitationError::Expired)));

        let by_id = resolve_by_id(&pool, &invitation.id, &invitee, true).await;
        assert!(matches!(by_id, Err(InvitationError::Expired)));

        // Storage still says pending: expiry is derived, not written back
        assert_eq!(invitation_status(&pool, &invitation.id).await, "pending");
    }

    #[tokio::test]
    async fn test_expired_pending_invite_is_superseded() {
        let pool = test_pool().await;
        let admin = insert_user(&pool, "Ada", "ada@example.com", Role::Admin).await;
        let home = households::create_household(&pool, &admin.id, "Home")
            .await
            .unwrap();

        let stale = invite(&pool, &home.id, "b@example.com", &admin, true)
            .await
            .unwrap();
        sqlx::query("UPDATE household_invitations SET expires_at = ? WHERE id = ?")
            .bind(Utc::now() - Duration::days(1))
            .bind(stale.id.to_string())
            .execute(&pool)
            .await
            .unwrap();

        let fresh = invite(&pool, &home.id, "b@example.com", &admin, true)
            .await
            .unwrap();
        assert_ne!(fresh.id, stale.id);
        assert_ne!(fresh.code, stale.code);
    }

    #[tokio::test]
    async fn test_resolution_requires_matching_email() {
        let pool = test_pool().await;
        let admin = insert_user(&pool, "Ada", "ada@example.com", Role::Admin).await;
        let home = households::create_household(&pool, &admin.id, "Home")
            .await
            .unwrap();

        let invitation = invite(&pool, &home.id, "b@example.com", &admin, true)
            .await
            .unwrap();

        let wrong_user = insert_user(&pool, "Eve", "eve@example.com", Role::Member).await;
        let result = resolve_by_code(&pool, &invitation.code, &wrong_user).await;
        assert!(matches!(result, Err(InvitationError::NotForUser)));

        // The match is case-insensitive
        let invitee = insert_user(&pool, "Bea", "B@EXAMPLE.COM", Role::Member).await;
        assert!(resolve_by_code(&pool, &invitation.code, &invitee).await.is_ok());
    }

    #[tokio::test]
    async fn test_rejection_is_terminal() {
        let pool = test_pool().await;
        let admin = insert_user(&pool, "Ada", "ada@example.com", Role::Admin).await;
        let home = households::create_household(&pool, &admin.id, "Home")
            .await
            .unwrap();

        let invitation = invite(&pool, &home.id, "b@example.com", &admin, true)
            .await
            .unwrap();
        let invitee = insert_user(&pool, "Bea", "b@example.com", Role::Member).await;

        let rejected = resolve_by_id(&pool, &invitation.id, &invitee, false)
            .await
            .unwrap();
        assert!(rejected.is_none());
        assert_eq!(invitation_status(&pool, &invitation.id).await, "rejected");

        // Neither path can accept it afterwards
        let by_id = resolve_by_id(&pool, &invitation.id, &invitee, true).await;
        assert!(matches!(by_id, Err(InvitationError::NotFound)));
        let by_code = resolve_by_code(&pool, &invitation.code, &invitee).await;
        assert!(matches!(by_code, Err(InvitationError::NotFound)));
    }

    #[tokio::test]
    async fn test_accepted_invitation_cannot_be_rejected() {
        let pool = test_pool().await;
        let admin = insert_user(&pool, "Ada", "ada@example.com", Role::Admin).await;
        let home = households::create_household(&pool, &admin.id, "Home")
            .await
            .unwrap();

        let invitation = invite(&pool, &home.id, "b@example.com", &admin, true)
            .await
            .unwrap();
        let invitee = insert_user(&pool, "Bea", "b@example.com", Role::Member).await;
        resolve_by_code(&pool, &invitation.code, &invitee)
            .await
            .unwrap();

        let result = resolve_by_id(&pool, &invitation.id, &invitee, false).await;
        assert!(matches!(result, Err(InvitationError::NotFound)));
        assert_eq!(invitation_status(&pool, &invitation.id).await, "accepted");
    }

    #[tokio::test]
    async fn test_accept_when_already_member_is_idempotent() {
        let pool = test_pool().await;
        let admin = insert_user(&pool, "Ada", "ada@example.com", Role::Admin).await;
        let home = households::create_household(&pool, &admin.id, "Home")
            .await
            .unwrap();

        let invitation = invite(&pool, &home.id, "b@example.com", &admin, true)
            .await
            .unwrap();
        let invitee = insert_user(&pool, "Bea", "b@example.com", Role::Member).await;
        households::add_member(&pool, &home.id, &invitee.id)
            .await
            .unwrap();

        let membership = resolve_by_code(&pool, &invitation.code, &invitee)
            .await
            .unwrap();

        assert_eq!(membership.household_id, home.id);
        assert_eq!(invitation_status(&pool, &invitation.id).await, "accepted");

        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM household_memberships WHERE household_id = ? AND user_id = ?",
        )
        .bind(home.id.to_string())
        .bind(invitee.id.to_string())
        .fetch_one(&pool)
        .await
        .unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn test_cancel_invitation() {
        let pool = test_pool().await;
        let admin = insert_user(&pool, "Ada", "ada@example.com", Role::Admin).await;
        let home = households::create_household(&pool, &admin.id, "Home")
            .await
            .unwrap();

        let invitation = invite(&pool, &home.id, "b@example.com", &admin, true)
            .await
            .unwrap();

        cancel_invitation(&pool, &invitation.id).await.unwrap();
        let again = cancel_invitation(&pool, &invitation.id).await;
        assert!(matches!(again, Err(InvitationError::NotFound)));
    }

    #[tokio::test]
    async fn test_list_user_invitations_excludes_expired() {
        let pool = test_pool().await;
        let admin = insert_user(&pool, "Ada", "ada@example.com", Role::Admin).await;
        let home = households::create_household(&pool, &admin.id, "Home")
            .await
            .unwrap();
        let cabin = households::create_household(&pool, &admin.id, "Cabin")
            .await
            .unwrap();

        invite(&pool, &home.id, "b@example.com", &admin, true)
            .await
            .unwrap();
        let stale = invite(&pool, &cabin.id, "b@example.com", &admin, true)
            .await
            .unwrap();
        sqlx::query("UPDATE household_invitations SET expires_at = ? WHERE id = ?")
            .bind(Utc::now() - Duration::days(1))
            .bind(stale.id.to_string())
            .execute(&pool)
            .await
            .unwrap();

        let listed = list_user_invitations(&pool, "B@example.com").await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].household.id, home.id);
    }
}
