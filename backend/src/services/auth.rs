use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use rand::{distributions::Alphanumeric, Rng};
use rand_core::OsRng;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use thiserror::Error;
use uuid::Uuid;

use crate::models::UserRow;
use shared::{CreateUserRequest, LoginRequest, Role, User};

const VERIFICATION_TOKEN_EXPIRY_HOURS: i64 = 24;
const RESET_TOKEN_EXPIRY_HOURS: i64 = 1;
/// 43 alphanumeric characters, roughly 256 bits of entropy.
const TOKEN_LENGTH: usize = 43;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("A user with this email already exists")]
    UserAlreadyExists,
    #[error("Invalid credentials")]
    InvalidCredentials,
    #[error("Token not found")]
    TokenNotFound,
    #[error("Token has expired")]
    TokenExpired,
    #[error("Password hashing error")]
    HashingError,
    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),
    #[error("JWT error: {0}")]
    JwtError(#[from] jsonwebtoken::errors::Error),
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub exp: i64,
    pub iat: i64,
}

/// Generate a URL-safe unguessable token for verification links, password
/// resets, and invitation codes.
pub fn generate_token() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(TOKEN_LENGTH)
        .map(char::from)
        .collect()
}

pub fn hash_password(password: &str) -> Result<String, AuthError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|h| h.to_string())
        .map_err(|_| AuthError::HashingError)
}

pub fn verify_password(password: &str, hash: &str) -> bool {
    PasswordHash::new(hash)
        .map(|parsed| {
            Argon2::default()
                .verify_password(password.as_bytes(), &parsed)
                .is_ok()
        })
        .unwrap_or(false)
}

/// Register a new user. The first user ever registered becomes an admin.
/// Returns the user together with their email verification token; sending
/// the verification email is the caller's concern.
pub async fn register_user(
    pool: &SqlitePool,
    request: &CreateUserRequest,
) -> Result<(User, String), AuthError> {
    let existing =
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM users WHERE LOWER(email) = LOWER(?)")
            .bind(&request.email)
            .fetch_one(pool)
            .await?;

    if existing > 0 {
        return Err(AuthError::UserAlreadyExists);
    }

    let user_count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM users")
        .fetch_one(pool)
        .await?;
    let role = if user_count == 0 {
        Role::Admin
    } else {
        Role::Member
    };

    let password_hash = hash_password(&request.password)?;
    let verification_token = generate_token();

    let id = Uuid::new_v4();
    let now = Utc::now();
    let token_expires = now + Duration::hours(VERIFICATION_TOKEN_EXPIRY_HOURS);

    sqlx::query(
        r#"
        INSERT INTO users (id, name, email, password_hash, role, is_email_verified,
                           email_verification_token, email_verification_expires, created_at)
        VALUES (?, ?, ?, ?, ?, FALSE, ?, ?, ?)
        "#,
    )
    .bind(id.to_string())
    .bind(&request.name)
    .bind(&request.email)
    .bind(&password_hash)
    .bind(role.as_str())
    .bind(&verification_token)
    .bind(token_expires)
    .bind(now)
    .execute(pool)
    .await?;

    let user = User {
        id,
        name: request.name.clone(),
        email: request.email.clone(),
        role,
        is_email_verified: false,
        created_at: now,
    };

    Ok((user, verification_token))
}

pub async fn login_user(pool: &SqlitePool, request: &LoginRequest) -> Result<User, AuthError> {
    let user: UserRow = sqlx::query_as("SELECT * FROM users WHERE LOWER(email) = LOWER(?)")
        .bind(&request.email)
        .fetch_optional(pool)
        .await?
        .ok_or(AuthError::InvalidCredentials)?;

    if !verify_password(&request.password, &user.password_hash) {
        return Err(AuthError::InvalidCredentials);
    }

    Ok(user.to_shared())
}

/// Mark a user's email as verified if the token matches and has not expired.
pub async fn verify_email(pool: &SqlitePool, token: &str) -> Result<User, AuthError> {
    let user: UserRow = sqlx::query_as("SELECT * FROM users WHERE email_verification_token = ?")
        .bind(token)
        .fetch_optional(pool)
        .await?
        .ok_or(AuthError::TokenNotFound)?;

    if let Some(expires) = user.email_verification_expires {
        if Utc::now() > expires {
            return Err(AuthError::TokenExpired);
        }
    }

    sqlx::query(
        r#"
        UPDATE users
        SET is_email_verified = TRUE,
            email_verification_token = NULL,
            email_verification_expires = NULL
        WHERE id = ?
        "#,
    )
    .bind(&user.id)
    .execute(pool)
    .await?;

    let mut verified = user.to_shared();
    verified.is_email_verified = true;
    Ok(verified)
}

/// Issue a password reset token for the given email. Returns `None` when no
/// user matches so callers can report success either way and avoid leaking
/// which emails are registered.
pub async fn request_password_reset(
    pool: &SqlitePool,
    email: &str,
) -> Result<Option<(User, String)>, AuthError> {
    let user: Option<UserRow> = sqlx::query_as("SELECT * FROM users WHERE LOWER(email) = LOWER(?)")
        .bind(email)
        .fetch_optional(pool)
        .await?;

    let Some(user) = user else {
        return Ok(None);
    };

    let token = generate_token();
    let expires = Utc::now() + Duration::hours(RESET_TOKEN_EXPIRY_HOURS);

    sqlx::query("UPDATE users SET password_reset_token = ?, password_reset_expires = ? WHERE id = ?")
        .bind(&token)
        .bind(expires)
        .bind(&user.id)
        .execute(pool)
        .await?;

    Ok(Some((user.to_shared(), token)))
}

pub async fn reset_password(
    pool: &SqlitePool,
    token: &str,
    new_password: &str,
) -> Result<User, AuthError> {
    let user: UserRow = sqlx::query_as("SELECT * FROM users WHERE password_reset_token = ?")
        .bind(token)
        .fetch_optional(pool)
        .await?
        .ok_or(AuthError::TokenNotFound)?;

    if let Some(expires) = user.password_reset_expires {
        if Utc::now() > expires {
            return Err(AuthError::TokenExpired);
        }
    }

    let password_hash = hash_password(new_password)?;

    sqlx::query(
        r#"
        UPDATE users
        SET password_hash = ?,
            password_reset_token = NULL,
            password_reset_expires = NULL
        WHERE id = ?
        "#,
    )
    .bind(&password_hash)
    .bind(&user.id)
    .execute(pool)
    .await?;

    Ok(user.to_shared())
}

pub async fn get_user_by_id(pool: &SqlitePool, user_id: &Uuid) -> Result<Option<User>, AuthError> {
    let user: Option<UserRow> = sqlx::query_as("SELECT * FROM users WHERE id = ?")
        .bind(user_id.to_string())
        .fetch_optional(pool)
        .await?;

    Ok(user.map(|u| u.to_shared()))
}

pub fn create_jwt(user_id: &Uuid, secret: &str, expiration_hours: i64) -> Result<String, AuthError> {
    let now = Utc::now();
    let exp = now + Duration::hours(expiration_hours);

    let claims = Claims {
        sub: user_id.to_string(),
        exp: exp.timestamp(),
        iat: now.timestamp(),
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?;

    Ok(token)
}

pub fn verify_jwt(token: &str, secret: &str) -> Result<Uuid, AuthError> {
    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )?;

    Uuid::parse_str(&token_data.claims.sub).map_err(|_| AuthError::InvalidCredentials)
}
