use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

// ============================================================================
// User Types
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Member,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Member => "member",
        }
    }

    pub fn is_admin(&self) -> bool {
        matches!(self, Role::Admin)
    }
}

impl FromStr for Role {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "admin" => Ok(Role::Admin),
            "member" => Ok(Role::Member),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub role: Role,
    pub is_email_verified: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateUserRequest {
    pub name: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthResponse {
    pub token: String,
    pub user: User,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestPasswordResetRequest {
    pub email: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResetPasswordRequest {
    pub token: String,
    pub password: String,
}

// ============================================================================
// Household Types
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Household {
    pub id: Uuid,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateHouseholdRequest {
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateHouseholdRequest {
    pub name: Option<String>,
}

// ============================================================================
// Membership Types
// ============================================================================

/// A user's membership in a household. Across all households, each user has
/// at most one membership flagged as primary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HouseholdMembership {
    pub household_id: Uuid,
    pub user_id: Uuid,
    pub is_primary: bool,
    pub joined_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemberWithUser {
    pub membership: HouseholdMembership,
    pub user: User,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddMemberRequest {
    pub user_id: Uuid,
}

// ============================================================================
// Invitation Types
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InvitationStatus {
    Pending,
    Accepted,
    Rejected,
}

impl InvitationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvitationStatus::Pending => "pending",
            InvitationStatus::Accepted => "accepted",
            InvitationStatus::Rejected => "rejected",
        }
    }
}

impl FromStr for InvitationStatus {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(InvitationStatus::Pending),
            "accepted" => Ok(InvitationStatus::Accepted),
            "rejected" => Ok(InvitationStatus::Rejected),
            _ => Err(()),
        }
    }
}

/// An offer, bound to an email address, to join a specific household.
///
/// Expiry is never a stored status: an invitation past `expires_at` still
/// reads `pending` from storage, and every consumer must call `is_expired`
/// before honoring it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Invitation {
    pub id: Uuid,
    pub household_id: Uuid,
    pub email: String,
    pub code: String,
    pub status: InvitationStatus,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub responded_at: Option<DateTime<Utc>>,
}

impl Invitation {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvitationWithHousehold {
    pub invitation: Invitation,
    pub household: Household,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InviteMemberRequest {
    pub email: String,
}

// ============================================================================
// Food Log Types
// ============================================================================

/// AI-estimated nutrition facts for one logged entry. Every field is
/// independently optional: `None` means the estimate was unavailable, which
/// is distinct from an estimated zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct NutritionFacts {
    pub calories: Option<f64>,
    pub protein: Option<f64>,
    pub carbohydrates: Option<f64>,
    pub fiber: Option<f64>,
    pub fat: Option<f64>,
    pub sugar: Option<f64>,
}

impl NutritionFacts {
    /// True when no field could be estimated.
    pub fn is_unavailable(&self) -> bool {
        self.calories.is_none()
            && self.protein.is_none()
            && self.carbohydrates.is_none()
            && self.fiber.is_none()
            && self.fat.is_none()
            && self.sugar.is_none()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FoodLog {
    pub id: Uuid,
    pub household_id: Uuid,
    pub user_id: Uuid,
    pub food_name: String,
    pub portion_size: String,
    pub nutrition: NutritionFacts,
    pub logged_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FoodLogWithUser {
    pub log: FoodLog,
    pub user: User,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateFoodLogRequest {
    pub food_name: String,
    pub portion_size: String,
    /// Log on behalf of another member (admins only).
    pub user_id: Option<Uuid>,
}

// ============================================================================
// Statistics Types
// ============================================================================

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct StatsRange {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

/// Summed nutrition over a set of entries. Absent estimates count as zero
/// in the sums; `entries` is the number of logs included.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct NutritionTotals {
    pub calories: f64,
    pub protein: f64,
    pub carbohydrates: f64,
    pub fiber: f64,
    pub fat: f64,
    pub sugar: f64,
    pub entries: i64,
}

impl NutritionTotals {
    pub fn add(&mut self, facts: &NutritionFacts) {
        self.calories += facts.calories.unwrap_or(0.0);
        self.protein += facts.protein.unwrap_or(0.0);
        self.carbohydrates += facts.carbohydrates.unwrap_or(0.0);
        self.fiber += facts.fiber.unwrap_or(0.0);
        self.fat += facts.fat.unwrap_or(0.0);
        self.sugar += facts.sugar.unwrap_or(0.0);
        self.entries += 1;
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserNutritionSummary {
    pub user: User,
    pub totals: NutritionTotals,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NutritionReport {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub totals: NutritionTotals,
    /// Per-user summaries, ordered by descending total calories.
    pub per_user: Vec<UserNutritionSummary>,
}

// ============================================================================
// API Response Types
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiError {
    pub error: String,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiSuccess<T> {
    pub data: T,
}

impl<T> ApiSuccess<T> {
    pub fn new(data: T) -> Self {
        Self { data }
    }
}

// ============================================================================
// Tests
// ============================================================================
