use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Database model for household invitations
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct InvitationRow {
    pub id: String,
    pub household_id: String,
    pub email: String,
    pub code: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub responded_at: Option<DateTime<Utc>>,
}

impl InvitationRow {
    pub fn to_shared(&self) -> shared::Invitation {
        shared::Invitation {
            id: Uuid::parse_str(&self.id).unwrap(),
            household_id: Uuid::parse_str(&self.household_id).unwrap(),
            email: self.email.clone(),
            code: self.code.clone(),
            status: self
                .status
                .parse()
                .unwrap_or(shared::InvitationStatus::Pending),
            created_at: self.created_at,
            expires_at: self.expires_at,
            responded_at: self.responded_at,
        }
    }
}
