use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Database model for households
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct HouseholdRow {
    pub id: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

impl HouseholdRow {
    pub fn to_shared(&self) -> shared::Household {
        shared::Household {
            id: Uuid::parse_str(&self.id).unwrap(),
            name: self.name.clone(),
            created_at: self.created_at,
        }
    }
}
