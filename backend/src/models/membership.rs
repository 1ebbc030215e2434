use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Database model for household memberships. The (user_id, household_id)
/// pair is the primary key.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct MembershipRow {
    pub user_id: String,
    pub household_id: String,
    pub is_primary: bool,
    pub joined_at: DateTime<Utc>,
}

impl MembershipRow {
    pub fn to_shared(&self) -> shared::HouseholdMembership {
        shared::HouseholdMembership {
            household_id: Uuid::parse_str(&self.household_id).unwrap(),
            user_id: Uuid::parse_str(&self.user_id).unwrap(),
            is_primary: self.is_primary,
            joined_at: self.joined_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_membership_row_to_shared() {
        let now = Utc::now();
        let household_id = Uuid::new_v4();
        let user_id = Uuid::new_v4();

        let row = MembershipRow {
            user_id: user_id.to_string(),
            household_id: household_id.to_string(),
            is_primary: true,
            joined_at: now,
        };

        let shared = row.to_shared();

        assert_eq!(shared.household_id, household_id);
        assert_eq!(shared.user_id, user_id);
        assert!(shared.is_primary);
    }
}
