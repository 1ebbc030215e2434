use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Database model for food log entries. Nutrition columns are nullable:
/// NULL means the estimate was unavailable, not zero.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct FoodLogRow {
    pub id: String,
    pub household_id: String,
    pub user_id: String,
    pub food_name: String,
    pub portion_size: String,
    pub calories: Option<f64>,
    pub protein: Option<f64>,
    pub carbohydrates: Option<f64>,
    pub fiber: Option<f64>,
    pub fat: Option<f64>,
    pub sugar: Option<f64>,
    pub logged_at: DateTime<Utc>,
}

impl FoodLogRow {
    pub fn to_shared(&self) -> shared::FoodLog {
        shared::FoodLog {
            id: Uuid::parse_str(&self.id).unwrap(),
            household_id: Uuid::parse_str(&self.household_id).unwrap(),
            user_id: Uuid::parse_str(&self.user_id).unwrap(),
            food_name: self.food_name.clone(),
            portion_size: self.portion_size.clone(),
            nutrition: self.nutrition(),
            logged_at: self.logged_at,
        }
    }

    pub fn nutrition(&self) -> shared::NutritionFacts {
        shared::NutritionFacts {
            calories: self.calories,
            protein: self.protein,
            carbohydrates: self.carbohydrates,
            fiber: self.fiber,
            fat: self.fat,
            sugar: self.sugar,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_food_log_row_to_shared() {
        let now = Utc::now();
        let id = Uuid::new_v4();

        let row = FoodLogRow {
            id: id.to_string(),
            household_id: Uuid::new_v4().to_string(),
            user_id: Uuid::new_v4().to_string(),
            food_name: "apple".to_string(),
            portion_size: "1 medium".to_string(),
            calories: Some(95.0),
            protein: Some(0.5),
            carbohydrates: Some(25.0),
            fiber: Some(4.4),
            fat: None,
            sugar: Some(19.0),
            logged_at: now,
        };

        let shared = row.to_shared();

        assert_eq!(shared.id, id);
        assert_eq!(shared.food_name, "apple");
        assert_eq!(shared.nutrition.calories, Some(95.0));
        assert_eq!(shared.nutrition.fat, None);
    }

    #[test]
    fn test_food_log_row_all_nutrition_absent() {
        let row = FoodLogRow {
            id: Uuid::new_v4().to_string(),
            household_id: Uuid::new_v4().to_string(),
            user_id: Uuid::new_v4().to_string(),
            food_name: "mystery stew".to_string(),
            portion_size: "1 bowl".to_string(),
            calories: None,
            protein: None,
            carbohydrates: None,
            fiber: None,
            fat: None,
            sugar: None,
            logged_at: Utc::now(),
        };

        assert!(row.nutrition().is_unavailable());
    }
}
