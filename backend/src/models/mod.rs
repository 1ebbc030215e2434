use std::sync::Arc;

use sqlx::SqlitePool;

use crate::config::Config;
use crate::middleware::RateLimiter;
use crate::services::email::Mailer;
use crate::services::nutrition::NutritionEstimator;

pub mod food_log;
pub mod household;
pub mod invitation;
pub mod membership;
pub mod user;

pub use food_log::*;
pub use household::*;
pub use invitation::*;
pub use membership::*;
pub use user::*;

/// Application state shared across all handlers
pub struct AppState {
    pub db: SqlitePool,
    pub config: Config,
    pub mailer: Mailer,
    pub estimator: NutritionEstimator,
    pub login_rate_limiter: Arc<RateLimiter>,
}
