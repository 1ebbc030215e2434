use std::env;

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    pub jwt_secret: String,
    pub jwt_expiration_hours: i64,
    /// Base URL used in verification, reset, and invitation links.
    pub base_url: String,
    /// Resend API key; when unset, emails are skipped with a log line.
    pub resend_api_key: Option<String>,
    pub sender_email: String,
    /// Which AI backend estimates nutrition: "openai", "anthropic", or "none".
    pub preferred_ai: String,
    pub openai_api_key: Option<String>,
    pub anthropic_api_key: Option<String>,
    /// When true, inviting an email that already belongs to a user with any
    /// household membership fails with a conflict.
    pub invite_blocks_placed_users: bool,
}

impl Config {
    pub fn from_env() -> Result<Self, env::VarError> {
        Ok(Self {
            host: env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string()),
            port: env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .expect("PORT must be a number"),
            database_url: env::var("DATABASE_URL")
                .unwrap_or_else(|_| "sqlite:food_log.db?mode=rwc".to_string()),
            jwt_secret: env::var("JWT_SECRET")
                .unwrap_or_else(|_| "development-secret-key-change-in-production".to_string()),
            jwt_expiration_hours: env::var("JWT_EXPIRATION_HOURS")
                .unwrap_or_else(|_| "24".to_string())
                .parse()
                .expect("JWT_EXPIRATION_HOURS must be a number"),
            base_url: env::var("BASE_URL").unwrap_or_else(|_| "http://localhost:8080".to_string()),
            resend_api_key: env::var("RESEND_API_KEY").ok(),
            sender_email: env::var("SENDER_EMAIL")
                .unwrap_or_else(|_| "noreply@yourdomain.com".to_string()),
            preferred_ai: env::var("PREFERRED_AI").unwrap_or_else(|_| "none".to_string()),
            openai_api_key: env::var("OPENAI_API_KEY").ok(),
            anthropic_api_key: env::var("ANTHROPIC_API_KEY").ok(),
            invite_blocks_placed_users: env::var("INVITE_BLOCKS_PLACED_USERS")
                .map(|v| v != "false" && v != "0")
                .unwrap_or(true),
        })
    }

    pub fn verification_link(&self, token: &str) -> String {
        format!("{}/verify-email/{}", self.base_url, token)
    }

    pub fn password_reset_link(&self, token: &str) -> String {
        format!("{}/reset-password/{}", self.base_url, token)
    }

    pub fn invitation_link(&self, code: &str) -> String {
        format!("{}/accept-invite/{}", self.base_url, code)
    }
}
