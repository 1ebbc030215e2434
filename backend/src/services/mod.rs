pub mod auth;
pub mod email;
pub mod food_logs;
pub mod households;
pub mod invitations;
pub mod nutrition;
