use actix_web::web;

pub mod auth;
pub mod food_logs;
pub mod households;
pub mod invitations;

pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api")
            .configure(auth::configure)
            .configure(households::configure)
            .configure(invitations::configure)
            .configure(food_logs::configure),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::{http::StatusCode, test, App};
    use serde_json::{json, Value};
    use sqlx::sqlite::SqlitePoolOptions;
    use std::sync::Arc;

    use crate::config::Config;
    use crate::middleware::RateLimiter;
    use crate::models::AppState;
    use crate::services::{email::Mailer, nutrition::NutritionEstimator};

    async fn test_state() -> web::Data<AppState> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        sqlx::migrate!("./migrations").run(&pool).await.unwrap();

        let config = Config {
            host: "127.0.0.1".to_string(),
            port: 0,
            database_url: String::new(),
            jwt_secret: "test-secret".to_string(),
            jwt_expiration_hours: 24,
            base_url: "http://localhost".to_string(),
            resend_api_key: None,
            sender_email: "noreply@example.com".to_string(),
            preferred_ai: "none".to_string(),
            openai_api_key: None,
            anthropic_api_key: None,
            invite_blocks_placed_users: true,
        };

        web::Data::new(AppState {
            db: pool,
            mailer: Mailer::from_config(&config),
            estimator: NutritionEstimator::from_config(&config),
            login_rate_limiter: Arc::new(RateLimiter::new(5, 15 * 60)),
            config,
        })
    }

    fn bearer(token: &str) -> (&'static str, String) {
        ("Authorization", format!("Bearer {}", token))
    }

    fn register_request(name: &str, email: &str) -> test::TestRequest {
        test::TestRequest::post()
            .uri("/api/auth/register")
            .set_json(json!({"name": name, "email": email, "password": "longenough"}))
    }

    async fn verification_token(state: &AppState, email: &str) -> String {
        sqlx::query_scalar("SELECT email_verification_token FROM users WHERE email = ?")
            .bind(email)
            .fetch_one(&state.db)
            .await
            .unwrap()
    }

    #[actix_web::test]
    async fn test_register_invite_accept_and_log_flow() {
        let state = test_state().await;
        let app = test::init_service(
            App::new()
                .app_data(state.clone())
                .configure(configure_routes),
        )
        .await;

        // First registered user is the household admin
        let req = register_request("Ada", "ada@example.com").to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        let admin_token = body["data"]["token"].as_str().unwrap().to_string();
        let req = test::TestRequest::get()
            .uri(&format!(
                "/api/auth/verify-email/{}",
                verification_token(&state, "ada@example.com").await
            ))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::OK);

        let req = test::TestRequest::post()
            .uri("/api/households")
            .insert_header(bearer(&admin_token))
            .set_json(json!({"name": "Home"}))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        let household_id = body["data"]["id"].as_str().unwrap().to_string();

        // Invite b@example.com; the invitation stands even with email disabled
        let req = test::TestRequest::post()
            .uri(&format!("/api/households/{}/invite", household_id))
            .insert_header(bearer(&admin_token))
            .set_json(json!({"email": "b@example.com"}))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        let code = body["data"]["code"].as_str().unwrap().to_string();

        // The invitee registers, verifies, and accepts by code
        let req = register_request("Bea", "b@example.com").to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        let bea_token = body["data"]["token"].as_str().unwrap().to_string();
        let req = test::TestRequest::get()
            .uri(&format!(
                "/api/auth/verify-email/{}",
                verification_token(&state, "b@example.com").await
            ))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::OK);

        let req = test::TestRequest::post()
            .uri(&format!("/api/invitations/accept/{}", code))
            .insert_header(bearer(&bea_token))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["data"]["is_primary"], json!(true));

        // Bea logs a meal; the disabled estimator yields absent nutrition
        let req = test::TestRequest::post()
            .uri(&format!("/api/households/{}/logs", household_id))
            .insert_header(bearer(&bea_token))
            .set_json(json!({"food_name": "apple", "portion_size": "1 medium"}))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["data"]["nutrition"]["calories"], Value::Null);

        // Stats over today count the entry with absent treated as zero
        let today = chrono::Utc::now().date_naive();
        let req = test::TestRequest::get()
            .uri(&format!(
                "/api/households/{}/stats?start_date={}&end_date={}",
                household_id, today, today
            ))
            .insert_header(bearer(&admin_token))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["data"]["totals"]["entries"], json!(1));
        assert_eq!(body["data"]["totals"]["calories"], json!(0.0));
        assert_eq!(body["data"]["per_user"][0]["user"]["name"], json!("Bea"));
    }

    #[actix_web::test]
    async fn test_requests_without_token_are_unauthorized() {
        let state = test_state().await;
        let app = test::init_service(
            App::new()
                .app_data(state.clone())
                .configure(configure_routes),
        )
        .await;

        let req = test::TestRequest::get().uri("/api/households").to_request();
        let response = test::call_service(&app, req).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[actix_web::test]
    async fn test_unverified_user_cannot_create_household() {
        let state = test_state().await;
        let app = test::init_service(
            App::new()
                .app_data(state.clone())
                .configure(configure_routes),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/api/auth/register")
            .set_json(json!({"name": "Ada", "email": "ada@example.com", "password": "longenough"}))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        let token = body["data"]["token"].as_str().unwrap().to_string();

        let req = test::TestRequest::post()
            .uri("/api/households")
            .insert_header(bearer(&token))
            .set_json(json!({"name": "Home"}))
            .to_request();
        let response = test::call_service(&app, req).await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }
}
