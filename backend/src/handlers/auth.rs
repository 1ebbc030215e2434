use actix_web::{web, HttpResponse, Result};
use shared::{
    ApiError, ApiSuccess, AuthResponse, CreateUserRequest, LoginRequest,
    RequestPasswordResetRequest, ResetPasswordRequest,
};

use crate::models::AppState;
use crate::services::auth as auth_service;

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/auth")
            .route("/register", web::post().to(register))
            .route("/login", web::post().to(login))
            .route("/me", web::get().to(get_current_user))
            .route("/verify-email/{token}", web::get().to(verify_email))
            .route(
                "/request-password-reset",
                web::post().to(request_password_reset),
            )
            .route("/reset-password", web::post().to(reset_password)),
    );
}

async fn register(
    state: web::Data<AppState>,
    body: web::Json<CreateUserRequest>,
) -> Result<HttpResponse> {
    let request = body.into_inner();

    // Validate input
    if request.name.is_empty() || request.email.is_empty() || request.password.is_empty() {
        return Ok(HttpResponse::BadRequest().json(ApiError {
            error: "validation_error".to_string(),
            message: "Name, email, and password are required".to_string(),
        }));
    }

    if !request.email.contains('@') {
        return Ok(HttpResponse::BadRequest().json(ApiError {
            error: "validation_error".to_string(),
            message: "Invalid email address".to_string(),
        }));
    }

    if request.password.len() < 8 {
        return Ok(HttpResponse::BadRequest().json(ApiError {
            error: "validation_error".to_string(),
            message: "Password must be at least 8 characters".to_string(),
        }));
    }

    match auth_service::register_user(&state.db, &request).await {
        Ok((user, verification_token)) => {
            state
                .mailer
                .send_verification_email(
                    &user.email,
                    &user.name,
                    &state.config.verification_link(&verification_token),
                )
                .await;

            match auth_service::create_jwt(
                &user.id,
                &state.config.jwt_secret,
                state.config.jwt_expiration_hours,
            ) {
                Ok(token) => {
                    Ok(HttpResponse::Created().json(ApiSuccess::new(AuthResponse { token, user })))
                }
                Err(e) => {
                    log::error!("JWT creation error: {:?}", e);
                    Ok(HttpResponse::InternalServerError().json(ApiError {
                        error: "jwt_error".to_string(),
                        message: "Failed to create token".to_string(),
                    }))
                }
            }
        }
        Err(auth_service::AuthError::UserAlreadyExists) => {
            Ok(HttpResponse::Conflict().json(ApiError {
                error: "email_taken".to_string(),
                message: "A user with this email already exists".to_string(),
            }))
        }
        Err(e) => {
            log::error!("Registration error: {:?}", e);
            Ok(HttpResponse::InternalServerError().json(ApiError {
                error: "internal_error".to_string(),
                message: "Failed to register".to_string(),
            }))
        }
    }
}

async fn login(state: web::Data<AppState>, body: web::Json<LoginRequest>) -> Result<HttpResponse> {
    let request = body.into_inner();
    let rate_key = request.email.to_lowercase();

    if !state.login_rate_limiter.check(&rate_key) {
        return Ok(HttpResponse::TooManyRequests().json(ApiError {
            error: "rate_limited".to_string(),
            message: "Too many login attempts, try again later".to_string(),
        }));
    }

    match auth_service::login_user(&state.db, &request).await {
        Ok(user) => {
            state.login_rate_limiter.clear(&rate_key);
            match auth_service::create_jwt(
                &user.id,
                &state.config.jwt_secret,
                state.config.jwt_expiration_hours,
            ) {
                Ok(token) => {
                    Ok(HttpResponse::Ok().json(ApiSuccess::new(AuthResponse { token, user })))
                }
                Err(e) => {
                    log::error!("JWT creation error: {:?}", e);
                    Ok(HttpResponse::InternalServerError().json(ApiError {
                        error: "jwt_error".to_string(),
                        message: "Failed to create token".to_string(),
                    }))
                }
            }
        }
        Err(auth_service::AuthError::InvalidCredentials) => {
            state.login_rate_limiter.record(&rate_key);
            Ok(HttpResponse::Unauthorized().json(ApiError {
                error: "authentication_error".to_string(),
                message: "Invalid email or password".to_string(),
            }))
        }
        Err(e) => {
            log::error!("Login error: {:?}", e);
            Ok(HttpResponse::InternalServerError().json(ApiError {
                error: "internal_error".to_string(),
                message: "Failed to log in".to_string(),
            }))
        }
    }
}

async fn get_current_user(
    state: web::Data<AppState>,
    req: actix_web::HttpRequest,
) -> Result<HttpResponse> {
    let user_id = match crate::middleware::auth::extract_user_id(&req, &state.config.jwt_secret) {
        Ok(id) => id,
        Err(_) => {
            return Ok(HttpResponse::Unauthorized().json(ApiError {
                error: "unauthorized".to_string(),
                message: "Invalid or missing token".to_string(),
            }));
        }
    };

    match auth_service::get_user_by_id(&state.db, &user_id).await {
        Ok(Some(user)) => Ok(HttpResponse::Ok().json(ApiSuccess::new(user))),
        Ok(None) => Ok(HttpResponse::NotFound().json(ApiError {
            error: "not_found".to_string(),
            message: "User not found".to_string(),
        })),
        Err(e) => {
            log::error!("Error fetching user: {:?}", e);
            Ok(HttpResponse::InternalServerError().json(ApiError {
                error: "internal_error".to_string(),
                message: "Failed to fetch user".to_string(),
            }))
        }
    }
}

async fn verify_email(state: web::Data<AppState>, path: web::Path<String>) -> Result<HttpResponse> {
    let token = path.into_inner();

    match auth_service::verify_email(&state.db, &token).await {
        Ok(user) => Ok(HttpResponse::Ok().json(ApiSuccess::new(user))),
        Err(auth_service::AuthError::TokenNotFound) => {
            Ok(HttpResponse::NotFound().json(ApiError {
                error: "not_found".to_string(),
                message: "Verification link is invalid".to_string(),
            }))
        }
        Err(auth_service::AuthError::TokenExpired) => {
            Ok(HttpResponse::BadRequest().json(ApiError {
                error: "expired".to_string(),
                message: "Verification link has expired".to_string(),
            }))
        }
        Err(e) => {
            log::error!("Email verification error: {:?}", e);
            Ok(HttpResponse::InternalServerError().json(ApiError {
                error: "internal_error".to_string(),
                message: "Failed to verify email".to_string(),
            }))
        }
    }
}

async fn request_password_reset(
    state: web::Data<AppState>,
    body: web::Json<RequestPasswordResetRequest>,
) -> Result<HttpResponse> {
    let request = body.into_inner();

    match auth_service::request_password_reset(&state.db, &request.email).await {
        Ok(Some((user, token))) => {
            state
                .mailer
                .send_password_reset_email(
                    &user.email,
                    &user.name,
                    &state.config.password_reset_link(&token),
                )
                .await;
        }
        Ok(None) => {
            log::info!("Password reset requested for unknown email");
        }
        Err(e) => {
            log::error!("Password reset request error: {:?}", e);
            return Ok(HttpResponse::InternalServerError().json(ApiError {
                error: "internal_error".to_string(),
                message: "Failed to request password reset".to_string(),
            }));
        }
    }

    // Same response either way so the endpoint doesn't leak which emails exist
    Ok(HttpResponse::Ok().json(ApiSuccess::new(
        "If that email is registered, a reset link is on its way".to_string(),
    )))
}

async fn reset_password(
    state: web::Data<AppState>,
    body: web::Json<ResetPasswordRequest>,
) -> Result<HttpResponse> {
    let request = body.into_inner();

    if request.password.len() < 8 {
        return Ok(HttpResponse::BadRequest().json(ApiError {
            error: "validation_error".to_string(),
            message: "Password must be at least 8 characters".to_string(),
        }));
    }

    match auth_service::reset_password(&state.db, &request.token, &request.password).await {
        Ok(user) => Ok(HttpResponse::Ok().json(ApiSuccess::new(user))),
        Err(auth_service::AuthError::TokenNotFound) => {
            Ok(HttpResponse::NotFound().json(ApiError {
                error: "not_found".to_string(),
                message: "Reset link is invalid".to_string(),
            }))
        }
        Err(auth_service::AuthError::TokenExpired) => {
            Ok(HttpResponse::BadRequest().json(ApiError {
                error: "expired".to_string(),
                message: "Reset link has expired".to_string(),
            }))
        }
        Err(e) => {
            log::error!("Password reset error: {:?}", e);
            Ok(HttpResponse::InternalServerError().json(ApiError {
                error: "internal_error".to_string(),
                message: "Failed to reset password".to_string(),
            }))
        }
    }
}
