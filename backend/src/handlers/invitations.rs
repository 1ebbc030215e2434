use actix_web::{web, HttpResponse, Result};
use shared::{ApiError, ApiSuccess};

use crate::handlers::households::authenticate;
use crate::models::AppState;
use crate::services::invitations as invitation_service;

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/invitations")
            .route("", web::get().to(list_user_invitations))
            .route("/accept/{code}", web::post().to(accept_by_code))
            .route("/{id}/accept", web::post().to(accept_invitation))
            .route("/{id}/decline", web::post().to(decline_invitation)),
    );
}

/// Get the current user's pending invitations
async fn list_user_invitations(
    state: web::Data<AppState>,
    req: actix_web::HttpRequest,
) -> Result<HttpResponse> {
    let user = match authenticate(&state, &req).await {
        Ok(user) => user,
        Err(response) => return Ok(response),
    };

    match invitation_service::list_user_invitations(&state.db, &user.email).await {
        Ok(invitations) => Ok(HttpResponse::Ok().json(ApiSuccess::new(invitations))),
        Err(e) => {
            log::error!("Error fetching invitations: {:?}", e);
            Ok(HttpResponse::InternalServerError().json(ApiError {
                error: "internal_error".to_string(),
                message: "Failed to fetch invitations".to_string(),
            }))
        }
    }
}

/// Accept an invitation using the code from the invitation email
async fn accept_by_code(
    state: web::Data<AppState>,
    req: actix_web::HttpRequest,
    path: web::Path<String>,
) -> Result<HttpResponse> {
    let user = match authenticate(&state, &req).await {
        Ok(user) => user,
        Err(response) => return Ok(response),
    };
    let code = path.into_inner();

    match invitation_service::resolve_by_code(&state.db, &code, &user).await {
        Ok(membership) => Ok(HttpResponse::Ok().json(ApiSuccess::new(membership))),
        Err(e) => Ok(invitation_error_response(e, "accept")),
    }
}

/// Accept an invitation by id
async fn accept_invitation(
    state: web::Data<AppState>,
    req: actix_web::HttpRequest,
    path: web::Path<String>,
) -> Result<HttpResponse> {
    let user = match authenticate(&state, &req).await {
        Ok(user) => user,
        Err(response) => return Ok(response),
    };

    let invitation_id = match uuid::Uuid::parse_str(&path.into_inner()) {
        Ok(id) => id,
        Err(_) => {
            return Ok(HttpResponse::BadRequest().json(ApiError {
                error: "invalid_id".to_string(),
                message: "Invalid invitation ID format".to_string(),
            }));
        }
    };

    match invitation_service::resolve_by_id(&state.db, &invitation_id, &user, true).await {
        Ok(membership) => Ok(HttpResponse::Ok().json(ApiSuccess::new(membership))),
        Err(e) => Ok(invitation_error_response(e, "accept")),
    }
}

/// Decline an invitation by id
async fn decline_invitation(
    state: web::Data<AppState>,
    req: actix_web::HttpRequest,
    path: web::Path<String>,
) -> Result<HttpResponse> {
    let user = match authenticate(&state, &req).await {
        Ok(user) => user,
        Err(response) => return Ok(response),
    };

    let invitation_id = match uuid::Uuid::parse_str(&path.into_inner()) {
        Ok(id) => id,
        Err(_) => {
            return Ok(HttpResponse::BadRequest().json(ApiError {
                error: "invalid_id".to_string(),
                message: "Invalid invitation ID format".to_string(),
            }));
        }
    };

    match invitation_service::resolve_by_id(&state.db, &invitation_id, &user, false).await {
        Ok(_) => Ok(HttpResponse::NoContent().finish()),
        Err(e) => Ok(invitation_error_response(e, "decline")),
    }
}

fn invitation_error_response(e: invitation_service::InvitationError, action: &str) -> HttpResponse {
    match e {
        invitation_service::InvitationError::NotFound => HttpResponse::NotFound().json(ApiError {
            error: "not_found".to_string(),
            message: "Invitation not found".to_string(),
        }),
        invitation_service::InvitationError::NotForUser => {
            HttpResponse::Forbidden().json(ApiError {
                error: "forbidden".to_string(),
                message: "This invitation is not for you".to_string(),
            })
        }
        invitation_service::InvitationError::Expired => HttpResponse::BadRequest().json(ApiError {
            error: "expired".to_string(),
            message: "This invitation has expired".to_string(),
        }),
        e => {
            log::error!("Error trying to {} invitation: {:?}", action, e);
            HttpResponse::InternalServerError().json(ApiError {
                error: "internal_error".to_string(),
                message: format!("Failed to {} invitation", action),
            })
        }
    }
}
