use actix_web::{web, HttpResponse, Result};
use shared::{ApiError, ApiSuccess, CreateFoodLogRequest, StatsRange};
use uuid::Uuid;

use crate::handlers::households::{authenticate, require_verified};
use crate::models::AppState;
use crate::services::{
    food_logs as food_log_service, households as household_service,
};

/// Top-level routes: food logs are deleted independently of any household
/// scope.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(web::scope("/logs").route("/{id}", web::delete().to(delete_log)));
}

/// Routes nested under /households/{household_id}
pub fn configure_scoped(cfg: &mut web::ServiceConfig) {
    cfg.route("/logs", web::post().to(create_log))
        .route("/logs", web::get().to(list_logs))
        .route("/stats", web::get().to(get_stats));
}

/// Record a food entry. The nutrition estimate comes from the AI
/// collaborator; if it is unavailable the entry is still recorded with
/// absent nutrition fields.
async fn create_log(
    state: web::Data<AppState>,
    req: actix_web::HttpRequest,
    path: web::Path<String>,
    body: web::Json<CreateFoodLogRequest>,
) -> Result<HttpResponse> {
    let user = match authenticate(&state, &req).await {
        Ok(user) => user,
        Err(response) => return Ok(response),
    };
    if let Err(response) = require_verified(&user) {
        return Ok(response);
    }

    let household_id = match Uuid::parse_str(&path.into_inner()) {
        Ok(id) => id,
        Err(_) => {
            return Ok(HttpResponse::BadRequest().json(ApiError {
                error: "invalid_id".to_string(),
                message: "Invalid household ID format".to_string(),
            }));
        }
    };

    let request = body.into_inner();
    if request.food_name.trim().is_empty() || request.portion_size.trim().is_empty() {
        return Ok(HttpResponse::BadRequest().json(ApiError {
            error: "validation_error".to_string(),
            message: "Food name and portion size are required".to_string(),
        }));
    }

    // Admins may log on behalf of members they share a household with
    let target_user_id = request.user_id.unwrap_or(user.id);
    let allowed = household_service::can_act_on(&state.db, &user, &target_user_id, &household_id)
        .await
        .unwrap_or(false);
    if !allowed {
        return Ok(HttpResponse::Forbidden().json(ApiError {
            error: "forbidden".to_string(),
            message: "You cannot log food for this user in this household".to_string(),
        }));
    }

    let nutrition = state
        .estimator
        .estimate(request.food_name.trim(), request.portion_size.trim())
        .await;

    match food_log_service::record_entry(
        &state.db,
        &target_user_id,
        &household_id,
        request.food_name.trim(),
        request.portion_size.trim(),
        &nutrition,
    )
    .await
    {
        Ok(log) => Ok(HttpResponse::Created().json(ApiSuccess::new(log))),
        Err(food_log_service::FoodLogError::NotAMember) => {
            Ok(HttpResponse::Forbidden().json(ApiError {
                error: "forbidden".to_string(),
                message: "User is not a member of this household".to_string(),
            }))
        }
        Err(e) => {
            log::error!("Error recording food log: {:?}", e);
            Ok(HttpResponse::InternalServerError().json(ApiError {
                error: "internal_error".to_string(),
                message: "Failed to record food log".to_string(),
            }))
        }
    }
}

async fn list_logs(
    state: web::Data<AppState>,
    req: actix_web::HttpRequest,
    path: web::Path<String>,
) -> Result<HttpResponse> {
    let user = match authenticate(&state, &req).await {
        Ok(user) => user,
        Err(response) => return Ok(response),
    };

    let household_id = match Uuid::parse_str(&path.into_inner()) {
        Ok(id) => id,
        Err(_) => {
            return Ok(HttpResponse::BadRequest().json(ApiError {
                error: "invalid_id".to_string(),
                message: "Invalid household ID format".to_string(),
            }));
        }
    };

    if !household_service::is_member(&state.db, &household_id, &user.id)
        .await
        .unwrap_or(false)
    {
        return Ok(HttpResponse::Forbidden().json(ApiError {
            error: "forbidden".to_string(),
            message: "You are not a member of this household".to_string(),
        }));
    }

    match food_log_service::list_entries(&state.db, &household_id).await {
        Ok(logs) => Ok(HttpResponse::Ok().json(ApiSuccess::new(logs))),
        Err(e) => {
            log::error!("Error listing food logs: {:?}", e);
            Ok(HttpResponse::InternalServerError().json(ApiError {
                error: "internal_error".to_string(),
                message: "Failed to list food logs".to_string(),
            }))
        }
    }
}

async fn get_stats(
    state: web::Data<AppState>,
    req: actix_web::HttpRequest,
    path: web::Path<String>,
    query: web::Query<StatsRange>,
) -> Result<HttpResponse> {
    let user = match authenticate(&state, &req).await {
        Ok(user) => user,
        Err(response) => return Ok(response),
    };

    let household_id = match Uuid::parse_str(&path.into_inner()) {
        Ok(id) => id,
        Err(_) => {
            return Ok(HttpResponse::BadRequest().json(ApiError {
                error: "invalid_id".to_string(),
                message: "Invalid household ID format".to_string(),
            }));
        }
    };

    if !household_service::is_member(&state.db, &household_id, &user.id)
        .await
        .unwrap_or(false)
    {
        return Ok(HttpResponse::Forbidden().json(ApiError {
            error: "forbidden".to_string(),
            message: "You are not a member of this household".to_string(),
        }));
    }

    let range = query.into_inner();
    if range.start_date > range.end_date {
        return Ok(HttpResponse::BadRequest().json(ApiError {
            error: "validation_error".to_string(),
            message: "start_date must not be after end_date".to_string(),
        }));
    }

    match food_log_service::aggregate(&state.db, &[household_id], range.start_date, range.end_date)
        .await
    {
        Ok(report) => Ok(HttpResponse::Ok().json(ApiSuccess::new(report))),
        Err(e) => {
            log::error!("Error aggregating stats: {:?}", e);
            Ok(HttpResponse::InternalServerError().json(ApiError {
                error: "internal_error".to_string(),
                message: "Failed to aggregate stats".to_string(),
            }))
        }
    }
}

async fn delete_log(
    state: web::Data<AppState>,
    req: actix_web::HttpRequest,
    path: web::Path<String>,
) -> Result<HttpResponse> {
    let user = match authenticate(&state, &req).await {
        Ok(user) => user,
        Err(response) => return Ok(response),
    };

    let log_id = match Uuid::parse_str(&path.into_inner()) {
        Ok(id) => id,
        Err(_) => {
            return Ok(HttpResponse::BadRequest().json(ApiError {
                error: "invalid_id".to_string(),
                message: "Invalid food log ID format".to_string(),
            }));
        }
    };

    let log = match food_log_service::get_entry(&state.db, &log_id).await {
        Ok(Some(log)) => log,
        Ok(None) => {
            return Ok(HttpResponse::NotFound().json(ApiError {
                error: "not_found".to_string(),
                message: "Food log not found".to_string(),
            }));
        }
        Err(e) => {
            log::error!("Error fetching food log: {:?}", e);
            return Ok(HttpResponse::InternalServerError().json(ApiError {
                error: "internal_error".to_string(),
                message: "Failed to fetch food log".to_string(),
            }));
        }
    };

    let allowed = household_service::can_act_on(&state.db, &user, &log.user_id, &log.household_id)
        .await
        .unwrap_or(false);
    if !allowed {
        return Ok(HttpResponse::Forbidden().json(ApiError {
            error: "forbidden".to_string(),
            message: "You cannot delete this food log".to_string(),
        }));
    }

    match food_log_service::delete_entry(&state.db, &log_id).await {
        Ok(()) => Ok(HttpResponse::NoContent().finish()),
        Err(food_log_service::FoodLogError::NotFound) => {
            Ok(HttpResponse::NotFound().json(ApiError {
                error: "not_found".to_string(),
                message: "Food log not found".to_string(),
            }))
        }
        Err(e) => {
            log::error!("Error deleting food log: {:?}", e);
            Ok(HttpResponse::InternalServerError().json(ApiError {
                error: "internal_error".to_string(),
                message: "Failed to delete food log".to_string(),
            }))
        }
    }
}
