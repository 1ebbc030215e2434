use actix_web::{web, HttpResponse, Result};
use shared::{
    AddMemberRequest, ApiError, ApiSuccess, CreateHouseholdRequest, InviteMemberRequest,
    StatsRange, UpdateHouseholdRequest, User,
};
use uuid::Uuid;

use crate::handlers::food_logs;
use crate::models::AppState;
use crate::services::{
    auth as auth_service, food_logs as food_log_service, households as household_service,
    invitations as invitation_service,
};

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/households")
            .route("", web::get().to(list_households))
            .route("", web::post().to(create_household))
            .route("/primary", web::get().to(get_primary_household))
            .route("/stats", web::get().to(get_overview_stats))
            .route("/{id}", web::get().to(get_household))
            .route("/{id}", web::put().to(update_household))
            .route("/{id}", web::delete().to(delete_household))
            .route("/{id}/members", web::get().to(list_members))
            .route("/{id}/members", web::post().to(add_member))
            .route("/{id}/members/{user_id}", web::delete().to(remove_member))
            .route("/{id}/primary", web::post().to(set_primary))
            .route("/{id}/invite", web::post().to(invite_member))
            .route("/{id}/invitations", web::get().to(list_household_invitations))
            .route("/{id}/invitations/{inv_id}", web::delete().to(cancel_invitation))
            .service(web::scope("/{household_id}").configure(food_logs::configure_scoped)),
    );
}

/// Resolve the bearer token to a full user, or produce the error response.
pub(crate) async fn authenticate(
    state: &AppState,
    req: &actix_web::HttpRequest,
) -> std::result::Result<User, HttpResponse> {
    let user_id = crate::middleware::auth::extract_user_id(req, &state.config.jwt_secret)
        .map_err(|_| {
            HttpResponse::Unauthorized().json(ApiError {
                error: "unauthorized".to_string(),
                message: "Invalid or missing token".to_string(),
            })
        })?;

    match auth_service::get_user_by_id(&state.db, &user_id).await {
        Ok(Some(user)) => Ok(user),
        Ok(None) => Err(HttpResponse::Unauthorized().json(ApiError {
            error: "unauthorized".to_string(),
            message: "Unknown user".to_string(),
        })),
        Err(e) => {
            log::error!("Error fetching user: {:?}", e);
            Err(HttpResponse::InternalServerError().json(ApiError {
                error: "internal_error".to_string(),
                message: "Failed to fetch user".to_string(),
            }))
        }
    }
}

/// Mutating household operations are reserved for verified accounts.
pub(crate) fn require_verified(user: &User) -> std::result::Result<(), HttpResponse> {
    if user.is_email_verified {
        Ok(())
    } else {
        Err(HttpResponse::Forbidden().json(ApiError {
            error: "email_not_verified".to_string(),
            message: "Verify your email address first".to_string(),
        }))
    }
}

fn parse_id(raw: &str) -> std::result::Result<Uuid, HttpResponse> {
    Uuid::parse_str(raw).map_err(|_| {
        HttpResponse::BadRequest().json(ApiError {
            error: "invalid_id".to_string(),
            message: "Invalid ID format".to_string(),
        })
    })
}

async fn list_households(
    state: web::Data<AppState>,
    req: actix_web::HttpRequest,
) -> Result<HttpResponse> {
    let user = match authenticate(&state, &req).await {
        Ok(user) => user,
        Err(response) => return Ok(response),
    };

    match household_service::list_user_households(&state.db, &user.id).await {
        Ok(households) => Ok(HttpResponse::Ok().json(ApiSuccess::new(households))),
        Err(e) => {
            log::error!("Error listing households: {:?}", e);
            Ok(HttpResponse::InternalServerError().json(ApiError {
                error: "internal_error".to_string(),
                message: "Failed to list households".to_string(),
            }))
        }
    }
}

async fn create_household(
    state: web::Data<AppState>,
    req: actix_web::HttpRequest,
    body: web::Json<CreateHouseholdRequest>,
) -> Result<HttpResponse> {
    let user = match authenticate(&state, &req).await {
        Ok(user) => user,
        Err(response) => return Ok(response),
    };
    if let Err(response) = require_verified(&user) {
        return Ok(response);
    }

    let request = body.into_inner();
    if request.name.trim().is_empty() {
        return Ok(HttpResponse::BadRequest().json(ApiError {
            error: "validation_error".to_string(),
            message: "Household name is required".to_string(),
        }));
    }

    match household_service::create_household(&state.db, &user.id, request.name.trim()).await {
        Ok(household) => Ok(HttpResponse::Created().json(ApiSuccess::new(household))),
        Err(household_service::HouseholdError::NameTaken) => {
            Ok(HttpResponse::Conflict().json(ApiError {
                error: "name_taken".to_string(),
                message: "A household with this name already exists".to_string(),
            }))
        }
        Err(e) => {
            log::error!("Error creating household: {:?}", e);
            Ok(HttpResponse::InternalServerError().json(ApiError {
                error: "internal_error".to_string(),
                message: "Failed to create household".to_string(),
            }))
        }
    }
}

async fn get_primary_household(
    state: web::Data<AppState>,
    req: actix_web::HttpRequest,
) -> Result<HttpResponse> {
    let user = match authenticate(&state, &req).await {
        Ok(user) => user,
        Err(response) => return Ok(response),
    };

    match household_service::get_primary_household(&state.db, &user.id).await {
        Ok(household) => Ok(HttpResponse::Ok().json(ApiSuccess::new(household))),
        Err(e) => {
            log::error!("Error fetching primary household: {:?}", e);
            Ok(HttpResponse::InternalServerError().json(ApiError {
                error: "internal_error".to_string(),
                message: "Failed to fetch primary household".to_string(),
            }))
        }
    }
}

/// Nutrition stats across every household the user belongs to.
async fn get_overview_stats(
    state: web::Data<AppState>,
    req: actix_web::HttpRequest,
    query: web::Query<StatsRange>,
) -> Result<HttpResponse> {
    let user = match authenticate(&state, &req).await {
        Ok(user) => user,
        Err(response) => return Ok(response),
    };

    let range = query.into_inner();
    if range.start_date > range.end_date {
        return Ok(HttpResponse::BadRequest().json(ApiError {
            error: "validation_error".to_string(),
            message: "start_date must not be after end_date".to_string(),
        }));
    }

    let households = match household_service::list_user_households(&state.db, &user.id).await {
        Ok(households) => households,
        Err(e) => {
            log::error!("Error listing households: {:?}", e);
            return Ok(HttpResponse::InternalServerError().json(ApiError {
                error: "internal_error".to_string(),
                message: "Failed to list households".to_string(),
            }));
        }
    };

    let ids: Vec<Uuid> = households.iter().map(|h| h.id).collect();
    match food_log_service::aggregate(&state.db, &ids, range.start_date, range.end_date).await {
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

async fn get_household(
    state: web::Data<AppState>,
    req: actix_web::HttpRequest,
    path: web::Path<String>,
) -> Result<HttpResponse> {
    let user = match authenticate(&state, &req).await {
        Ok(user) => user,
        Err(response) => return Ok(response),
    };
    let household_id = match parse_id(&path.into_inner()) {
        Ok(id) => id,
        Err(response) => return Ok(response),
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

    match household_service::get_household(&state.db, &household_id).await {
        Ok(Some(household)) => Ok(HttpResponse::Ok().json(ApiSuccess::new(household))),
        Ok(None) => Ok(HttpResponse::NotFound().json(ApiError {
            error: "not_found".to_string(),
            message: "Household not found".to_string(),
        })),
        Err(e) => {
            log::error!("Error fetching household: {:?}", e);
            Ok(HttpResponse::InternalServerError().json(ApiError {
                error: "internal_error".to_string(),
                message: "Failed to fetch household".to_string(),
            }))
        }
    }
}

/// True when the user is an admin with a membership in this household.
async fn is_household_admin(state: &AppState, household_id: &Uuid, user: &User) -> bool {
    user.role.is_admin()
        && household_service::is_member(&state.db, household_id, &user.id)
            .await
            .unwrap_or(false)
}

async fn update_household(
    state: web::Data<AppState>,
    req: actix_web::HttpRequest,
    path: web::Path<String>,
    body: web::Json<UpdateHouseholdRequest>,
) -> Result<HttpResponse> {
    let user = match authenticate(&state, &req).await {
        Ok(user) => user,
        Err(response) => return Ok(response),
    };
    let household_id = match parse_id(&path.into_inner()) {
        Ok(id) => id,
        Err(response) => return Ok(response),
    };

    if !is_household_admin(&state, &household_id, &user).await {
        return Ok(HttpResponse::Forbidden().json(ApiError {
            error: "forbidden".to_string(),
            message: "Only a household admin can do this".to_string(),
        }));
    }

    let Some(name) = body.into_inner().name else {
        return Ok(HttpResponse::BadRequest().json(ApiError {
            error: "validation_error".to_string(),
            message: "A new household name is required".to_string(),
        }));
    };

    match household_service::update_household(&state.db, &household_id, name.trim()).await {
        Ok(household) => Ok(HttpResponse::Ok().json(ApiSuccess::new(household))),
        Err(household_service::HouseholdError::NotFound) => {
            Ok(HttpResponse::NotFound().json(ApiError {
                error: "not_found".to_string(),
                message: "Household not found".to_string(),
            }))
        }
        Err(household_service::HouseholdError::NameTaken) => {
            Ok(HttpResponse::Conflict().json(ApiError {
                error: "name_taken".to_string(),
                message: "A household with this name already exists".to_string(),
            }))
        }
        Err(e) => {
            log::error!("Error updating household: {:?}", e);
            Ok(HttpResponse::InternalServerError().json(ApiError {
                error: "internal_error".to_string(),
                message: "Failed to update household".to_string(),
            }))
        }
    }
}

async fn delete_household(
    state: web::Data<AppState>,
    req: actix_web::HttpRequest,
    path: web::Path<String>,
) -> Result<HttpResponse> {
    let user = match authenticate(&state, &req).await {
        Ok(user) => user,
        Err(response) => return Ok(response),
    };
    let household_id = match parse_id(&path.into_inner()) {
        Ok(id) => id,
        Err(response) => return Ok(response),
    };

    if !is_household_admin(&state, &household_id, &user).await {
        return Ok(HttpResponse::Forbidden().json(ApiError {
            error: "forbidden".to_string(),
            message: "Only a household admin can do this".to_string(),
        }));
    }

    match household_service::delete_household(&state.db, &household_id).await {
        Ok(()) => Ok(HttpResponse::NoContent().finish()),
        Err(household_service::HouseholdError::NotFound) => {
            Ok(HttpResponse::NotFound().json(ApiError {
                error: "not_found".to_string(),
                message: "Household not found".to_string(),
            }))
        }
        Err(e) => {
            log::error!("Error deleting household: {:?}", e);
            Ok(HttpResponse::InternalServerError().json(ApiError {
                error: "internal_error".to_string(),
                message: "Failed to delete household".to_string(),
            }))
        }
    }
}

async fn list_members(
    state: web::Data<AppState>,
    req: actix_web::HttpRequest,
    path: web::Path<String>,
) -> Result<HttpResponse> {
    let user = match authenticate(&state, &req).await {
        Ok(user) => user,
        Err(response) => return Ok(response),
    };
    let household_id = match parse_id(&path.into_inner()) {
        Ok(id) => id,
        Err(response) => return Ok(response),
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

    match household_service::list_members(&state.db, &household_id).await {
        Ok(members) => Ok(HttpResponse::Ok().json(ApiSuccess::new(members))),
        Err(e) => {
            log::error!("Error listing members: {:?}", e);
            Ok(HttpResponse::InternalServerError().json(ApiError {
                error: "internal_error".to_string(),
                message: "Failed to list members".to_string(),
            }))
        }
    }
}

/// Directly enroll an existing user, skipping the invitation flow.
async fn add_member(
    state: web::Data<AppState>,
    req: actix_web::HttpRequest,
    path: web::Path<String>,
    body: web::Json<AddMemberRequest>,
) -> Result<HttpResponse> {
    let user = match authenticate(&state, &req).await {
        Ok(user) => user,
        Err(response) => return Ok(response),
    };
    if let Err(response) = require_verified(&user) {
        return Ok(response);
    }
    let household_id = match parse_id(&path.into_inner()) {
        Ok(id) => id,
        Err(response) => return Ok(response),
    };

    if !is_household_admin(&state, &household_id, &user).await {
        return Ok(HttpResponse::Forbidden().json(ApiError {
            error: "forbidden".to_string(),
            message: "Only a household admin can add members".to_string(),
        }));
    }

    let member_id = body.into_inner().user_id;
    match auth_service::get_user_by_id(&state.db, &member_id).await {
        Ok(Some(_)) => {}
        Ok(None) => {
            return Ok(HttpResponse::NotFound().json(ApiError {
                error: "not_found".to_string(),
                message: "User not found".to_string(),
            }));
        }
        Err(e) => {
            log::error!("Error fetching user: {:?}", e);
            return Ok(HttpResponse::InternalServerError().json(ApiError {
                error: "internal_error".to_string(),
                message: "Failed to fetch user".to_string(),
            }));
        }
    }

    match household_service::add_member(&state.db, &household_id, &member_id).await {
        Ok(membership) => Ok(HttpResponse::Created().json(ApiSuccess::new(membership))),
        Err(household_service::HouseholdError::AlreadyMember) => {
            Ok(HttpResponse::Conflict().json(ApiError {
                error: "already_member".to_string(),
                message: "User is already a member of this household".to_string(),
            }))
        }
        Err(e) => {
            log::error!("Error adding member: {:?}", e);
            Ok(HttpResponse::InternalServerError().json(ApiError {
                error: "internal_error".to_string(),
                message: "Failed to add member".to_string(),
            }))
        }
    }
}

async fn remove_member(
    state: web::Data<AppState>,
    req: actix_web::HttpRequest,
    path: web::Path<(String, String)>,
) -> Result<HttpResponse> {
    let user = match authenticate(&state, &req).await {
        Ok(user) => user,
        Err(response) => return Ok(response),
    };
    let (household_raw, member_raw) = path.into_inner();
    let household_id = match parse_id(&household_raw) {
        Ok(id) => id,
        Err(response) => return Ok(response),
    };
    let member_id = match parse_id(&member_raw) {
        Ok(id) => id,
        Err(response) => return Ok(response),
    };

    let allowed = household_service::can_act_on(&state.db, &user, &member_id, &household_id)
        .await
        .unwrap_or(false);
    if !allowed {
        return Ok(HttpResponse::Forbidden().json(ApiError {
            error: "forbidden".to_string(),
            message: "You cannot remove this member".to_string(),
        }));
    }

    match household_service::remove_member(&state.db, &household_id, &member_id).await {
        Ok(()) => Ok(HttpResponse::NoContent().finish()),
        Err(household_service::HouseholdError::NotAMember) => {
            Ok(HttpResponse::NotFound().json(ApiError {
                error: "not_found".to_string(),
                message: "Membership not found".to_string(),
            }))
        }
        Err(household_service::HouseholdError::LastAdmin) => {
            Ok(HttpResponse::BadRequest().json(ApiError {
                error: "last_admin".to_string(),
                message: "The household would be left without an admin".to_string(),
            }))
        }
        Err(e) => {
            log::error!("Error removing member: {:?}", e);
            Ok(HttpResponse::InternalServerError().json(ApiError {
                error: "internal_error".to_string(),
                message: "Failed to remove member".to_string(),
            }))
        }
    }
}

async fn set_primary(
    state: web::Data<AppState>,
    req: actix_web::HttpRequest,
    path: web::Path<String>,
) -> Result<HttpResponse> {
    let user = match authenticate(&state, &req).await {
        Ok(user) => user,
        Err(response) => return Ok(response),
    };
    let household_id = match parse_id(&path.into_inner()) {
        Ok(id) => id,
        Err(response) => return Ok(response),
    };

    match household_service::set_primary(&state.db, &household_id, &user.id).await {
        Ok(membership) => Ok(HttpResponse::Ok().json(ApiSuccess::new(membership))),
        Err(household_service::HouseholdError::NotAMember) => {
            Ok(HttpResponse::Forbidden().json(ApiError {
                error: "forbidden".to_string(),
                message: "You are not a member of this household".to_string(),
            }))
        }
        Err(e) => {
            log::error!("Error setting primary household: {:?}", e);
            Ok(HttpResponse::InternalServerError().json(ApiError {
                error: "internal_error".to_string(),
                message: "Failed to set primary household".to_string(),
            }))
        }
    }
}

async fn invite_member(
    state: web::Data<AppState>,
    req: actix_web::HttpRequest,
    path: web::Path<String>,
    body: web::Json<InviteMemberRequest>,
) -> Result<HttpResponse> {
    let user = match authenticate(&state, &req).await {
        Ok(user) => user,
        Err(response) => return Ok(response),
    };
    if let Err(response) = require_verified(&user) {
        return Ok(response);
    }
    let household_id = match parse_id(&path.into_inner()) {
        Ok(id) => id,
        Err(response) => return Ok(response),
    };

    if !is_household_admin(&state, &household_id, &user).await {
        return Ok(HttpResponse::Forbidden().json(ApiError {
            error: "forbidden".to_string(),
            message: "Only a household admin can invite members".to_string(),
        }));
    }

    let request = body.into_inner();
    if !request.email.contains('@') {
        return Ok(HttpResponse::BadRequest().json(ApiError {
            error: "validation_error".to_string(),
            message: "Invalid email address".to_string(),
        }));
    }

    let invitation = match invitation_service::invite(
        &state.db,
        &household_id,
        request.email.trim(),
        &user,
        state.config.invite_blocks_placed_users,
    )
    .await
    {
        Ok(invitation) => invitation,
        Err(invitation_service::InvitationError::SelfInvite) => {
            return Ok(HttpResponse::Forbidden().json(ApiError {
                error: "self_invite".to_string(),
                message: "You cannot invite yourself".to_string(),
            }));
        }
        Err(invitation_service::InvitationError::AlreadyPlaced) => {
            return Ok(HttpResponse::Conflict().json(ApiError {
                error: "already_placed".to_string(),
                message: "This user already belongs to a household".to_string(),
            }));
        }
        Err(invitation_service::InvitationError::HouseholdNotFound) => {
            return Ok(HttpResponse::NotFound().json(ApiError {
                error: "not_found".to_string(),
                message: "Household not found".to_string(),
            }));
        }
        Err(e) => {
            log::error!("Error creating invitation: {:?}", e);
            return Ok(HttpResponse::InternalServerError().json(ApiError {
                error: "internal_error".to_string(),
                message: "Failed to create invitation".to_string(),
            }));
        }
    };

    // The invitation stands whether or not the email goes out
    if let Ok(Some(household)) = household_service::get_household(&state.db, &household_id).await {
        state
            .mailer
            .send_invitation_email(
                &invitation.email,
                &user.name,
                &household.name,
                &state.config.invitation_link(&invitation.code),
            )
            .await;
    }

    Ok(HttpResponse::Created().json(ApiSuccess::new(invitation)))
}

async fn list_household_invitations(
    state: web::Data<AppState>,
    req: actix_web::HttpRequest,
    path: web::Path<String>,
) -> Result<HttpResponse> {
    let user = match authenticate(&state, &req).await {
        Ok(user) => user,
        Err(response) => return Ok(response),
    };
    let household_id = match parse_id(&path.into_inner()) {
        Ok(id) => id,
        Err(response) => return Ok(response),
    };

    if !is_household_admin(&state, &household_id, &user).await {
        return Ok(HttpResponse::Forbidden().json(ApiError {
            error: "forbidden".to_string(),
            message: "Only a household admin can list invitations".to_string(),
        }));
    }

    match invitation_service::list_household_invitations(&state.db, &household_id).await {
        Ok(invitations) => Ok(HttpResponse::Ok().json(ApiSuccess::new(invitations))),
        Err(e) => {
            log::error!("Error listing invitations: {:?}", e);
            Ok(HttpResponse::InternalServerError().json(ApiError {
                error: "internal_error".to_string(),
                message: "Failed to list invitations".to_string(),
            }))
        }
    }
}

async fn cancel_invitation(
    state: web::Data<AppState>,
    req: actix_web::HttpRequest,
    path: web::Path<(String, String)>,
) -> Result<HttpResponse> {
    let user = match authenticate(&state, &req).await {
        Ok(user) => user,
        Err(response) => return Ok(response),
    };
    let (household_raw, invitation_raw) = path.into_inner();
    let household_id = match parse_id(&household_raw) {
        Ok(id) => id,
        Err(response) => return Ok(response),
    };
    let invitation_id = match parse_id(&invitation_raw) {
        Ok(id) => id,
        Err(response) => return Ok(response),
    };

    if !is_household_admin(&state, &household_id, &user).await {
        return Ok(HttpResponse::Forbidden().json(ApiError {
            error: "forbidden".to_string(),
            message: "Only a household admin can cancel invitations".to_string(),
        }));
    }

    match invitation_service::cancel_invitation(&state.db, &invitation_id).await {
        Ok(()) => Ok(HttpResponse::NoContent().finish()),
        Err(invitation_service::InvitationError::NotFound) => {
            Ok(HttpResponse::NotFound().json(ApiError {
                error: "not_found".to_string(),
                message: "Invitation not found".to_string(),
            }))
        }
        Err(e) => {
            log::error!("Error cancelling invitation: {:?}", e);
            Ok(HttpResponse::InternalServerError().json(ApiError {
                error: "internal_error".to_string(),
                message: "Failed to cancel invitation".to_string(),
            }))
        }
    }
}
