//! Tenant user administration.

use axum::{
    extract::{Path, State},
    Json,
};
use chrono::Utc;
use serde_json::json;
use tracing::{info, warn};

use crate::api::error::ApiError;
use crate::api::extractors::Client;
use crate::api::routes::AppState;
use crate::auth::{
    models::{RequestContext, Role, User, UserProfile},
    permissions::require_permission,
    validation::UpdateRoleRequest,
};
use crate::domain::UserId;
use crate::errors::{AccessErrorType, Error};
use crate::services::audit::{actions, AuditEvent};

/// Load a user of the request tenant. Users of other tenants are reported as missing.
async fn tenant_member(
    state: &AppState,
    context: &RequestContext,
    id: &UserId,
) -> Result<User, ApiError> {
    state
        .repos
        .users
        .find_by_id(id)
        .await?
        .filter(|user| user.tenant_id == Some(context.tenant_id()))
        .ok_or_else(|| Error::not_found("user", id.to_string()).into())
}

/// Only owners may touch owners, and nobody administers themselves here.
fn check_target(context: &RequestContext, target: &User) -> Result<(), ApiError> {
    if target.id == context.auth.user_id() {
        return Err(Error::validation("Use the account endpoints to manage your own user").into());
    }
    if target.role == Role::Owner && context.auth.role() != Role::Owner {
        return Err(Error::forbidden(
            "Only an owner can modify another owner",
            AccessErrorType::InsufficientPermission,
        )
        .into());
    }
    Ok(())
}

#[utoipa::path(
    get,
    path = "/api/v1/users",
    responses(
        (status = 200, description = "Users of the tenant", body = [UserProfile]),
        (status = 403, description = "Missing users:read permission", body = crate::api::error::ErrorBody)
    ),
    security(("cookieAuth" = [])),
    tag = "users"
)]
pub async fn list_users_handler(
    State(state): State<AppState>,
    context: RequestContext,
) -> Result<Json<Vec<UserProfile>>, ApiError> {
    require_permission(&context.auth.permissions, "users:read").into_result()?;

    let users = state.repos.users.list_by_tenant(&context.scope()).await?;
    Ok(Json(users.iter().map(User::profile).collect()))
}

/// Change a user's role. Outstanding tokens of that user stop working.
#[utoipa::path(
    patch,
    path = "/api/v1/users/{id}/role",
    params(("id" = String, Path, description = "User id")),
    request_body = UpdateRoleRequest,
    responses(
        (status = 200, description = "Updated user", body = UserProfile),
        (status = 400, description = "Role cannot be assigned", body = crate::api::error::ErrorBody),
        (status = 403, description = "Not permitted", body = crate::api::error::ErrorBody),
        (status = 404, description = "User not found", body = crate::api::error::ErrorBody)
    ),
    security(("cookieAuth" = [])),
    tag = "users"
)]
pub async fn update_user_role_handler(
    State(state): State<AppState>,
    Client(client): Client,
    context: RequestContext,
    Path(id): Path<UserId>,
    Json(payload): Json<UpdateRoleRequest>,
) -> Result<Json<UserProfile>, ApiError> {
    require_permission(&context.auth.permissions, "users:manage").into_result()?;

    if payload.role.is_platform() {
        return Err(Error::validation_field("Platform roles cannot be assigned", "role").into());
    }
    if payload.role == Role::Owner && context.auth.role() != Role::Owner {
        warn!(user_id = %context.auth.user_id(), target = %id, "non-owner tried to grant owner");
        return Err(Error::forbidden(
            "Only an owner can grant the owner role",
            AccessErrorType::InsufficientPermission,
        )
        .into());
    }

    let target = tenant_member(&state, &context, &id).await?;
    check_target(&context, &target)?;
    let previous = target.role;

    let updated = state
        .repos
        .users
        .update_role(&context.scope(), &id, payload.role)
        .await?
        .ok_or_else(|| Error::not_found("user", id.to_string()))?;

    info!(user_id = %id, from = %previous, to = %updated.role, "user role changed");
    state.audit.log(
        AuditEvent::new(actions::USER_ROLE_CHANGED, "user")
            .tenant(Some(context.tenant_id()))
            .user(Some(context.auth.user_id()))
            .resource(id)
            .details(json!({ "from": previous.as_str(), "to": updated.role.as_str() }))
            .client(&client),
    );
    Ok(Json(updated.profile()))
}

/// Deactivate a user. The row is kept; every session of the user ends.
#[utoipa::path(
    post,
    path = "/api/v1/users/{id}/deactivate",
    params(("id" = String, Path, description = "User id")),
    responses(
        (status = 200, description = "Deactivated user", body = UserProfile),
        (status = 403, description = "Not permitted", body = crate::api::error::ErrorBody),
        (status = 404, description = "User not found", body = crate::api::error::ErrorBody)
    ),
    security(("cookieAuth" = [])),
    tag = "users"
)]
pub async fn deactivate_user_handler(
    State(state): State<AppState>,
    Client(client): Client,
    context: RequestContext,
    Path(id): Path<UserId>,
) -> Result<Json<UserProfile>, ApiError> {
    require_permission(&context.auth.permissions, "users:manage").into_result()?;

    let target = tenant_member(&state, &context, &id).await?;
    check_target(&context, &target)?;

    let updated = state
        .repos
        .users
        .deactivate(&context.scope(), &id)
        .await?
        .ok_or_else(|| Error::not_found("user", id.to_string()))?;
    let revoked = state.repos.refresh_tokens.revoke_all_for_user(&id, Utc::now()).await?;

    info!(user_id = %id, refresh_tokens_revoked = revoked, "user deactivated");
    state.audit.log(
        AuditEvent::new(actions::USER_DEACTIVATED, "user")
            .tenant(Some(context.tenant_id()))
            .user(Some(context.auth.user_id()))
            .resource(id)
            .client(&client),
    );
    Ok(Json(updated.profile()))
}
