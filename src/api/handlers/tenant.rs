//! The resolved tenant and its module settings.

use axum::Json;

use crate::api::error::ApiError;
use crate::auth::models::{RequestContext, Tenant};

#[utoipa::path(
    get,
    path = "/api/v1/tenant",
    responses(
        (status = 200, description = "Tenant of the request", body = Tenant),
        (status = 403, description = "Tenant access denied", body = crate::api::error::ErrorBody),
        (status = 404, description = "Tenant not found", body = crate::api::error::ErrorBody)
    ),
    security(("cookieAuth" = [])),
    tag = "tenant"
)]
pub async fn get_tenant_handler(context: RequestContext) -> Result<Json<Tenant>, ApiError> {
    Ok(Json(context.tenant))
}
