//! Endpoints for unauthenticated callers, such as embedded lead forms.

use axum::{
    extract::{Path, State},
    Json,
};
use serde::Serialize;
use utoipa::ToSchema;

use crate::api::error::ApiError;
use crate::api::routes::AppState;
use crate::domain::TenantId;

/// Public view of a tenant. Settings stay private.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PublicTenantResponse {
    pub id: TenantId,
    pub slug: String,
    pub name: String,
}

#[utoipa::path(
    get,
    path = "/public/forms/{slug}/tenant",
    params(("slug" = String, Path, description = "Tenant slug or id")),
    responses(
        (status = 200, description = "Tenant owning the form", body = PublicTenantResponse),
        (status = 404, description = "Unknown or inactive tenant", body = crate::api::error::ErrorBody)
    ),
    tag = "public"
)]
pub async fn public_form_tenant_handler(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> Result<Json<PublicTenantResponse>, ApiError> {
    let tenant = state.pipeline.tenants.resolve_public(Some(&slug)).await?;
    Ok(Json(PublicTenantResponse { id: tenant.id, slug: tenant.slug, name: tenant.name }))
}
