//! Tenant resolution for every tenant-scoped request.
//!
//! The identifier comes from the `X-Tenant-Id` header or, failing that, the
//! host subdomain under the configured base domain. It may be a tenant id or
//! a slug. For regular users their own tenant is authoritative and any
//! identifier naming a different tenant is rejected as spoofing.

use std::sync::Arc;

use axum::http::{header::HOST, HeaderMap};
use serde_json::json;
use tracing::{instrument, warn};

use crate::auth::models::{AuthContext, Tenant};
use crate::auth::session::TENANT_HEADER_NAME;
use crate::domain::TenantId;
use crate::errors::{AccessErrorType, Error, Result, TenantErrorType};
use crate::services::audit::{actions, AuditEvent, AuditLogger, ClientInfo};
use crate::storage::repository::TenantRepository;

#[derive(Clone)]
pub struct TenantResolver {
    tenants: Arc<dyn TenantRepository>,
    base_domain: Option<String>,
    audit: AuditLogger,
}

impl std::fmt::Debug for TenantResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TenantResolver").field("base_domain", &self.base_domain).finish()
    }
}

/// Leftmost label of `host` when it sits directly under `base_domain`.
pub fn subdomain_of(host: &str, base_domain: &str) -> Option<String> {
    let host = host.split(':').next().unwrap_or(host).trim_end_matches('.').to_ascii_lowercase();
    let base = base_domain.trim_matches('.').to_ascii_lowercase();
    let label = host.strip_suffix(&base)?.strip_suffix('.')?;
    if label.is_empty() || label.contains('.') || label == "www" {
        return None;
    }
    Some(label.to_string())
}

fn not_found(identifier: &str) -> Error {
    Error::tenant(format!("Tenant '{}' not found", identifier), TenantErrorType::NotFound)
}

impl TenantResolver {
    pub fn new(
        tenants: Arc<dyn TenantRepository>,
        base_domain: Option<String>,
        audit: AuditLogger,
    ) -> Self {
        Self { tenants, base_domain, audit }
    }

    /// Tenant identifier named by the request, header first.
    pub fn identifier_from_headers(&self, headers: &HeaderMap) -> Option<String> {
        let from_header = headers
            .get(TENANT_HEADER_NAME)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(str::to_string);
        if from_header.is_some() {
            return from_header;
        }

        let base = self.base_domain.as_deref()?;
        let host = headers.get(HOST)?.to_str().ok()?;
        subdomain_of(host, base)
    }

    /// Active tenant by id or slug.
    pub async fn lookup(&self, identifier: &str) -> Result<Option<Tenant>> {
        Ok(self.find_any(identifier).await?.filter(|t| t.is_active))
    }

    /// Like [`lookup`](Self::lookup) but also returns inactive tenants.
    async fn find_any(&self, identifier: &str) -> Result<Option<Tenant>> {
        match TenantId::parse(identifier) {
            Ok(id) => self.tenants.find_by_id(&id).await,
            Err(_) => self.tenants.find_by_slug(&identifier.to_ascii_lowercase()).await,
        }
    }

    /// Resolve the tenant for an authenticated caller.
    #[instrument(skip(self, auth, client), fields(user_id = %auth.user_id()), name = "tenant_resolve")]
    pub async fn resolve_for_user(
        &self,
        auth: &AuthContext,
        identifier: Option<&str>,
        client: &ClientInfo,
    ) -> Result<Tenant> {
        if auth.is_platform() {
            let identifier = identifier.ok_or_else(|| {
                Error::tenant(
                    "A tenant must be selected for platform users",
                    TenantErrorType::NotResolved,
                )
            })?;
            return self.lookup(identifier).await?.ok_or_else(|| not_found(identifier));
        }

        let own_id = auth.user.tenant_id.ok_or_else(|| {
            Error::internal(format!("User {} has no tenant and no platform role", auth.user_id()))
        })?;

        if let Some(identifier) = identifier {
            // Ownership is decided before activity, so naming the own
            // deactivated tenant is a 404 rather than a spoofing attempt.
            let requested = self.find_any(identifier).await?;
            if requested.as_ref().map(|t| t.id) != Some(own_id) {
                warn!(
                    user_id = %auth.user_id(),
                    tenant_id = %own_id,
                    requested = %identifier,
                    "tenant spoofing attempt rejected"
                );
                self.audit.log(
                    AuditEvent::new(actions::TENANT_SPOOF_ATTEMPT, "tenant")
                        .tenant(Some(own_id))
                        .user(Some(auth.user_id()))
                        .resource(identifier)
                        .details(json!({ "requested": identifier }))
                        .client(client),
                );
                return Err(Error::forbidden(
                    "Access to the requested tenant is denied",
                    AccessErrorType::TenantAccessDenied,
                ));
            }
            if let Some(tenant) = requested.filter(|t| t.is_active) {
                return Ok(tenant);
            }
        }

        self.tenants
            .find_by_id(&own_id)
            .await?
            .filter(|t| t.is_active)
            .ok_or_else(|| not_found(&own_id.to_string()))
    }

    /// Resolve the tenant for an unauthenticated caller. The identifier is mandatory.
    pub async fn resolve_public(&self, identifier: Option<&str>) -> Result<Tenant> {
        let identifier = identifier.ok_or_else(|| {
            Error::tenant("Tenant identifier is required", TenantErrorType::NotResolved)
        })?;
        self.lookup(identifier).await?.ok_or_else(|| not_found(identifier))
    }
}
