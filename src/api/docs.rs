use axum::{routing::get, Json, Router};
use utoipa::{Modify, OpenApi};

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::api::handlers::health::health_handler,
        crate::api::handlers::auth::register_handler,
        crate::api::handlers::auth::login_handler,
        crate::api::handlers::auth::refresh_handler,
        crate::api::handlers::auth::logout_handler,
        crate::api::handlers::auth::me_handler,
        crate::api::handlers::auth::change_password_handler,
        crate::api::handlers::auth::revoke_all_sessions_handler,
        crate::api::handlers::auth::password_reset_request_handler,
        crate::api::handlers::auth::password_reset_confirm_handler,
        crate::api::handlers::tenant::get_tenant_handler,
        crate::api::handlers::users::list_users_handler,
        crate::api::handlers::users::update_user_role_handler,
        crate::api::handlers::users::deactivate_user_handler,
        crate::api::handlers::tasks::list_tasks_handler,
        crate::api::handlers::tasks::create_task_handler,
        crate::api::handlers::tasks::get_task_handler,
        crate::api::handlers::tasks::update_task_handler,
        crate::api::handlers::public::public_form_tenant_handler
    ),
    components(
        schemas(
            crate::api::error::ErrorBody,
            crate::api::handlers::health::HealthResponse,
            crate::api::handlers::auth::SessionResponse,
            crate::api::handlers::auth::CurrentUserResponse,
            crate::api::handlers::auth::SuccessResponse,
            crate::api::handlers::auth::MessageResponse,
            crate::api::handlers::auth::SessionsRevokedResponse,
            crate::api::handlers::public::PublicTenantResponse,
            crate::auth::validation::RegisterRequest,
            crate::auth::validation::LoginRequest,
            crate::auth::validation::ChangePasswordRequest,
            crate::auth::validation::PasswordResetRequest,
            crate::auth::validation::PasswordResetConfirmRequest,
            crate::auth::validation::UpdateRoleRequest,
            crate::auth::validation::CreateTaskRequest,
            crate::auth::validation::UpdateTaskRequest,
            crate::auth::models::Role,
            crate::auth::models::UserProfile,
            crate::auth::models::Tenant,
            crate::auth::models::TenantSettings,
            crate::auth::models::Task
        )
    ),
    tags(
        (name = "auth", description = "Registration, login and session management"),
        (name = "tenant", description = "The tenant resolved for the request"),
        (name = "users", description = "Tenant user administration"),
        (name = "tasks", description = "Tenant-scoped tasks with ownership checks"),
        (name = "public", description = "Unauthenticated tenant lookups"),
        (name = "health", description = "Liveness and readiness")
    ),
    modifiers(&SecurityAddon)
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        use utoipa::openapi::security::{ApiKey, ApiKeyValue, HttpAuthScheme, HttpBuilder, SecurityScheme};

        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "cookieAuth",
            SecurityScheme::ApiKey(ApiKey::Cookie(ApiKeyValue::new(
                crate::auth::session::ACCESS_TOKEN_COOKIE,
            ))),
        );
        components.add_security_scheme(
            "bearerAuth",
            SecurityScheme::Http(HttpBuilder::new().scheme(HttpAuthScheme::Bearer).build()),
        );
    }
}

/// Serves the OpenAPI document. Unauthenticated and outside the application state.
pub fn docs_router() -> Router {
    Router::new().route("/api-docs/openapi.json", get(|| async { Json(ApiDoc::openapi()) }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn openapi_includes_all_endpoints() {
        let openapi = ApiDoc::openapi();
        let paths = &openapi.paths.paths;

        for path in [
            "/health",
            "/auth/register",
            "/auth/login",
            "/auth/refresh",
            "/auth/logout",
            "/auth/me",
            "/auth/password/change",
            "/auth/sessions/revoke-all",
            "/auth/password-reset/request",
            "/auth/password-reset/confirm",
            "/api/v1/tenant",
            "/api/v1/users",
            "/api/v1/users/{id}/role",
            "/api/v1/users/{id}/deactivate",
            "/api/v1/tasks",
            "/api/v1/tasks/{id}",
            "/public/forms/{slug}/tenant",
        ] {
            assert!(paths.contains_key(path), "Missing {path}");
        }
    }

    #[test]
    fn openapi_includes_required_schemas() {
        let openapi = ApiDoc::openapi();
        let schemas = &openapi.components.as_ref().expect("components").schemas;

        for schema in ["ErrorBody", "SessionResponse", "LoginRequest", "RegisterRequest", "Task", "UserProfile"] {
            assert!(schemas.contains_key(schema), "Missing {schema} schema");
        }
    }

    #[test]
    fn openapi_documents_cookie_auth() {
        let openapi = ApiDoc::openapi();
        let components = openapi.components.expect("components");
        assert!(components.security_schemes.contains_key("cookieAuth"));
    }
}
