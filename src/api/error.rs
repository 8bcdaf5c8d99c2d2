use axum::{
    extract::Request,
    http::{header::RETRY_AFTER, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use tracing::error;
use utoipa::ToSchema;

use crate::errors::{AccessErrorType, AuthErrorType, Error, TenantErrorType};

const INTERNAL_MESSAGE: &str = "Internal server error";

/// Unmasked description of an internal error, attached to the response as
/// an extension. Only [`expose_internal_errors`] puts it on the wire.
#[derive(Debug, Clone)]
pub struct InternalErrorDetail(pub String);

/// Error rendered as a JSON response.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    code: &'static str,
    message: String,
    field: Option<String>,
    retry_after: Option<u64>,
    detail: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorBody {
    pub error: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
}

impl ApiError {
    fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self { status, code, message: message.into(), field: None, retry_after: None, detail: None }
    }

    pub fn unauthorized<S: Into<String>>(msg: S) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "authentication_required", msg)
    }

    pub fn forbidden<S: Into<String>>(msg: S) -> Self {
        Self::new(StatusCode::FORBIDDEN, "forbidden", msg)
    }

    pub fn bad_request<S: Into<String>>(msg: S) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "bad_request", msg)
    }

    pub fn status_code(&self) -> StatusCode {
        self.status
    }

    pub fn code(&self) -> &'static str {
        self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// Map a domain error to its client-facing form. Internal errors always
    /// render the generic message; their description travels in `detail`.
    pub fn from_error(err: Error) -> Self {
        if !err.is_operational() {
            error!(error = ?err, "Internal error while handling request");
            return Self {
                detail: Some(err.to_string()),
                ..Self::new(StatusCode::INTERNAL_SERVER_ERROR, "internal_error", INTERNAL_MESSAGE)
            };
        }

        match err {
            Error::Validation { message, field } => Self {
                field,
                ..Self::new(StatusCode::BAD_REQUEST, "validation_failed", message)
            },
            Error::Serialization { context, .. } => Self::bad_request(context),
            Error::Auth { message, error_type } => match error_type {
                AuthErrorType::AuthenticationRequired => {
                    Self::new(StatusCode::UNAUTHORIZED, "authentication_required", message)
                }
                AuthErrorType::InvalidCredentials | AuthErrorType::AccountLocked => Self::new(
                    StatusCode::UNAUTHORIZED,
                    "invalid_credentials",
                    "Invalid email or password",
                ),
                AuthErrorType::TokenExpired | AuthErrorType::TokenInvalid => {
                    Self::new(StatusCode::UNAUTHORIZED, "token_invalid", "Invalid or expired token")
                }
                AuthErrorType::TokenRevoked => {
                    Self::new(StatusCode::UNAUTHORIZED, "token_revoked", "Token has been revoked")
                }
            },
            Error::Tenant { message, error_type } => match error_type {
                TenantErrorType::NotResolved => {
                    Self::new(StatusCode::BAD_REQUEST, "tenant_not_resolved", message)
                }
                TenantErrorType::NotFound => {
                    Self::new(StatusCode::NOT_FOUND, "tenant_not_found", message)
                }
            },
            Error::Forbidden { message, error_type } => {
                let code = match error_type {
                    AccessErrorType::TenantAccessDenied => "tenant_access_denied",
                    AccessErrorType::InsufficientPermission => "insufficient_permission",
                    AccessErrorType::OwnershipDenied => "ownership_denied",
                };
                Self::new(StatusCode::FORBIDDEN, code, message)
            }
            err @ Error::NotFound { .. } => {
                Self::new(StatusCode::NOT_FOUND, "not_found", err.to_string())
            }
            Error::Conflict { message, .. } => Self::new(StatusCode::CONFLICT, "conflict", message),
            Error::RateLimit { message, retry_after } => Self {
                retry_after,
                ..Self::new(StatusCode::TOO_MANY_REQUESTS, "rate_limited", message)
            },
            other => Self::new(StatusCode::INTERNAL_SERVER_ERROR, "internal_error", other.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let body = ErrorBody { error: self.code, message: self.message, field: self.field };
        let mut response = (self.status, Json(body)).into_response();
        if let Some(detail) = self.detail {
            response.extensions_mut().insert(InternalErrorDetail(detail));
        }
        if let Some(seconds) = self.retry_after {
            if let Ok(value) = HeaderValue::from_str(&seconds.to_string()) {
                response.headers_mut().insert(RETRY_AFTER, value);
            }
        }
        response
    }
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        Self::from_error(err)
    }
}

/// Replace the generic internal error body with the real description.
/// Layered only on routers built for non-production environments.
pub async fn expose_internal_errors(request: Request, next: Next) -> Response {
    let response = next.run(request).await;
    let Some(InternalErrorDetail(detail)) = response.extensions().get::<InternalErrorDetail>().cloned()
    else {
        return response;
    };

    let (parts, _) = response.into_parts();
    let body = ErrorBody { error: "internal_error", message: detail, field: None };
    (parts.status, Json(body)).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::routing::get;
    use axum::Router;
    use tower::ServiceExt;

    #[test]
    fn test_locked_and_wrong_password_render_identically() {
        let locked = ApiError::from_error(
            Error::auth("Account locked until 12:00", AuthErrorType::AccountLocked),
        );
        let wrong = ApiError::from_error(Error::invalid_credentials());
        assert_eq!(locked.status_code(), wrong.status_code());
        assert_eq!(locked.code(), wrong.code());
        assert_eq!(locked.message(), wrong.message());
    }

    #[test]
    fn test_expired_and_invalid_tokens_are_indistinguishable() {
        let expired = ApiError::from_error(Error::auth("exp", AuthErrorType::TokenExpired));
        let invalid = ApiError::from_error(Error::auth("sig", AuthErrorType::TokenInvalid));
        assert_eq!(expired.code(), invalid.code());
        assert_eq!(expired.message(), invalid.message());
        assert_eq!(expired.status_code(), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn test_internal_errors_are_masked() {
        for err in [Error::internal("pool exhausted"), Error::config("missing JWT secret")] {
            let masked = ApiError::from_error(err);
            assert_eq!(masked.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
            assert_eq!(masked.code(), "internal_error");
            assert_eq!(masked.message(), INTERNAL_MESSAGE);
        }
    }

    async fn failing_handler() -> Result<(), ApiError> {
        Err(Error::internal("pool exhausted").into())
    }

    async fn body_of(router: Router) -> (StatusCode, serde_json::Value) {
        let request = axum::http::Request::builder().uri("/").body(Body::empty()).unwrap();
        let response = router.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_exposure_is_per_router() {
        let masked = Router::new().route("/", get(failing_handler));
        let exposing = Router::new()
            .route("/", get(failing_handler))
            .layer(axum::middleware::from_fn(expose_internal_errors));

        // Building the exposing router must not leak into the other one
        let (status, exposed) = body_of(exposing).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(exposed["message"].as_str().unwrap().contains("pool exhausted"));

        let (status, hidden) = body_of(masked).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(hidden["error"], "internal_error");
        assert_eq!(hidden["message"], INTERNAL_MESSAGE);
    }

    #[tokio::test]
    async fn test_operational_errors_pass_through_exposure() {
        async fn conflict() -> Result<(), ApiError> {
            Err(Error::conflict("slug taken", "tenant").into())
        }
        let router =
            Router::new().route("/", get(conflict)).layer(axum::middleware::from_fn(expose_internal_errors));
        let (status, body) = body_of(router).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["message"], "slug taken");
    }

    #[test]
    fn test_validation_keeps_field() {
        let err = ApiError::from_error(Error::validation_field("too short", "password"));
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(err.field.as_deref(), Some("password"));
    }

    #[test]
    fn test_rate_limit_sets_retry_after() {
        let response =
            ApiError::from_error(Error::rate_limit("slow down", Some(30))).into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers().get(RETRY_AFTER).unwrap(), "30");
    }

    #[test]
    fn test_spoofing_maps_to_forbidden() {
        let err = ApiError::from_error(
            Error::forbidden("denied", AccessErrorType::TenantAccessDenied),
        );
        assert_eq!(err.status_code(), StatusCode::FORBIDDEN);
        assert_eq!(err.code(), "tenant_access_denied");
    }
}
