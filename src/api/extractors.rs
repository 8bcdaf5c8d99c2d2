//! Request extractors for client metadata and the per-request identity context.

use std::net::SocketAddr;

use axum::{
    extract::{ConnectInfo, FromRequestParts},
    http::{header::USER_AGENT, request::Parts, Extensions, HeaderMap},
};

use crate::api::error::ApiError;
use crate::auth::models::{AuthContext, RequestContext};
use crate::errors::Error;
use crate::services::audit::ClientInfo;

const FORWARDED_FOR: &str = "x-forwarded-for";
const MAX_USER_AGENT_LEN: usize = 512;

/// Client address and user agent for audit records and rate limiting.
///
/// The socket peer address wins; `X-Forwarded-For` is consulted only when the
/// server was not started with connect info.
pub fn client_info(headers: &HeaderMap, extensions: &Extensions) -> ClientInfo {
    let ip_address = extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .or_else(|| {
            headers
                .get(FORWARDED_FOR)
                .and_then(|value| value.to_str().ok())
                .and_then(|value| value.split(',').next())
                .map(str::trim)
                .filter(|value| !value.is_empty())
                .map(str::to_string)
        });

    let user_agent = headers
        .get(USER_AGENT)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.chars().take(MAX_USER_AGENT_LEN).collect());

    ClientInfo { ip_address, user_agent }
}

/// Extracts [`ClientInfo`] from the request.
#[derive(Debug, Clone)]
pub struct Client(pub ClientInfo);

impl<S> FromRequestParts<S> for Client
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Client(client_info(&parts.headers, &parts.extensions)))
    }
}

impl<S> FromRequestParts<S> for AuthContext
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        if let Some(ctx) = parts.extensions.get::<AuthContext>() {
            return Ok(ctx.clone());
        }
        if let Some(ctx) = parts.extensions.get::<RequestContext>() {
            return Ok(ctx.auth.clone());
        }
        Err(Error::authentication_required().into())
    }
}

impl<S> FromRequestParts<S> for RequestContext
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<RequestContext>()
            .cloned()
            .ok_or_else(|| Error::internal("Tenant context missing on a tenant-scoped route").into())
    }
}
