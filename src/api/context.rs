//! Request-scoped peer metadata and caller identity.
//!
//! The outermost middleware stamps [`ClientInfo`] onto every request.
//! After bearer validation the auth middleware adds a [`CallerIdentity`].
//! Both travel as typed request extensions, never as globals.

use axum::{
    extract::{ConnectInfo, Request},
    middleware::Next,
    response::Response,
};
use std::net::SocketAddr;

use super::ApiError;
use crate::security::{CallerIdentity, ClientInfo, Role};

/// Header names checked for the peer's user agent, in order.
const USER_AGENT_HEADERS: [&str; 3] = ["user-agent", "grpc-user-agent", "x-user-agent"];

/// Outermost layer: stamp peer address and user agent onto the request.
pub async fn extract_client_info(mut request: Request, next: Next) -> Response {
    let ip_address = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|info| info.0.ip().to_string());

    let user_agent = USER_AGENT_HEADERS.iter().find_map(|header| {
        request
            .headers()
            .get(*header)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string)
    });

    request.extensions_mut().insert(ClientInfo {
        ip_address,
        user_agent,
    });

    next.run(request).await
}

/// Admin gate used by the security administration routes.
pub async fn require_admin(request: Request, next: Next) -> Result<Response, ApiError> {
    require_role(&[Role::Admin], request, next).await
}

/// Reject callers whose role is absent or outside the allowed set.
pub async fn require_role(
    roles: &[Role],
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let caller = request
        .extensions()
        .get::<CallerIdentity>()
        .ok_or_else(|| ApiError::unauthenticated("user not authenticated"))?;

    if !roles.contains(&caller.role) {
        return Err(ApiError::PermissionDenied(
            "insufficient permissions".to_string(),
        ));
    }

    Ok(next.run(request).await)
}
