//! One structured record per call, emitted after the handler finishes.

use axum::{extract::Request, middleware::Next, response::Response};
use std::time::Instant;

use crate::security::{CallerIdentity, ClientInfo};

/// Innermost middleware: by the time it runs, the context and auth layers
/// have already stamped their extensions, so the record carries the caller
/// when there is one.
pub async fn track_requests(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let client = request.extensions().get::<ClientInfo>().cloned();
    let caller_id = request
        .extensions()
        .get::<CallerIdentity>()
        .map(|caller| caller.account_id.clone());

    let start = Instant::now();
    let response = next.run(request).await;
    let latency_ms = start.elapsed().as_millis();

    let status = response.status();
    let peer = client
        .as_ref()
        .and_then(|c| c.ip_address.as_deref())
        .unwrap_or("-");

    tracing::info!(
        %method,
        path = %path,
        status = status.as_u16(),
        latency_ms = latency_ms as u64,
        peer = %peer,
        caller = caller_id.as_deref().unwrap_or("-"),
        "request completed"
    );

    response
}
