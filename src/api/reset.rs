use axum::{
    Extension, Json,
    extract::{Query, State},
};
use serde::Deserialize;
use std::sync::Arc;

use super::types::MessageResponse;
use super::validation::{require_challenge_token, require_non_empty};
use super::{ApiError, ApiResponse, AppState};
use crate::security::{CallerIdentity, ClientInfo};
use crate::services::reset_service::{ResetStatus, ResetTokenInfo};

#[derive(Deserialize)]
pub struct RequestResetBody {
    pub email: String,
}

#[derive(Deserialize)]
pub struct VerifyResetQuery {
    pub token: String,
}

#[derive(Deserialize)]
pub struct ResetPasswordBody {
    pub token: String,
    pub new_password: String,
}

/// POST /auth/password-reset/request
///
/// Uniformly succeeds for unknown addresses; account existence is never
/// revealed through this endpoint.
pub async fn request(
    State(state): State<Arc<AppState>>,
    Extension(client): Extension<ClientInfo>,
    Json(body): Json<RequestResetBody>,
) -> Result<Json<ApiResponse<MessageResponse>>, ApiError> {
    require_non_empty(&body.email, "email")?;

    state.reset.request(&body.email, &client).await?;

    Ok(Json(ApiResponse::success(MessageResponse::new(
        "if the address exists, a reset email has been sent",
    ))))
}

/// GET /auth/password-reset/verify?token=...
pub async fn verify(
    State(state): State<Arc<AppState>>,
    Query(query): Query<VerifyResetQuery>,
) -> Result<Json<ApiResponse<ResetTokenInfo>>, ApiError> {
    require_challenge_token(&query.token)?;

    let info = state.reset.verify_token(&query.token).await?;

    Ok(Json(ApiResponse::success(info)))
}

/// GET /auth/password-reset/status
pub async fn status(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<CallerIdentity>,
) -> Result<Json<ApiResponse<ResetStatus>>, ApiError> {
    let status = state.reset.status(&caller.account_id).await?;

    Ok(Json(ApiResponse::success(status)))
}

/// POST /auth/password-reset/reset
pub async fn reset(
    State(state): State<Arc<AppState>>,
    Extension(client): Extension<ClientInfo>,
    Json(body): Json<ResetPasswordBody>,
) -> Result<Json<ApiResponse<MessageResponse>>, ApiError> {
    require_challenge_token(&body.token)?;
    require_non_empty(&body.new_password, "new password")?;

    state
        .reset
        .reset(&body.token, &body.new_password, &client)
        .await?;

    Ok(Json(ApiResponse::success(MessageResponse::new(
        "password has been reset",
    ))))
}
