use axum::{Extension, Json, extract::State};
use serde::Deserialize;
use std::sync::Arc;

use super::types::MessageResponse;
use super::validation::require_challenge_token;
use super::{ApiError, ApiResponse, AppState};
use crate::security::{CallerIdentity, ClientInfo};
use crate::services::verification_service::VerificationStatus;

#[derive(Deserialize)]
pub struct VerifyEmailBody {
    pub token: String,
}

/// POST /auth/verification/send
pub async fn send(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<CallerIdentity>,
    Extension(client): Extension<ClientInfo>,
) -> Result<Json<ApiResponse<MessageResponse>>, ApiError> {
    state.verification.send(&caller.account_id, &client).await?;

    Ok(Json(ApiResponse::success(MessageResponse::new(
        "verification email sent",
    ))))
}

/// POST /auth/verify-email (public)
pub async fn verify(
    State(state): State<Arc<AppState>>,
    Extension(client): Extension<ClientInfo>,
    Json(body): Json<VerifyEmailBody>,
) -> Result<Json<ApiResponse<MessageResponse>>, ApiError> {
    require_challenge_token(&body.token)?;

    state.verification.verify(&body.token, &client).await?;

    Ok(Json(ApiResponse::success(MessageResponse::new(
        "email verified",
    ))))
}

/// POST /auth/verification/resend
pub async fn resend(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<CallerIdentity>,
    Extension(client): Extension<ClientInfo>,
) -> Result<Json<ApiResponse<MessageResponse>>, ApiError> {
    state
        .verification
        .resend(&caller.account_id, &client)
        .await?;

    Ok(Json(ApiResponse::success(MessageResponse::new(
        "verification email sent",
    ))))
}

/// GET /auth/verification/status
pub async fn status(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<CallerIdentity>,
) -> Result<Json<ApiResponse<VerificationStatus>>, ApiError> {
    let status = state.verification.status(&caller.account_id).await?;

    Ok(Json(ApiResponse::success(status)))
}
