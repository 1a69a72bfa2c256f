use axum::{
    Extension, Json,
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::types::MessageResponse;
use super::validation::{
    require_login_identifier, require_non_empty, require_valid_display_name, require_valid_email,
    require_valid_username,
};
use super::{ApiError, ApiResponse, AppState};
use crate::auth::token::extract_bearer;
use crate::security::{CallerIdentity, ClientInfo};
use crate::services::auth_service::{
    AccountInfo, LoginOutcome, LoginSuccess, ProfileUpdate, RegisterRequest, RegisterResult,
};
use crate::services::verification_service::VerificationStatus;

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Deserialize)]
pub struct RegisterBody {
    pub email: String,
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub send_verification: bool,
}

#[derive(Deserialize)]
pub struct LoginBody {
    /// Email or username
    pub identifier: String,
    pub password: String,
}

#[derive(Deserialize)]
pub struct RefreshBody {
    pub refresh_token: String,
}

#[derive(Deserialize, Default)]
pub struct LogoutBody {
    #[serde(default)]
    pub refresh_token: String,
}

#[derive(Deserialize)]
pub struct ChangePasswordBody {
    pub current_password: String,
    pub new_password: String,
}

#[derive(Deserialize, Default)]
pub struct UpdateProfileBody {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub preferences: Option<serde_json::Value>,
    pub email_notifications_enabled: Option<bool>,
    pub security_notifications_enabled: Option<bool>,
}

#[derive(Serialize)]
pub struct LoginResponse {
    #[serde(flatten)]
    pub success: LoginSuccess,
    pub locked: bool,
}

#[derive(Serialize)]
pub struct LockedResponse {
    pub success: bool,
    pub error: String,
    pub locked: bool,
    pub locked_until: DateTime<Utc>,
}

#[derive(Serialize)]
pub struct MeResponse {
    pub account: AccountInfo,
    pub verification: VerificationStatus,
}

// ============================================================================
// Middleware
// ============================================================================

/// Bearer authentication for every protected route. Validates the access
/// token and attaches the caller identity to the request.
pub async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let header = request
        .headers()
        .get("authorization")
        .and_then(|value| value.to_str().ok())
        .ok_or_else(|| ApiError::unauthenticated("missing authorization header"))?;

    let token = extract_bearer(header)
        .map_err(|_| ApiError::unauthenticated("invalid authorization header format"))?;

    let claims = state
        .tokens
        .validate_access(token)
        .map_err(|_| ApiError::unauthenticated("invalid token"))?;

    request.extensions_mut().insert(CallerIdentity {
        account_id: claims.sub,
        email: claims.email,
        role: claims.role,
    });

    Ok(next.run(request).await)
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /auth/register
pub async fn register(
    State(state): State<Arc<AppState>>,
    Extension(client): Extension<ClientInfo>,
    Json(body): Json<RegisterBody>,
) -> Result<Json<ApiResponse<RegisterResult>>, ApiError> {
    require_valid_email(&body.email)?;
    require_valid_username(&body.username)?;
    require_non_empty(&body.password, "password")?;
    require_valid_display_name(&body.first_name, "first name")?;
    require_valid_display_name(&body.last_name, "last name")?;

    let result = state
        .auth_service
        .register(
            RegisterRequest {
                email: body.email,
                username: body.username,
                password: body.password,
                first_name: body.first_name,
                last_name: body.last_name,
                send_verification: body.send_verification,
            },
            &client,
        )
        .await?;

    Ok(Json(ApiResponse::success(result)))
}

/// POST /auth/login
pub async fn login(
    State(state): State<Arc<AppState>>,
    Extension(client): Extension<ClientInfo>,
    Json(body): Json<LoginBody>,
) -> Result<Response, ApiError> {
    require_login_identifier(&body.identifier)?;
    require_non_empty(&body.password, "password")?;

    let outcome = state
        .auth_service
        .login(&body.identifier, &body.password, &client)
        .await?;

    match outcome {
        LoginOutcome::Success(success) => Ok(Json(ApiResponse::success(LoginResponse {
            success: *success,
            locked: false,
        }))
        .into_response()),
        LoginOutcome::Locked { locked_until } => Ok((
            StatusCode::FORBIDDEN,
            Json(LockedResponse {
                success: false,
                error: "account is temporarily locked".to_string(),
                locked: true,
                locked_until,
            }),
        )
            .into_response()),
        LoginOutcome::InvalidCredentials => {
            Err(ApiError::unauthenticated("invalid credentials"))
        }
    }
}

/// POST /auth/refresh
pub async fn refresh_token(
    State(state): State<Arc<AppState>>,
    Json(body): Json<RefreshBody>,
) -> Result<Json<ApiResponse<crate::auth::TokenPair>>, ApiError> {
    require_non_empty(&body.refresh_token, "refresh token")?;

    let pair = state.auth_service.refresh(&body.refresh_token).await?;

    Ok(Json(ApiResponse::success(pair)))
}

/// POST /auth/logout
///
/// Always succeeds; an invalid refresh token is swallowed.
pub async fn logout(
    State(state): State<Arc<AppState>>,
    Json(body): Json<LogoutBody>,
) -> Json<ApiResponse<MessageResponse>> {
    state.auth_service.logout(&body.refresh_token).await;

    Json(ApiResponse::success(MessageResponse::new("logged out")))
}

/// GET /auth/me
pub async fn get_me(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<CallerIdentity>,
) -> Result<Json<ApiResponse<MeResponse>>, ApiError> {
    let (account, verification) = state.auth_service.get_me(&caller.account_id).await?;

    Ok(Json(ApiResponse::success(MeResponse {
        account,
        verification,
    })))
}

/// PUT /auth/profile
pub async fn update_profile(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<CallerIdentity>,
    Json(body): Json<UpdateProfileBody>,
) -> Result<Json<ApiResponse<AccountInfo>>, ApiError> {
    if let Some(first_name) = &body.first_name {
        require_valid_display_name(first_name, "first name")?;
    }
    if let Some(last_name) = &body.last_name {
        require_valid_display_name(last_name, "last name")?;
    }

    let account = state
        .auth_service
        .update_profile(
            &caller.account_id,
            ProfileUpdate {
                first_name: body.first_name,
                last_name: body.last_name,
                preferences: body.preferences,
                email_notifications_enabled: body.email_notifications_enabled,
                security_notifications_enabled: body.security_notifications_enabled,
            },
        )
        .await?;

    Ok(Json(ApiResponse::success(account)))
}

/// PUT /auth/password
pub async fn change_password(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<CallerIdentity>,
    Extension(client): Extension<ClientInfo>,
    Json(body): Json<ChangePasswordBody>,
) -> Result<Json<ApiResponse<MessageResponse>>, ApiError> {
    require_non_empty(&body.current_password, "current password")?;
    require_non_empty(&body.new_password, "new password")?;
    if body.current_password == body.new_password {
        return Err(ApiError::validation(
            "new password must differ from the current password",
        ));
    }

    state
        .auth_service
        .change_password(
            &caller.account_id,
            &body.current_password,
            &body.new_password,
            &client,
        )
        .await?;

    Ok(Json(ApiResponse::success(MessageResponse::new(
        "password updated",
    ))))
}
