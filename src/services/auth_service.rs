//! Domain service for the credential lifecycle and account protection.
//!
//! Handles registration, login with temporal lockout, refresh rotation,
//! logout, profile and password mutation, journal queries, and admin
//! unlock.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

use crate::auth::{PasswordError, TokenPair};
use crate::entities::{accounts, security_events};
use crate::security::{CallerIdentity, ClientInfo, Role};
use crate::services::verification_service::VerificationStatus;

/// Errors specific to authentication operations, named after the abstract
/// error taxonomy the transport maps them to.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("{0}")]
    InvalidArgument(String),

    #[error("{0}")]
    Unauthenticated(String),

    #[error("{0}")]
    PermissionDenied(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    AlreadyExists(String),

    #[error("{0}")]
    FailedPrecondition(String),

    #[error("{0}")]
    ResourceExhausted(String),

    #[error("{0}")]
    DeadlineExceeded(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<anyhow::Error> for AuthError {
    fn from(err: anyhow::Error) -> Self {
        Self::Internal(err.to_string())
    }
}

impl From<PasswordError> for AuthError {
    fn from(err: PasswordError) -> Self {
        match err {
            PasswordError::TooWeak(msg) => {
                Self::InvalidArgument(format!("password does not meet requirements: {msg}"))
            }
            other => Self::Internal(other.to_string()),
        }
    }
}

/// Account fields safe to expose. The password digest never leaves the
/// service layer.
#[derive(Debug, Clone, Serialize)]
pub struct AccountInfo {
    pub id: String,
    pub email: String,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub role: Role,
    pub is_active: bool,
    pub email_verified: bool,
    pub preferences: serde_json::Value,
    pub email_notifications_enabled: bool,
    pub security_notifications_enabled: bool,
    pub last_login: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&accounts::Model> for AccountInfo {
    fn from(model: &accounts::Model) -> Self {
        Self {
            id: model.id.clone(),
            email: model.email.clone(),
            username: model.username.clone(),
            first_name: model.first_name.clone(),
            last_name: model.last_name.clone(),
            role: Role::parse(&model.role).unwrap_or_default(),
            is_active: model.is_active,
            email_verified: model.email_verified,
            preferences: model.preferences.clone(),
            email_notifications_enabled: model.email_notifications_enabled,
            security_notifications_enabled: model.security_notifications_enabled,
            last_login: model.last_login,
            created_at: model.created_at,
            updated_at: model.updated_at,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RegisterRequest {
    pub email: String,
    pub username: String,
    pub password: String,
    pub first_name: String,
    pub last_name: String,
    pub send_verification: bool,
}

#[derive(Debug, Serialize)]
pub struct RegisterResult {
    pub account: AccountInfo,
    #[serde(flatten)]
    pub tokens: TokenPair,
    pub verification_required: bool,
}

#[derive(Debug, Serialize)]
pub struct LoginSuccess {
    pub account: AccountInfo,
    #[serde(flatten)]
    pub tokens: TokenPair,
    pub verification_required: bool,
}

/// Tagged outcome of a login attempt. A locked account and a credential
/// mismatch are distinct states, not error strings.
#[derive(Debug)]
pub enum LoginOutcome {
    Success(Box<LoginSuccess>),
    Locked { locked_until: DateTime<Utc> },
    InvalidCredentials,
}

#[derive(Debug, Clone, Default)]
pub struct ProfileUpdate {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub preferences: Option<serde_json::Value>,
    pub email_notifications_enabled: Option<bool>,
    pub security_notifications_enabled: Option<bool>,
}

/// Journal query as issued by a caller; scope narrowing happens inside
/// the service based on the caller's role.
#[derive(Debug, Clone, Default)]
pub struct EventQuery {
    pub account_id: Option<String>,
    pub event_type: Option<String>,
    pub severity: Option<String>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub only_unresolved: bool,
    pub page_size: u64,
    pub offset: u64,
}

#[derive(Debug, Serialize)]
pub struct SecurityEventPage {
    pub events: Vec<security_events::Model>,
    pub total: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_page_token: Option<String>,
}

/// Domain service trait for the auth coordinator.
#[async_trait]
pub trait AuthService: Send + Sync {
    /// Create an account and mint its first token pair.
    ///
    /// # Errors
    ///
    /// [`AuthError::AlreadyExists`] when either identifier is taken,
    /// [`AuthError::InvalidArgument`] for malformed identifiers or a weak
    /// password.
    async fn register(
        &self,
        req: RegisterRequest,
        client: &ClientInfo,
    ) -> Result<RegisterResult, AuthError>;

    /// Run the account-protection state machine for one login attempt.
    async fn login(
        &self,
        identifier: &str,
        password: &str,
        client: &ClientInfo,
    ) -> Result<LoginOutcome, AuthError>;

    /// Rotate the refresh token, returning a fresh pair.
    async fn refresh(&self, refresh_token: &str) -> Result<TokenPair, AuthError>;

    /// Invalidate the presented refresh token. Never fails: malformed
    /// tokens produce no error and no state change.
    async fn logout(&self, refresh_token: &str);

    async fn get_me(
        &self,
        account_id: &str,
    ) -> Result<(AccountInfo, VerificationStatus), AuthError>;

    /// Mutate names, preferences, and notification toggles only.
    async fn update_profile(
        &self,
        account_id: &str,
        update: ProfileUpdate,
    ) -> Result<AccountInfo, AuthError>;

    async fn change_password(
        &self,
        account_id: &str,
        current_password: &str,
        new_password: &str,
        client: &ClientInfo,
    ) -> Result<(), AuthError>;

    /// Query the journal, scoped to the caller's own events unless the
    /// caller is an admin.
    async fn get_security_events(
        &self,
        caller: &CallerIdentity,
        query: EventQuery,
    ) -> Result<SecurityEventPage, AuthError>;

    /// Clear a lockout. Admin only.
    async fn unlock_account(
        &self,
        caller: &CallerIdentity,
        target_account_id: &str,
        client: &ClientInfo,
    ) -> Result<(), AuthError>;
}
