//! Email-verification engine: token issuance, single-use consumption,
//! rate-limited resend, attempt accounting.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::warn;

use crate::db::Store;
use crate::email::Mailer;
use crate::entities::accounts;
use crate::security::{ClientInfo, Severity};
use crate::services::auth_service::AuthError;
use crate::services::generate_challenge_token;
use crate::services::security_service::SecurityService;

pub const MAX_VERIFICATION_ATTEMPTS: i32 = 5;

fn token_ttl() -> Duration {
    Duration::hours(24)
}

fn resend_window() -> Duration {
    Duration::hours(1)
}

#[derive(Debug, Serialize)]
pub struct VerificationStatus {
    pub email_verified: bool,
    pub attempts: i32,
    pub max_attempts: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    pub is_expired: bool,
    pub can_resend: bool,
}

pub struct EmailVerificationService {
    store: Store,
    mailer: Arc<dyn Mailer>,
    journal: Arc<SecurityService>,
}

impl EmailVerificationService {
    #[must_use]
    pub fn new(store: Store, mailer: Arc<dyn Mailer>, journal: Arc<SecurityService>) -> Self {
        Self {
            store,
            mailer,
            journal,
        }
    }

    /// Issue a fresh token and dispatch the verification mail.
    pub async fn send(&self, account_id: &str, client: &ClientInfo) -> Result<(), AuthError> {
        let account = self.fetch(account_id).await?;
        self.check_sendable(&account)?;
        self.issue_and_dispatch(account, client).await
    }

    /// Like `send`, but additionally enforces the resend rate limit: a new
    /// mail goes out only once the window since the previous issue has
    /// elapsed.
    pub async fn resend(&self, account_id: &str, client: &ClientInfo) -> Result<(), AuthError> {
        let account = self.fetch(account_id).await?;

        if account.email_verified {
            return Err(AuthError::FailedPrecondition(
                "email is already verified".to_string(),
            ));
        }

        if let Some(expires_at) = account.email_verification_expires_at {
            let issued_at = expires_at - token_ttl();
            if Utc::now() < issued_at + resend_window() {
                return Err(AuthError::ResourceExhausted(
                    "please wait before requesting another verification email".to_string(),
                ));
            }
        }

        self.check_sendable(&account)?;
        self.issue_and_dispatch(account, client).await
    }

    /// Consume a verification token. Single-use: a second consumption of
    /// the same token reports not-found.
    pub async fn verify(&self, token: &str, client: &ClientInfo) -> Result<(), AuthError> {
        if token.is_empty() {
            return Err(AuthError::InvalidArgument(
                "verification token is required".to_string(),
            ));
        }

        let account = self
            .store
            .accounts()
            .find_unverified_by_verification_token(token)
            .await?
            .ok_or_else(|| {
                AuthError::NotFound("invalid or expired verification token".to_string())
            })?;

        if let Some(expires_at) = account.email_verification_expires_at
            && expires_at < Utc::now()
        {
            return Err(AuthError::DeadlineExceeded(
                "verification token has expired".to_string(),
            ));
        }

        let consumed = self
            .store
            .accounts()
            .consume_verification_token(token)
            .await?;
        if !consumed {
            return Err(AuthError::NotFound(
                "invalid or expired verification token".to_string(),
            ));
        }

        if let Err(e) = self.mailer.send_welcome(&account).await {
            warn!(account_id = %account.id, "Failed to send welcome email: {e}");
            self.journal
                .security_alert(
                    Some(&account.id),
                    "Failed to send welcome email".to_string(),
                    Severity::Medium,
                    client,
                )
                .await;
        }

        self.journal
            .email_verification_completed(&account.id, client)
            .await;

        Ok(())
    }

    pub async fn status(&self, account_id: &str) -> Result<VerificationStatus, AuthError> {
        let account = self.fetch(account_id).await?;
        let now = Utc::now();

        let is_expired = account
            .email_verification_expires_at
            .is_some_and(|expires_at| expires_at < now);

        let resend_allowed = account
            .email_verification_expires_at
            .is_none_or(|expires_at| now >= expires_at - token_ttl() + resend_window());

        Ok(VerificationStatus {
            email_verified: account.email_verified,
            attempts: account.email_verification_attempts,
            max_attempts: MAX_VERIFICATION_ATTEMPTS,
            expires_at: account.email_verification_expires_at,
            is_expired,
            can_resend: !account.email_verified
                && account.email_verification_attempts < MAX_VERIFICATION_ATTEMPTS
                && resend_allowed,
        })
    }

    /// Null out expired tokens in bulk. Safe to run repeatedly.
    pub async fn cleanup_expired(&self) -> Result<u64, AuthError> {
        Ok(self
            .store
            .accounts()
            .cleanup_expired_verification_tokens()
            .await?)
    }

    async fn fetch(&self, account_id: &str) -> Result<accounts::Model, AuthError> {
        self.store
            .accounts()
            .get(account_id)
            .await?
            .ok_or_else(|| AuthError::NotFound("account not found".to_string()))
    }

    fn check_sendable(&self, account: &accounts::Model) -> Result<(), AuthError> {
        if account.email_verified {
            return Err(AuthError::FailedPrecondition(
                "email is already verified".to_string(),
            ));
        }
        if account.email_verification_attempts >= MAX_VERIFICATION_ATTEMPTS {
            return Err(AuthError::ResourceExhausted(
                "maximum verification attempts exceeded".to_string(),
            ));
        }
        Ok(())
    }

    async fn issue_and_dispatch(
        &self,
        account: accounts::Model,
        client: &ClientInfo,
    ) -> Result<(), AuthError> {
        let token = generate_challenge_token();
        let expires_at = Utc::now() + token_ttl();
        let attempts = account.email_verification_attempts + 1;

        let account = self
            .store
            .accounts()
            .set_verification_token(account, &token, expires_at, attempts)
            .await?;

        if let Err(e) = self.mailer.send_verification(&account, &token).await {
            warn!(account_id = %account.id, "Failed to send verification email: {e}");
            self.journal
                .security_alert(
                    Some(&account.id),
                    "Failed to send verification email".to_string(),
                    Severity::High,
                    client,
                )
                .await;
            return Err(AuthError::Internal(
                "failed to send verification email".to_string(),
            ));
        }

        self.journal
            .email_verification_sent(&account.id, client)
            .await;

        Ok(())
    }
}
