//! Password-reset engine.
//!
//! Requests are rate-limited per address and never reveal whether an
//! account exists. A completed reset rotates the credential and revokes
//! every session.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::warn;

use crate::auth::PasswordPolicy;
use crate::auth::validate::case_fold;
use crate::db::Store;
use crate::email::Mailer;
use crate::security::{ClientInfo, Severity};
use crate::services::auth_service::AuthError;
use crate::services::generate_challenge_token;
use crate::services::security_service::SecurityService;

pub const MAX_RESET_ATTEMPTS: i32 = 5;

fn token_ttl() -> Duration {
    Duration::hours(1)
}

fn attempt_window() -> Duration {
    Duration::hours(24)
}

#[derive(Debug, Serialize)]
pub struct ResetTokenInfo {
    pub is_valid: bool,
    /// Masked for display without disclosure
    pub email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
pub struct ResetStatus {
    pub attempts: i32,
    pub max_attempts: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    pub is_expired: bool,
    pub has_active_request: bool,
    pub can_request: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_reset_at: Option<DateTime<Utc>>,
}

pub struct PasswordResetService {
    store: Store,
    mailer: Arc<dyn Mailer>,
    policy: PasswordPolicy,
    journal: Arc<SecurityService>,
    rate_limit: Duration,
    notifications_enabled: bool,
}

impl PasswordResetService {
    #[must_use]
    pub fn new(
        store: Store,
        mailer: Arc<dyn Mailer>,
        policy: PasswordPolicy,
        journal: Arc<SecurityService>,
        rate_limit: Duration,
        notifications_enabled: bool,
    ) -> Self {
        Self {
            store,
            mailer,
            policy,
            journal,
            rate_limit,
            notifications_enabled,
        }
    }

    /// Start a reset for the given address.
    ///
    /// Unknown addresses succeed silently; revealing account existence
    /// through this endpoint is treated as a defect.
    pub async fn request(&self, email: &str, client: &ClientInfo) -> Result<(), AuthError> {
        if email.is_empty() {
            return Err(AuthError::InvalidArgument("email is required".to_string()));
        }

        let email = case_fold(email);
        let Some(account) = self.store.accounts().find_active_by_email(&email).await? else {
            self.journal
                .suspicious_activity(
                    None,
                    format!("Password reset requested for unknown address: {email}"),
                    Severity::Medium,
                    client,
                    serde_json::json!({ "email": email }),
                )
                .await;
            return Ok(());
        };

        let now = Utc::now();

        // Guard 1: minimum gap since the previous token was issued.
        if let Some(expires_at) = account.password_reset_expires_at {
            let issued_at = expires_at - token_ttl();
            if now < issued_at + self.rate_limit {
                self.journal
                    .suspicious_activity(
                        Some(&account.id),
                        "Password reset request rate limited".to_string(),
                        Severity::Medium,
                        client,
                        serde_json::json!({}),
                    )
                    .await;
                return Err(AuthError::ResourceExhausted(
                    "please wait before requesting another password reset".to_string(),
                ));
            }
        }

        // Guard 2: daily attempt cap, self-resetting after 24 hours.
        let account = if account.password_reset_attempts >= MAX_RESET_ATTEMPTS {
            let last_issued = account
                .password_reset_expires_at
                .map(|expires_at| expires_at - token_ttl());
            let within_window =
                last_issued.is_some_and(|issued_at| now - issued_at < attempt_window());

            if within_window {
                self.journal
                    .suspicious_activity(
                        Some(&account.id),
                        "Password reset attempts limit exceeded".to_string(),
                        Severity::High,
                        client,
                        serde_json::json!({}),
                    )
                    .await;
                return Err(AuthError::ResourceExhausted(
                    "maximum password reset attempts exceeded for today".to_string(),
                ));
            }

            self.store.accounts().clear_reset_attempts(account).await?
        } else {
            account
        };

        let token = generate_challenge_token();
        let expires_at = now + token_ttl();
        let attempts = account.password_reset_attempts + 1;

        let account = self
            .store
            .accounts()
            .set_reset_token(account, &token, expires_at, attempts)
            .await?;

        if let Err(e) = self.mailer.send_password_reset(&account, &token).await {
            warn!(account_id = %account.id, "Failed to send password reset email: {e}");
            self.journal
                .security_alert(
                    Some(&account.id),
                    "Failed to send password reset email".to_string(),
                    Severity::High,
                    client,
                )
                .await;
            return Err(AuthError::Internal(
                "failed to send password reset email".to_string(),
            ));
        }

        self.journal
            .password_reset_requested(&account.id, client)
            .await;

        Ok(())
    }

    /// Check a reset token without consuming it.
    pub async fn verify_token(&self, token: &str) -> Result<ResetTokenInfo, AuthError> {
        if token.is_empty() {
            return Err(AuthError::InvalidArgument(
                "reset token is required".to_string(),
            ));
        }

        let account = self
            .store
            .accounts()
            .find_active_by_reset_token(token)
            .await?
            .ok_or_else(|| AuthError::NotFound("invalid or expired reset token".to_string()))?;

        if let Some(expires_at) = account.password_reset_expires_at
            && expires_at < Utc::now()
        {
            return Err(AuthError::DeadlineExceeded(
                "reset token has expired".to_string(),
            ));
        }

        Ok(ResetTokenInfo {
            is_valid: true,
            email: mask_email(&account.email),
            expires_at: account.password_reset_expires_at,
        })
    }

    /// Consume a reset token: swap the digest, clear the lockout, revoke
    /// every session.
    pub async fn reset(
        &self,
        token: &str,
        new_password: &str,
        client: &ClientInfo,
    ) -> Result<(), AuthError> {
        if token.is_empty() {
            return Err(AuthError::InvalidArgument(
                "reset token is required".to_string(),
            ));
        }
        if new_password.is_empty() {
            return Err(AuthError::InvalidArgument(
                "new password is required".to_string(),
            ));
        }

        self.policy.validate_strength(new_password)?;

        let Some(account) = self
            .store
            .accounts()
            .find_active_by_reset_token(token)
            .await?
        else {
            self.journal
                .suspicious_activity(
                    None,
                    "Invalid password reset token used".to_string(),
                    Severity::Medium,
                    client,
                    serde_json::json!({}),
                )
                .await;
            return Err(AuthError::NotFound(
                "invalid or expired reset token".to_string(),
            ));
        };

        if let Some(expires_at) = account.password_reset_expires_at
            && expires_at < Utc::now()
        {
            self.journal
                .suspicious_activity(
                    Some(&account.id),
                    "Expired password reset token used".to_string(),
                    Severity::Medium,
                    client,
                    serde_json::json!({}),
                )
                .await;
            return Err(AuthError::DeadlineExceeded(
                "reset token has expired".to_string(),
            ));
        }

        let digest = self.policy.hash(new_password).await?;

        let applied = self
            .store
            .accounts()
            .apply_password_reset(token, &digest)
            .await?;
        if !applied {
            return Err(AuthError::NotFound(
                "invalid or expired reset token".to_string(),
            ));
        }

        if self.notifications_enabled && account.security_notifications_enabled {
            if let Err(e) = self.mailer.send_password_changed(&account).await {
                warn!(account_id = %account.id, "Failed to send password changed notification: {e}");
                self.journal
                    .security_alert(
                        Some(&account.id),
                        "Failed to send password changed notification".to_string(),
                        Severity::Medium,
                        client,
                    )
                    .await;
            }
        }

        self.journal
            .password_reset_completed(&account.id, client)
            .await;

        Ok(())
    }

    /// Reset-request state for one account: attempt budget, pending
    /// request, and whether a new request would currently be accepted.
    pub async fn status(&self, account_id: &str) -> Result<ResetStatus, AuthError> {
        let account = self
            .store
            .accounts()
            .get(account_id)
            .await?
            .ok_or_else(|| AuthError::NotFound("account not found".to_string()))?;

        let now = Utc::now();
        let mut status = ResetStatus {
            attempts: account.password_reset_attempts,
            max_attempts: MAX_RESET_ATTEMPTS,
            expires_at: account.password_reset_expires_at,
            is_expired: false,
            has_active_request: false,
            can_request: account.password_reset_attempts < MAX_RESET_ATTEMPTS,
            last_reset_at: account.password_reset_at,
        };

        if let Some(expires_at) = account.password_reset_expires_at {
            status.is_expired = expires_at < now;
            status.has_active_request = !status.is_expired;

            let issued_at = expires_at - token_ttl();
            status.can_request = now >= issued_at + self.rate_limit
                && account.password_reset_attempts < MAX_RESET_ATTEMPTS;
        }

        Ok(status)
    }

    /// Null out expired tokens in bulk. Safe to run repeatedly.
    pub async fn cleanup_expired(&self) -> Result<u64, AuthError> {
        Ok(self.store.accounts().cleanup_expired_reset_tokens().await?)
    }
}

/// Mask the local part of an address: `"u@d" -> "*@d"`, `"ab@d" -> "**@d"`,
/// otherwise keep the first and last characters.
#[must_use]
pub fn mask_email(email: &str) -> String {
    let Some((local, domain)) = email.split_once('@') else {
        return email.to_string();
    };

    let chars: Vec<char> = local.chars().collect();
    if chars.len() <= 2 {
        return format!("{}@{domain}", "*".repeat(chars.len()));
    }

    let first = chars[0];
    let last = chars[chars.len() - 1];
    let middle = "*".repeat(chars.len() - 2);
    format!("{first}{middle}{last}@{domain}")
}

#[cfg(test)]
mod tests {
    use super::mask_email;

    #[test]
    fn masks_preserve_domain_and_edges() {
        assert_eq!(mask_email("u@d.com"), "*@d.com");
        assert_eq!(mask_email("ab@d.com"), "**@d.com");
        assert_eq!(mask_email("abc@d.com"), "a*c@d.com");
        assert_eq!(mask_email("alice@e.com"), "a***e@e.com");
        assert_eq!(mask_email("not-an-email"), "not-an-email");
    }
}
