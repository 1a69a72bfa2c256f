use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, DatabaseConnection, EntityTrait, QueryFilter, Set,
};
use uuid::Uuid;

use crate::entities::{accounts, prelude::Accounts};
use crate::security::Role;

/// Field set for inserting a freshly registered account.
#[derive(Debug, Clone)]
pub struct NewAccount {
    pub email: String,
    pub username: String,
    pub password_hash: String,
    pub first_name: String,
    pub last_name: String,
}

pub struct AccountRepository {
    conn: DatabaseConnection,
}

impl AccountRepository {
    #[must_use]
    pub const fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    pub async fn insert(&self, new: NewAccount) -> Result<accounts::Model> {
        let now = Utc::now();
        let model = accounts::ActiveModel {
            id: Set(Uuid::new_v4().to_string()),
            email: Set(new.email),
            username: Set(new.username),
            password_hash: Set(new.password_hash),
            first_name: Set(new.first_name),
            last_name: Set(new.last_name),
            role: Set(Role::User.as_str().to_string()),
            is_active: Set(true),
            email_verified: Set(false),
            email_verification_token: Set(None),
            email_verification_expires_at: Set(None),
            email_verification_attempts: Set(0),
            password_reset_token: Set(None),
            password_reset_expires_at: Set(None),
            password_reset_at: Set(None),
            password_reset_attempts: Set(0),
            password_changed_at: Set(None),
            failed_login_attempts: Set(0),
            locked_until: Set(None),
            refresh_token: Set(None),
            refresh_token_expires_at: Set(None),
            last_login: Set(None),
            last_login_ip: Set(None),
            preferences: Set(serde_json::json!({})),
            email_notifications_enabled: Set(true),
            security_notifications_enabled: Set(true),
            created_at: Set(now),
            updated_at: Set(now),
        };

        model
            .insert(&self.conn)
            .await
            .context("Failed to insert account")
    }

    pub async fn get(&self, id: &str) -> Result<Option<accounts::Model>> {
        Accounts::find_by_id(id)
            .one(&self.conn)
            .await
            .context("Failed to query account by id")
    }

    /// True when either the email or the username is already taken.
    pub async fn identifier_taken(&self, email: &str, username: &str) -> Result<bool> {
        let existing = Accounts::find()
            .filter(
                Condition::any()
                    .add(accounts::Column::Email.eq(email))
                    .add(accounts::Column::Username.eq(username)),
            )
            .one(&self.conn)
            .await
            .context("Failed to check account existence")?;

        Ok(existing.is_some())
    }

    /// Login lookup: the identifier matches either the email or the
    /// username. Inactive and locked accounts are returned as-is; the
    /// caller decides how to refuse them.
    pub async fn find_by_identifier(&self, identifier: &str) -> Result<Option<accounts::Model>> {
        Accounts::find()
            .filter(
                Condition::any()
                    .add(accounts::Column::Email.eq(identifier))
                    .add(accounts::Column::Username.eq(identifier)),
            )
            .one(&self.conn)
            .await
            .context("Failed to query account by identifier")
    }

    pub async fn find_active_by_email(&self, email: &str) -> Result<Option<accounts::Model>> {
        Accounts::find()
            .filter(accounts::Column::Email.eq(email))
            .filter(accounts::Column::IsActive.eq(true))
            .one(&self.conn)
            .await
            .context("Failed to query account by email")
    }

    /// Refresh lookup: the stored token must match the presented one.
    pub async fn find_by_refresh_token(
        &self,
        account_id: &str,
        refresh_token: &str,
    ) -> Result<Option<accounts::Model>> {
        Accounts::find()
            .filter(accounts::Column::Id.eq(account_id))
            .filter(accounts::Column::RefreshToken.eq(refresh_token))
            .filter(accounts::Column::IsActive.eq(true))
            .one(&self.conn)
            .await
            .context("Failed to query account by refresh token")
    }

    /// Persist a new refresh token, stamping last-login state.
    pub async fn record_login_success(
        &self,
        account: accounts::Model,
        refresh_token: &str,
        refresh_expires_at: DateTime<Utc>,
        ip_address: Option<&str>,
    ) -> Result<accounts::Model> {
        let now = Utc::now();
        let mut active: accounts::ActiveModel = account.into();
        active.refresh_token = Set(Some(refresh_token.to_string()));
        active.refresh_token_expires_at = Set(Some(refresh_expires_at));
        active.last_login = Set(Some(now));
        active.last_login_ip = Set(ip_address.map(str::to_string));
        active.failed_login_attempts = Set(0);
        active.locked_until = Set(None);
        active.updated_at = Set(now);

        active
            .update(&self.conn)
            .await
            .context("Failed to record login")
    }

    /// Bump the failure counter, locking the account when `locked_until`
    /// is provided.
    pub async fn record_login_failure(
        &self,
        account: accounts::Model,
        attempts: i32,
        locked_until: Option<DateTime<Utc>>,
    ) -> Result<()> {
        let mut active: accounts::ActiveModel = account.into();
        active.failed_login_attempts = Set(attempts);
        if locked_until.is_some() {
            active.locked_until = Set(locked_until);
        }
        active.updated_at = Set(Utc::now());

        active
            .update(&self.conn)
            .await
            .context("Failed to record login failure")?;
        Ok(())
    }

    /// Rotate the stored refresh token without touching last-login.
    pub async fn rotate_refresh_token(
        &self,
        account: accounts::Model,
        refresh_token: &str,
        refresh_expires_at: DateTime<Utc>,
    ) -> Result<()> {
        let mut active: accounts::ActiveModel = account.into();
        active.refresh_token = Set(Some(refresh_token.to_string()));
        active.refresh_token_expires_at = Set(Some(refresh_expires_at));
        active.updated_at = Set(Utc::now());

        active
            .update(&self.conn)
            .await
            .context("Failed to rotate refresh token")?;
        Ok(())
    }

    pub async fn clear_refresh_token(&self, account_id: &str) -> Result<()> {
        Accounts::update_many()
            .col_expr(accounts::Column::RefreshToken, Expr::value(None::<String>))
            .col_expr(
                accounts::Column::RefreshTokenExpiresAt,
                Expr::value(None::<DateTime<Utc>>),
            )
            .col_expr(accounts::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(accounts::Column::Id.eq(account_id))
            .exec(&self.conn)
            .await
            .context("Failed to clear refresh token")?;
        Ok(())
    }

    pub async fn update_profile(
        &self,
        account: accounts::Model,
        first_name: Option<String>,
        last_name: Option<String>,
        preferences: Option<serde_json::Value>,
        email_notifications: Option<bool>,
        security_notifications: Option<bool>,
    ) -> Result<accounts::Model> {
        let mut active: accounts::ActiveModel = account.into();
        if let Some(first) = first_name {
            active.first_name = Set(first);
        }
        if let Some(last) = last_name {
            active.last_name = Set(last);
        }
        if let Some(prefs) = preferences {
            active.preferences = Set(prefs);
        }
        if let Some(enabled) = email_notifications {
            active.email_notifications_enabled = Set(enabled);
        }
        if let Some(enabled) = security_notifications {
            active.security_notifications_enabled = Set(enabled);
        }
        active.updated_at = Set(Utc::now());

        active
            .update(&self.conn)
            .await
            .context("Failed to update profile")
    }

    /// Swap the password digest and revoke every session.
    pub async fn update_password(&self, account: accounts::Model, digest: &str) -> Result<()> {
        let now = Utc::now();
        let mut active: accounts::ActiveModel = account.into();
        active.password_hash = Set(digest.to_string());
        active.password_changed_at = Set(Some(now));
        active.refresh_token = Set(None);
        active.refresh_token_expires_at = Set(None);
        active.updated_at = Set(now);

        active
            .update(&self.conn)
            .await
            .context("Failed to update password")?;
        Ok(())
    }

    pub async fn unlock(&self, account: accounts::Model) -> Result<()> {
        let mut active: accounts::ActiveModel = account.into();
        active.failed_login_attempts = Set(0);
        active.locked_until = Set(None);
        active.updated_at = Set(Utc::now());

        active
            .update(&self.conn)
            .await
            .context("Failed to unlock account")?;
        Ok(())
    }

    // ===== Email verification =====

    pub async fn set_verification_token(
        &self,
        account: accounts::Model,
        token: &str,
        expires_at: DateTime<Utc>,
        attempts: i32,
    ) -> Result<accounts::Model> {
        let mut active: accounts::ActiveModel = account.into();
        active.email_verification_token = Set(Some(token.to_string()));
        active.email_verification_expires_at = Set(Some(expires_at));
        active.email_verification_attempts = Set(attempts);
        active.updated_at = Set(Utc::now());

        active
            .update(&self.conn)
            .await
            .context("Failed to set verification token")
    }

    pub async fn find_unverified_by_verification_token(
        &self,
        token: &str,
    ) -> Result<Option<accounts::Model>> {
        Accounts::find()
            .filter(accounts::Column::EmailVerificationToken.eq(token))
            .filter(accounts::Column::EmailVerified.eq(false))
            .one(&self.conn)
            .await
            .context("Failed to query account by verification token")
    }

    /// Consume a verification token. The update is conditioned on the
    /// token still being present, so a concurrent consumer loses the race
    /// and sees zero rows affected.
    pub async fn consume_verification_token(&self, token: &str) -> Result<bool> {
        let result = Accounts::update_many()
            .col_expr(accounts::Column::EmailVerified, Expr::value(true))
            .col_expr(
                accounts::Column::EmailVerificationToken,
                Expr::value(None::<String>),
            )
            .col_expr(
                accounts::Column::EmailVerificationExpiresAt,
                Expr::value(None::<DateTime<Utc>>),
            )
            .col_expr(accounts::Column::EmailVerificationAttempts, Expr::value(0))
            .col_expr(accounts::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(accounts::Column::EmailVerificationToken.eq(token))
            .filter(accounts::Column::EmailVerified.eq(false))
            .exec(&self.conn)
            .await
            .context("Failed to consume verification token")?;

        Ok(result.rows_affected > 0)
    }

    pub async fn cleanup_expired_verification_tokens(&self) -> Result<u64> {
        let result = Accounts::update_many()
            .col_expr(
                accounts::Column::EmailVerificationToken,
                Expr::value(None::<String>),
            )
            .col_expr(
                accounts::Column::EmailVerificationExpiresAt,
                Expr::value(None::<DateTime<Utc>>),
            )
            .filter(accounts::Column::EmailVerificationToken.is_not_null())
            .filter(accounts::Column::EmailVerificationExpiresAt.lt(Utc::now()))
            .exec(&self.conn)
            .await
            .context("Failed to clean up expired verification tokens")?;

        Ok(result.rows_affected)
    }

    // ===== Password reset =====

    pub async fn set_reset_token(
        &self,
        account: accounts::Model,
        token: &str,
        expires_at: DateTime<Utc>,
        attempts: i32,
    ) -> Result<accounts::Model> {
        let mut active: accounts::ActiveModel = account.into();
        active.password_reset_token = Set(Some(token.to_string()));
        active.password_reset_expires_at = Set(Some(expires_at));
        active.password_reset_attempts = Set(attempts);
        active.updated_at = Set(Utc::now());

        active
            .update(&self.conn)
            .await
            .context("Failed to set reset token")
    }

    pub async fn clear_reset_attempts(&self, account: accounts::Model) -> Result<accounts::Model> {
        let mut active: accounts::ActiveModel = account.into();
        active.password_reset_attempts = Set(0);
        active.updated_at = Set(Utc::now());

        active
            .update(&self.conn)
            .await
            .context("Failed to clear reset attempts")
    }

    pub async fn find_active_by_reset_token(&self, token: &str) -> Result<Option<accounts::Model>> {
        Accounts::find()
            .filter(accounts::Column::PasswordResetToken.eq(token))
            .filter(accounts::Column::IsActive.eq(true))
            .one(&self.conn)
            .await
            .context("Failed to query account by reset token")
    }

    /// Complete a password reset in one conditional update: new digest,
    /// reset bookkeeping, every session revoked, lockout cleared. Keyed on
    /// the token so the reset is single-use.
    pub async fn apply_password_reset(&self, token: &str, digest: &str) -> Result<bool> {
        let now = Utc::now();
        let result = Accounts::update_many()
            .col_expr(accounts::Column::PasswordHash, Expr::value(digest))
            .col_expr(accounts::Column::PasswordChangedAt, Expr::value(Some(now)))
            .col_expr(accounts::Column::PasswordResetAt, Expr::value(Some(now)))
            .col_expr(
                accounts::Column::PasswordResetToken,
                Expr::value(None::<String>),
            )
            .col_expr(
                accounts::Column::PasswordResetExpiresAt,
                Expr::value(None::<DateTime<Utc>>),
            )
            .col_expr(accounts::Column::PasswordResetAttempts, Expr::value(0))
            .col_expr(accounts::Column::RefreshToken, Expr::value(None::<String>))
            .col_expr(
                accounts::Column::RefreshTokenExpiresAt,
                Expr::value(None::<DateTime<Utc>>),
            )
            .col_expr(accounts::Column::FailedLoginAttempts, Expr::value(0))
            .col_expr(
                accounts::Column::LockedUntil,
                Expr::value(None::<DateTime<Utc>>),
            )
            .col_expr(accounts::Column::UpdatedAt, Expr::value(now))
            .filter(accounts::Column::PasswordResetToken.eq(token))
            .filter(accounts::Column::IsActive.eq(true))
            .exec(&self.conn)
            .await
            .context("Failed to apply password reset")?;

        Ok(result.rows_affected > 0)
    }

    pub async fn cleanup_expired_reset_tokens(&self) -> Result<u64> {
        let result = Accounts::update_many()
            .col_expr(
                accounts::Column::PasswordResetToken,
                Expr::value(None::<String>),
            )
            .col_expr(
                accounts::Column::PasswordResetExpiresAt,
                Expr::value(None::<DateTime<Utc>>),
            )
            .filter(accounts::Column::PasswordResetToken.is_not_null())
            .filter(accounts::Column::PasswordResetExpiresAt.lt(Utc::now()))
            .exec(&self.conn)
            .await
            .context("Failed to clean up expired reset tokens")?;

        Ok(result.rows_affected)
    }
}
