//! `SeaORM` implementation of the `AuthService` trait.

use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use tracing::warn;

use crate::auth::validate::{case_fold, validate_email, validate_username};
use crate::auth::{PasswordPolicy, TokenIdentity, TokenManager, TokenPair};
use crate::config::SecurityConfig;
use crate::db::{EventFilter, NewAccount, Store};
use crate::email::Mailer;
use crate::entities::accounts;
use crate::security::{CallerIdentity, ClientInfo, EventKind, Role, Severity};
use crate::services::auth_service::{
    AccountInfo, AuthError, AuthService, EventQuery, LoginOutcome, LoginSuccess, ProfileUpdate,
    RegisterRequest, RegisterResult, SecurityEventPage,
};
use crate::services::security_service::SecurityService;
use crate::services::verification_service::{EmailVerificationService, VerificationStatus};

pub struct SeaOrmAuthService {
    store: Store,
    tokens: Arc<TokenManager>,
    policy: PasswordPolicy,
    journal: Arc<SecurityService>,
    verification: Arc<EmailVerificationService>,
    mailer: Arc<dyn Mailer>,
    security: SecurityConfig,
}

impl SeaOrmAuthService {
    #[must_use]
    pub fn new(
        store: Store,
        tokens: Arc<TokenManager>,
        policy: PasswordPolicy,
        journal: Arc<SecurityService>,
        verification: Arc<EmailVerificationService>,
        mailer: Arc<dyn Mailer>,
        security: SecurityConfig,
    ) -> Self {
        Self {
            store,
            tokens,
            policy,
            journal,
            verification,
            mailer,
            security,
        }
    }

    fn identity_of(account: &accounts::Model) -> TokenIdentity {
        TokenIdentity {
            account_id: account.id.clone(),
            email: account.email.clone(),
            username: account.username.clone(),
            role: Role::parse(&account.role).unwrap_or_default(),
        }
    }

    fn mint_pair(&self, account: &accounts::Model) -> Result<TokenPair, AuthError> {
        self.tokens
            .generate_pair(&Self::identity_of(account))
            .map_err(|_| AuthError::Internal("failed to generate tokens".to_string()))
    }
}

#[async_trait]
impl AuthService for SeaOrmAuthService {
    async fn register(
        &self,
        req: RegisterRequest,
        client: &ClientInfo,
    ) -> Result<RegisterResult, AuthError> {
        validate_email(&req.email).map_err(AuthError::InvalidArgument)?;
        validate_username(&req.username).map_err(AuthError::InvalidArgument)?;

        let email = case_fold(&req.email);
        let username = case_fold(&req.username);

        if self
            .store
            .accounts()
            .identifier_taken(&email, &username)
            .await?
        {
            return Err(AuthError::AlreadyExists(
                "user with this email or username already exists".to_string(),
            ));
        }

        // Strength validation happens inside hash()
        let digest = self.policy.hash(&req.password).await?;

        let account = self
            .store
            .accounts()
            .insert(NewAccount {
                email,
                username,
                password_hash: digest,
                first_name: req.first_name,
                last_name: req.last_name,
            })
            .await?;

        let pair = self.mint_pair(&account)?;
        let refresh_expires_at = Utc::now() + self.tokens.refresh_ttl();
        self.store
            .accounts()
            .rotate_refresh_token(account.clone(), &pair.refresh_token, refresh_expires_at)
            .await?;

        let verification_required = self.security.require_email_verification;

        if req.send_verification || verification_required {
            // Registration already succeeded; a failed verification send
            // must not undo it.
            if let Err(e) = self.verification.send(&account.id, client).await {
                warn!(account_id = %account.id, "Verification send after register failed: {e}");
            }
        }

        Ok(RegisterResult {
            account: AccountInfo::from(&account),
            tokens: pair,
            verification_required,
        })
    }

    async fn login(
        &self,
        identifier: &str,
        password: &str,
        client: &ClientInfo,
    ) -> Result<LoginOutcome, AuthError> {
        let identifier = case_fold(identifier);
        let now = Utc::now();

        let Some(account) = self
            .store
            .accounts()
            .find_by_identifier(&identifier)
            .await?
        else {
            self.journal
                .login_failed(None, &identifier, "unknown identifier", client)
                .await;
            return Ok(LoginOutcome::InvalidCredentials);
        };

        // Lockout check precedes the credential check: a locked account
        // refuses even the correct password.
        if let Some(locked_until) = account.locked_until
            && locked_until > now
        {
            return Ok(LoginOutcome::Locked { locked_until });
        }

        if !account.is_active {
            return Err(AuthError::PermissionDenied(
                "account is inactive".to_string(),
            ));
        }

        let valid = PasswordPolicy::verify(&account.password_hash, password).await?;

        if !valid {
            let attempts = account.failed_login_attempts + 1;

            if attempts >= self.security.max_login_attempts {
                let locked_until = now + self.security.lockout_duration;
                let account_id = account.id.clone();
                self.store
                    .accounts()
                    .record_login_failure(account, attempts, Some(locked_until))
                    .await?;
                self.journal
                    .login_failed(
                        Some(&account_id),
                        &identifier,
                        &format!("wrong password (attempt {attempts})"),
                        client,
                    )
                    .await;
                self.journal
                    .account_locked(
                        &account_id,
                        &format!("{attempts} failed login attempts"),
                        client,
                    )
                    .await;
                return Ok(LoginOutcome::Locked { locked_until });
            }

            let account_id = account.id.clone();
            self.store
                .accounts()
                .record_login_failure(account, attempts, None)
                .await?;
            self.journal
                .login_failed(
                    Some(&account_id),
                    &identifier,
                    &format!("wrong password (attempt {attempts})"),
                    client,
                )
                .await;
            return Ok(LoginOutcome::InvalidCredentials);
        }

        let pair = self.mint_pair(&account)?;
        let refresh_expires_at = now + self.tokens.refresh_ttl();

        let account = self
            .store
            .accounts()
            .record_login_success(
                account,
                &pair.refresh_token,
                refresh_expires_at,
                client.ip_address.as_deref(),
            )
            .await?;

        self.journal.login_success(&account.id, client).await;

        let verification_required =
            !account.email_verified && self.security.require_email_verification;

        Ok(LoginOutcome::Success(Box::new(LoginSuccess {
            account: AccountInfo::from(&account),
            tokens: pair,
            verification_required,
        })))
    }

    async fn refresh(&self, refresh_token: &str) -> Result<TokenPair, AuthError> {
        if refresh_token.is_empty() {
            return Err(AuthError::InvalidArgument(
                "refresh token is required".to_string(),
            ));
        }

        let claims = self
            .tokens
            .validate_refresh(refresh_token)
            .map_err(|_| AuthError::Unauthenticated("invalid refresh token".to_string()))?;

        // The presented token must still be the stored one; rotation
        // invalidates every predecessor.
        let account = self
            .store
            .accounts()
            .find_by_refresh_token(&claims.sub, refresh_token)
            .await?
            .ok_or_else(|| AuthError::Unauthenticated("invalid refresh token".to_string()))?;

        let now = Utc::now();

        if account
            .refresh_token_expires_at
            .is_some_and(|expires_at| expires_at < now)
        {
            return Err(AuthError::Unauthenticated(
                "refresh token expired".to_string(),
            ));
        }

        if account
            .last_login
            .is_some_and(|last_login| now - last_login > self.security.session_timeout)
        {
            return Err(AuthError::Unauthenticated("session expired".to_string()));
        }

        let pair = self.mint_pair(&account)?;
        let refresh_expires_at = now + self.tokens.refresh_ttl();
        self.store
            .accounts()
            .rotate_refresh_token(account, &pair.refresh_token, refresh_expires_at)
            .await?;

        Ok(pair)
    }

    async fn logout(&self, refresh_token: &str) {
        if refresh_token.is_empty() {
            return;
        }

        // Invalid tokens are swallowed; logout is idempotent.
        let Ok(claims) = self.tokens.validate_refresh(refresh_token) else {
            return;
        };

        if let Err(e) = self.store.accounts().clear_refresh_token(&claims.sub).await {
            warn!(account_id = %claims.sub, "Failed to clear refresh token on logout: {e}");
        }
    }

    async fn get_me(
        &self,
        account_id: &str,
    ) -> Result<(AccountInfo, VerificationStatus), AuthError> {
        let account = self
            .store
            .accounts()
            .get(account_id)
            .await?
            .ok_or_else(|| AuthError::NotFound("account not found".to_string()))?;

        let status = self.verification.status(account_id).await?;

        Ok((AccountInfo::from(&account), status))
    }

    async fn update_profile(
        &self,
        account_id: &str,
        update: ProfileUpdate,
    ) -> Result<AccountInfo, AuthError> {
        let account = self
            .store
            .accounts()
            .get(account_id)
            .await?
            .ok_or_else(|| AuthError::NotFound("account not found".to_string()))?;

        let account = self
            .store
            .accounts()
            .update_profile(
                account,
                update.first_name,
                update.last_name,
                update.preferences,
                update.email_notifications_enabled,
                update.security_notifications_enabled,
            )
            .await?;

        Ok(AccountInfo::from(&account))
    }

    async fn change_password(
        &self,
        account_id: &str,
        current_password: &str,
        new_password: &str,
        client: &ClientInfo,
    ) -> Result<(), AuthError> {
        if current_password.is_empty() || new_password.is_empty() {
            return Err(AuthError::InvalidArgument(
                "current and new passwords are required".to_string(),
            ));
        }

        let account = self
            .store
            .accounts()
            .get(account_id)
            .await?
            .ok_or_else(|| AuthError::NotFound("account not found".to_string()))?;

        let valid = PasswordPolicy::verify(&account.password_hash, current_password).await?;
        if !valid {
            return Err(AuthError::InvalidArgument(
                "incorrect current password".to_string(),
            ));
        }

        let digest = self.policy.hash(new_password).await?;

        // Clearing the refresh token forces re-login on every other session
        self.store
            .accounts()
            .update_password(account.clone(), &digest)
            .await?;

        self.journal.password_changed(&account.id, client).await;

        if self.security.security_notifications_enabled && account.security_notifications_enabled {
            if let Err(e) = self.send_password_changed_notification(&account, client).await {
                warn!(account_id = %account.id, "Password changed notification failed: {e}");
            }
        }

        Ok(())
    }

    async fn get_security_events(
        &self,
        caller: &CallerIdentity,
        query: EventQuery,
    ) -> Result<SecurityEventPage, AuthError> {
        // Non-admin callers only ever see their own trail, regardless of
        // any requested account filter.
        let account_id = if caller.role == Role::Admin {
            query.account_id
        } else {
            Some(caller.account_id.clone())
        };

        let kind = query
            .event_type
            .as_deref()
            .map(EventKind::parse)
            .transpose()
            .map_err(|e| AuthError::InvalidArgument(e.to_string()))?;

        let severity = query
            .severity
            .as_deref()
            .map(Severity::parse)
            .transpose()
            .map_err(|e| AuthError::InvalidArgument(e.to_string()))?;

        let filter = EventFilter {
            account_id,
            kind,
            severity,
            from: query.from,
            to: query.to,
            only_unresolved: query.only_unresolved,
            offset: query.offset,
            limit: query.page_size,
        };

        let (events, total) = self
            .journal
            .query(&filter)
            .await
            .map_err(|e| AuthError::Internal(e.to_string()))?;

        let consumed = query.offset + events.len() as u64;
        let next_page_token = (consumed < total).then(|| consumed.to_string());

        Ok(SecurityEventPage {
            events,
            total,
            next_page_token,
        })
    }

    async fn unlock_account(
        &self,
        caller: &CallerIdentity,
        target_account_id: &str,
        client: &ClientInfo,
    ) -> Result<(), AuthError> {
        if caller.role != Role::Admin {
            return Err(AuthError::PermissionDenied(
                "insufficient permissions".to_string(),
            ));
        }

        let account = self
            .store
            .accounts()
            .get(target_account_id)
            .await?
            .ok_or_else(|| AuthError::NotFound("account not found".to_string()))?;

        let account_id = account.id.clone();
        self.store.accounts().unlock(account).await?;

        self.journal
            .account_unlocked(&account_id, &caller.account_id, client)
            .await;

        Ok(())
    }
}

impl SeaOrmAuthService {
    /// Best-effort mail; failure lands in the journal, never in the caller.
    async fn send_password_changed_notification(
        &self,
        account: &accounts::Model,
        client: &ClientInfo,
    ) -> Result<(), AuthError> {
        if let Err(e) = self.mailer.send_password_changed(account).await {
            self.journal
                .security_alert(
                    Some(&account.id),
                    "Failed to send password changed notification".to_string(),
                    Severity::Medium,
                    client,
                )
                .await;
            return Err(AuthError::Internal(e.to_string()));
        }
        Ok(())
    }
}
