//! Append-only journal of security-relevant events.
//!
//! Entries are classified with the closed enums from [`crate::security`];
//! string-valued input is parsed and unknown classifications are rejected.
//! Every stored entry is also published on a broadcast bus so streaming
//! subscribers observe the journal live.

use thiserror::Error;
use tokio::sync::broadcast;
use tracing::warn;

use crate::db::{EventFilter, NewSecurityEvent, Store};
use crate::entities::security_events;
use crate::security::{ClientInfo, EventKind, Severity, UnknownVariant};

#[derive(Debug, Error)]
pub enum JournalError {
    #[error(transparent)]
    Unknown(#[from] UnknownVariant),

    #[error("journal error: {0}")]
    Database(String),
}

impl From<anyhow::Error> for JournalError {
    fn from(err: anyhow::Error) -> Self {
        Self::Database(err.to_string())
    }
}

#[derive(Debug, serde::Serialize)]
pub struct JournalStats {
    pub total_events: u64,
    pub unresolved_events: u64,
    pub high_severity_events: u64,
}

/// String-keyed journal entry as accepted at the service boundary.
#[derive(Debug, Clone)]
pub struct LogEventRequest {
    pub account_id: Option<String>,
    pub event_type: String,
    pub severity: String,
    pub description: Option<String>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub metadata: serde_json::Value,
}

pub struct SecurityService {
    store: Store,
    events_tx: broadcast::Sender<security_events::Model>,
}

impl SecurityService {
    #[must_use]
    pub const fn new(store: Store, events_tx: broadcast::Sender<security_events::Model>) -> Self {
        Self { store, events_tx }
    }

    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<security_events::Model> {
        self.events_tx.subscribe()
    }

    /// Parse the string-valued classification and append the entry.
    pub async fn log(&self, req: LogEventRequest) -> Result<(), JournalError> {
        let kind = EventKind::parse(&req.event_type)?;
        let severity = Severity::parse(&req.severity)?;

        self.append(NewSecurityEvent {
            account_id: req.account_id,
            kind,
            severity,
            ip_address: req.ip_address,
            user_agent: req.user_agent,
            description: req.description,
            metadata: req.metadata,
        })
        .await
    }

    pub async fn append(&self, event: NewSecurityEvent) -> Result<(), JournalError> {
        let stored = self.store.security_events().append(event).await?;
        // Nobody listening is fine; the journal row is already durable.
        let _ = self.events_tx.send(stored);
        Ok(())
    }

    pub async fn query(
        &self,
        filter: &EventFilter,
    ) -> Result<(Vec<security_events::Model>, u64), JournalError> {
        Ok(self.store.security_events().query(filter).await?)
    }

    /// Returns false when no event carries that id.
    pub async fn resolve(&self, event_id: &str) -> Result<bool, JournalError> {
        Ok(self.store.security_events().resolve(event_id).await?)
    }

    /// Aggregate counts, optionally scoped to one account.
    pub async fn stats(&self, account_id: Option<&str>) -> Result<JournalStats, JournalError> {
        let (total_events, unresolved_events, high_severity_events) =
            self.store.security_events().stats(account_id).await?;

        Ok(JournalStats {
            total_events,
            unresolved_events,
            high_severity_events,
        })
    }

    // ===== Convenience loggers =====
    //
    // Journal writes triggered as side effects of auth flows must never
    // fail the primary operation, so these swallow append errors after
    // logging them.

    async fn append_quietly(
        &self,
        account_id: Option<&str>,
        kind: EventKind,
        severity: Severity,
        description: String,
        client: &ClientInfo,
        metadata: serde_json::Value,
    ) {
        let event = NewSecurityEvent {
            account_id: account_id.map(str::to_string),
            kind,
            severity,
            ip_address: client.ip_address.clone(),
            user_agent: client.user_agent.clone(),
            description: Some(description),
            metadata,
        };

        if let Err(e) = self.append(event).await {
            warn!(kind = %kind, "Failed to record security event: {e}");
        }
    }

    pub async fn login_success(&self, account_id: &str, client: &ClientInfo) {
        self.append_quietly(
            Some(account_id),
            EventKind::LoginSuccess,
            Severity::Low,
            "User successfully logged in".to_string(),
            client,
            serde_json::json!({}),
        )
        .await;
    }

    pub async fn login_failed(
        &self,
        account_id: Option<&str>,
        identifier: &str,
        reason: &str,
        client: &ClientInfo,
    ) {
        self.append_quietly(
            account_id,
            EventKind::LoginFailed,
            Severity::Medium,
            format!("Login failed for {identifier}: {reason}"),
            client,
            serde_json::json!({}),
        )
        .await;
    }

    pub async fn password_changed(&self, account_id: &str, client: &ClientInfo) {
        self.append_quietly(
            Some(account_id),
            EventKind::PasswordChanged,
            Severity::Low,
            "User password changed".to_string(),
            client,
            serde_json::json!({}),
        )
        .await;
    }

    pub async fn password_reset_requested(&self, account_id: &str, client: &ClientInfo) {
        self.append_quietly(
            Some(account_id),
            EventKind::PasswordResetRequested,
            Severity::Low,
            "Password reset email sent".to_string(),
            client,
            serde_json::json!({}),
        )
        .await;
    }

    pub async fn password_reset_completed(&self, account_id: &str, client: &ClientInfo) {
        self.append_quietly(
            Some(account_id),
            EventKind::PasswordResetCompleted,
            Severity::Low,
            "Password reset completed".to_string(),
            client,
            serde_json::json!({}),
        )
        .await;
    }

    pub async fn email_verification_sent(&self, account_id: &str, client: &ClientInfo) {
        self.append_quietly(
            Some(account_id),
            EventKind::EmailVerificationSent,
            Severity::Low,
            "Email verification sent".to_string(),
            client,
            serde_json::json!({}),
        )
        .await;
    }

    pub async fn email_verification_completed(&self, account_id: &str, client: &ClientInfo) {
        self.append_quietly(
            Some(account_id),
            EventKind::EmailVerificationCompleted,
            Severity::Low,
            "Email verification completed".to_string(),
            client,
            serde_json::json!({}),
        )
        .await;
    }

    pub async fn account_locked(&self, account_id: &str, reason: &str, client: &ClientInfo) {
        self.append_quietly(
            Some(account_id),
            EventKind::AccountLocked,
            Severity::High,
            format!("Account locked: {reason}"),
            client,
            serde_json::json!({}),
        )
        .await;
    }

    pub async fn account_unlocked(&self, account_id: &str, unlocked_by: &str, client: &ClientInfo) {
        self.append_quietly(
            Some(account_id),
            EventKind::AccountUnlocked,
            Severity::Low,
            "Account unlocked by administrator".to_string(),
            client,
            serde_json::json!({ "unlocked_by": unlocked_by }),
        )
        .await;
    }

    pub async fn suspicious_activity(
        &self,
        account_id: Option<&str>,
        description: String,
        severity: Severity,
        client: &ClientInfo,
        metadata: serde_json::Value,
    ) {
        self.append_quietly(
            account_id,
            EventKind::SuspiciousActivity,
            severity,
            description,
            client,
            metadata,
        )
        .await;
    }

    pub async fn security_alert(
        &self,
        account_id: Option<&str>,
        description: String,
        severity: Severity,
        client: &ClientInfo,
    ) {
        self.append_quietly(
            account_id,
            EventKind::SecurityAlert,
            severity,
            description,
            client,
            serde_json::json!({}),
        )
        .await;
    }
}
