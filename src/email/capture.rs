//! Capture-only mailer used in tests and development mode.

use async_trait::async_trait;
use std::sync::Mutex;

use super::{MailError, Mailer};
use crate::entities::accounts;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SentEmailKind {
    Verification,
    PasswordReset,
    Welcome,
    PasswordChanged,
}

#[derive(Debug, Clone)]
pub struct SentEmail {
    pub kind: SentEmailKind,
    pub to: String,
    pub token: Option<String>,
}

/// Records every delivery request in order instead of dispatching it.
#[derive(Default)]
pub struct CaptureMailer {
    sent: Mutex<Vec<SentEmail>>,
}

impl CaptureMailer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn record(&self, kind: SentEmailKind, to: &str, token: Option<&str>) {
        self.sent.lock().expect("capture mailer poisoned").push(SentEmail {
            kind,
            to: to.to_string(),
            token: token.map(str::to_string),
        });
    }

    /// Snapshot of everything sent so far, oldest first.
    #[must_use]
    pub fn sent(&self) -> Vec<SentEmail> {
        self.sent.lock().expect("capture mailer poisoned").clone()
    }

    #[must_use]
    pub fn count(&self) -> usize {
        self.sent.lock().expect("capture mailer poisoned").len()
    }

    /// Most recent captured token of the given kind, if any.
    #[must_use]
    pub fn last_token(&self, kind: SentEmailKind) -> Option<String> {
        self.sent
            .lock()
            .expect("capture mailer poisoned")
            .iter()
            .rev()
            .find(|mail| mail.kind == kind)
            .and_then(|mail| mail.token.clone())
    }
}

#[async_trait]
impl Mailer for CaptureMailer {
    async fn send_verification(
        &self,
        account: &accounts::Model,
        token: &str,
    ) -> Result<(), MailError> {
        self.record(SentEmailKind::Verification, &account.email, Some(token));
        Ok(())
    }

    async fn send_password_reset(
        &self,
        account: &accounts::Model,
        token: &str,
    ) -> Result<(), MailError> {
        self.record(SentEmailKind::PasswordReset, &account.email, Some(token));
        Ok(())
    }

    async fn send_welcome(&self, account: &accounts::Model) -> Result<(), MailError> {
        self.record(SentEmailKind::Welcome, &account.email, None);
        Ok(())
    }

    async fn send_password_changed(&self, account: &accounts::Model) -> Result<(), MailError> {
        self.record(SentEmailKind::PasswordChanged, &account.email, None);
        Ok(())
    }
}
