//! Email delivery port.
//!
//! The core hands accounts and tokens to a [`Mailer`]; rendering and
//! transport are the implementation's concern. [`SmtpMailer`] delivers over
//! SMTP, [`CaptureMailer`] records calls for inspection in tests and
//! development mode.

use async_trait::async_trait;
use thiserror::Error;

use crate::entities::accounts;

mod capture;
mod smtp;

pub use capture::{CaptureMailer, SentEmail, SentEmailKind};
pub use smtp::SmtpMailer;

#[derive(Debug, Error)]
pub enum MailError {
    #[error("invalid email address: {0}")]
    Address(String),

    #[error("failed to build message: {0}")]
    Build(String),

    #[error("failed to send message: {0}")]
    Transport(String),

    #[error("mail task panicked")]
    TaskFailed,
}

#[async_trait]
pub trait Mailer: Send + Sync {
    /// Deliver the verification challenge for a freshly registered or
    /// still-unverified account.
    async fn send_verification(
        &self,
        account: &accounts::Model,
        token: &str,
    ) -> Result<(), MailError>;

    /// Deliver the password-reset challenge.
    async fn send_password_reset(
        &self,
        account: &accounts::Model,
        token: &str,
    ) -> Result<(), MailError>;

    /// Greet an account whose email just got verified. Best-effort.
    async fn send_welcome(&self, account: &accounts::Model) -> Result<(), MailError>;

    /// Notify an account that its password changed. Best-effort.
    async fn send_password_changed(&self, account: &accounts::Model) -> Result<(), MailError>;
}
