//! SMTP mailer backed by Lettre.

use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};

use super::{MailError, Mailer};
use crate::config::EmailConfig;
use crate::entities::accounts;

pub struct SmtpMailer {
    host: String,
    port: u16,
    credentials: Credentials,
    from_address: String,
    from_name: String,
    base_url: String,
    app_name: String,
    support_email: String,
}

impl SmtpMailer {
    #[must_use]
    pub fn new(config: &EmailConfig) -> Self {
        Self {
            host: config.smtp_host.clone(),
            port: config.smtp_port,
            credentials: Credentials::new(
                config.smtp_username.clone(),
                config.smtp_password.clone(),
            ),
            from_address: config.from_address.clone(),
            from_name: config.from_name.clone(),
            base_url: config.base_url.clone(),
            app_name: config.app_name.clone(),
            support_email: config.support_email.clone(),
        }
    }

    /// Probe the relay without sending anything. Best-effort at startup.
    pub async fn test_connection(&self) -> Result<(), MailError> {
        let transport = self.build_transport()?;
        tokio::task::spawn_blocking(move || {
            transport
                .test_connection()
                .map_err(|e| MailError::Transport(e.to_string()))
                .and_then(|ok| {
                    if ok {
                        Ok(())
                    } else {
                        Err(MailError::Transport("relay refused connection".to_string()))
                    }
                })
        })
        .await
        .map_err(|_| MailError::TaskFailed)?
    }

    fn build_transport(&self) -> Result<SmtpTransport, MailError> {
        Ok(SmtpTransport::relay(&self.host)
            .map_err(|e| MailError::Transport(e.to_string()))?
            .port(self.port)
            .credentials(self.credentials.clone())
            .build())
    }

    fn greeting_name(account: &accounts::Model) -> &str {
        if account.first_name.is_empty() {
            &account.username
        } else {
            &account.first_name
        }
    }

    async fn deliver(&self, to: &str, subject: &str, html_body: String) -> Result<(), MailError> {
        let message = Message::builder()
            .from(
                format!("{} <{}>", self.from_name, self.from_address)
                    .parse()
                    .map_err(|e| MailError::Address(format!("invalid from address: {e}")))?,
            )
            .to(to
                .parse()
                .map_err(|e| MailError::Address(format!("invalid to address: {e}")))?)
            .subject(subject)
            .header(ContentType::TEXT_HTML)
            .body(html_body)
            .map_err(|e| MailError::Build(e.to_string()))?;

        let transport = self.build_transport()?;

        // Lettre's blocking transport; the handshake would stall the
        // runtime if run inline.
        tokio::task::spawn_blocking(move || {
            transport
                .send(&message)
                .map(|_| ())
                .map_err(|e| MailError::Transport(e.to_string()))
        })
        .await
        .map_err(|_| MailError::TaskFailed)?
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send_verification(
        &self,
        account: &accounts::Model,
        token: &str,
    ) -> Result<(), MailError> {
        let verification_url = format!("{}/verify-email?token={token}", self.base_url);
        let subject = format!("Verify your {} account", self.app_name);
        let body = format!(
            r#"
<!DOCTYPE html>
<html>
<body style="font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, sans-serif; line-height: 1.6; color: #333;">
    <div style="max-width: 600px; margin: 0 auto; padding: 20px;">
        <h2>Welcome to {app_name}!</h2>
        <p>Hi {name},</p>
        <p>Thank you for signing up. Please verify your email address by clicking the link below:</p>
        <p style="margin: 30px 0;">
            <a href="{verification_url}"
               style="display: inline-block; background-color: #007bff; color: white; padding: 12px 24px; text-decoration: none; border-radius: 5px;">
                Verify Email Address
            </a>
        </p>
        <p style="color: #666; font-size: 14px;">
            This link expires in 24 hours. If you didn't create an account
            with {app_name}, you can safely ignore this email.
        </p>
        <p style="color: #666; font-size: 12px;">
            Or copy and paste this link into your browser:<br>{verification_url}
        </p>
        <p style="color: #666; font-size: 14px;">
            Questions? Contact us at {support_email}.
        </p>
    </div>
</body>
</html>
"#,
            app_name = self.app_name,
            name = Self::greeting_name(account),
            support_email = self.support_email,
        );

        self.deliver(&account.email, &subject, body).await
    }

    async fn send_password_reset(
        &self,
        account: &accounts::Model,
        token: &str,
    ) -> Result<(), MailError> {
        let reset_url = format!("{}/reset-password?token={token}", self.base_url);
        let subject = format!("Reset your {} password", self.app_name);
        let body = format!(
            r#"
<!DOCTYPE html>
<html>
<body style="font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, sans-serif; line-height: 1.6; color: #333;">
    <div style="max-width: 600px; margin: 0 auto; padding: 20px;">
        <h2>Password Reset Request</h2>
        <p>Hi {name},</p>
        <p>We received a request to reset the password for your {app_name} account.</p>
        <p style="margin: 30px 0;">
            <a href="{reset_url}"
               style="display: inline-block; background-color: #dc3545; color: white; padding: 12px 24px; text-decoration: none; border-radius: 5px;">
                Reset Password
            </a>
        </p>
        <p style="color: #666; font-size: 14px;">
            This link expires in 1 hour. If you didn't request a password
            reset, please ignore this email; your password will remain
            unchanged.
        </p>
        <p style="color: #666; font-size: 12px;">
            Or copy and paste this link into your browser:<br>{reset_url}
        </p>
    </div>
</body>
</html>
"#,
            app_name = self.app_name,
            name = Self::greeting_name(account),
        );

        self.deliver(&account.email, &subject, body).await
    }

    async fn send_welcome(&self, account: &accounts::Model) -> Result<(), MailError> {
        let subject = format!("Welcome to {}!", self.app_name);
        let body = format!(
            r#"
<!DOCTYPE html>
<html>
<body style="font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, sans-serif; line-height: 1.6; color: #333;">
    <div style="max-width: 600px; margin: 0 auto; padding: 20px;">
        <h2>Your account is ready</h2>
        <p>Hi {name},</p>
        <p>Your email has been verified and your {app_name} account is ready to use.</p>
        <p style="margin: 30px 0;">
            <a href="{base_url}"
               style="display: inline-block; background-color: #28a745; color: white; padding: 12px 24px; text-decoration: none; border-radius: 5px;">
                Start Using {app_name}
            </a>
        </p>
        <p style="color: #666; font-size: 14px;">
            Need help? Contact us at {support_email}.
        </p>
    </div>
</body>
</html>
"#,
            app_name = self.app_name,
            name = Self::greeting_name(account),
            base_url = self.base_url,
            support_email = self.support_email,
        );

        self.deliver(&account.email, &subject, body).await
    }

    async fn send_password_changed(&self, account: &accounts::Model) -> Result<(), MailError> {
        let subject = format!("Your {} password has been changed", self.app_name);
        let body = format!(
            r#"
<!DOCTYPE html>
<html>
<body style="font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, sans-serif; line-height: 1.6; color: #333;">
    <div style="max-width: 600px; margin: 0 auto; padding: 20px;">
        <h2>Password Changed</h2>
        <p>Hi {name},</p>
        <p>This confirms that your {app_name} account password was changed.</p>
        <p style="background-color: #fff3cd; border: 1px solid #ffeaa7; padding: 15px; border-radius: 5px;">
            If you didn't make this change, contact our support team
            immediately at {support_email}.
        </p>
    </div>
</body>
</html>
"#,
            app_name = self.app_name,
            name = Self::greeting_name(account),
            support_email = self.support_email,
        );

        self.deliver(&account.email, &subject, body).await
    }
}
