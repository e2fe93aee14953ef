//! Out-of-band delivery of codes and approval links.

use async_trait::async_trait;
use lettre::{
    message::header::ContentType, transport::smtp::authentication::Credentials, Message,
    SmtpTransport, Transport,
};
use service_core::error::AppError;
use std::sync::Mutex;
use std::time::Duration;

use crate::config::SmtpConfig;
use crate::models::Target;

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, to: &Target, subject: &str, body: &str) -> Result<(), AppError>;
}

/// SMTP delivery through lettre.
#[derive(Clone)]
pub struct EmailNotifier {
    mailer: SmtpTransport,
    from_email: String,
}

impl EmailNotifier {
    pub fn new(config: &SmtpConfig) -> Result<Self, AppError> {
        let mailer = match (&config.user, &config.password) {
            (Some(user), Some(password)) => SmtpTransport::relay(&config.host)
                .map_err(|e| AppError::ConfigError(anyhow::anyhow!(e)))?
                .credentials(Credentials::new(user.clone(), password.clone()))
                .port(config.port)
                .timeout(Some(Duration::from_secs(10)))
                .build(),
            // Unauthenticated plain SMTP, e.g. a local MailHog.
            _ => SmtpTransport::builder_dangerous(&config.host)
                .port(config.port)
                .timeout(Some(Duration::from_secs(10)))
                .build(),
        };

        tracing::info!(host = %config.host, port = config.port, "Email notifier initialized");

        Ok(Self {
            mailer,
            from_email: config.from.clone(),
        })
    }
}

#[async_trait]
impl Notifier for EmailNotifier {
    async fn send(&self, to: &Target, subject: &str, body: &str) -> Result<(), AppError> {
        let Target::Email(to_email) = to else {
            tracing::warn!(to = %to, subject, "No SMS channel configured; message not delivered");
            return Ok(());
        };

        let email = Message::builder()
            .from(
                self.from_email
                    .parse()
                    .map_err(|e: lettre::address::AddressError| AppError::EmailError(e.to_string()))?,
            )
            .to(to_email
                .parse()
                .map_err(|e: lettre::address::AddressError| AppError::EmailError(e.to_string()))?)
            .subject(subject)
            .header(ContentType::TEXT_PLAIN)
            .body(body.to_string())
            .map_err(|e| AppError::EmailError(e.to_string()))?;

        // SmtpTransport is blocking
        let mailer = self.mailer.clone();
        let result = tokio::task::spawn_blocking(move || mailer.send(&email))
            .await
            .map_err(|e| AppError::InternalError(e.into()))?;

        match result {
            Ok(_) => {
                tracing::info!(to = %to_email, subject, "Email sent successfully");
                Ok(())
            }
            Err(e) => {
                tracing::error!(error = %e, to = %to_email, "Failed to send email");
                Err(AppError::EmailError(e.to_string()))
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMessage {
    pub to: String,
    pub subject: String,
    pub body: String,
}

/// Records messages instead of sending them.
#[derive(Default)]
pub struct MockNotifier {
    sent: Mutex<Vec<SentMessage>>,
    fail: bool,
}

impl MockNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// A notifier whose every send fails.
    pub fn failing() -> Self {
        Self {
            sent: Mutex::default(),
            fail: true,
        }
    }

    pub fn messages(&self) -> Vec<SentMessage> {
        self.sent.lock().map(|m| m.clone()).unwrap_or_default()
    }

    pub fn messages_to(&self, to: &str) -> Vec<SentMessage> {
        self.messages().into_iter().filter(|m| m.to == to).collect()
    }

    /// First six-digit run in the latest message to `to`.
    pub fn last_code_for(&self, to: &str) -> Option<String> {
        let message = self.messages_to(to).pop()?;
        message
            .body
            .split(|c: char| !c.is_ascii_digit())
            .find(|run| run.len() == 6)
            .map(str::to_string)
    }

    /// Value of the `token` query parameter in the latest message to `to`.
    pub fn last_link_token_for(&self, to: &str) -> Option<String> {
        let message = self.messages_to(to).pop()?;
        let start = message.body.find("token=")? + "token=".len();
        let token: String = message.body[start..]
            .chars()
            .take_while(|c| !c.is_whitespace())
            .collect();
        Some(token)
    }
}

#[async_trait]
impl Notifier for MockNotifier {
    async fn send(&self, to: &Target, subject: &str, body: &str) -> Result<(), AppError> {
        if self.fail {
            return Err(AppError::EmailError("mock delivery failure".to_string()));
        }
        let mut sent = self
            .sent
            .lock()
            .map_err(|e| AppError::InternalError(anyhow::anyhow!("{}", e)))?;
        sent.push(SentMessage {
            to: to.as_str().to_string(),
            subject: subject.to_string(),
            body: body.to_string(),
        });
        Ok(())
    }
}

pub mod templates {
    pub fn verification_code(code: &str, ttl_minutes: i64) -> (&'static str, String) {
        (
            "Verification Code",
            format!(
                "Your verification code is {}.\n\nIt expires in {} minutes. If you did not request it, ignore this message.",
                code, ttl_minutes
            ),
        )
    }

    pub fn admin_verification_code(code: &str, ttl_minutes: i64) -> (&'static str, String) {
        (
            "Admin Access Verification",
            format!(
                "Your admin access verification code is {}.\n\nIt expires in {} minutes.",
                code, ttl_minutes
            ),
        )
    }

    pub fn password_reset_code(code: &str, ttl_minutes: i64) -> (&'static str, String) {
        (
            "Password Reset Request",
            format!(
                "Use code {} to reset your password.\n\nIt expires in {} minutes. If you did not request a reset, your password is unchanged.",
                code, ttl_minutes
            ),
        )
    }

    pub fn approval_request(email: &str, link: &str) -> (&'static str, String) {
        (
            "[ACTION REQUIRED] New Admin Access Request",
            format!(
                "{} has requested admin access.\n\nApprove the request:\n{}\n\nThe link is valid for 7 days.",
                email, link
            ),
        )
    }

    pub fn access_approved() -> (&'static str, String) {
        (
            "Admin Access Approved",
            "Your admin access request has been approved. Verify your e-mail again to sign in."
                .to_string(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_extracts_code_and_token() {
        let notifier = MockNotifier::new();
        let to = Target::parse("a@x.com").unwrap();

        let (subject, body) = templates::verification_code("042137", 10);
        notifier.send(&to, subject, &body).await.unwrap();
        assert_eq!(notifier.last_code_for("a@x.com").as_deref(), Some("042137"));

        let (subject, body) =
            templates::approval_request("a@x.com", "http://h/auth/admin/approve-magic?token=abc.def");
        notifier.send(&to, subject, &body).await.unwrap();
        assert_eq!(notifier.last_link_token_for("a@x.com").as_deref(), Some("abc.def"));
        assert_eq!(notifier.messages().len(), 2);
    }

    #[tokio::test]
    async fn test_failing_mock() {
        let notifier = MockNotifier::failing();
        let to = Target::parse("a@x.com").unwrap();
        assert!(notifier.send(&to, "s", "b").await.is_err());
        assert!(notifier.messages().is_empty());
    }
}
