/// Transactional email
///
/// [`Mailer`] renders the account emails (verification, password reset,
/// invitation) and hands them to a [`MailTransport`]. Handlers call
/// [`Mailer::send_in_background`]: the send runs on a spawned task and a
/// failure is logged, never returned to the client.
///
/// # Transports
///
/// - [`HttpTransport`]: JSON `POST {from, to, subject, text}` with an
///   optional bearer key, for providers with a simple send endpoint
/// - [`LogTransport`]: writes the email to the log (used when no mail API
///   is configured)
/// - [`RecordingTransport`]: keeps sent emails in memory for tests

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use std::{sync::Arc, time::Duration};
use tokio::sync::Mutex;

use crate::config::MailConfig;

#[derive(Debug, thiserror::Error)]
pub enum MailError {
    #[error("Mail request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Mail API rejected the message ({status}): {body}")]
    Rejected { status: u16, body: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Email {
    pub to: String,
    pub subject: String,
    pub text: String,
}

impl Email {
    pub fn verification(to: &str, name: &str, link: &str) -> Self {
        Self {
            to: to.to_string(),
            subject: "Verify your TenantDesk email".to_string(),
            text: format!(
                "Hi {},\n\nConfirm your email address by opening this link:\n\n{}\n\nThe link expires in 48 hours.\n",
                name, link
            ),
        }
    }

    pub fn password_reset(to: &str, name: &str, link: &str) -> Self {
        Self {
            to: to.to_string(),
            subject: "Reset your TenantDesk password".to_string(),
            text: format!(
                "Hi {},\n\nSomeone asked to reset your password. If it was you, open this link:\n\n{}\n\nThe link expires in 1 hour. If you did not ask for this, ignore this email.\n",
                name, link
            ),
        }
    }

    pub fn invitation(to: &str, tenant_name: &str, inviter: &str, role: &str, link: &str) -> Self {
        Self {
            to: to.to_string(),
            subject: format!("You are invited to {} on TenantDesk", tenant_name),
            text: format!(
                "{} invited you to join {} as {}.\n\nAccept the invitation here:\n\n{}\n\nThe invitation expires in 7 days.\n",
                inviter, tenant_name, role, link
            ),
        }
    }
}

/// Delivers a rendered email
#[async_trait]
pub trait MailTransport: Send + Sync {
    fn name(&self) -> &str;

    async fn send(&self, from: &str, email: &Email) -> Result<(), MailError>;
}

pub struct HttpTransport {
    client: Client,
    url: String,
    api_key: Option<String>,
}

impl HttpTransport {
    pub fn new(url: impl Into<String>, api_key: Option<String>) -> Result<Self, MailError> {
        let client = Client::builder().timeout(Duration::from_secs(10)).build()?;
        Ok(Self {
            client,
            url: url.into(),
            api_key,
        })
    }
}

#[derive(Serialize)]
struct OutboundMessage<'a> {
    from: &'a str,
    to: &'a str,
    subject: &'a str,
    text: &'a str,
}

#[async_trait]
impl MailTransport for HttpTransport {
    fn name(&self) -> &str {
        "http"
    }

    async fn send(&self, from: &str, email: &Email) -> Result<(), MailError> {
        let mut request = self.client.post(&self.url).json(&OutboundMessage {
            from,
            to: &email.to,
            subject: &email.subject,
            text: &email.text,
        });
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(MailError::Rejected { status, body });
        }

        Ok(())
    }
}

pub struct LogTransport;

#[async_trait]
impl MailTransport for LogTransport {
    fn name(&self) -> &str {
        "log"
    }

    async fn send(&self, from: &str, email: &Email) -> Result<(), MailError> {
        tracing::info!(
            from = %from,
            to = %email.to,
            subject = %email.subject,
            "Mail API not configured; email body:\n{}",
            email.text
        );
        Ok(())
    }
}

/// In-memory transport for tests
#[derive(Default)]
pub struct RecordingTransport {
    sent: Mutex<Vec<Email>>,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn sent(&self) -> Vec<Email> {
        self.sent.lock().await.clone()
    }

    /// Latest email to `to`, polling briefly for background sends
    pub async fn wait_for(&self, to: &str) -> Option<Email> {
        for _ in 0..50 {
            if let Some(email) = self.sent.lock().await.iter().rev().find(|e| e.to == to) {
                return Some(email.clone());
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        None
    }
}

#[async_trait]
impl MailTransport for RecordingTransport {
    fn name(&self) -> &str {
        "recording"
    }

    async fn send(&self, _from: &str, email: &Email) -> Result<(), MailError> {
        self.sent.lock().await.push(email.clone());
        Ok(())
    }
}

#[derive(Clone)]
pub struct Mailer {
    transport: Arc<dyn MailTransport>,
    from: String,
}

impl Mailer {
    pub fn new(transport: Arc<dyn MailTransport>, from: impl Into<String>) -> Self {
        Self {
            transport,
            from: from.into(),
        }
    }

    /// HTTP transport when `MAIL_API_URL` is set, log transport otherwise
    pub fn from_config(config: &MailConfig) -> Result<Self, MailError> {
        let transport: Arc<dyn MailTransport> = match &config.api_url {
            Some(url) => Arc::new(HttpTransport::new(url.clone(), config.api_key.clone())?),
            None => Arc::new(LogTransport),
        };
        Ok(Self::new(transport, config.from.clone()))
    }

    pub async fn send(&self, email: &Email) -> Result<(), MailError> {
        self.transport.send(&self.from, email).await
    }

    /// Sends on a spawned task; failures are logged
    pub fn send_in_background(&self, email: Email) {
        let mailer = self.clone();
        tokio::spawn(async move {
            match mailer.send(&email).await {
                Ok(()) => tracing::debug!(
                    transport = mailer.transport.name(),
                    to = %email.to,
                    subject = %email.subject,
                    "Email sent"
                ),
                Err(e) => tracing::warn!(
                    transport = mailer.transport.name(),
                    to = %email.to,
                    error = %e,
                    "Failed to send email"
                ),
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_background_send_reaches_transport() {
        let transport = Arc::new(RecordingTransport::new());
        let mailer = Mailer::new(transport.clone(), "TenantDesk <no-reply@test>");

        mailer.send_in_background(Email::verification(
            "ada@example.com",
            "Ada",
            "https://app.example/verify-email?token=tdv_x",
        ));

        let email = transport.wait_for("ada@example.com").await.expect("email recorded");
        assert!(email.text.contains("tdv_x"));
        assert_eq!(transport.sent().await.len(), 1);
    }

    #[test]
    fn test_invitation_email_names_tenant_and_role() {
        let email = Email::invitation("bo@example.com", "Acme", "Ada", "admin", "https://x/accept");
        assert!(email.subject.contains("Acme"));
        assert!(email.text.contains("as admin"));
    }

    #[test]
    fn test_from_config_without_url_uses_log_transport() {
        let mailer = Mailer::from_config(&MailConfig {
            api_url: None,
            api_key: None,
            from: "x@y".to_string(),
        })
        .unwrap();
        assert_eq!(mailer.transport.name(), "log");
    }
}
