use anyhow::{Context, Error, Result};
use async_trait::async_trait;
use lettre::{
    AsyncSmtpTransport, AsyncTransport, Message as Email, Tokio1Executor,
    message::{Mailbox, header::ContentType},
    transport::smtp::authentication::Credentials,
};
use tracing::{debug, info};

use crate::{config::SmtpConfig, error::SendError, models::validation::validate_email};

/// Capability to deliver one email. Implementations classify failures so the
/// caller can tell a bad address from a flaky provider.
#[async_trait]
pub trait EmailSender: Send + Sync {
    async fn send(&self, recipient: &str, body: &str, subject: &str) -> Result<(), SendError>;
}

pub struct SmtpEmailSender {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpEmailSender {
    pub fn new(config: &SmtpConfig) -> Result<Self, Error> {
        let from = config
            .from_email
            .parse::<Mailbox>()
            .context("FROM_EMAIL is not a valid mailbox")?;

        let mut builder = if config.smtp_starttls {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.smtp_host)
                .context("Failed to configure SMTP relay")?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.smtp_host)
        };

        builder = builder.port(config.smtp_port);

        if let (Some(username), Some(password)) = (&config.smtp_username, &config.smtp_password) {
            builder = builder.credentials(Credentials::new(username.clone(), password.clone()));
        }

        info!(
            host = %config.smtp_host,
            port = config.smtp_port,
            starttls = config.smtp_starttls,
            "SMTP sender initialized"
        );

        Ok(Self {
            transport: builder.build(),
            from,
        })
    }
}

#[async_trait]
impl EmailSender for SmtpEmailSender {
    async fn send(&self, recipient: &str, body: &str, subject: &str) -> Result<(), SendError> {
        let to = validate_email(recipient)?;

        let email = Email::builder()
            .from(self.from.clone())
            .to(to)
            .subject(subject)
            .header(ContentType::TEXT_PLAIN)
            .body(body.to_string())
            .map_err(|e| SendError::Transient(format!("Failed to build email: {}", e)))?;

        self.transport
            .send(email)
            .await
            .map_err(|e| SendError::Transient(e.to_string()))?;

        debug!(recipient, "Email handed to SMTP relay");

        Ok(())
    }
}
