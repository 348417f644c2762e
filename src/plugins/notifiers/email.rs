use async_trait::async_trait;
use lettre::message::{header, Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use tracing::{debug, error};

use crate::config::SmtpConfig;
use crate::core::DigestMessage;
use crate::plugins::traits::{NotificationResult, NotifierPlugin};
use crate::utils::error::{AppError, Result};

/// Resolved SMTP settings; every field the transport needs is present.
#[derive(Debug, Clone)]
pub struct EmailConfig {
    pub smtp_host: String,
    pub smtp_port: u16,
    pub username: String,
    pub password: String,
    pub from_address: String,
    pub to_address: String,
    pub use_starttls: bool,
}

impl EmailConfig {
    pub fn from_settings(settings: &SmtpConfig) -> Result<Self> {
        let required = |value: &Option<String>, field: &str| -> Result<String> {
            value
                .as_deref()
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
                .ok_or_else(|| AppError::Notification(format!("Missing email setting: {}", field)))
        };

        let username = required(&settings.username, "username")?;
        let from_address = settings
            .from_address
            .as_deref()
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| username.clone());

        Ok(EmailConfig {
            smtp_host: required(&settings.host, "host")?,
            smtp_port: settings.port,
            password: settings.password.clone().unwrap_or_default(),
            username,
            from_address,
            to_address: required(&settings.to_address, "to_address")?,
            use_starttls: settings.use_starttls,
        })
    }
}

pub struct EmailNotifier {
    config: EmailConfig,
    transport: AsyncSmtpTransport<Tokio1Executor>,
}

impl EmailNotifier {
    pub fn new(config: EmailConfig) -> Result<Self> {
        let builder = if config.use_starttls {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.smtp_host)
                .map_err(|e| AppError::Notification(format!("Invalid SMTP relay {}: {}", config.smtp_host, e)))?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.smtp_host)
        };

        let transport = builder
            .port(config.smtp_port)
            .credentials(Credentials::new(config.username.clone(), config.password.clone()))
            .build();

        Ok(Self { config, transport })
    }

    pub fn from_config(settings: &SmtpConfig) -> Result<Self> {
        Self::new(EmailConfig::from_settings(settings)?)
    }

    pub fn config(&self) -> &EmailConfig {
        &self.config
    }

    fn mailbox(address: &str) -> Result<Mailbox> {
        address
            .parse()
            .map_err(|e| AppError::Notification(format!("Invalid email address {}: {}", address, e)))
    }

    /// Multipart/alternative message carrying both digest bodies.
    pub fn build_message(&self, digest: &DigestMessage) -> Result<Message> {
        Message::builder()
            .from(Self::mailbox(&self.config.from_address)?)
            .to(Self::mailbox(&self.config.to_address)?)
            .subject(digest.subject.clone())
            .multipart(
                MultiPart::alternative()
                    .singlepart(
                        SinglePart::builder()
                            .header(header::ContentType::TEXT_PLAIN)
                            .body(digest.text_body.clone()),
                    )
                    .singlepart(
                        SinglePart::builder()
                            .header(header::ContentType::TEXT_HTML)
                            .body(digest.html_body.clone()),
                    ),
            )
            .map_err(|e| AppError::Notification(format!("Failed to build email: {}", e)))
    }
}

#[async_trait]
impl NotifierPlugin for EmailNotifier {
    fn name(&self) -> &str {
        "Email Notifier"
    }

    fn plugin_type(&self) -> &str {
        "email"
    }

    fn description(&self) -> &str {
        "Sends change digests by SMTP"
    }

    async fn send(&self, message: &DigestMessage) -> Result<NotificationResult> {
        let email = self.build_message(message)?;

        match self.transport.send(email).await {
            Ok(response) => {
                debug!(to = %self.config.to_address, "Email digest accepted");
                Ok(NotificationResult::sent(response.first_line().map(str::to_string)))
            }
            Err(e) => {
                error!(host = %self.config.smtp_host, error = %e, "Failed to send email digest");
                Ok(NotificationResult::failed(format!("Failed to send email: {}", e)))
            }
        }
    }
}
