//! Email delivery for quotes and operator alerts.
//!
//! Providers:
//! - `console`: logs the message (development)
//! - `sendgrid`: SendGrid v3 mail API

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info};

use domain::models::{ChannelKind, NotificationRecord};
use domain::services::{
    ChannelError, DeliveryError, MessageSender, NotificationChannel, OutboundMessage,
};

use crate::config::EmailConfig;

const SENDGRID_URL: &str = "https://api.sendgrid.com/v3/mail/send";

#[derive(Debug, Error)]
pub enum EmailError {
    #[error("Email service disabled")]
    Disabled,

    #[error("Unknown email provider: {0}")]
    UnknownProvider(String),

    #[error("Failed to send email: {0}")]
    SendFailed(String),

    #[error("Provider returned {status}: {body}")]
    ProviderError { status: u16, body: String },

    #[error("Failed to build HTTP client: {0}")]
    Client(String),
}

impl EmailError {
    /// Network failures, throttling and provider outages are worth retrying.
    pub fn is_transient(&self) -> bool {
        match self {
            EmailError::SendFailed(_) => true,
            EmailError::ProviderError { status, .. } => {
                *status == StatusCode::TOO_MANY_REQUESTS.as_u16() || *status >= 500
            }
            _ => false,
        }
    }
}

impl From<EmailError> for DeliveryError {
    fn from(err: EmailError) -> Self {
        if err.is_transient() {
            DeliveryError::Transient(err.to_string())
        } else {
            DeliveryError::Rejected(err.to_string())
        }
    }
}

#[derive(Debug, Clone)]
pub struct EmailMessage {
    pub to: String,
    pub subject: String,
    pub body_text: String,
}

/// Transactional email sender.
#[derive(Clone)]
pub struct EmailService {
    config: Arc<EmailConfig>,
    client: Client,
}

impl EmailService {
    pub fn new(config: EmailConfig) -> Result<Self, EmailError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| EmailError::Client(e.to_string()))?;
        Ok(Self {
            config: Arc::new(config),
            client,
        })
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    pub async fn send_email(&self, message: &EmailMessage) -> Result<(), EmailError> {
        if !self.config.enabled {
            debug!(to = %message.to, subject = %message.subject, "Email disabled, not sending");
            return Err(EmailError::Disabled);
        }

        match self.config.provider.as_str() {
            "console" => {
                info!(
                    provider = "console",
                    to = %message.to,
                    subject = %message.subject,
                    body_len = message.body_text.len(),
                    "Email sent"
                );
                Ok(())
            }
            "sendgrid" => self.send_sendgrid(message).await,
            other => Err(EmailError::UnknownProvider(other.to_string())),
        }
    }

    async fn send_sendgrid(&self, message: &EmailMessage) -> Result<(), EmailError> {
        let body = json!({
            "personalizations": [{ "to": [{ "email": message.to }] }],
            "from": {
                "email": self.config.sender_email,
                "name": self.config.sender_name,
            },
            "subject": message.subject,
            "content": [{ "type": "text/plain", "value": message.body_text }],
        });

        let response = self
            .client
            .post(SENDGRID_URL)
            .bearer_auth(&self.config.sendgrid_api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| EmailError::SendFailed(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            info!(provider = "sendgrid", to = %message.to, subject = %message.subject, "Email sent");
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        error!(status = %status, error = %body, "SendGrid API error");
        Err(EmailError::ProviderError {
            status: status.as_u16(),
            body,
        })
    }
}

#[async_trait]
impl MessageSender for EmailService {
    async fn send(&self, message: &OutboundMessage) -> Result<(), DeliveryError> {
        let email = EmailMessage {
            to: message.to.clone(),
            subject: message.subject.clone(),
            body_text: message.body.clone(),
        };
        self.send_email(&email).await.map_err(DeliveryError::from)
    }
}

/// Operator alerts by email to the configured recipients.
pub struct EmailAlertChannel {
    email: EmailService,
    recipients: Vec<String>,
}

impl EmailAlertChannel {
    pub fn new(email: EmailService, recipients: Vec<String>) -> Self {
        Self { email, recipients }
    }

    fn render(record: &NotificationRecord) -> EmailMessage {
        let mut body = format!(
            "{}\n\nSeverity: {}\nKind: {}\nSource: {}\nTime: {}\n",
            record.message,
            record.severity,
            record.kind,
            record.source,
            record.timestamp.to_rfc3339(),
        );
        if let Some(error) = &record.error {
            body.push_str(&format!("\nError {}: {}\n", error.code, error.message));
            if let Some(detail) = &error.detail {
                body.push_str(&format!("{}\n", detail));
            }
        }
        if let Some(context) = &record.context {
            for (key, value) in context {
                body.push_str(&format!("{}: {}\n", key, value));
            }
        }

        EmailMessage {
            to: String::new(),
            subject: format!(
                "[Quote Desk {}] {}",
                record.severity.as_str().to_uppercase(),
                record.title
            ),
            body_text: body,
        }
    }
}

#[async_trait]
impl NotificationChannel for EmailAlertChannel {
    fn kind(&self) -> ChannelKind {
        ChannelKind::Email
    }

    async fn deliver(&self, record: &NotificationRecord) -> Result<(), ChannelError> {
        if self.recipients.is_empty() {
            return Err(ChannelError::NotConfigured(
                "no email recipients configured".to_string(),
            ));
        }

        let template = Self::render(record);
        let mut failures = Vec::new();
        for recipient in &self.recipients {
            let message = EmailMessage {
                to: recipient.clone(),
                ..template.clone()
            };
            if let Err(e) = self.email.send_email(&message).await {
                failures.push(format!("{}: {}", recipient, e));
            }
        }

        match failures.len() {
            0 => Ok(()),
            n if n == self.recipients.len() => Err(ChannelError::Unavailable(failures.join("; "))),
            _ => Err(ChannelError::Rejected(failures.join("; "))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use domain::models::{NotificationError, NotificationKind, Severity};
    use uuid::Uuid;

    fn config(enabled: bool) -> EmailConfig {
        EmailConfig {
            enabled,
            ..EmailConfig::default()
        }
    }

    fn record() -> NotificationRecord {
        NotificationRecord {
            id: Uuid::new_v4(),
            kind: NotificationKind::Error,
            title: "Template chain exhausted".to_string(),
            message: "No template for erp".to_string(),
            severity: Severity::Critical,
            timestamp: Utc::now(),
            source: "template_resolution".to_string(),
            error: Some(NotificationError {
                code: "fallback_chain_exhausted".to_string(),
                message: "exhausted".to_string(),
                detail: None,
            }),
            context: None,
        }
    }

    #[tokio::test]
    async fn test_console_provider_sends() {
        let service = EmailService::new(config(true)).unwrap();
        let message = OutboundMessage {
            to: "buyer@example.com".to_string(),
            subject: "Your quote".to_string(),
            body: "Hello".to_string(),
        };
        assert!(MessageSender::send(&service, &message).await.is_ok());
    }

    #[tokio::test]
    async fn test_disabled_service_rejects_delivery() {
        let service = EmailService::new(config(false)).unwrap();
        let message = OutboundMessage {
            to: "buyer@example.com".to_string(),
            subject: "Your quote".to_string(),
            body: "Hello".to_string(),
        };
        let err = MessageSender::send(&service, &message).await.unwrap_err();
        assert!(matches!(err, DeliveryError::Rejected(_)));
    }

    #[test]
    fn test_transient_classification() {
        assert!(EmailError::SendFailed("timeout".to_string()).is_transient());
        let provider = |status| EmailError::ProviderError {
            status,
            body: String::new(),
        };
        assert!(provider(503).is_transient());
        assert!(provider(429).is_transient());
        assert!(!provider(400).is_transient());
        assert!(!EmailError::Disabled.is_transient());
    }

    #[test]
    fn test_alert_rendering() {
        let message = EmailAlertChannel::render(&record());
        assert_eq!(message.subject, "[Quote Desk CRITICAL] Template chain exhausted");
        assert!(message.body_text.contains("fallback_chain_exhausted"));
    }

    #[tokio::test]
    async fn test_alert_channel_without_recipients_is_not_configured() {
        let channel = EmailAlertChannel::new(EmailService::new(config(true)).unwrap(), vec![]);
        let err = channel.deliver(&record()).await.unwrap_err();
        assert!(matches!(err, ChannelError::NotConfigured(_)));
    }

    #[tokio::test]
    async fn test_alert_channel_delivers_to_recipients() {
        let channel = EmailAlertChannel::new(
            EmailService::new(config(true)).unwrap(),
            vec!["ops@example.com".to_string()],
        );
        assert!(channel.deliver(&record()).await.is_ok());
    }
}
