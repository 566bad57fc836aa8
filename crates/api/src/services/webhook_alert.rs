//! Operator alerts posted to a webhook, signed with HMAC-SHA256.

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use reqwest::Client;
use sha2::Sha256;
use std::time::Duration;
use tracing::{debug, warn};

use domain::models::{ChannelKind, NotificationRecord};
use domain::services::{ChannelError, NotificationChannel};

pub const SIGNATURE_HEADER: &str = "X-Webhook-Signature";

const WEBHOOK_TIMEOUT_SECS: u64 = 5;

type HmacSha256 = Hmac<Sha256>;

/// `sha256=<hex>` signature of `payload` under `secret`.
pub fn sign_payload(payload: &str, secret: &str) -> Result<String, ChannelError> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| ChannelError::NotConfigured(format!("invalid webhook secret: {}", e)))?;
    mac.update(payload.as_bytes());
    Ok(format!("sha256={}", hex::encode(mac.finalize().into_bytes())))
}

pub struct WebhookAlertChannel {
    client: Client,
    url: Option<String>,
    secret: Option<String>,
}

impl WebhookAlertChannel {
    pub fn new(url: Option<String>, secret: Option<String>) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .timeout(Duration::from_secs(WEBHOOK_TIMEOUT_SECS))
            .build()?;
        Ok(Self {
            client,
            url: url.filter(|u| !u.is_empty()),
            secret: secret.filter(|s| !s.is_empty()),
        })
    }
}

#[async_trait]
impl NotificationChannel for WebhookAlertChannel {
    fn kind(&self) -> ChannelKind {
        ChannelKind::Webhook
    }

    async fn deliver(&self, record: &NotificationRecord) -> Result<(), ChannelError> {
        let url = self
            .url
            .as_deref()
            .ok_or_else(|| ChannelError::NotConfigured("webhook_url is not set".to_string()))?;

        let payload = serde_json::to_string(record)
            .map_err(|e| ChannelError::Rejected(format!("unserializable notification: {}", e)))?;

        let mut request = self
            .client
            .post(url)
            .header("Content-Type", "application/json");
        if let Some(secret) = &self.secret {
            request = request.header(SIGNATURE_HEADER, sign_payload(&payload, secret)?);
        }

        let response = request
            .body(payload)
            .send()
            .await
            .map_err(|e| ChannelError::Unavailable(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            debug!(notification_id = %record.id, status = status.as_u16(), "Webhook alert delivered");
            Ok(())
        } else if status.is_server_error() {
            warn!(notification_id = %record.id, status = status.as_u16(), "Webhook endpoint failing");
            Err(ChannelError::Unavailable(format!("webhook returned {}", status)))
        } else {
            warn!(notification_id = %record.id, status = status.as_u16(), "Webhook rejected alert");
            Err(ChannelError::Rejected(format!("webhook returned {}", status)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use domain::models::{NotificationKind, Severity};
    use uuid::Uuid;

    #[test]
    fn test_signature_format_and_determinism() {
        let payload = r#"{"kind":"error","title":"Template chain exhausted"}"#;
        let first = sign_payload(payload, "shared-secret").unwrap();
        let second = sign_payload(payload, "shared-secret").unwrap();

        assert_eq!(first, second);
        assert!(first.starts_with("sha256="));
        assert_eq!(first.len(), "sha256=".len() + 64);
        assert_ne!(first, sign_payload(payload, "other-secret").unwrap());
    }

    #[tokio::test]
    async fn test_missing_url_is_not_configured() {
        let channel = WebhookAlertChannel::new(Some(String::new()), None).unwrap();
        let record = NotificationRecord {
            id: Uuid::new_v4(),
            kind: NotificationKind::SystemIssue,
            title: "Database unavailable".to_string(),
            message: "Connection refused".to_string(),
            severity: Severity::Error,
            timestamp: Utc::now(),
            source: "persistence".to_string(),
            error: None,
            context: None,
        };

        let err = channel.deliver(&record).await.unwrap_err();
        assert!(matches!(err, ChannelError::NotConfigured(_)));
    }
}
