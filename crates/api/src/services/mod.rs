//! Outbound integrations: quote email delivery and operator alert channels.

pub mod email;
pub mod webhook_alert;

pub use email::{EmailAlertChannel, EmailError, EmailMessage, EmailService};
pub use webhook_alert::{sign_payload, WebhookAlertChannel, SIGNATURE_HEADER};
