//! Domain services for Quote Desk.
//!
//! Template resolution, recovery, auditing, operator notification and
//! submission coordination. Storage and delivery sit behind traits so the
//! persistence and api crates can plug in Postgres, SMTP-style senders and
//! webhooks.

pub mod audit;
pub mod in_memory;
pub mod locks;
pub mod notification;
pub mod recovery;
pub mod submission;
pub mod template_resolution;

pub use audit::{AuditAlertSink, AuditEntryBuilder, AuditLogStore, AuditTrail};
pub use in_memory::{
    InMemorySubmissionStore, InMemoryTemplateStore, MockMessageSender, TemplateStoreCalls,
};
pub use locks::{IdempotencyRegistry, LockGuard, SubmissionLocks};
pub use notification::{
    ChannelError, ConsoleChannel, InAppChannel, MockNotificationChannel, NotificationChannel,
    NotificationDispatcher,
};
pub use recovery::{
    AlternateFuture, Alternates, RecoveryConfig, RecoveryContext, RecoveryExecutor,
    RecoveryOutcome, RecoveryStrategy,
};
pub use submission::{
    DeliveryError, MessageSender, OutboundMessage, SubmissionConfig, SubmissionCoordinator,
    SubmissionStore,
};
pub use template_resolution::{TemplateResolver, TemplateStore};
