//! Domain models for Quote Desk.

pub mod audit_log;
pub mod notification;
pub mod submission;
pub mod template;

pub use audit_log::{
    AuditConfig, AuditError, AuditLogEntry, AuditOperation, AuditQuery, AuditResult,
    AuditStatistics, EntityKind, NewAuditEntry,
};
pub use notification::{
    ChannelFailure, ChannelKind, DispatchOutcome, NotificationConfig, NotificationError,
    NotificationKind, NotificationRecord, NotificationStatistics, Severity,
};
pub use submission::{
    NewSubmission, QuoteRequest, SubmissionReceipt, SubmissionRecord, SubmissionStatus,
};
pub use template::{
    modality_label, FallbackConfig, FallbackKind, FormKind, Modality, NewTemplate,
    ResolutionResult, Template, TemplateMapping,
};
