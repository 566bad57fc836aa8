//! Repository implementations.
//!
//! Each repository implements one of the domain store traits on top of a
//! shared `PgPool`.

pub mod audit_log;
pub mod notification;
pub mod submission;
pub mod template;

pub use audit_log::AuditLogRepository;
pub use notification::NotificationRepository;
pub use submission::SubmissionRepository;
pub use template::TemplateRepository;

use domain::errors::QuoteError;

/// Postgres SQLSTATE for unique constraint violations.
const UNIQUE_VIOLATION: &str = "23505";

/// Whether `err` is a unique constraint violation.
pub(crate) fn is_unique_violation(err: &sqlx::Error) -> bool {
    err.as_database_error()
        .and_then(|db| db.code())
        .is_some_and(|code| code == UNIQUE_VIOLATION)
}

/// Wrap a sqlx failure as a domain database error.
pub(crate) fn db_error(operation: &str, err: sqlx::Error) -> QuoteError {
    tracing::warn!(operation, error = %err, "Database operation failed");
    QuoteError::database(operation, err)
}
