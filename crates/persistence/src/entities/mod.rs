//! Database entity definitions.
//!
//! Entities are direct mappings to database rows. Enumerations are stored as
//! text and parsed back into domain types on load.

pub mod audit_log;
pub mod notification;
pub mod submission;
pub mod template;

pub use audit_log::AuditLogEntity;
pub use notification::NotificationEntity;
pub use submission::SubmissionEntity;
pub use template::TemplateEntity;

use domain::errors::QuoteError;
use std::str::FromStr;

/// Parse a text column into a domain enumeration.
pub(crate) fn parse_column<T>(column: &str, value: &str) -> Result<T, QuoteError>
where
    T: FromStr<Err = String>,
{
    value
        .parse()
        .map_err(|e: String| QuoteError::database(format!("decode {}", column), e))
}

/// Parse an optional text column.
pub(crate) fn parse_optional_column<T>(
    column: &str,
    value: Option<&str>,
) -> Result<Option<T>, QuoteError>
where
    T: FromStr<Err = String>,
{
    value.map(|v| parse_column(column, v)).transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::models::{FormKind, Modality};

    #[test]
    fn test_parse_column() {
        let form: FormKind = parse_column("form", "crm").unwrap();
        assert_eq!(form, FormKind::Crm);

        let err = parse_column::<FormKind>("form", "hr").unwrap_err();
        assert!(matches!(err, QuoteError::Database { .. }));
    }

    #[test]
    fn test_parse_optional_column() {
        let none: Option<Modality> = parse_optional_column("modality", None).unwrap();
        assert_eq!(none, None);

        let some: Option<Modality> = parse_optional_column("modality", Some("saas")).unwrap();
        assert_eq!(some, Some(Modality::Saas));
    }
}
