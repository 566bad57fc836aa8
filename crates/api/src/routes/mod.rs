//! HTTP route handlers.

pub mod audit_logs;
pub mod fallback_config;
pub mod health;
pub mod notifications;
pub mod quotes;
pub mod templates;

use domain::models::{FormKind, Modality};

use crate::error::ApiError;

/// Parse a form path or query segment.
pub(crate) fn parse_form(value: &str) -> Result<FormKind, ApiError> {
    value
        .parse()
        .map_err(|e: String| ApiError::validation(e))
}

/// Parse an optional modality; blank means generic.
pub(crate) fn parse_modality(value: Option<&str>) -> Result<Option<Modality>, ApiError> {
    match value.map(str::trim).filter(|v| !v.is_empty()) {
        None => Ok(None),
        Some(v) => v.parse().map(Some).map_err(|e: String| ApiError::validation(e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_form() {
        assert_eq!(parse_form("ERP").unwrap(), FormKind::Erp);
        assert!(parse_form("hr").is_err());
    }

    #[test]
    fn test_parse_modality() {
        assert_eq!(parse_modality(None).unwrap(), None);
        assert_eq!(parse_modality(Some(" ")).unwrap(), None);
        assert_eq!(
            parse_modality(Some("on_premise")).unwrap(),
            Some(Modality::OnPremise)
        );
        assert!(parse_modality(Some("hybrid")).is_err());
    }
}
