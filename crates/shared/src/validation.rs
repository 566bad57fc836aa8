//! Common validation utilities for quote request payloads.

use validator::ValidationError;

/// Maximum number of free-form fields accepted on a quote request.
pub const MAX_QUOTE_FIELDS: usize = 50;

/// Maximum length of a free-form field key.
const MAX_FIELD_KEY_LENGTH: usize = 64;

/// Validates a business tax identifier.
///
/// Accepts 5 to 20 alphanumeric characters, optionally separated by `-`, `.`
/// or spaces.
pub fn validate_tax_id(tax_id: &str) -> Result<(), ValidationError> {
    let compact: String = tax_id
        .chars()
        .filter(|c| !matches!(c, '-' | '.' | ' '))
        .collect();

    if (5..=20).contains(&compact.len()) && compact.chars().all(|c| c.is_ascii_alphanumeric()) {
        Ok(())
    } else {
        let mut err = ValidationError::new("tax_id_format");
        err.message = Some("Tax id must contain 5-20 letters or digits".into());
        Err(err)
    }
}

/// Validates a phone number: optional leading `+`, then 6 to 20 digits with
/// optional spaces, dashes or parentheses.
pub fn validate_phone(phone: &str) -> Result<(), ValidationError> {
    let body = phone.strip_prefix('+').unwrap_or(phone);
    let digits = body.chars().filter(|c| c.is_ascii_digit()).count();
    let allowed = body
        .chars()
        .all(|c| c.is_ascii_digit() || matches!(c, ' ' | '-' | '(' | ')'));

    if allowed && (6..=20).contains(&digits) {
        Ok(())
    } else {
        let mut err = ValidationError::new("phone_format");
        err.message = Some("Phone number must contain 6-20 digits".into());
        Err(err)
    }
}

/// Validates a placeholder-compatible field key (`[A-Za-z0-9_]`, 1-64 chars).
pub fn validate_field_key(key: &str) -> Result<(), ValidationError> {
    if !key.is_empty()
        && key.len() <= MAX_FIELD_KEY_LENGTH
        && key.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
    {
        Ok(())
    } else {
        let mut err = ValidationError::new("field_key_format");
        err.message = Some("Field keys must be 1-64 characters of letters, digits or '_'".into());
        Err(err)
    }
}
