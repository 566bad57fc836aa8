//! Client supplied idempotency key.

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::request::Parts,
};
use shared::crypto::sha256_hex;

use crate::error::ApiError;

pub const IDEMPOTENCY_KEY_HEADER: &str = "idempotency-key";

const MAX_KEY_LENGTH: usize = 255;

/// An `Idempotency-Key` header value. Only its SHA-256 digest is used as the
/// submission key, so raw client values never reach storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdempotencyKey {
    pub original: String,
    pub hash: String,
}

impl IdempotencyKey {
    pub fn new(original: String) -> Self {
        let hash = sha256_hex(&original);
        Self { original, hash }
    }
}

/// `None` when the header is absent or blank.
#[derive(Debug, Clone)]
pub struct OptionalIdempotencyKey(pub Option<IdempotencyKey>);

impl OptionalIdempotencyKey {
    /// Digest to hand to the coordinator.
    pub fn into_hash(self) -> Option<String> {
        self.0.map(|k| k.hash)
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for OptionalIdempotencyKey
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let Some(value) = parts.headers.get(IDEMPOTENCY_KEY_HEADER) else {
            return Ok(Self(None));
        };

        let value = value
            .to_str()
            .map_err(|_| ApiError::validation("Idempotency-Key must be visible ASCII"))?
            .trim();

        if value.is_empty() {
            return Ok(Self(None));
        }
        if value.len() > MAX_KEY_LENGTH {
            return Err(ApiError::validation(format!(
                "Idempotency-Key must be at most {} characters",
                MAX_KEY_LENGTH
            )));
        }

        Ok(Self(Some(IdempotencyKey::new(value.to_string()))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    async fn extract(value: Option<&str>) -> Result<OptionalIdempotencyKey, ApiError> {
        let mut builder = Request::builder();
        if let Some(v) = value {
            builder = builder.header(IDEMPOTENCY_KEY_HEADER, v);
        }
        let (mut parts, _) = builder.body(()).unwrap().into_parts();
        OptionalIdempotencyKey::from_request_parts(&mut parts, &()).await
    }

    #[test]
    fn test_hash_is_deterministic_sha256() {
        let a = IdempotencyKey::new("order-42".to_string());
        let b = IdempotencyKey::new("order-42".to_string());
        assert_eq!(a.hash, b.hash);
        assert_eq!(a.hash.len(), 64);
        assert_ne!(a.hash, IdempotencyKey::new("order-43".to_string()).hash);
    }

    #[tokio::test]
    async fn test_missing_and_blank_headers_are_none() {
        assert!(extract(None).await.unwrap().0.is_none());
        assert!(extract(Some("  ")).await.unwrap().0.is_none());
    }

    #[tokio::test]
    async fn test_header_is_trimmed_and_hashed() {
        let key = extract(Some(" order-42 ")).await.unwrap().0.unwrap();
        assert_eq!(key.original, "order-42");
        assert_eq!(key.hash, sha256_hex("order-42"));
    }

    #[tokio::test]
    async fn test_oversized_key_rejected() {
        let long = "k".repeat(MAX_KEY_LENGTH + 1);
        assert!(extract(Some(&long)).await.is_err());
    }
}
