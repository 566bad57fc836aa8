//! Request extractors.

pub mod actor;
pub mod idempotency_key;

pub use actor::Actor;
pub use idempotency_key::{IdempotencyKey, OptionalIdempotencyKey, IDEMPOTENCY_KEY_HEADER};
