//! Shared utilities and common types for the Quote Desk backend.
//!
//! This crate provides common functionality used across all other crates:
//! - Hashing utilities (content digests, key hashing)
//! - `{{variable}}` placeholder rendering
//! - Common validation logic

pub mod crypto;
pub mod placeholders;
pub mod validation;
