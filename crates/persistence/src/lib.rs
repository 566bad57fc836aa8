//! Persistence layer for the Quote Desk backend.
//!
//! This crate contains:
//! - Database connection management and embedded migrations
//! - Entity definitions (database row mappings)
//! - Postgres implementations of the domain store traits

pub mod db;
pub mod entities;
pub mod metrics;
pub mod repositories;

pub use repositories::{
    AuditLogRepository, NotificationRepository, SubmissionRepository, TemplateRepository,
};
