//! Domain layer for Quote Desk.
//!
//! This crate contains:
//! - Domain models (Template, QuoteRequest, AuditLogEntry, NotificationRecord)
//! - The error taxonomy shared by every layer
//! - Resolution, recovery, audit, alerting and submission services

pub mod errors;
pub mod models;
pub mod services;
