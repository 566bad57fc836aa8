//! Audit trail queries.

use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;

use domain::models::{AuditLogEntry, AuditQuery, AuditStatistics};

use crate::app::AppState;

const DEFAULT_LIMIT: usize = 100;
const MAX_LIMIT: usize = 1_000;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_audit_logs))
        .route("/statistics", get(audit_statistics))
}

#[derive(Debug, Deserialize)]
pub struct StatisticsQuery {
    pub since: Option<DateTime<Utc>>,
}

/// Newest entries first, filtered by the query parameters.
pub async fn list_audit_logs(
    State(state): State<AppState>,
    Query(mut query): Query<AuditQuery>,
) -> Json<Vec<AuditLogEntry>> {
    query.limit = Some(query.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT));
    Json(state.audit.query(&query).await)
}

pub async fn audit_statistics(
    State(state): State<AppState>,
    Query(query): Query<StatisticsQuery>,
) -> Json<AuditStatistics> {
    Json(state.audit.statistics(query.since).await)
}
