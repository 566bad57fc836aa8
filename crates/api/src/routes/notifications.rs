//! Operator notification history and in-app feed.

use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};
use serde::Deserialize;

use domain::models::{NotificationRecord, NotificationStatistics};

use crate::app::AppState;

const DEFAULT_LIMIT: usize = 50;
const MAX_LIMIT: usize = 500;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(notification_history))
        .route("/statistics", get(notification_statistics))
        .route("/feed", get(in_app_feed))
}

#[derive(Debug, Deserialize)]
pub struct LimitQuery {
    pub limit: Option<usize>,
}

impl LimitQuery {
    fn clamped(&self) -> usize {
        self.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT)
    }
}

pub async fn notification_history(
    State(state): State<AppState>,
    Query(query): Query<LimitQuery>,
) -> Json<Vec<NotificationRecord>> {
    Json(state.dispatcher.history(Some(query.clamped())).await)
}

pub async fn notification_statistics(State(state): State<AppState>) -> Json<NotificationStatistics> {
    Json(state.dispatcher.statistics().await)
}

pub async fn in_app_feed(
    State(state): State<AppState>,
    Query(query): Query<LimitQuery>,
) -> Json<Vec<NotificationRecord>> {
    Json(state.in_app.feed(Some(query.clamped())).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_limit_is_clamped() {
        assert_eq!(LimitQuery { limit: None }.clamped(), DEFAULT_LIMIT);
        assert_eq!(LimitQuery { limit: Some(0) }.clamped(), 1);
        assert_eq!(LimitQuery { limit: Some(10_000) }.clamped(), MAX_LIMIT);
    }
}
