//! Health and probe endpoints.

use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;
use std::time::Instant;

use crate::app::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub database: DatabaseHealth,
    pub submission_locks_held: usize,
    pub notification_channels: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct DatabaseHealth {
    /// False when the service runs without a database.
    pub configured: bool,
    pub connected: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub status: &'static str,
}

async fn database_health(state: &AppState) -> DatabaseHealth {
    let Some(pool) = &state.pool else {
        return DatabaseHealth {
            configured: false,
            connected: false,
            latency_ms: None,
        };
    };

    let started = Instant::now();
    let connected = persistence::db::ping(pool).await.is_ok();
    DatabaseHealth {
        configured: true,
        connected,
        latency_ms: connected.then(|| started.elapsed().as_millis() as u64),
    }
}

fn is_healthy(db: &DatabaseHealth) -> bool {
    !db.configured || db.connected
}

pub async fn health_check(
    State(state): State<AppState>,
) -> (StatusCode, Json<HealthResponse>) {
    let database = database_health(&state).await;
    let healthy = is_healthy(&database);

    let response = HealthResponse {
        status: if healthy { "healthy" } else { "unhealthy" },
        version: env!("CARGO_PKG_VERSION"),
        database,
        submission_locks_held: state.coordinator.locks().len(),
        notification_channels: state
            .config
            .notifications
            .channels
            .iter()
            .map(|c| c.to_string())
            .collect(),
    };

    let status = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(response))
}

pub async fn live() -> Json<StatusResponse> {
    Json(StatusResponse { status: "alive" })
}

pub async fn ready(
    State(state): State<AppState>,
) -> Result<Json<StatusResponse>, StatusCode> {
    if is_healthy(&database_health(&state).await) {
        Ok(Json(StatusResponse { status: "ready" }))
    } else {
        Err(StatusCode::SERVICE_UNAVAILABLE)
    }
}
