//! Quote form submission routes.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::post,
    Json, Router,
};
use serde::Serialize;
use validator::Validate;

use domain::models::{QuoteRequest, SubmissionReceipt, SubmissionStatus};

use super::parse_form;
use crate::app::AppState;
use crate::error::ApiError;
use crate::extractors::OptionalIdempotencyKey;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/:product", post(submit_quote))
        .route("/:product/send", post(send_quote))
}

#[derive(Debug, Serialize)]
pub struct SendResponse {
    pub sent: bool,
}

/// Queue a quote for operator approval.
pub async fn submit_quote(
    State(state): State<AppState>,
    Path(product): Path<String>,
    idempotency_key: OptionalIdempotencyKey,
    Json(request): Json<QuoteRequest>,
) -> Result<(StatusCode, Json<SubmissionReceipt>), ApiError> {
    let product = parse_form(&product)?;
    request.validate()?;

    let submission_id = state
        .coordinator
        .submit(&request, product, idempotency_key.into_hash())
        .await?;

    tracing::info!(%submission_id, product = %product, "Quote queued");
    Ok((
        StatusCode::ACCEPTED,
        Json(SubmissionReceipt {
            submission_id,
            status: SubmissionStatus::PendingApproval,
        }),
    ))
}

/// Render and send the quote straight to the contact.
pub async fn send_quote(
    State(state): State<AppState>,
    Path(product): Path<String>,
    idempotency_key: OptionalIdempotencyKey,
    Json(request): Json<QuoteRequest>,
) -> Result<Json<SendResponse>, ApiError> {
    let product = parse_form(&product)?;
    request.validate()?;

    let sent = state
        .coordinator
        .send_directly(&request, product, idempotency_key.into_hash())
        .await?;

    Ok(Json(SendResponse { sent }))
}
