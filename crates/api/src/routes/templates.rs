//! Template registration and mapping administration.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use domain::models::{NewTemplate, ResolutionResult, Template, TemplateMapping};

use super::{parse_form, parse_modality};
use crate::app::AppState;
use crate::error::ApiError;
use crate::extractors::Actor;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/template-mappings", get(list_mappings))
        .route("/template-mappings/resolve", get(resolve_template))
        .route("/template-mappings/uniqueness", get(check_uniqueness))
        .route("/templates", post(register_template))
        .route("/templates/:id", get(get_template))
}

#[derive(Debug, Deserialize)]
pub struct MappingQuery {
    pub form: String,
    pub modality: Option<String>,
    pub exclude_id: Option<Uuid>,
}

#[derive(Debug, Serialize)]
pub struct UniquenessResponse {
    pub unique: bool,
}

pub async fn list_mappings(
    State(state): State<AppState>,
) -> Result<Json<Vec<TemplateMapping>>, ApiError> {
    Ok(Json(state.resolver.list_mappings().await?))
}

/// Preview which template a (form, modality) pair resolves to.
pub async fn resolve_template(
    State(state): State<AppState>,
    Query(query): Query<MappingQuery>,
) -> Result<Json<ResolutionResult>, ApiError> {
    let form = parse_form(&query.form)?;
    let modality = parse_modality(query.modality.as_deref())?;
    Ok(Json(state.resolver.resolve_with_fallback(form, modality).await?))
}

pub async fn check_uniqueness(
    State(state): State<AppState>,
    Query(query): Query<MappingQuery>,
) -> Result<Json<UniquenessResponse>, ApiError> {
    let form = parse_form(&query.form)?;
    let modality = parse_modality(query.modality.as_deref())?;
    let unique = state
        .resolver
        .validate_uniqueness(form, modality, query.exclude_id)
        .await?;
    Ok(Json(UniquenessResponse { unique }))
}

pub async fn register_template(
    State(state): State<AppState>,
    actor: Actor,
    Json(input): Json<NewTemplate>,
) -> Result<(StatusCode, Json<Template>), ApiError> {
    input.validate()?;
    if input.modality.is_some() && input.form.is_none() {
        return Err(ApiError::validation("A modality requires a form"));
    }

    let template = state.resolver.register_template(input, actor.id()).await?;
    Ok((StatusCode::CREATED, Json(template)))
}

pub async fn get_template(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Template>, ApiError> {
    state
        .resolver
        .get_by_id(id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("Active template {} not found", id)))
}
