//! Fallback configuration administration.

use axum::{
    extract::{Path, State},
    routing::{get, put},
    Json, Router,
};
use serde::Deserialize;
use uuid::Uuid;

use domain::models::FallbackConfig;

use super::parse_form;
use crate::app::AppState;
use crate::error::ApiError;
use crate::extractors::Actor;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(get_config).put(replace_config))
        .route("/defaults/:form", put(set_default_template))
        .route("/global", put(set_global_fallback))
}

#[derive(Debug, Deserialize)]
pub struct TemplateRef {
    pub template_id: Uuid,
}

pub async fn get_config(State(state): State<AppState>) -> Json<FallbackConfig> {
    Json(state.resolver.fallback_config().await)
}

/// Replace the whole configuration. Every referenced template must be active.
pub async fn replace_config(
    State(state): State<AppState>,
    actor: Actor,
    Json(config): Json<FallbackConfig>,
) -> Result<Json<FallbackConfig>, ApiError> {
    let referenced = config
        .default_templates
        .values()
        .chain(config.global_fallback_id.iter());
    for id in referenced {
        if state.resolver.get_by_id(*id).await?.is_none() {
            return Err(ApiError::validation(format!(
                "Template {} is missing or inactive",
                id
            )));
        }
    }

    state
        .resolver
        .update_fallback_config(config, actor.id())
        .await;
    Ok(Json(state.resolver.fallback_config().await))
}

pub async fn set_default_template(
    State(state): State<AppState>,
    Path(form): Path<String>,
    actor: Actor,
    Json(body): Json<TemplateRef>,
) -> Result<Json<FallbackConfig>, ApiError> {
    let form = parse_form(&form)?;
    let updated = state
        .resolver
        .set_default_template(form, body.template_id, actor.id())
        .await?;
    if !updated {
        return Err(ApiError::validation(format!(
            "Template {} is missing or inactive",
            body.template_id
        )));
    }
    Ok(Json(state.resolver.fallback_config().await))
}

pub async fn set_global_fallback(
    State(state): State<AppState>,
    actor: Actor,
    Json(body): Json<TemplateRef>,
) -> Result<Json<FallbackConfig>, ApiError> {
    let updated = state
        .resolver
        .set_global_fallback(body.template_id, actor.id())
        .await?;
    if !updated {
        return Err(ApiError::validation(format!(
            "Template {} is missing or inactive",
            body.template_id
        )));
    }
    Ok(Json(state.resolver.fallback_config().await))
}
