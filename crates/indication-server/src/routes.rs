//! HTTP routes.
//!
//! - `GET    /indication/drug/:setid`  resolve by set ID
//! - `GET    /indication/search?title=` resolve by title
//! - `GET    /indication`              list stored set IDs
//! - `DELETE /indication/drug/:setid`  drop a stored mapping
//! - `GET    /health`                  liveness and cache counters

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use indication_core::{IndicationMapper, MappingRecord};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;

use crate::error::ApiError;

#[derive(Clone)]
pub struct AppState {
    pub mapper: Arc<IndicationMapper>,
}

#[derive(Debug, Deserialize)]
pub struct SearchParams {
    pub title: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct IdentifierList {
    pub identifiers: Vec<String>,
}

pub fn router(mapper: Arc<IndicationMapper>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/indication", get(list_mappings))
        .route("/indication/search", get(search_by_title))
        .route(
            "/indication/drug/:setid",
            get(resolve_by_setid).delete(delete_mapping),
        )
        .with_state(AppState { mapper })
}

async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let pages = state.mapper.catalog().pages().stats();
    let documents = state.mapper.documents().stats();
    let degraded = pages.is_degraded() || documents.is_degraded();
    (
        StatusCode::OK,
        Json(json!({
            "status": "ok",
            "caches": {
                "degraded": degraded,
                "pages": pages,
                "documents": documents,
            },
        })),
    )
}

async fn resolve_by_setid(
    State(state): State<AppState>,
    Path(setid): Path<String>,
) -> Result<Json<MappingRecord>, ApiError> {
    info!(%setid, "resolve by setid");
    let record = state.mapper.resolve_by_identifier(&setid).await?;
    Ok(Json(record))
}

async fn search_by_title(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> Result<Json<MappingRecord>, ApiError> {
    let title = params
        .title
        .filter(|t| !t.trim().is_empty())
        .ok_or_else(|| ApiError::not_found("title query parameter is required"))?;

    info!(%title, "resolve by title");
    let record = state.mapper.resolve_by_title(&title).await?;
    Ok(Json(record))
}

async fn list_mappings(State(state): State<AppState>) -> Json<IdentifierList> {
    let identifiers = state
        .mapper
        .store()
        .list_all_identifiers()
        .await
        .into_iter()
        .collect();
    Json(IdentifierList { identifiers })
}

async fn delete_mapping(
    State(state): State<AppState>,
    Path(setid): Path<String>,
) -> Result<StatusCode, ApiError> {
    if state.mapper.store().delete(&setid).await {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::not_found(format!("no stored mapping for setid {setid}")))
    }
}
