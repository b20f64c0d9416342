//! Version history endpoints.
//!
//! - `GET /api/conversations/:id/current`
//! - `GET /api/conversations/:id/history`
//! - `GET /api/conversations/:id/versions/:version`
//! - `GET /api/conversations/:id/diff?from=&to=`
//! - `POST /api/reset`

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::api::error::ApiError;
use crate::api::types::ApiContext;
use crate::models::{PatchOperation, VersionRecord};
use crate::pipeline::editing::{diff_versions, get_current, get_history, get_version, reset};

#[derive(Serialize)]
pub struct HistoryResponse {
    pub conversation_id: String,
    pub count: usize,
    pub versions: Vec<VersionRecord>,
}

#[derive(Deserialize)]
pub struct DiffQuery {
    pub from: i64,
    pub to: i64,
}

#[derive(Serialize)]
pub struct DiffResponse {
    pub conversation_id: String,
    pub from: i64,
    pub to: i64,
    pub operations: Vec<PatchOperation>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ResetBody {
    pub conversation_id: Option<String>,
    pub to_version: Option<i64>,
}

pub async fn current(
    State(ctx): State<ApiContext>,
    Path(id): Path<String>,
) -> Result<Json<VersionRecord>, ApiError> {
    let record = ctx
        .blocking(move |core| Ok(get_current(core.store(), &id)?))
        .await?;
    Ok(Json(record))
}

/// Unknown conversations return an empty history, not 404.
pub async fn history(
    State(ctx): State<ApiContext>,
    Path(id): Path<String>,
) -> Result<Json<HistoryResponse>, ApiError> {
    let response = ctx
        .blocking(move |core| {
            let versions = get_history(core.store(), &id)?;
            Ok(HistoryResponse {
                conversation_id: id,
                count: versions.len(),
                versions,
            })
        })
        .await?;
    Ok(Json(response))
}

pub async fn version(
    State(ctx): State<ApiContext>,
    Path((id, version)): Path<(String, i64)>,
) -> Result<Json<VersionRecord>, ApiError> {
    let record = ctx
        .blocking(move |core| Ok(get_version(core.store(), &id, version)?))
        .await?;
    Ok(Json(record))
}

pub async fn diff(
    State(ctx): State<ApiContext>,
    Path(id): Path<String>,
    Query(query): Query<DiffQuery>,
) -> Result<Json<DiffResponse>, ApiError> {
    let response = ctx
        .blocking(move |core| {
            let operations = diff_versions(core.store(), &id, query.from, query.to)?;
            Ok(DiffResponse {
                conversation_id: id,
                from: query.from,
                to: query.to,
                operations,
            })
        })
        .await?;
    Ok(Json(response))
}

/// `POST /api/reset` — new version holding the template or an older version.
/// An empty body starts a fresh conversation.
pub async fn reset_conversation(
    State(ctx): State<ApiContext>,
    body: Option<Json<ResetBody>>,
) -> Result<Json<VersionRecord>, ApiError> {
    let body = body.map(|Json(b)| b).unwrap_or_default();
    if body.conversation_id.as_deref().is_some_and(|id| id.trim().is_empty()) {
        return Err(ApiError::BadRequest("conversation_id must not be blank".into()));
    }
    let record = ctx
        .blocking(move |core| {
            Ok(reset(
                core.store(),
                body.conversation_id.as_deref(),
                body.to_version,
            )?)
        })
        .await?;
    Ok(Json(record))
}
