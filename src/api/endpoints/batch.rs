//! Batch editing and cross-conversation lookups.
//!
//! - `POST /api/edit/batch`
//! - `GET /api/edit/batch/:batch_id`
//! - `GET /api/edit/inci/:inci_name`

use axum::extract::{Path, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::api::error::ApiError;
use crate::api::types::ApiContext;
use crate::models::VersionRecord;
use crate::pipeline::editing::{run_batch, versions_by_batch, versions_by_inci, BatchItem, BatchOutcome};

#[derive(Debug, Deserialize)]
pub struct BatchBody {
    /// Reused as the batch id when present.
    pub batch_id: Option<String>,
    pub edits: Vec<BatchItem>,
}

#[derive(Serialize)]
pub struct VersionListResponse {
    pub key: String,
    pub count: usize,
    pub versions: Vec<VersionRecord>,
}

pub async fn run(
    State(ctx): State<ApiContext>,
    Json(body): Json<BatchBody>,
) -> Result<Json<BatchOutcome>, ApiError> {
    if body.edits.is_empty() {
        return Err(ApiError::BadRequest("edits must not be empty".into()));
    }
    let outcome = ctx
        .blocking(move |core| {
            run_batch(core.orchestrator(), body.batch_id, &body.edits).map_err(ApiError::from)
        })
        .await?;
    Ok(Json(outcome))
}

/// 404 when neither a batch nor a conversation has that id.
pub async fn by_batch(
    State(ctx): State<ApiContext>,
    Path(batch_id): Path<String>,
) -> Result<Json<VersionListResponse>, ApiError> {
    let key = batch_id.clone();
    let versions = ctx
        .blocking(move |core| Ok(versions_by_batch(core.store(), &key)?))
        .await?;
    if versions.is_empty() {
        return Err(ApiError::NotFound(format!("No versions for batch {batch_id}")));
    }
    Ok(Json(VersionListResponse {
        key: batch_id,
        count: versions.len(),
        versions,
    }))
}

pub async fn by_inci(
    State(ctx): State<ApiContext>,
    Path(inci_name): Path<String>,
) -> Result<Json<VersionListResponse>, ApiError> {
    let key = inci_name.clone();
    let versions = ctx
        .blocking(move |core| Ok(versions_by_inci(core.store(), &key)?))
        .await?;
    Ok(Json(VersionListResponse {
        key: inci_name,
        count: versions.len(),
        versions,
    }))
}
