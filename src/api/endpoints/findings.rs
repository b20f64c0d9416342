//! Generic Finding form over the eight finding-list fields.
//!
//! - `POST /api/conversations/:id/findings/:field` — add one entry
//! - `GET /api/conversations/:id/findings/:field` — list entries
//! - `DELETE /api/conversations/:id/findings/:field/:index` — delete one
//! - `GET /api/fields` — field names

use axum::extract::{Path, State};
use axum::Json;
use serde::Serialize;
use serde_json::Value;

use crate::api::error::ApiError;
use crate::api::types::ApiContext;
use crate::models::FINDING_FIELDS;
use crate::pipeline::editing::{FindingDeletion, FindingFormRequest, FindingFormResult};

#[derive(Serialize)]
pub struct FindingListResponse {
    pub conversation_id: String,
    pub field: String,
    pub count: usize,
    pub entries: Vec<Value>,
}

#[derive(Serialize)]
pub struct FieldsResponse {
    pub fields: &'static [&'static str],
    pub count: usize,
}

pub async fn submit(
    State(ctx): State<ApiContext>,
    Path((id, field)): Path<(String, String)>,
    Json(request): Json<FindingFormRequest>,
) -> Result<Json<FindingFormResult>, ApiError> {
    let result = ctx
        .blocking(move |core| {
            core.orchestrator()
                .submit_finding(&id, &field, &request)
                .map_err(ApiError::from)
        })
        .await?;
    Ok(Json(result))
}

pub async fn list(
    State(ctx): State<ApiContext>,
    Path((id, field)): Path<(String, String)>,
) -> Result<Json<FindingListResponse>, ApiError> {
    let response = ctx
        .blocking(move |core| {
            let entries = core.orchestrator().list_findings(&id, &field)?;
            Ok(FindingListResponse {
                conversation_id: id,
                field,
                count: entries.len(),
                entries,
            })
        })
        .await?;
    Ok(Json(response))
}

pub async fn delete(
    State(ctx): State<ApiContext>,
    Path((id, field, index)): Path<(String, String, usize)>,
) -> Result<Json<FindingDeletion>, ApiError> {
    let deletion = ctx
        .blocking(move |core| {
            core.orchestrator()
                .delete_finding(&id, &field, index)
                .map_err(ApiError::from)
        })
        .await?;
    Ok(Json(deletion))
}

pub async fn fields() -> Json<FieldsResponse> {
    Json(FieldsResponse {
        fields: FINDING_FIELDS,
        count: FINDING_FIELDS.len(),
    })
}
