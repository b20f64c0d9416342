//! Direct NOAEL / DAP form submissions. No classification, no LLM.

use axum::extract::State;
use axum::Json;
use serde::Deserialize;

use crate::api::error::ApiError;
use crate::api::types::ApiContext;
use crate::models::MetricType;
use crate::pipeline::editing::{EditOutcome, FormPayloads, MetricPayload};

#[derive(Debug, Deserialize)]
pub struct FormBody {
    pub conversation_id: Option<String>,
    #[serde(flatten)]
    pub payload: MetricPayload,
}

/// `POST /api/edit-form/noael`
pub async fn noael(
    State(ctx): State<ApiContext>,
    Json(body): Json<FormBody>,
) -> Result<Json<EditOutcome>, ApiError> {
    submit(ctx, MetricType::Noael, body).await
}

/// `POST /api/edit-form/dap`
pub async fn dap(
    State(ctx): State<ApiContext>,
    Json(body): Json<FormBody>,
) -> Result<Json<EditOutcome>, ApiError> {
    submit(ctx, MetricType::Dap, body).await
}

async fn submit(
    ctx: ApiContext,
    kind: MetricType,
    body: FormBody,
) -> Result<Json<EditOutcome>, ApiError> {
    let payloads = match kind {
        MetricType::Noael => FormPayloads::from_typed(Some(&body.payload), None),
        MetricType::Dap => FormPayloads::from_typed(None, Some(&body.payload)),
    };
    let outcome = ctx
        .blocking(move |core| {
            core.orchestrator()
                .apply_form(
                    body.conversation_id.as_deref(),
                    &payloads,
                    body.payload.inci_name.as_deref(),
                )
                .map_err(ApiError::from)
        })
        .await?;
    Ok(Json(outcome))
}
