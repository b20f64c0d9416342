//! Edit endpoint.
//!
//! - `POST /api/edit` — run one instruction through the pipeline

use axum::extract::State;
use axum::Json;
use serde::Deserialize;
use serde_json::Value;

use crate::api::error::ApiError;
use crate::api::types::ApiContext;
use crate::pipeline::editing::{EditOutcome, EditRequest};

#[derive(Debug, Deserialize)]
pub struct EditBody {
    pub conversation_id: Option<String>,
    #[serde(default)]
    pub instruction: String,
    pub inci_name: Option<String>,
    /// Starting document for a conversation with no stored versions.
    pub initial_json: Option<Value>,
}

impl EditBody {
    fn into_request(self) -> EditRequest {
        let mut request = EditRequest::new(self.instruction);
        if let Some(id) = self.conversation_id {
            request = request.in_conversation(id);
        }
        if let Some(name) = self.inci_name {
            request = request.for_inci(name);
        }
        if let Some(seed) = self.initial_json {
            request = request.with_seed(seed);
        }
        request
    }
}

/// `POST /api/edit` — classify, apply and save one version.
pub async fn edit(
    State(ctx): State<ApiContext>,
    Json(body): Json<EditBody>,
) -> Result<Json<EditOutcome>, ApiError> {
    let request = body.into_request();
    let outcome = ctx
        .blocking(move |core| core.orchestrator().edit(request).map_err(ApiError::from))
        .await?;
    Ok(Json(outcome))
}
