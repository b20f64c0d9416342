//! API error types with structured JSON responses.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::db::DatabaseError;
use crate::pipeline::editing::EditError;

/// Structured error response body.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

#[derive(Debug, Serialize)]
pub struct ErrorDetail {
    pub code: &'static str,
    pub message: String,
}

/// API-level errors with HTTP status mapping.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Invalid request: {0}")]
    BadRequest(String),
    #[error("Internal error: {0}")]
    Internal(String),
    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = match self {
            ApiError::NotFound(detail) => (StatusCode::NOT_FOUND, "NOT_FOUND", detail),
            ApiError::BadRequest(detail) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", detail),
            ApiError::Internal(detail) => {
                tracing::error!(detail, "API internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL",
                    "An internal error occurred".to_string(),
                )
            }
            ApiError::ServiceUnavailable(detail) => {
                tracing::error!(detail, "API dependency unavailable");
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "UNAVAILABLE",
                    "A backing service is unavailable".to_string(),
                )
            }
        };

        let body = ErrorBody {
            error: ErrorDetail { code, message },
        };
        (status, Json(body)).into_response()
    }
}

impl From<DatabaseError> for ApiError {
    fn from(err: DatabaseError) -> Self {
        match err {
            DatabaseError::NotFound { entity_type, id } => {
                ApiError::NotFound(format!("{entity_type} {id} not found"))
            }
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl From<EditError> for ApiError {
    fn from(err: EditError) -> Self {
        match err {
            EditError::InvalidRequest(detail) => ApiError::BadRequest(detail),
            EditError::FindingNotFound { .. } => ApiError::NotFound(err.to_string()),
            EditError::StoreUnavailable(DatabaseError::NotFound { entity_type, id }) => {
                ApiError::NotFound(format!("{entity_type} {id} not found"))
            }
            EditError::StoreUnavailable(e) => ApiError::ServiceUnavailable(e.to_string()),
            EditError::OllamaConnection(_) | EditError::OllamaError { .. } => {
                ApiError::ServiceUnavailable(err.to_string())
            }
            EditError::ExtractionEmpty | EditError::PatchInvalid(_) => {
                ApiError::BadRequest(err.to_string())
            }
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl From<tokio::task::JoinError> for ApiError {
    fn from(err: tokio::task::JoinError) -> Self {
        ApiError::Internal(format!("Worker task failed: {err}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    async fn body_json(response: Response) -> serde_json::Value {
        let body = to_bytes(response.into_body(), 1024).await.unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    #[tokio::test]
    async fn not_found_returns_404_with_detail() {
        let response = ApiError::NotFound("Version c@3 not found".into()).into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let json = body_json(response).await;
        assert_eq!(json["error"]["code"], "NOT_FOUND");
        assert_eq!(json["error"]["message"], "Version c@3 not found");
    }

    #[tokio::test]
    async fn bad_request_returns_400() {
        let response = ApiError::BadRequest("instruction must not be empty".into()).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn internal_hides_details() {
        let response = ApiError::Internal("disk on fire".into()).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let json = body_json(response).await;
        assert_eq!(json["error"]["message"], "An internal error occurred");
    }

    #[tokio::test]
    async fn unavailable_returns_503() {
        let response = ApiError::ServiceUnavailable("db locked".into()).into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        let json = body_json(response).await;
        assert_eq!(json["error"]["code"], "UNAVAILABLE");
    }

    #[test]
    fn edit_errors_map_to_statuses() {
        assert!(matches!(
            ApiError::from(EditError::InvalidRequest("blank".into())),
            ApiError::BadRequest(_)
        ));
        assert!(matches!(
            ApiError::from(EditError::FindingNotFound {
                field: "acute_toxicity".into(),
                index: 4
            }),
            ApiError::NotFound(_)
        ));
        assert!(matches!(
            ApiError::from(EditError::StoreUnavailable(DatabaseError::LockPoisoned)),
            ApiError::ServiceUnavailable(_)
        ));
        assert!(matches!(
            ApiError::from(EditError::StoreUnavailable(DatabaseError::NotFound {
                entity_type: "Version".into(),
                id: "c@2".into()
            })),
            ApiError::NotFound(_)
        ));
    }

    #[test]
    fn database_not_found_is_404() {
        let err = ApiError::from(DatabaseError::NotFound {
            entity_type: "Version".into(),
            id: "c@9".into(),
        });
        assert!(matches!(err, ApiError::NotFound(ref m) if m == "Version c@9 not found"));
    }
}
