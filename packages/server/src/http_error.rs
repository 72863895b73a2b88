//! HTTP error handling
//!
//! Every failed request answers with the same JSON shape, with the status code
//! derived from the machine-readable `code`.

use axum::{
    extract::multipart::MultipartError,
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::{Deserialize, Serialize};

use lifeplan_core::services::PlanServiceError;

/// HTTP error response body
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpError {
    /// Always `false`; mirrors the `success` flag of successful responses
    pub success: bool,
    /// User-facing error message
    pub message: String,
    /// Machine-readable error code
    pub code: String,
    /// Optional detailed error information for debugging
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl HttpError {
    /// Create a new HTTP error
    pub fn new(message: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            code: code.into(),
            details: None,
        }
    }

    /// Create a new HTTP error with details
    pub fn with_details(
        message: impl Into<String>,
        code: impl Into<String>,
        details: impl Into<String>,
    ) -> Self {
        Self {
            details: Some(details.into()),
            ..Self::new(message, code)
        }
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::new(message, "INVALID_INPUT")
    }

    pub fn status(&self) -> StatusCode {
        match self.code.as_str() {
            "NOT_FOUND" => StatusCode::NOT_FOUND,
            "INVALID_INPUT" | "VALIDATION_ERROR" | "MISSING_OWNER" => StatusCode::BAD_REQUEST,
            "CONFLICT" => StatusCode::CONFLICT,
            "EXTERNAL_SERVICE_ERROR" => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        (self.status(), Json(self)).into_response()
    }
}

impl From<PlanServiceError> for HttpError {
    fn from(err: PlanServiceError) -> Self {
        let message = err.to_string();
        match &err {
            PlanServiceError::NotFound { .. } => HttpError::new(message, "NOT_FOUND"),
            PlanServiceError::Conflict { .. } => HttpError::new(message, "CONFLICT"),
            PlanServiceError::Validation(_) => HttpError::new(message, "VALIDATION_ERROR"),
            PlanServiceError::Deletion {
                node_id, deleted, ..
            } => HttpError::with_details(
                message,
                "DELETION_ERROR",
                format!("failed_node: {}, deleted: [{}]", node_id, deleted.join(", ")),
            ),
            PlanServiceError::Integrity { node_id, depth, .. } => HttpError::with_details(
                message,
                "INTEGRITY_ERROR",
                format!("node_id: {}, depth: {}", node_id, depth),
            ),
            PlanServiceError::ExternalService {
                operation, node_id, ..
            } => {
                tracing::error!("External service failure: {}", message);
                HttpError::with_details(
                    message,
                    "EXTERNAL_SERVICE_ERROR",
                    format!("operation: {}, node_id: {}", operation, node_id),
                )
            }
        }
    }
}

impl From<MultipartError> for HttpError {
    fn from(err: MultipartError) -> Self {
        HttpError::with_details("Malformed multipart body", "INVALID_INPUT", err.body_text())
    }
}
