//! Gateway HTTP wire types: success envelopes and the JSON error mapping.

use crate::conversations::ConversationError;
use crate::relay::{ErrorKind, RelayError};
use crate::validation::{FieldIssue, ValidationError};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use serde_json::json;

/// `{ "success": true, ...body }`: the body's fields flattened next to the flag.
#[derive(Debug, Serialize)]
pub struct Success<T> {
    pub success: bool,
    #[serde(flatten)]
    pub body: T,
}

impl<T: Serialize> Success<T> {
    pub fn new(body: T) -> Self {
        Self {
            success: true,
            body,
        }
    }
}

impl<T: Serialize> IntoResponse for Success<T> {
    fn into_response(self) -> Response {
        Json(self).into_response()
    }
}

/// Failure body for a relay call that did not complete.
#[derive(Debug, Serialize)]
pub struct RelayFailure {
    pub success: bool,
    pub error: String,
    pub code: ErrorKind,
    pub details: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<&'static str>,
}

/// Errors returned by gateway handlers; each maps to a status and a JSON body.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("invalid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("relay failed: {error}")]
    Relay {
        error: RelayError,
        /// Extra human summary (test path only).
        message: Option<&'static str>,
    },
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    BadRequest(String),
}

impl From<ConversationError> for ApiError {
    fn from(e: ConversationError) -> Self {
        match e {
            ConversationError::Invalid(v) => ApiError::Validation(v),
            ConversationError::NotFound(_) => ApiError::NotFound("Conversation not found".to_string()),
        }
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            _ => StatusCode::BAD_REQUEST,
        }
    }
}

fn validation_body(issues: &[FieldIssue]) -> serde_json::Value {
    json!({
        "success": false,
        "error": "Invalid request",
        "details": issues,
    })
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match self {
            ApiError::InvalidJson(e) => json!({
                "error": "Invalid JSON",
                "details": e.to_string(),
            }),
            ApiError::Validation(v) => validation_body(&v.issues),
            ApiError::Relay { error, message } => {
                let failure = RelayFailure {
                    success: false,
                    error: error.message(),
                    code: error.kind(),
                    details: error.details(),
                    message,
                };
                serde_json::to_value(failure).unwrap_or_else(|_| json!({ "success": false }))
            }
            ApiError::NotFound(msg) | ApiError::BadRequest(msg) => json!({
                "success": false,
                "error": msg,
            }),
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn body_json(resp: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn validation_error_lists_fields() {
        let err = ApiError::from(ValidationError::single("payload.message", "message is required"));
        let resp = err.into_response();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let json = body_json(resp).await;
        assert_eq!(json["success"], false);
        assert_eq!(json["details"][0]["field"], "payload.message");
    }

    #[tokio::test]
    async fn relay_error_carries_code() {
        let err = ApiError::Relay {
            error: RelayError::Http {
                status: 500,
                status_text: "Internal Server Error".to_string(),
            },
            message: None,
        };
        let json = body_json(err.into_response()).await;
        assert_eq!(json["code"], "HTTP_ERROR");
        assert_eq!(json["error"], "HTTP 500: Internal Server Error");
        assert!(json.get("message").is_none());
    }

    #[tokio::test]
    async fn not_found_maps_to_404() {
        let err = ApiError::from(ConversationError::NotFound("x".to_string()));
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn success_flattens_body() {
        let v = serde_json::to_value(Success::new(json!({ "content": "hi" }))).unwrap();
        assert_eq!(v, json!({ "success": true, "content": "hi" }));
    }
}
