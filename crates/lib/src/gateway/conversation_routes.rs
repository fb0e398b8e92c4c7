//! /api/conversations routes over the in-memory [`ConversationStore`](crate::conversations::ConversationStore).

use super::protocol::{ApiError, Success};
use super::server::GatewayState;
use crate::conversations::{ConversationInput, ListQuery, MessageInput};
use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::header,
    response::{IntoResponse, Response},
};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};

const EXPORT_FILENAME: &str = "conversations-export.json";

/// Decode a JSON body: syntax errors are "Invalid JSON", shape errors a plain 400.
fn decode<T: DeserializeOwned>(body: &Bytes, what: &str) -> Result<T, ApiError> {
    let value: Value = serde_json::from_slice(body)?;
    serde_json::from_value(value).map_err(|e| ApiError::BadRequest(format!("invalid {}: {}", what, e)))
}

pub(super) async fn list(
    State(state): State<GatewayState>,
    Query(query): Query<ListQuery>,
) -> Response {
    Success::new(state.conversations.list(&query).await).into_response()
}

pub(super) async fn get_one(
    State(state): State<GatewayState>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let conversation = state
        .conversations
        .get(&id)
        .await
        .ok_or_else(|| ApiError::NotFound("Conversation not found".to_string()))?;
    Ok(Success::new(json!({ "conversation": conversation })).into_response())
}

pub(super) async fn upsert(
    State(state): State<GatewayState>,
    body: Bytes,
) -> Result<Response, ApiError> {
    let input: ConversationInput = decode(&body, "conversation")?;
    let (conversation, is_new) = state.conversations.upsert(input).await?;
    Ok(Success::new(json!({ "conversation": conversation, "isNew": is_new })).into_response())
}

pub(super) async fn append_message(
    State(state): State<GatewayState>,
    Path(id): Path<String>,
    body: Bytes,
) -> Result<Response, ApiError> {
    let input: MessageInput = decode(&body, "message")?;
    let (message, conversation) = state.conversations.append_message(&id, input).await?;
    Ok(Success::new(json!({ "message": message, "conversation": conversation })).into_response())
}

pub(super) async fn delete(
    State(state): State<GatewayState>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    state.conversations.delete(&id).await?;
    Ok(Success::new(json!({ "message": "Conversation deleted" })).into_response())
}

pub(super) async fn stats(State(state): State<GatewayState>) -> Response {
    Success::new(json!({ "stats": state.conversations.stats().await })).into_response()
}

/// GET /api/conversations/export/all: snapshot served as a download.
pub(super) async fn export_all(State(state): State<GatewayState>) -> Response {
    let snapshot = state.conversations.export().await;
    (
        [(
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{}\"", EXPORT_FILENAME),
        )],
        axum::Json(snapshot),
    )
        .into_response()
}

#[derive(Deserialize)]
struct ImportBody {
    conversations: Option<Value>,
    #[serde(default)]
    overwrite: bool,
}

pub(super) async fn import(
    State(state): State<GatewayState>,
    body: Bytes,
) -> Result<Response, ApiError> {
    let body: ImportBody = decode(&body, "import")?;
    let Some(Value::Array(items)) = body.conversations else {
        return Err(ApiError::BadRequest(
            "Invalid import format: conversations must be an array".to_string(),
        ));
    };
    let report = state.conversations.import(&items, body.overwrite).await;
    Ok(Success::new(report).into_response())
}
