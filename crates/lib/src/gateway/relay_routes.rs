//! POST /relay/test, /relay/send and /relay/info.

use super::protocol::{ApiError, Success};
use super::server::GatewayState;
use crate::relay::{webhook_url_from_json, RelayError, RelayKind, RelayRequest, TestOutcome};
use axum::{
    body::Bytes,
    extract::State,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::{json, Value};

const TEST_SUCCEEDED: &str = "Connection test succeeded";
const TEST_FAILED: &str = "Connection test failed";

#[derive(Serialize)]
struct TestReply {
    #[serde(flatten)]
    outcome: TestOutcome,
    message: &'static str,
}

fn parse_body(body: &Bytes) -> Result<Value, ApiError> {
    Ok(serde_json::from_slice(body)?)
}

fn relay_failure(state: &GatewayState, err: RelayError, message: Option<&'static str>) -> ApiError {
    log::warn!("relay failed ({}): {}", err.kind(), err.details());
    state.stats.record_error(err.to_string());
    ApiError::Relay {
        error: err,
        message,
    }
}

/// POST /relay/test: send the synthetic test payload. Any HTTP status is a completed test.
pub(super) async fn relay_test(
    State(state): State<GatewayState>,
    body: Bytes,
) -> Result<Response, ApiError> {
    let body = parse_body(&body)?;
    let request = RelayRequest::from_json(RelayKind::Test, &body)?;
    let outcome = state
        .relay
        .test(&request)
        .await
        .map_err(|e| relay_failure(&state, e, Some(TEST_FAILED)))?;
    Ok(Success::new(TestReply {
        outcome,
        message: TEST_SUCCEEDED,
    })
    .into_response())
}

/// POST /relay/send: forward the chat payload and return the normalized reply.
pub(super) async fn relay_send(
    State(state): State<GatewayState>,
    body: Bytes,
) -> Result<Response, ApiError> {
    let body = parse_body(&body)?;
    let request = RelayRequest::from_json(RelayKind::Send, &body)?;
    let outcome = state
        .relay
        .send(&request)
        .await
        .map_err(|e| relay_failure(&state, e, None))?;
    Ok(Success::new(outcome).into_response())
}

/// POST /relay/info: HEAD request. Transport failures are reported in a 200 body.
pub(super) async fn relay_info(
    State(state): State<GatewayState>,
    body: Bytes,
) -> Result<Response, ApiError> {
    let body = parse_body(&body)?;
    let url = webhook_url_from_json(&body)?;
    match state.relay.info(&url).await {
        Ok(outcome) => Ok(Success::new(outcome).into_response()),
        Err(e) => {
            log::debug!("relay info request failed for {}: {}", url, e);
            Ok(Json(json!({
                "success": false,
                "url": url.as_str(),
                "accessible": false,
                "error": e.details(),
            }))
            .into_response())
        }
    }
}
