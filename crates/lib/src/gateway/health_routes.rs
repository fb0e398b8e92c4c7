//! /api/health routes: liveness, readiness, counters and version info.

use super::server::GatewayState;
use crate::health::{APP_DESCRIPTION, APP_NAME, APP_VERSION};
use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use chrono::{SecondsFormat, Utc};
use serde_json::{json, Value};

fn now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn app_info() -> Value {
    json!({
        "name": APP_NAME,
        "version": APP_VERSION,
        "description": APP_DESCRIPTION,
    })
}

pub(super) async fn health(State(state): State<GatewayState>) -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "timestamp": now(),
        "uptime": state.stats.uptime().as_secs(),
        "environment": state.environment.as_str(),
        "version": APP_VERSION,
    }))
}

pub(super) async fn detailed(State(state): State<GatewayState>) -> Json<Value> {
    let snap = state.stats.snapshot();
    Json(json!({
        "status": "healthy",
        "timestamp": now(),
        "app": app_info(),
        "server": {
            "uptime": snap.uptime,
            "startTime": snap.start_time,
            "requestCount": snap.request_count,
            "errorCount": snap.error_count,
            "lastError": snap.last_error,
            "environment": state.environment.as_str(),
            "platform": std::env::consts::OS,
            "arch": std::env::consts::ARCH,
        },
        "features": {
            "webhookProxy": true,
            "conversationStorage": true,
            "rateLimit": true,
            "cors": true,
            "compression": true,
            "security": true,
        },
    }))
}

pub(super) async fn metrics(State(state): State<GatewayState>) -> Response {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.stats.prometheus(),
    )
        .into_response()
}

/// 503 until `server.readyAfterSecs` have passed since startup.
pub(super) async fn ready(State(state): State<GatewayState>) -> Response {
    let uptime = state.stats.uptime();
    if uptime >= state.ready_after {
        Json(json!({
            "status": "ready",
            "timestamp": now(),
            "uptime": uptime.as_secs(),
        }))
        .into_response()
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({
                "status": "not ready",
                "timestamp": now(),
                "uptime": uptime.as_secs(),
                "reason": "Application still starting",
            })),
        )
            .into_response()
    }
}

pub(super) async fn live() -> Json<Value> {
    Json(json!({ "status": "alive", "timestamp": now() }))
}

pub(super) async fn version(State(state): State<GatewayState>) -> Json<Value> {
    let mut info = app_info();
    if let Some(obj) = info.as_object_mut() {
        obj.insert("startTime".to_string(), json!(state.stats.started_at()));
        obj.insert("environment".to_string(), json!(state.environment.as_str()));
    }
    Json(info)
}

pub(super) async fn stats(State(state): State<GatewayState>) -> Json<Value> {
    Json(json!(state.stats.snapshot()))
}
