//! Outbound webhook client: one bounded HTTP exchange per relay call, no retries.

use super::error::RelayError;
use super::request::{RelayKind, RelayRequest};
use crate::config::RelayConfig;
use crate::normalize;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE, USER_AGENT};
use reqwest::{StatusCode, Url};
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::time::{Duration, Instant};

/// Substituted for a JSON-labelled body that does not decode.
pub const UNPARSEABLE_BODY: &str = "Response received but it could not be parsed.";

/// Message carried by the synthetic test payload.
pub const TEST_MESSAGE: &str = "Connection test from Hookchat";

/// Version stamped into enriched send payloads.
pub const PAYLOAD_VERSION: &str = "1.0";

/// Completed test call. Any HTTP status counts as a completed exchange.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TestOutcome {
    pub status: u16,
    pub status_text: String,
    pub response_time: u64,
    pub headers: BTreeMap<String, String>,
    pub data: Value,
}

/// Successful send: normalized reply text plus response metadata.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SendOutcome {
    pub content: String,
    pub metadata: Map<String, Value>,
    pub response_time: u64,
    pub status: u16,
    pub headers: BTreeMap<String, String>,
}

/// Result of a HEAD request against a webhook URL.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InfoOutcome {
    pub url: String,
    pub status: u16,
    pub status_text: String,
    pub headers: BTreeMap<String, String>,
    pub accessible: bool,
}

/// Response after the body has been fully read.
struct RawResponse {
    status: StatusCode,
    headers: HeaderMap,
    body: Value,
    elapsed: Duration,
}

/// Client for relaying calls to user-configured webhooks. Cheap to clone; safe to share.
#[derive(Clone)]
pub struct RelayClient {
    client: reqwest::Client,
    timeout: Duration,
    info_timeout: Duration,
    user_agent: String,
    source: String,
}

impl RelayClient {
    pub fn new(config: &RelayConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            timeout: Duration::from_secs(config.timeout_secs),
            info_timeout: Duration::from_secs(config.info_timeout_secs),
            user_agent: config.user_agent.clone(),
            source: config.source.clone(),
        }
    }

    /// Override the relay timeout (tests use short deadlines).
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Connectivity check: send the synthetic test payload and report whatever comes back.
    pub async fn test(&self, request: &RelayRequest) -> Result<TestOutcome, RelayError> {
        let payload = self.test_payload();
        log::info!(
            "relay test: {} {}",
            request.config.method,
            request.config.url
        );
        let raw = self.exchange(RelayKind::Test, request, &payload).await?;
        log::info!(
            "relay test completed: {} in {}ms",
            raw.status.as_u16(),
            raw.elapsed.as_millis()
        );
        Ok(TestOutcome {
            status: raw.status.as_u16(),
            status_text: status_text(raw.status),
            response_time: millis(raw.elapsed),
            headers: header_map(&raw.headers),
            data: raw.body,
        })
    }

    /// Deliver a chat message and normalize the reply. Non-2xx statuses are failures.
    pub async fn send(&self, request: &RelayRequest) -> Result<SendOutcome, RelayError> {
        let payload = self.enrich_payload(request.payload.clone().unwrap_or_default());
        log::info!(
            "relay send: {} {}",
            request.config.method,
            request.config.url
        );
        let raw = self.exchange(RelayKind::Send, request, &payload).await?;
        if !raw.status.is_success() {
            return Err(RelayError::Http {
                status: raw.status.as_u16(),
                status_text: status_text(raw.status),
            });
        }
        let content = normalize::extract_text(&raw.body);
        let metadata = response_metadata(&raw.body);
        log::info!("relay send completed in {}ms", raw.elapsed.as_millis());
        Ok(SendOutcome {
            content,
            metadata,
            response_time: millis(raw.elapsed),
            status: raw.status.as_u16(),
            headers: header_map(&raw.headers),
        })
    }

    /// HEAD request with its own short timeout.
    pub async fn info(&self, url: &Url) -> Result<InfoOutcome, RelayError> {
        let res = self
            .client
            .head(url.clone())
            .timeout(self.info_timeout)
            .send()
            .await
            .map_err(|e| RelayError::from_reqwest(&e, RelayKind::Test))?;
        let status = res.status();
        Ok(InfoOutcome {
            url: url.to_string(),
            status: status.as_u16(),
            status_text: status_text(status),
            headers: header_map(res.headers()),
            accessible: status.is_success(),
        })
    }

    /// Issue the request and read the body; the timeout covers both.
    async fn exchange(
        &self,
        kind: RelayKind,
        request: &RelayRequest,
        payload: &Value,
    ) -> Result<RawResponse, RelayError> {
        let config = &request.config;
        let builder = self
            .client
            .request(config.method.to_reqwest(), config.url.clone())
            .timeout(self.timeout)
            .headers(self.outbound_headers(&config.headers))
            .body(payload.to_string());

        let started = Instant::now();
        let res = builder.send().await.map_err(|e| {
            log::warn!("relay {:?} to {} failed: {}", kind, config.url, e);
            RelayError::from_reqwest(&e, kind)
        })?;
        let status = res.status();
        let headers = res.headers().clone();
        let bytes = res.bytes().await.map_err(|e| {
            log::warn!("relay {:?} reading body from {} failed: {}", kind, config.url, e);
            RelayError::from_reqwest(&e, kind)
        })?;
        let elapsed = started.elapsed();

        Ok(RawResponse {
            status,
            body: decode_body(&headers, &bytes),
            headers,
            elapsed,
        })
    }

    /// Default headers, then the caller's headers replacing same-named defaults.
    fn outbound_headers(&self, custom: &BTreeMap<String, String>) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        if let Ok(ua) = HeaderValue::from_str(&self.user_agent) {
            headers.insert(USER_AGENT, ua);
        }
        for (name, value) in custom {
            match (
                HeaderName::from_bytes(name.as_bytes()),
                HeaderValue::from_str(value),
            ) {
                (Ok(name), Ok(value)) => {
                    headers.insert(name, value);
                }
                _ => log::debug!("skipping invalid header {}", name),
            }
        }
        headers
    }

    fn test_payload(&self) -> Value {
        json!({
            "message": TEST_MESSAGE,
            "timestamp": timestamp(),
            "test": true,
            "source": self.source,
        })
    }

    /// Caller payload with timestamp, source and version added (overwriting same-named keys).
    fn enrich_payload(&self, mut payload: Map<String, Value>) -> Value {
        payload.insert("timestamp".to_string(), Value::String(timestamp()));
        payload.insert("source".to_string(), Value::String(self.source.clone()));
        payload.insert(
            "version".to_string(),
            Value::String(PAYLOAD_VERSION.to_string()),
        );
        Value::Object(payload)
    }
}

/// JSON when the content type says so, otherwise the body as text.
pub fn decode_body(headers: &HeaderMap, bytes: &[u8]) -> Value {
    let is_json = headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.to_ascii_lowercase().contains("application/json"));
    if is_json {
        serde_json::from_slice(bytes)
            .unwrap_or_else(|_| Value::String(UNPARSEABLE_BODY.to_string()))
    } else {
        Value::String(String::from_utf8_lossy(bytes).into_owned())
    }
}

/// `model`, `usage` and `finish_reason` from the top level, merged with any `metadata` object.
pub fn response_metadata(body: &Value) -> Map<String, Value> {
    let mut metadata = Map::new();
    let Some(obj) = body.as_object() else {
        return metadata;
    };
    for key in ["model", "usage", "finish_reason"] {
        if let Some(v) = obj.get(key).filter(|v| !v.is_null()) {
            metadata.insert(key.to_string(), v.clone());
        }
    }
    if let Some(extra) = obj.get("metadata").and_then(Value::as_object) {
        for (k, v) in extra {
            metadata.insert(k.clone(), v.clone());
        }
    }
    metadata
}

/// Response headers as a flat map; repeated headers are joined with ", ".
fn header_map(headers: &HeaderMap) -> BTreeMap<String, String> {
    let mut out: BTreeMap<String, String> = BTreeMap::new();
    for (name, value) in headers {
        let value = String::from_utf8_lossy(value.as_bytes()).into_owned();
        out.entry(name.as_str().to_string())
            .and_modify(|existing| {
                existing.push_str(", ");
                existing.push_str(&value);
            })
            .or_insert(value);
    }
    out
}

fn status_text(status: StatusCode) -> String {
    status.canonical_reason().unwrap_or("").to_string()
}

fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

fn timestamp() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}
