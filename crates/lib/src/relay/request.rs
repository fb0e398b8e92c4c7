//! Relay request validation: turn a caller's JSON body into a checked [`RelayRequest`].
//!
//! Every violated field is reported at once; nothing here touches the network.

use crate::validation::ValidationError;
use reqwest::header::{HeaderName, HeaderValue};
use reqwest::Url;
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;

/// Which relay operation a request is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayKind {
    /// Connectivity check with a synthetic payload.
    Test,
    /// Real chat message.
    Send,
}

/// HTTP methods a webhook may be called with.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum WebhookMethod {
    Get,
    #[default]
    Post,
    Put,
    Patch,
}

impl WebhookMethod {
    pub const ALL: [WebhookMethod; 4] = [
        WebhookMethod::Get,
        WebhookMethod::Post,
        WebhookMethod::Put,
        WebhookMethod::Patch,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            WebhookMethod::Get => "GET",
            WebhookMethod::Post => "POST",
            WebhookMethod::Put => "PUT",
            WebhookMethod::Patch => "PATCH",
        }
    }

    /// Exact, upper-case token; `None` for anything else (`"post"` included).
    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|m| m.as_str() == s)
    }

    pub fn to_reqwest(self) -> reqwest::Method {
        match self {
            WebhookMethod::Get => reqwest::Method::GET,
            WebhookMethod::Post => reqwest::Method::POST,
            WebhookMethod::Put => reqwest::Method::PUT,
            WebhookMethod::Patch => reqwest::Method::PATCH,
        }
    }
}

impl fmt::Display for WebhookMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Validated webhook target. Replaced as a whole, never edited in place.
#[derive(Debug, Clone, PartialEq)]
pub struct WebhookConfig {
    pub url: Url,
    pub method: WebhookMethod,
    pub headers: BTreeMap<String, String>,
}

/// Validated relay call: target plus the caller's payload (required for send).
#[derive(Debug, Clone)]
pub struct RelayRequest {
    pub config: WebhookConfig,
    pub payload: Option<Map<String, Value>>,
}

/// Parse an absolute http(s) URL with a host.
pub fn parse_webhook_url(raw: &str) -> Result<Url, &'static str> {
    let url = Url::parse(raw.trim()).map_err(|_| "invalid URL")?;
    if url.scheme() != "http" && url.scheme() != "https" {
        return Err("URL must use the http or https protocol");
    }
    if url.host_str().map_or(true, str::is_empty) {
        return Err("URL must include a host");
    }
    Ok(url)
}

fn validate_url(body: &Map<String, Value>, errors: &mut ValidationError) -> Option<Url> {
    match body.get("url") {
        None | Some(Value::Null) => {
            errors.push("url", "url is required");
            None
        }
        Some(Value::String(s)) => match parse_webhook_url(s) {
            Ok(url) => Some(url),
            Err(msg) => {
                errors.push("url", msg);
                None
            }
        },
        Some(_) => {
            errors.push("url", "url must be a string");
            None
        }
    }
}

/// Validate only the `url` field of a JSON request body, with the same messages as
/// [`RelayRequest::from_json`].
pub fn webhook_url_from_json(body: &Value) -> Result<Url, ValidationError> {
    let Some(body) = body.as_object() else {
        return Err(ValidationError::single("body", "request body must be a JSON object"));
    };
    let mut errors = ValidationError::default();
    match validate_url(body, &mut errors) {
        Some(url) => Ok(url),
        None => Err(errors),
    }
}

fn validate_method(body: &Map<String, Value>, errors: &mut ValidationError) -> WebhookMethod {
    match body.get("method") {
        None | Some(Value::Null) => WebhookMethod::default(),
        Some(Value::String(s)) => WebhookMethod::parse(s).unwrap_or_else(|| {
            errors.push("method", "unsupported HTTP method (expected GET, POST, PUT or PATCH)");
            WebhookMethod::default()
        }),
        Some(_) => {
            errors.push("method", "method must be a string");
            WebhookMethod::default()
        }
    }
}

fn validate_headers(
    body: &Map<String, Value>,
    errors: &mut ValidationError,
) -> BTreeMap<String, String> {
    let mut headers = BTreeMap::new();
    let map = match body.get("headers") {
        None | Some(Value::Null) => return headers,
        Some(Value::Object(map)) => map,
        Some(_) => {
            errors.push("headers", "headers must be an object");
            return headers;
        }
    };
    for (name, value) in map {
        let field = format!("headers.{}", name);
        let Some(value) = value.as_str() else {
            errors.push(field, "header values must be strings");
            continue;
        };
        if HeaderName::from_bytes(name.as_bytes()).is_err() {
            errors.push(field, "invalid header name");
            continue;
        }
        if HeaderValue::from_str(value).is_err() {
            errors.push(field, "invalid header value");
            continue;
        }
        headers.insert(name.clone(), value.to_string());
    }
    headers
}

fn validate_payload(
    kind: RelayKind,
    body: &Map<String, Value>,
    errors: &mut ValidationError,
) -> Option<Map<String, Value>> {
    let payload = match body.get("payload") {
        None | Some(Value::Null) => {
            if kind == RelayKind::Send {
                errors.push("payload", "payload is required");
            }
            return None;
        }
        Some(Value::Object(map)) => map,
        Some(_) => {
            errors.push("payload", "payload must be an object");
            return None;
        }
    };
    if kind == RelayKind::Send {
        let has_message = payload
            .get("message")
            .and_then(Value::as_str)
            .is_some_and(|m| !m.trim().is_empty());
        if !has_message {
            errors.push("payload.message", "message is required");
        }
    }
    Some(payload.clone())
}

impl RelayRequest {
    /// Validate a raw JSON request body for the given operation.
    pub fn from_json(kind: RelayKind, body: &Value) -> Result<Self, ValidationError> {
        let Some(body) = body.as_object() else {
            return Err(ValidationError::single("body", "request body must be a JSON object"));
        };
        let mut errors = ValidationError::default();
        let url = validate_url(body, &mut errors);
        let method = validate_method(body, &mut errors);
        let headers = validate_headers(body, &mut errors);
        let payload = validate_payload(kind, body, &mut errors);
        match url {
            Some(url) => errors.into_result(|| RelayRequest {
                config: WebhookConfig {
                    url,
                    method,
                    headers,
                },
                payload,
            }),
            None => Err(errors),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn defaults_to_post_without_headers() {
        let req = RelayRequest::from_json(RelayKind::Test, &json!({ "url": "https://example.com/hook" }))
            .expect("valid");
        assert_eq!(req.config.method, WebhookMethod::Post);
        assert!(req.config.headers.is_empty());
        assert!(req.payload.is_none());
        assert_eq!(req.config.url.as_str(), "https://example.com/hook");
    }

    #[test]
    fn method_must_be_exact_token() {
        let req = RelayRequest::from_json(
            RelayKind::Test,
            &json!({ "url": "http://localhost:8080/", "method": "PATCH" }),
        )
        .expect("valid");
        assert_eq!(req.config.method, WebhookMethod::Patch);

        for method in ["patch", " POST ", "Get"] {
            let err = RelayRequest::from_json(
                RelayKind::Test,
                &json!({ "url": "http://localhost:8080/", "method": method }),
            )
            .unwrap_err();
            assert_eq!(err.fields(), vec!["method"], "method {:?}", method);
        }
    }

    #[test]
    fn standalone_url_check_matches_request_wording() {
        let err = webhook_url_from_json(&json!({})).unwrap_err();
        assert_eq!(err.fields(), vec!["url"]);
        assert_eq!(err.issues[0].message, "url is required");
        let err = webhook_url_from_json(&json!({ "url": 5 })).unwrap_err();
        assert_eq!(err.issues[0].message, "url must be a string");
        assert!(webhook_url_from_json(&json!({ "url": "https://example.com/x" })).is_ok());
    }

    #[test]
    fn reports_every_invalid_field() {
        let err = RelayRequest::from_json(
            RelayKind::Send,
            &json!({
                "url": "ftp://example.com",
                "method": "DELETE",
                "headers": { "X-Ok": "1", "X-Bad": 5 },
                "payload": { "message": "" }
            }),
        )
        .unwrap_err();
        assert_eq!(
            err.fields(),
            vec!["url", "method", "headers.X-Bad", "payload.message"]
        );
    }

    #[test]
    fn missing_url_is_required() {
        let err = RelayRequest::from_json(RelayKind::Test, &json!({})).unwrap_err();
        assert_eq!(err.fields(), vec!["url"]);
        assert_eq!(err.issues[0].message, "url is required");
    }

    #[test]
    fn relative_url_is_rejected() {
        let err = RelayRequest::from_json(RelayKind::Test, &json!({ "url": "/just/a/path" }))
            .unwrap_err();
        assert_eq!(err.fields(), vec!["url"]);
    }

    #[test]
    fn headers_must_be_an_object_of_strings() {
        let err = RelayRequest::from_json(
            RelayKind::Test,
            &json!({ "url": "https://example.com", "headers": ["a"] }),
        )
        .unwrap_err();
        assert_eq!(err.fields(), vec!["headers"]);

        let err = RelayRequest::from_json(
            RelayKind::Test,
            &json!({ "url": "https://example.com", "headers": { "X-Nested": { "a": "b" } } }),
        )
        .unwrap_err();
        assert_eq!(err.fields(), vec!["headers.X-Nested"]);
    }

    #[test]
    fn illegal_header_name_is_rejected() {
        let err = RelayRequest::from_json(
            RelayKind::Test,
            &json!({ "url": "https://example.com", "headers": { "Bad Name": "x" } }),
        )
        .unwrap_err();
        assert_eq!(err.issues[0].message, "invalid header name");
    }

    #[test]
    fn send_requires_payload_message() {
        let err = RelayRequest::from_json(RelayKind::Send, &json!({ "url": "https://example.com" }))
            .unwrap_err();
        assert_eq!(err.fields(), vec!["payload"]);

        let err = RelayRequest::from_json(
            RelayKind::Send,
            &json!({ "url": "https://example.com", "payload": { "conversation_id": "c1" } }),
        )
        .unwrap_err();
        assert_eq!(err.fields(), vec!["payload.message"]);
        assert!(err.to_string().contains("payload.message"));
    }

    #[test]
    fn send_keeps_payload() {
        let req = RelayRequest::from_json(
            RelayKind::Send,
            &json!({
                "url": "https://example.com",
                "headers": { "Authorization": "Bearer t" },
                "payload": { "message": "hi", "user_id": "user" }
            }),
        )
        .expect("valid");
        let payload = req.payload.expect("payload");
        assert_eq!(payload.get("user_id"), Some(&json!("user")));
        assert_eq!(
            req.config.headers.get("Authorization").map(String::as_str),
            Some("Bearer t")
        );
    }

    #[test]
    fn non_object_body_is_rejected() {
        let err = RelayRequest::from_json(RelayKind::Test, &json!("https://example.com")).unwrap_err();
        assert_eq!(err.fields(), vec!["body"]);
    }
}
