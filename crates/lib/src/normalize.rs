//! Response normalizer: turn an arbitrary webhook response body into one displayable string.
//!
//! Webhook targets are arbitrary and unversioned, so this never fails: shapes it does not
//! recognize degrade to a fixed fallback sentence. Resolution is an ordered chain of rules
//! (see [`RULES`]); the first rule that produces text wins.

use serde_json::{Map, Value};

/// Returned for bodies that are not objects or arrays (null, numbers, booleans) and for empty ones.
pub const UNPROCESSABLE_FALLBACK: &str = "Sorry, I could not process the service's response.";

/// Returned when an object went through every rule without a match.
pub const UNRECOGNIZED_FALLBACK: &str =
    "Sorry, I could not process the service's response. The reply was not in a recognized format.";

/// Returned instead of echoed request data when the target looks like an HTTP echo/test service.
pub const ECHO_GREETING: &str =
    "Hello! I'm an AI assistant. Your message was received successfully. How can I help you today?";

/// Returned for metadata-heavy objects whose content field could not be found.
pub const PROCESSED_MESSAGE: &str =
    "Hello! Your message was processed successfully. How can I help you?";

/// Top-level keys checked first, in priority order.
pub const CONTENT_FIELDS: &[&str] = &[
    "response",
    "message",
    "content",
    "text",
    "answer",
    "reply",
    "output",
    "result",
    "data",
    "body",
    "assistant_message",
];

/// Keys typical of echo services (httpbin and friends) that reflect the request back.
pub const ECHO_MARKER_FIELDS: &[&str] = &["headers", "origin", "args", "form", "files", "json"];

/// Substrings of a `url` field that identify a known echo service.
pub const ECHO_DOMAINS: &[&str] = &["httpbin", "postman-echo"];

/// Keys skipped by the generic scan (compared case-insensitively).
pub const TECHNICAL_FIELDS: &[&str] = &[
    "id",
    "model",
    "created",
    "object",
    "usage",
    "finish_reason",
    "timestamp",
    "version",
    "status",
    "code",
];

/// Generic scan only accepts strings longer than this (in characters, after trimming).
const MIN_SCAN_LEN: usize = 10;

/// Objects with more own keys than this are assumed to be API envelopes.
const METADATA_HEAVY_KEYS: usize = 5;

/// Borrowed view over a JSON container. Arrays behave like objects keyed by index.
#[derive(Clone, Copy)]
enum Fields<'a> {
    Object(&'a Map<String, Value>),
    Array(&'a [Value]),
}

impl<'a> Fields<'a> {
    fn of(value: &'a Value) -> Option<Self> {
        match value {
            Value::Object(map) => Some(Fields::Object(map)),
            Value::Array(items) => Some(Fields::Array(items)),
            _ => None,
        }
    }

    /// Named lookup; arrays have no named fields.
    fn get(self, key: &str) -> Option<&'a Value> {
        match self {
            Fields::Object(map) => map.get(key),
            Fields::Array(_) => None,
        }
    }

    fn len(self) -> usize {
        match self {
            Fields::Object(map) => map.len(),
            Fields::Array(items) => items.len(),
        }
    }

    /// Own entries in natural enumeration order (insertion order for objects, index order for arrays).
    fn entries(self) -> Box<dyn Iterator<Item = (String, &'a Value)> + 'a> {
        match self {
            Fields::Object(map) => Box::new(map.iter().map(|(k, v)| (k.clone(), v))),
            Fields::Array(items) => {
                Box::new(items.iter().enumerate().map(|(i, v)| (i.to_string(), v)))
            }
        }
    }
}

type Rule = fn(Fields<'_>) -> Option<String>;

/// Resolution rules in priority order: known fields, then structural shapes, then scanning.
const RULES: &[(&str, Rule)] = &[
    ("content_field", content_field),
    ("chat_completion", chat_completion),
    ("nested_data", nested_data),
    ("echo_service", echo_service),
    ("generic_scan", generic_scan),
    ("metadata_heavy", metadata_heavy),
];

/// Extract display text from a decoded response body.
///
/// Strings are returned trimmed. Containers go through [`RULES`]; when nothing matches, a
/// fallback sentence is returned and the raw body is logged at warn level.
pub fn extract_text(body: &Value) -> String {
    match body {
        Value::String(s) => s.trim().to_string(),
        _ => {
            let Some(fields) = Fields::of(body).filter(|f| f.len() > 0) else {
                return UNPROCESSABLE_FALLBACK.to_string();
            };
            match resolve(fields) {
                Some(text) => text,
                None => {
                    log::warn!("unrecognized webhook response: {}", body);
                    UNRECOGNIZED_FALLBACK.to_string()
                }
            }
        }
    }
}

/// Extract display text from a plain-text body.
pub fn extract_text_str(body: &str) -> String {
    body.trim().to_string()
}

/// True if `text` is one of the "could not process" fallbacks.
pub fn is_fallback(text: &str) -> bool {
    text == UNPROCESSABLE_FALLBACK || text == UNRECOGNIZED_FALLBACK
}

fn resolve(fields: Fields<'_>) -> Option<String> {
    RULES.iter().find_map(|(name, rule)| {
        let text = rule(fields)?;
        log::debug!("normalized response via {}", name);
        Some(text)
    })
}

/// Trimmed text of a string value, if it has any non-whitespace content.
fn non_empty_str(value: &Value) -> Option<String> {
    let s = value.as_str()?.trim();
    if s.is_empty() {
        None
    } else {
        Some(s.to_string())
    }
}

/// Loose truthiness used by marker detection: null, false, 0 and "" do not count.
fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

fn content_field(fields: Fields<'_>) -> Option<String> {
    CONTENT_FIELDS
        .iter()
        .find_map(|key| fields.get(key).and_then(non_empty_str))
}

fn chat_completion(fields: Fields<'_>) -> Option<String> {
    let choice = fields.get("choices")?.as_array()?.first()?;
    choice
        .get("message")
        .and_then(|m| m.get("content"))
        .and_then(non_empty_str)
        .or_else(|| choice.get("text").and_then(non_empty_str))
}

fn nested_data(fields: Fields<'_>) -> Option<String> {
    let nested = Fields::of(fields.get("data")?)?;
    if nested.len() == 0 {
        return None;
    }
    resolve(nested)
}

fn echo_service(fields: Fields<'_>) -> Option<String> {
    let has_marker = ECHO_MARKER_FIELDS
        .iter()
        .any(|key| fields.get(key).is_some_and(is_truthy));
    let echo_url = fields
        .get("url")
        .and_then(Value::as_str)
        .is_some_and(|url| ECHO_DOMAINS.iter().any(|d| url.contains(d)));
    if has_marker || echo_url {
        Some(ECHO_GREETING.to_string())
    } else {
        None
    }
}

fn generic_scan(fields: Fields<'_>) -> Option<String> {
    fields.entries().find_map(|(key, value)| {
        let text = value.as_str()?.trim();
        if text.chars().count() <= MIN_SCAN_LEN {
            return None;
        }
        let key = key.to_lowercase();
        if TECHNICAL_FIELDS.contains(&key.as_str()) {
            return None;
        }
        Some(text.to_string())
    })
}

fn metadata_heavy(fields: Fields<'_>) -> Option<String> {
    if fields.len() > METADATA_HEAVY_KEYS {
        Some(PROCESSED_MESSAGE.to_string())
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn strings_are_trimmed() {
        assert_eq!(extract_text(&json!("  hello there \n")), "hello there");
        assert_eq!(extract_text(&json!("   ")), "");
        assert_eq!(extract_text_str("\tplain text\n"), "plain text");
    }

    #[test]
    fn scalars_and_empty_containers_fall_back() {
        for body in [json!(null), json!(42), json!(true), json!({}), json!([])] {
            assert_eq!(extract_text(&body), UNPROCESSABLE_FALLBACK, "body: {}", body);
        }
    }

    #[test]
    fn response_field_wins() {
        let body = json!({ "id": "abc", "response": "  Bonjour  ", "message": "ignored" });
        assert_eq!(extract_text(&body), "Bonjour");
    }

    #[test]
    fn content_fields_follow_priority_order() {
        let body = json!({ "text": "from text", "content": "from content" });
        assert_eq!(extract_text(&body), "from content");
        let body = json!({ "assistant_message": "last resort", "body": "  body wins " });
        assert_eq!(extract_text(&body), "body wins");
    }

    #[test]
    fn blank_content_field_is_skipped() {
        let body = json!({ "response": "   ", "answer": "42 is the answer" });
        assert_eq!(extract_text(&body), "42 is the answer");
    }

    #[test]
    fn chat_completion_message_content() {
        let body = json!({
            "id": "chatcmpl-1",
            "object": "chat.completion",
            "choices": [{ "index": 0, "message": { "role": "assistant", "content": " Hi! " } }]
        });
        assert_eq!(extract_text(&body), "Hi!");
    }

    #[test]
    fn chat_completion_text_choice() {
        let body = json!({ "choices": [{ "text": "completion text" }] });
        assert_eq!(extract_text(&body), "completion text");
    }

    #[test]
    fn empty_choices_do_not_match() {
        let body = json!({ "choices": [], "model": "m" });
        assert_eq!(extract_text(&body), UNRECOGNIZED_FALLBACK);
    }

    #[test]
    fn nested_data_is_resolved_recursively() {
        let body = json!({ "data": { "reply": "nested reply" } });
        assert_eq!(extract_text(&body), "nested reply");
        let body = json!({ "data": { "data": { "choices": [{ "text": "deep" }] } } });
        assert_eq!(extract_text(&body), "deep");
    }

    #[test]
    fn unrecognized_nested_data_falls_through() {
        let body = json!({ "data": { "n": 1 }, "args": {} });
        assert_eq!(extract_text(&body), ECHO_GREETING);
    }

    #[test]
    fn echo_service_shape_gets_greeting() {
        let body = json!({
            "args": {},
            "headers": { "Host": "httpbin.org", "User-Agent": "Hookchat/1.0 long enough" },
            "origin": "203.0.113.9"
        });
        assert_eq!(extract_text(&body), ECHO_GREETING);
    }

    #[test]
    fn echo_url_gets_greeting() {
        let body = json!({ "url": "https://httpbin.org/post", "note": "echoed request payload" });
        assert_eq!(extract_text(&body), ECHO_GREETING);
        let body = json!({ "url": "https://postman-echo.com/post" });
        assert_eq!(extract_text(&body), ECHO_GREETING);
    }

    #[test]
    fn falsy_echo_markers_are_ignored() {
        let body = json!({ "origin": "", "summary": "a reasonably long sentence" });
        assert_eq!(extract_text(&body), "a reasonably long sentence");
    }

    #[test]
    fn generic_scan_skips_technical_and_short_values() {
        let body = json!({
            "ID": "0123456789abcdef",
            "Status": "completed successfully",
            "short": "tiny",
            "explanation": "  the first long enough field  ",
            "later": "another long enough field"
        });
        assert_eq!(extract_text(&body), "the first long enough field");
    }

    #[test]
    fn generic_scan_requires_more_than_ten_chars() {
        let body = json!({ "note": "0123456789" });
        assert_eq!(extract_text(&body), UNRECOGNIZED_FALLBACK);
        let body = json!({ "note": "0123456789a" });
        assert_eq!(extract_text(&body), "0123456789a");
    }

    #[test]
    fn metadata_heavy_objects_get_processed_message() {
        let body = json!({
            "id": "x", "model": "m", "created": 1, "object": "o", "usage": {}, "status": "ok"
        });
        assert_eq!(extract_text(&body), PROCESSED_MESSAGE);
    }

    #[test]
    fn small_unrecognized_object_falls_back() {
        let body = json!({ "id": 7, "ok": true });
        assert_eq!(extract_text(&body), UNRECOGNIZED_FALLBACK);
        assert!(is_fallback(&extract_text(&body)));
    }

    #[test]
    fn arrays_use_index_keys() {
        let body = json!(["short", "long enough element"]);
        assert_eq!(extract_text(&body), "long enough element");
        let body = json!([1, 2, 3, 4, 5, 6]);
        assert_eq!(extract_text(&body), PROCESSED_MESSAGE);
    }

    #[test]
    fn extraction_is_idempotent_and_does_not_mutate() {
        let body = json!({ "data": { "message": " same " }, "extra": "value with length" });
        let before = body.clone();
        let first = extract_text(&body);
        let second = extract_text(&body);
        assert_eq!(first, second);
        assert_eq!(body, before);
    }
}
