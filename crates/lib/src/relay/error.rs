//! Relay failure taxonomy and classification of transport errors.

use super::request::RelayKind;
use serde::{Deserialize, Serialize};
use std::error::Error as _;
use std::fmt;

/// Machine-readable failure code attached to every failed relay result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    /// Host name could not be resolved.
    DnsError,
    ConnectionRefused,
    /// Deadline exceeded before the response body was read.
    Timeout,
    InvalidUrl,
    /// Send path only: the webhook answered with a non-2xx status.
    HttpError,
    /// Unclassified transport failure on the test path.
    ConnectionError,
    /// Unclassified transport failure on the send path.
    SendError,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::DnsError => "DNS_ERROR",
            ErrorKind::ConnectionRefused => "CONNECTION_REFUSED",
            ErrorKind::Timeout => "TIMEOUT",
            ErrorKind::InvalidUrl => "INVALID_URL",
            ErrorKind::HttpError => "HTTP_ERROR",
            ErrorKind::ConnectionError => "CONNECTION_ERROR",
            ErrorKind::SendError => "SEND_ERROR",
        }
    }

    /// Human-readable summary shown to the end user.
    pub fn summary(self) -> &'static str {
        match self {
            ErrorKind::DnsError => "Server not found",
            ErrorKind::ConnectionRefused => "Connection refused",
            ErrorKind::Timeout => "Connection timed out",
            ErrorKind::InvalidUrl => "Invalid URL",
            ErrorKind::HttpError => "Webhook returned an error status",
            ErrorKind::ConnectionError => "Connection error",
            ErrorKind::SendError => "Error while sending the message",
        }
    }

    /// Fallback for failures that match no specific kind.
    pub fn default_for(kind: RelayKind) -> Self {
        match kind {
            RelayKind::Test => ErrorKind::ConnectionError,
            RelayKind::Send => ErrorKind::SendError,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A relay call that did not produce a usable response.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    /// No HTTP response was obtained (DNS, connect, timeout, ...).
    #[error("{}: {details}", .kind.summary())]
    Transport { kind: ErrorKind, details: String },
    /// Send path: response obtained but the status is not 2xx.
    #[error("HTTP {status}: {status_text}")]
    Http { status: u16, status_text: String },
}

impl RelayError {
    /// Classify a reqwest failure for the given operation.
    pub fn from_reqwest(err: &reqwest::Error, kind: RelayKind) -> Self {
        RelayError::Transport {
            kind: classify(err, kind),
            details: error_chain(err),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            RelayError::Transport { kind, .. } => *kind,
            RelayError::Http { .. } => ErrorKind::HttpError,
        }
    }

    /// User-facing message: the kind summary, or the status line for HTTP errors.
    pub fn message(&self) -> String {
        match self {
            RelayError::Transport { kind, .. } => kind.summary().to_string(),
            RelayError::Http { .. } => self.to_string(),
        }
    }

    /// Diagnostic detail (full error chain or status line).
    pub fn details(&self) -> String {
        match self {
            RelayError::Transport { details, .. } => details.clone(),
            RelayError::Http { .. } => self.to_string(),
        }
    }
}

/// Map a reqwest error onto the taxonomy; unknown failures get the path's default kind.
pub fn classify(err: &reqwest::Error, kind: RelayKind) -> ErrorKind {
    if err.is_timeout() {
        return ErrorKind::Timeout;
    }
    if err.is_builder() {
        return ErrorKind::InvalidUrl;
    }
    let mut source = err.source();
    while let Some(cause) = source {
        if let Some(io) = cause.downcast_ref::<std::io::Error>() {
            match io.kind() {
                std::io::ErrorKind::ConnectionRefused => return ErrorKind::ConnectionRefused,
                std::io::ErrorKind::TimedOut => return ErrorKind::Timeout,
                _ => {}
            }
        }
        source = cause.source();
    }
    let chain = error_chain(err).to_lowercase();
    if chain.contains("dns error") || chain.contains("failed to lookup address") {
        ErrorKind::DnsError
    } else if chain.contains("connection refused") {
        ErrorKind::ConnectionRefused
    } else if chain.contains("relative url") || chain.contains("invalid url") {
        ErrorKind::InvalidUrl
    } else {
        ErrorKind::default_for(kind)
    }
}

/// Error and all of its sources joined with ": ".
fn error_chain(err: &reqwest::Error) -> String {
    let mut out = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        let text = cause.to_string();
        if !out.contains(&text) {
            out.push_str(": ");
            out.push_str(&text);
        }
        source = cause.source();
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_serialize_as_codes() {
        assert_eq!(
            serde_json::to_value(ErrorKind::DnsError).unwrap(),
            serde_json::json!("DNS_ERROR")
        );
        assert_eq!(
            serde_json::to_value(ErrorKind::ConnectionRefused).unwrap(),
            serde_json::json!(ErrorKind::ConnectionRefused.as_str())
        );
        assert_eq!(ErrorKind::SendError.to_string(), "SEND_ERROR");
    }

    #[test]
    fn default_kind_depends_on_path() {
        assert_eq!(ErrorKind::default_for(RelayKind::Test), ErrorKind::ConnectionError);
        assert_eq!(ErrorKind::default_for(RelayKind::Send), ErrorKind::SendError);
    }

    #[test]
    fn http_error_message_embeds_status() {
        let err = RelayError::Http {
            status: 500,
            status_text: "Internal Server Error".to_string(),
        };
        assert_eq!(err.kind(), ErrorKind::HttpError);
        assert_eq!(err.message(), "HTTP 500: Internal Server Error");
    }

    #[test]
    fn transport_error_message_is_summary() {
        let err = RelayError::Transport {
            kind: ErrorKind::Timeout,
            details: "operation timed out".to_string(),
        };
        assert_eq!(err.message(), "Connection timed out");
        assert_eq!(err.details(), "operation timed out");
        assert_eq!(err.to_string(), "Connection timed out: operation timed out");
    }
}
