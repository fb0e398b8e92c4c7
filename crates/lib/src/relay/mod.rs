//! Webhook relay: validate a caller's target, call it once with a bounded timeout,
//! classify failures and normalize the reply.

mod client;
mod error;
mod request;

pub use client::{
    decode_body, response_metadata, InfoOutcome, RelayClient, SendOutcome, TestOutcome,
    PAYLOAD_VERSION, TEST_MESSAGE, UNPARSEABLE_BODY,
};
pub use error::{classify, ErrorKind, RelayError};
pub use request::{
    parse_webhook_url, webhook_url_from_json, RelayKind, RelayRequest, WebhookConfig, WebhookMethod,
};
