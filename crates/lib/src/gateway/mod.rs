//! Gateway: HTTP server for the relay, conversation and health APIs.
//!
//! Single port serves the JSON API and the embedded browser UI. Every response carries
//! security headers; requests are rate limited per client address.

mod assets;
mod conversation_routes;
mod health_routes;
mod protocol;
mod relay_routes;
mod server;

pub use protocol::{ApiError, RelayFailure, Success};
pub use server::{build_router, run_gateway, GatewayState};
