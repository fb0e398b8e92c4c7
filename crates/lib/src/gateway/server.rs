//! Gateway HTTP server: relay, conversation and health APIs plus the embedded UI (single port).

use crate::config::{self, Config};
use crate::conversations::ConversationStore;
use crate::gateway::{assets, conversation_routes, health_routes, relay_routes};
use crate::health::ServerStats;
use crate::rate_limit::{Decision, RateLimiter};
use crate::relay::RelayClient;
use anyhow::{Context, Result};
use axum::{
    extract::{ConnectInfo, DefaultBodyLimit, Request, State},
    http::{header, HeaderName, HeaderValue, Method, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tower_http::compression::CompressionLayer;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::set_header::SetResponseHeaderLayer;

const MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

const CONTENT_SECURITY_POLICY: &str = "default-src 'self'; script-src 'self'; \
    style-src 'self' 'unsafe-inline'; img-src 'self' data: https:; connect-src 'self'; \
    frame-ancestors 'none'";

const GLOBAL_LIMIT_MESSAGE: &str = "Too many requests from this IP, please try again later.";
const RELAY_LIMIT_MESSAGE: &str = "Too many webhook requests, please slow down.";

const RATELIMIT_LIMIT: HeaderName = HeaderName::from_static("ratelimit-limit");
const RATELIMIT_REMAINING: HeaderName = HeaderName::from_static("ratelimit-remaining");
const RATELIMIT_RESET: HeaderName = HeaderName::from_static("ratelimit-reset");

/// Shared state for the gateway (config, relay client, conversations, counters, limiters).
#[derive(Clone)]
pub struct GatewayState {
    pub config: Arc<Config>,
    /// Environment name reported by health endpoints.
    pub environment: String,
    /// Readiness delay after startup.
    pub ready_after: Duration,
    pub relay: RelayClient,
    pub conversations: Arc<ConversationStore>,
    pub stats: Arc<ServerStats>,
    pub global_limiter: Arc<RateLimiter>,
    pub relay_limiter: Arc<RateLimiter>,
}

impl GatewayState {
    pub fn new(config: Config) -> Self {
        let limits = &config.rate_limit;
        Self {
            environment: config::resolve_environment(&config),
            ready_after: Duration::from_secs(config.server.ready_after_secs),
            relay: RelayClient::new(&config.relay),
            conversations: Arc::new(ConversationStore::new()),
            stats: Arc::new(ServerStats::new()),
            global_limiter: Arc::new(RateLimiter::new(
                limits.global_max,
                Duration::from_secs(limits.global_window_secs),
            )),
            relay_limiter: Arc::new(RateLimiter::new(
                limits.relay_max,
                Duration::from_secs(limits.relay_window_secs),
            )),
            config: Arc::new(config),
        }
    }
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|o| match HeaderValue::from_str(o) {
            Ok(v) => Some(v),
            Err(_) => {
                log::warn!("ignoring invalid CORS origin: {}", o);
                None
            }
        })
        .collect();
    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
}

/// Build the application router. Callers add connect info when serving (see [`run_gateway`]).
pub fn build_router(state: GatewayState) -> Router {
    let origins = config::resolve_cors_origins(&state.config, state.config.server.port);

    let relay = Router::new()
        .route("/relay/test", post(relay_routes::relay_test))
        .route("/relay/send", post(relay_routes::relay_send))
        .route("/relay/info", post(relay_routes::relay_info))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            relay_rate_limit,
        ));

    let health = Router::new()
        .route("/api/health", get(health_routes::health))
        .route("/api/health/detailed", get(health_routes::detailed))
        .route("/api/health/metrics", get(health_routes::metrics))
        .route("/api/health/ready", get(health_routes::ready))
        .route("/api/health/live", get(health_routes::live))
        .route("/api/health/version", get(health_routes::version))
        .route("/api/health/stats", get(health_routes::stats));

    let conversations = Router::new()
        .route(
            "/api/conversations",
            get(conversation_routes::list).post(conversation_routes::upsert),
        )
        .route(
            "/api/conversations/stats/summary",
            get(conversation_routes::stats),
        )
        .route(
            "/api/conversations/export/all",
            get(conversation_routes::export_all),
        )
        .route(
            "/api/conversations/import",
            post(conversation_routes::import),
        )
        .route(
            "/api/conversations/:id",
            get(conversation_routes::get_one).delete(conversation_routes::delete),
        )
        .route(
            "/api/conversations/:id/messages",
            post(conversation_routes::append_message),
        );

    Router::new()
        .merge(relay)
        .merge(health)
        .merge(conversations)
        .fallback(assets::fallback)
        .layer(middleware::from_fn_with_state(
            state.clone(),
            global_rate_limit,
        ))
        .layer(middleware::from_fn_with_state(state.clone(), track_requests))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(CompressionLayer::new())
        .layer(cors_layer(&origins))
        .layer(SetResponseHeaderLayer::if_not_present(
            header::CONTENT_SECURITY_POLICY,
            HeaderValue::from_static(CONTENT_SECURITY_POLICY),
        ))
        .layer(SetResponseHeaderLayer::if_not_present(
            header::X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        ))
        .layer(SetResponseHeaderLayer::if_not_present(
            header::X_FRAME_OPTIONS,
            HeaderValue::from_static("DENY"),
        ))
        .layer(SetResponseHeaderLayer::if_not_present(
            header::REFERRER_POLICY,
            HeaderValue::from_static("no-referrer"),
        ))
        .with_state(state)
}

/// Run the gateway server; binds to config.server.bind:config.server.port.
/// Blocks until shutdown (e.g. Ctrl+C).
pub async fn run_gateway(config: Config) -> Result<()> {
    let bind = config.server.bind.trim().to_string();
    let port = config.server.port;
    if !config::is_loopback_bind(&bind) {
        log::warn!(
            "binding to {}: the relay will accept requests from other hosts and forward them to any URL",
            bind
        );
    }

    let state = GatewayState::new(config);
    log::info!(
        "relay timeout {}s, environment {}",
        state.config.relay.timeout_secs,
        state.environment
    );
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind((bind.as_str(), port))
        .await
        .with_context(|| format!("binding to {}:{}", bind, port))?;
    let local = listener.local_addr().context("reading bound address")?;
    log::info!("hookchat listening on http://{}", local);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("gateway server exited")?;
    log::info!("gateway stopped");
    Ok(())
}

/// Future that completes when the process should shut down (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    log::info!("shutdown signal received, draining connections");
}

fn client_ip(req: &Request) -> Option<IpAddr> {
    req.extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip())
}

/// Count and log every request (method, path, status, elapsed).
async fn track_requests(State(state): State<GatewayState>, req: Request, next: Next) -> Response {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let started = Instant::now();
    state.stats.record_request();
    let resp = next.run(req).await;
    let status = resp.status();
    if status.is_server_error() {
        state
            .stats
            .record_error(format!("{} {} returned {}", method, path, status.as_u16()));
    }
    log::info!(
        "{} {} {} {}ms",
        method,
        path,
        status.as_u16(),
        started.elapsed().as_millis()
    );
    resp
}

async fn global_rate_limit(
    State(state): State<GatewayState>,
    req: Request,
    next: Next,
) -> Response {
    let decision = state.global_limiter.check(client_ip(&req));
    enforce(decision, GLOBAL_LIMIT_MESSAGE, req, next).await
}

async fn relay_rate_limit(
    State(state): State<GatewayState>,
    req: Request,
    next: Next,
) -> Response {
    let decision = state.relay_limiter.check(client_ip(&req));
    enforce(decision, RELAY_LIMIT_MESSAGE, req, next).await
}

/// Run the request or reject it with 429. The innermost limiter's headers are kept.
async fn enforce(decision: Decision, message: &str, req: Request, next: Next) -> Response {
    let mut resp = if decision.allowed {
        next.run(req).await
    } else {
        log::warn!(
            "rate limit exceeded for {:?} on {}",
            client_ip(&req),
            req.uri().path()
        );
        (
            StatusCode::TOO_MANY_REQUESTS,
            Json(json!({ "error": message })),
        )
            .into_response()
    };
    let headers = resp.headers_mut();
    if !headers.contains_key(RATELIMIT_LIMIT) {
        let reset = decision.reset.as_secs_f64().ceil() as u64;
        headers.insert(RATELIMIT_LIMIT, HeaderValue::from(decision.limit));
        headers.insert(RATELIMIT_REMAINING, HeaderValue::from(decision.remaining));
        headers.insert(RATELIMIT_RESET, HeaderValue::from(reset));
    }
    resp
}
