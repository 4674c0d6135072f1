//! Built-in gateway application (`app.main:app`).
//!
//! # Routes
//! - `GET /`: liveness message
//! - `POST /process-text`: log a text submission and acknowledge it
//! - `GET /service/ping`: proxy to the upstream service's ping endpoint
//! - `POST /users/`, `GET /users/{user_id}`: Supabase-backed users (see [`users`])
//!
//! # Middleware
//! - Request ID (UUID v4, `x-request-id`, propagated to the response)
//! - HTTP tracing
//! - Per-request timeout
//! - CORS

pub mod handlers;
pub mod users;

use std::time::Duration;

use axum::{
    body::Body,
    http::{HeaderValue, Uri},
    routing::{get, post},
    Router,
};
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use tower::ServiceBuilder;
use tower_http::{
    cors::{AllowHeaders, AllowMethods, AllowOrigin, Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::config::GatewayConfig;
use crate::launch::AppContext;

/// Application state injected into handlers.
#[derive(Clone)]
pub struct GatewayState {
    pub client: Client<HttpConnector, Body>,
    /// `None` when the configured URL is not a valid URI.
    pub ping_uri: Option<Uri>,
    /// `None` until the Supabase URL and key are both configured.
    pub supabase: Option<users::Supabase>,
}

/// Build the gateway router. Registered as the `app.main:app` entrypoint.
pub fn router(ctx: &AppContext) -> Router {
    build_router(&ctx.gateway)
}

/// Build the router from gateway settings alone.
#[allow(deprecated)]
pub fn build_router(config: &GatewayConfig) -> Router {
    let ping_uri = match config.service_ping_url.parse::<Uri>() {
        Ok(uri) => Some(uri),
        Err(e) => {
            tracing::warn!(url = %config.service_ping_url, error = %e, "Invalid ping URL, /service/ping will fail");
            None
        }
    };

    let state = GatewayState {
        client: Client::builder(TokioExecutor::new()).build(HttpConnector::new()),
        ping_uri,
        supabase: users::Supabase::from_config(config),
    };

    Router::new()
        .route("/", get(handlers::read_root))
        .route("/process-text", post(handlers::process_text))
        .route("/service/ping", get(handlers::proxy_ping))
        .route("/users/", post(users::create_user))
        .route("/users/{user_id}", get(users::get_user))
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
                .layer(TraceLayer::new_for_http())
                .layer(TimeoutLayer::new(Duration::from_secs(config.request_timeout_secs)))
                .layer(PropagateRequestIdLayer::x_request_id())
                .layer(cors_layer(&config.cors_allow_origins)),
        )
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    if origins.iter().any(|o| o == "*") {
        // Credentials cannot be combined with a wildcard origin.
        return CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);
    }

    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|o| match HeaderValue::from_str(o) {
            Ok(v) => Some(v),
            Err(_) => {
                tracing::warn!(origin = %o, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(allowed))
        .allow_methods(AllowMethods::mirror_request())
        .allow_headers(AllowHeaders::mirror_request())
        .allow_credentials(true)
}
