//! Router assembly, logging setup and shutdown signal handling.

use axum::{
    http::HeaderName,
    routing::{get, post},
    Router,
};
use ethgate_core::{config::AppConfig, runtime::GatewayComponents};
use tokio::signal;
use tower::limit::ConcurrencyLimitLayer;
use tower_http::{
    limit::RequestBodyLimitLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::router::{self, AppState};

/// The header name for request correlation IDs.
pub static X_REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");

const DEFAULT_FILTER: &str = "warn,ethgate_core=info,server=info";

/// Initializes the logging system based on the configuration.
///
/// `RUST_LOG` wins when set; `debug` and `trace` are shorthands for the gateway crates only.
pub fn init_logging(config: &AppConfig) {
    let filter = match std::env::var("RUST_LOG").as_deref() {
        Ok("debug") => EnvFilter::new("warn,ethgate_core=debug,server=debug,tests=debug"),
        Ok("trace") => EnvFilter::new("warn,ethgate_core=trace,server=trace,tests=trace"),
        Ok(_) => EnvFilter::try_from_env("RUST_LOG")
            .unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER)),
        Err(_) => EnvFilter::new(DEFAULT_FILTER),
    };

    let registry = tracing_subscriber::registry().with(filter);

    if config.logging.format.as_str() == "json" {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        let fmt_layer = tracing_subscriber::fmt::layer()
            .pretty()
            .with_file(true)
            .with_line_number(true)
            .with_target(false);
        registry.with(fmt_layer).init();
    }
}

/// Builds the HTTP application.
///
/// `/health` and `/metrics` sit outside the request limits; the JSON-RPC routes get the
/// concurrency and body-size limits. Every response carries `x-request-id`.
pub fn create_app(components: GatewayComponents, config: &AppConfig) -> Router {
    let state = AppState::new(components, config.request_timeout());

    let public = Router::new()
        .route("/health", get(router::handle_health))
        .route("/metrics", get(router::handle_metrics))
        .with_state(state.clone());

    let rpc = Router::new()
        .route("/", post(router::handle_rpc))
        .route("/:func", post(router::handle_rpc_func))
        .with_state(state)
        .layer(ConcurrencyLimitLayer::new(config.server.max_concurrent_requests))
        .layer(RequestBodyLimitLayer::new(config.server.max_body_bytes));

    // Layers run outermost-last: the id is set before it is propagated.
    public
        .merge(rpc)
        .layer(TraceLayer::new_for_http())
        .layer(PropagateRequestIdLayer::new(X_REQUEST_ID.clone()))
        .layer(SetRequestIdLayer::new(X_REQUEST_ID.clone(), MakeRequestUuid))
}

/// Graceful shutdown timeout in seconds.
pub const GRACEFUL_SHUTDOWN_TIMEOUT_SECS: u64 = 30;

/// Resolves on Ctrl-C or SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut s) => {
                s.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install signal handler");
                () = std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    info!(
        "Shutdown signal received, starting graceful shutdown (timeout: {}s)",
        GRACEFUL_SHUTDOWN_TIMEOUT_SECS
    );
}
