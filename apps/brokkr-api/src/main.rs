//! brokkr API server.
//!
//! Wires configuration, logging, the encrypted storage backend and the
//! SSO broker routers into a single axum application, then serves it
//! with graceful shutdown.

mod config;
mod health;
mod logging;
mod openapi;

use std::net::SocketAddr;
use std::time::Duration;

use axum::routing::get;
use axum::Router;
use brokkr_sso::{admin_router, sso_router, SsoState};
use brokkr_store::Database;
use tokio::signal;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::config::Config;
use crate::health::{healthz_handler, readyz_handler};
use crate::openapi::openapi_json;

#[tokio::main]
async fn main() {
    // Load configuration (fail-fast on missing required values)
    let config = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    };

    logging::init_logging(&config.rust_log);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        host = %config.host,
        port = config.port,
        env = %config.app_env,
        engine = %config.db_engine,
        "Starting brokkr API"
    );

    match config.validate_security() {
        Ok(warnings) => {
            for warning in &warnings {
                tracing::warn!(target: "security", "{}", warning);
            }
            if !warnings.is_empty() {
                tracing::warn!(
                    target: "security",
                    count = warnings.len(),
                    "Insecure settings detected (allowed in {} mode)",
                    config.app_env
                );
            }
        }
        Err(errors) => {
            for error in &errors {
                tracing::error!(target: "security", "{}", error);
            }
            eprintln!(
                "FATAL: {} insecure setting(s) detected in production mode. \
                 Fix the configuration or use APP_ENV=development.",
                errors.len()
            );
            std::process::exit(1);
        }
    }

    let db = match Database::connect(config.store_config()).await {
        Ok(db) => {
            info!(engine = %config.db_engine, "Storage backend ready");
            db
        }
        Err(e) => {
            eprintln!("Failed to initialize storage backend: {e}");
            std::process::exit(1);
        }
    };

    // The state starts with the fail-closed SAML signature validator.
    // Deployments terminating SAML install a real one via
    // `SsoState::with_signature_validator` before serving.
    let state = SsoState::new(db, config.sso_options());
    tracing::warn!(
        "No SAML signature validator installed; SAML responses will be rejected until one is \
         provided"
    );

    let app = Router::new()
        .route("/healthz", get(healthz_handler))
        .route("/readyz", get(readyz_handler))
        .route("/openapi.json", get(openapi_json))
        .with_state(state.clone())
        .merge(sso_router(state.clone()))
        .nest("/api/v1", admin_router(state))
        .layer(build_cors_layer(&config.cors_origins))
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = match config.bind_addr().parse() {
        Ok(a) => a,
        Err(e) => {
            tracing::error!("Invalid bind address '{}': {e}", config.bind_addr());
            std::process::exit(1);
        }
    };

    info!(%addr, "Server listening");

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(l) => l,
        Err(e) => {
            tracing::error!("Failed to bind to address {addr}: {e}");
            std::process::exit(1);
        }
    };

    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        tracing::error!("Server error: {e}");
        std::process::exit(1);
    }

    info!("Server shutdown complete");
}

/// Build CORS layer from configured origins.
///
/// When explicit origins are configured (non-wildcard), rejected origins
/// are logged as structured security events.
fn build_cors_layer(origins: &[String]) -> CorsLayer {
    use tower_http::cors::AllowOrigin;

    let is_wildcard = origins.len() == 1 && origins[0] == "*";

    let allow_origin = if is_wildcard {
        AllowOrigin::any()
    } else {
        let allowed: Vec<axum::http::HeaderValue> =
            origins.iter().filter_map(|o| o.parse().ok()).collect();
        AllowOrigin::predicate(
            move |origin: &axum::http::HeaderValue, _req: &axum::http::request::Parts| {
                let is_allowed = allowed.contains(origin);
                if !is_allowed {
                    let origin_str = origin.to_str().unwrap_or("<non-utf8>");
                    tracing::warn!(
                        target: "security",
                        event_type = "cors_rejected",
                        origin = %origin_str,
                        "CORS origin rejected"
                    );
                }
                is_allowed
            },
        )
    };

    let mut layer = CorsLayer::new()
        .allow_origin(allow_origin)
        .max_age(Duration::from_secs(3600));

    // `allow_credentials(true)` cannot be combined with `Any`, so the
    // explicit-origin path lists methods and headers instead.
    if is_wildcard {
        layer = layer.allow_methods(Any).allow_headers(Any);
    } else {
        use axum::http::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE};
        use axum::http::Method;
        layer = layer
            .allow_methods([
                Method::GET,
                Method::POST,
                Method::PATCH,
                Method::DELETE,
                Method::OPTIONS,
            ])
            .allow_headers([ACCEPT, AUTHORIZATION, CONTENT_TYPE])
            .allow_credentials(true);
    }

    layer
}

/// Graceful shutdown signal handler.
async fn shutdown_signal() {
    let ctrl_c = async {
        match signal::ctrl_c().await {
            Ok(()) => {}
            Err(e) => {
                tracing::error!("Failed to install Ctrl+C handler: {e}");
                // Fall through - we still want to wait for terminate signal
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {e}");
                // Wait forever if we can't install the handler
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            info!("Received Ctrl+C, initiating graceful shutdown");
        }
        () = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}
