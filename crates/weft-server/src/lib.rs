//! Weft Server — HTTP adapter for the workflow orchestration engine.
//!
//! A standalone axum backend on top of `weft-core`, providing:
//! - RESTful HTTP API for templates and executions
//! - SQLite persistence via rusqlite
//!
//! This crate can be used standalone (`weft-cli serve`) or embedded in
//! other applications: build an `AppState` with your own `AgentRegistry`
//! and hand it to `start_server_with_state`.

pub mod api;
pub mod state;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use weft_core::agent::AgentRegistry;
use weft_core::db::Database;

use self::state::{AppState, AppStateInner};

/// Configuration for the Weft backend server.
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub db_path: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3720,
            db_path: "weft.db".to_string(),
        }
    }
}

/// Create a shared `AppState` from a database path and an agent registry.
///
/// This is useful when you need to share the state between the HTTP server
/// and other consumers (e.g. an embedded engine driving the same database).
pub async fn create_app_state(
    db_path: &str,
    registry: Arc<AgentRegistry>,
) -> Result<AppState, String> {
    let db = Database::open(db_path).map_err(|e| format!("Failed to open database: {}", e))?;
    Ok(Arc::new(AppStateInner::new(db, registry)))
}

/// Start the Weft backend server.
///
/// Returns the actual address the server is listening on.
pub async fn start_server(
    config: ServerConfig,
    registry: Arc<AgentRegistry>,
) -> Result<SocketAddr, String> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "weft_server=info,weft_core=info,tower_http=info".into()),
        )
        .init();

    tracing::info!(
        "Starting Weft backend server on {}:{}",
        config.host,
        config.port
    );

    let state = create_app_state(&config.db_path, registry).await?;

    start_server_with_state(config, state).await
}

/// Start the HTTP server with a pre-built `AppState`.
///
/// This variant is useful when the caller wants to wire its own registry
/// and database (tests do exactly this).
pub async fn start_server_with_state(
    config: ServerConfig,
    state: AppState,
) -> Result<SocketAddr, String> {
    // Build router
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .merge(api::api_router())
        .route("/api/health", axum::routing::get(health_check))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    // Bind and serve
    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .map_err(|e| format!("Invalid address: {}", e))?;

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| format!("Failed to bind to {}: {}", addr, e))?;

    let local_addr = listener
        .local_addr()
        .map_err(|e| format!("Failed to get local address: {}", e))?;

    tracing::info!("Weft backend server listening on {}", local_addr);

    // Spawn the server in a background task
    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!("Server error: {}", e);
        }
    });

    Ok(local_addr)
}

async fn health_check() -> axum::Json<serde_json::Value> {
    axum::Json(serde_json::json!({
        "status": "ok",
        "server": "weft-server",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
