//! HTTP server exposing the analysis endpoint.
//!
//! Axum-based; one aggregator is shared by all requests.

pub mod routes;
pub mod state;

pub use state::AppState;

use anyhow::{Context, Result};
use axum::{
    routing::{get, post},
    Router,
};
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::info;

/// Create the application router.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(routes::root))
        .route("/health", get(routes::health))
        .route("/analyze", post(routes::analyze))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Run the server until `shutdown` is cancelled.
///
/// In-flight analyses observe the same token, so their pending provider
/// calls end as `Cancelled` and the responses still go out.
pub async fn run_server(state: AppState, bind: &str, shutdown: CancellationToken) -> Result<()> {
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .with_context(|| format!("Failed to bind {}", bind))?;
    info!("Server listening on http://{}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .context("Server error")?;

    info!("Server stopped");
    Ok(())
}
