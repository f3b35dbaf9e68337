//! HTTP server startup.

use anyhow::Result;
use tower_http::cors::CorsLayer;

use crate::api::{AppState, create_router};

/// Serve the gateway API on `bind` until the process is stopped.
pub async fn start_http(bind: &str, state: AppState, cors: CorsLayer) -> Result<()> {
    let mode = state.authenticator.mode();
    let router = create_router(state, cors);
    let listener = tokio::net::TcpListener::bind(bind).await?;

    tracing::info!(
        "Gateway listening on http://{} ({} authentication)",
        listener.local_addr()?,
        mode
    );

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Gateway stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
