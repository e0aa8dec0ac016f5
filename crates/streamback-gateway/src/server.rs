//! Axum-based streaming server.

use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post},
};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::endpoint::{callbacks_handler, health_handler, layout_handler, stream_handler};
use crate::state::GatewayState;

/// Build the gateway router: the streaming endpoint plus health and introspection routes.
pub fn router(state: Arc<GatewayState>) -> Router {
    let app = Router::new()
        .route(&state.endpoint, post(stream_handler))
        .route("/health", get(health_handler))
        .route("/callbacks", get(callbacks_handler))
        .route("/layout", get(layout_handler));

    #[cfg(feature = "metrics")]
    let app = app.route("/metrics", get(crate::endpoint::metrics_handler));

    app.layer(TraceLayer::new_for_http()).with_state(state)
}

/// Start the gateway and serve until Ctrl+C.
pub async fn start_server(state: Arc<GatewayState>, port: u16) -> anyhow::Result<()> {
    let addr = format!("{}:{port}", state.config.bind());
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(
        endpoint = %state.endpoint,
        callbacks = state.registry.len(),
        "Gateway listening on {addr}"
    );

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to install Ctrl+C handler");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
