/// HTTP intake for anchor requests.
///
/// Whatever finalizes directory blocks posts them here; each accepted
/// request goes straight onto the dispatch loop's channel. The server
/// keeps no state of its own.
pub mod routes;

use std::sync::Arc;

use axum::Router;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;

use crate::anchor::DirectoryBlockAnchorInfo;

/// Shared application state available to all handlers.
#[derive(Clone)]
pub struct AppState {
    /// Inbound queue of the dispatch loop.
    pub requests: mpsc::Sender<DirectoryBlockAnchorInfo>,
    /// Name of the configured backend, reported by `/health`.
    pub chain: String,
}

/// Build the Axum application with all routes and middleware.
pub fn build_app(state: AppState) -> Router {
    Router::new()
        .merge(routes::health_routes())
        .merge(routes::anchor_routes())
        .with_state(Arc::new(state))
        .layer(TraceLayer::new_for_http())
}

/// Serve the intake on an already bound listener until `shutdown` is
/// cancelled.
pub async fn serve(
    listener: tokio::net::TcpListener,
    state: AppState,
    shutdown: CancellationToken,
) -> crate::error::Result<()> {
    let app = build_app(state);

    if let Ok(addr) = listener.local_addr() {
        tracing::info!("anchor intake listening on {addr}");
    }

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await
        .map_err(crate::error::AnchorError::Io)?;

    Ok(())
}
