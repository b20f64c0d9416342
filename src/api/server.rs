//! API server lifecycle: bind, serve, shut down.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;

use crate::api::router::api_router;
use crate::core_state::CoreState;

/// Bind `addr` and serve until `shutdown` resolves.
pub async fn serve(
    core: Arc<CoreState>,
    addr: SocketAddr,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<(), String> {
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|e| format!("Failed to bind API server on {addr}: {e}"))?;
    serve_on(core, listener, shutdown).await
}

/// Serve on an already-bound listener until `shutdown` resolves.
pub async fn serve_on(
    core: Arc<CoreState>,
    listener: TcpListener,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<(), String> {
    let local = listener
        .local_addr()
        .map_err(|e| format!("Failed to get server address: {e}"))?;

    tracing::info!(addr = %local, "API server started");
    axum::serve(listener, api_router(core))
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| format!("API server error: {e}"))?;
    tracing::info!("API server stopped");
    Ok(())
}
