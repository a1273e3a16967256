//! HTTP server lifecycle: bind, serve, prune in the background, shut down gracefully.

use crate::http::build_router;
use crate::publisher::CoursePublisher;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::{info, warn};

/// Serve the job API on `addr` until `shutdown` resolves.
///
/// Jobs still running when the server stops are abandoned with the process.
pub async fn serve<F>(
    publisher: Arc<CoursePublisher>,
    addr: SocketAddr,
    prune_interval: Duration,
    shutdown: F,
) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let listener = TcpListener::bind(addr).await?;
    serve_listener(publisher, listener, prune_interval, shutdown).await
}

/// Serve on an already bound listener.
pub async fn serve_listener<F>(
    publisher: Arc<CoursePublisher>,
    listener: TcpListener,
    prune_interval: Duration,
    shutdown: F,
) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let local_addr = listener.local_addr()?;
    let pruner = publisher.spawn_pruner(prune_interval);
    let app = build_router(publisher);

    info!(addr = %local_addr, "Course publishing API listening");
    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await;
    pruner.abort();
    info!("Server shut down");
    served
}

/// Resolves on ctrl-c. If the handler cannot be installed the server runs until killed.
pub async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = %err, "Failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    info!("Shutdown requested");
}
