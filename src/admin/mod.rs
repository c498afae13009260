//! Status endpoint.
//!
//! # Routes
//! - `GET /healthz`: 200 once the initial sync completed, 503 before
//! - `GET /status`: the latest `ReconcileStatus` as JSON

pub mod handlers;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{routing::get, Router};
use tokio::net::TcpListener;
use tokio::sync::broadcast;

use crate::controller::StatusBoard;
use self::handlers::*;

#[derive(Clone)]
pub struct AdminState {
    pub status: Arc<StatusBoard>,
}

pub fn setup_admin_router(state: AdminState) -> Router {
    Router::new()
        .route("/healthz", get(get_health))
        .route("/status", get(get_status))
        .with_state(state)
}

/// Serve on an already bound listener until shutdown.
pub async fn serve(
    listener: TcpListener,
    status: Arc<StatusBoard>,
    mut shutdown: broadcast::Receiver<()>,
) -> std::io::Result<()> {
    let app = setup_admin_router(AdminState { status });
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown.recv().await;
        })
        .await
}

/// Bind `addr` and serve until shutdown.
pub async fn run_admin(
    addr: SocketAddr,
    status: Arc<StatusBoard>,
    shutdown: broadcast::Receiver<()>,
) -> std::io::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(address = %listener.local_addr()?, "Status endpoint listening");
    serve(listener, status, shutdown).await
}
