//! HTTP interface for the toolgate host.
//!
//! Thin layer over the `host` crate: each route resolves a session,
//! takes its lock, and delegates to the dispatcher. All policy lives
//! below this crate.

mod routes;
mod state;

pub use state::{AppState, SessionFactory};

use axum::{
    Router,
    routing::{get, post},
};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;

/// Build the router with all routes and middleware.
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(routes::health))
        .route("/user_request", post(routes::user_request))
        .route("/approve", post(routes::approve))
        .route("/session_state", get(routes::session_state))
        .route("/reset", post(routes::reset))
        .route("/session", post(routes::create_session))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Bind and serve until the process is stopped.
pub async fn serve(state: Arc<AppState>, addr: SocketAddr) -> std::io::Result<()> {
    let app = create_router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(addr = %listener.local_addr()?, "listening");
    axum::serve(listener, app).await
}
