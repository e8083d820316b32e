//! `api` crate — HTTP REST API layer.
//!
//! Exposes:
//!   POST   /api/v1/workflows
//!   GET    /api/v1/workflows/:id
//!   POST   /api/v1/workflows/:id/validate
//!   POST   /api/v1/workflows/:id/run
//!   GET    /api/v1/running-workflows/:id
//!   POST   /api/v1/running-workflows/:id/stop
//!
//! Runs are not executed here: `run` and `stop` only record state and send
//! a `WorkflowMessage` for the engine to pick up.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;

use queue::MessageDispatcher;
use store::RunStateStore;

pub mod error;
pub mod handlers;

pub use error::ApiError;

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn RunStateStore>,
    pub dispatcher: MessageDispatcher,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/v1/workflows", post(handlers::workflows::create))
        .route("/api/v1/workflows/:id", get(handlers::workflows::get))
        .route(
            "/api/v1/workflows/:id/validate",
            post(handlers::workflows::validate),
        )
        .route("/api/v1/workflows/:id/run", post(handlers::running_workflows::run))
        .route(
            "/api/v1/running-workflows/:id",
            get(handlers::running_workflows::get),
        )
        .route(
            "/api/v1/running-workflows/:id/stop",
            post(handlers::running_workflows::stop),
        )
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Serve the API until the listener fails.
pub async fn serve(addr: SocketAddr, state: AppState) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("API listening on {}", listener.local_addr()?);
    axum::serve(listener, router(state)).await
}
