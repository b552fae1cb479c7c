//! REST API Server (hub)
//!
//! Serves the egress status and on-demand domain checks:
//!
//! | route          | method | handler                  |
//! |----------------|--------|--------------------------|
//! | `/`            | GET    | [`status::get_status`]   |
//! | `/check`       | POST   | [`check::check_domain`]  |
//! | `/version`     | GET    | [`status::version`]      |
//!
//! Any other method on `/check` gets a 405, unknown paths a 404.

mod check;
mod common;
mod status;

pub use common::{
    ApiError, ApiResponse, ApiResult, CheckRequest, ERROR_CODE_METHOD_NOT_ALLOWED,
    ERROR_CODE_NOT_FOUND, ERROR_CODE_OK, ERROR_CODE_UNREACHABLE,
};

use crate::probe::ReachabilityProbe;
use crate::status::StatusStore;
use crate::Result;

use axum::{
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::{broadcast, Semaphore};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    /// Shared status record (read-only from handlers)
    pub store: Arc<StatusStore>,
    /// Probe used by domain checks
    pub probe: ReachabilityProbe,
    /// Bounds domain checks in flight
    pub check_permits: Arc<Semaphore>,
}

impl AppState {
    pub fn new(store: Arc<StatusStore>, probe: ReachabilityProbe, max_concurrent_checks: usize) -> Self {
        AppState {
            store,
            probe,
            check_permits: Arc::new(Semaphore::new(max_concurrent_checks)),
        }
    }
}

/// Create the main router with all endpoints
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(status::get_status))
        .route("/version", get(status::version))
        .route(
            "/check",
            post(check::check_domain).fallback(check::method_not_allowed),
        )
        .fallback(not_found)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Serve on an already bound listener until `shutdown` fires
///
/// On shutdown the listener stops accepting; requests already being handled
/// run to completion.
pub async fn serve(
    listener: TcpListener,
    state: AppState,
    mut shutdown: broadcast::Receiver<()>,
) -> Result<()> {
    let router = create_router(state);
    info!("Listening on {}", listener.local_addr()?);

    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            let _ = shutdown.recv().await;
        })
        .await?;

    info!("Status API stopped");
    Ok(())
}

async fn not_found() -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        ApiResponse::<()>::error(ERROR_CODE_NOT_FOUND, "not found"),
    )
}
