//! popboard-server library - score synchronization service
//!
//! Clients connect over a WebSocket, announce a handle, and send increments.
//! Every accepted change is answered privately with the new score and
//! broadcast to all connections as a full ranking.

use axum::Router;
use chrono::{DateTime, Utc};
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

pub mod api;
pub mod engine;
pub mod fanout;
pub mod session;

pub use engine::{EngineOptions, SyncEngine};
pub use session::{Connection, SessionId, SessionState};

/// Application state shared across HTTP handlers
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<SyncEngine>,
    /// Directory served at `/` for the presentation assets
    pub static_dir: PathBuf,
    pub started_at: DateTime<Utc>,
}

impl AppState {
    pub fn new(engine: Arc<SyncEngine>, static_dir: PathBuf) -> Self {
        Self {
            engine,
            static_dir,
            started_at: Utc::now(),
        }
    }
}

/// Build application router
///
/// `/ws` carries the score protocol; anything not matched by an API route is
/// looked up in the static asset directory.
pub fn build_router(state: AppState) -> Router {
    use axum::routing::get;

    let assets = ServeDir::new(&state.static_dir);

    Router::new()
        .route("/ws", get(api::ws_handler))
        .route("/api/leaderboard", get(api::get_leaderboard))
        .merge(api::health_routes())
        .fallback_service(assets)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        // Any origin may connect, as with the original browser clients
        .layer(CorsLayer::permissive())
}
