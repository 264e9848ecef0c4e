//! Leaderboard query
//!
//! Read-side view of the same ranking the WebSocket fan-out carries, for
//! clients that want the top-N and their own rank without deriving them.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use popboard_common::ranking::{RankedEntry, Standing};
use popboard_common::Identity;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::error;

use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct LeaderboardQuery {
    /// Handle whose standing should be included
    pub identity: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct LeaderboardResponse {
    pub top: Vec<RankedEntry>,
    /// Number of ranked identities
    pub total: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub standing: Option<Standing>,
}

/// GET /api/leaderboard?identity=HANDLE
pub async fn get_leaderboard(
    State(state): State<AppState>,
    Query(query): Query<LeaderboardQuery>,
) -> Result<Json<LeaderboardResponse>, LeaderboardError> {
    let identity = match query.identity.as_deref() {
        Some(raw) => Some(
            Identity::parse(raw).map_err(|_| LeaderboardError::InvalidIdentity(raw.to_string()))?,
        ),
        None => None,
    };

    // One lookup and one snapshot, so `total` and the standing agree
    let (snapshot, standing) = state
        .engine
        .ranking_for(identity.as_ref().map(Identity::as_str))
        .await
        .map_err(|e| LeaderboardError::StorageUnavailable(e.to_string()))?;

    Ok(Json(LeaderboardResponse {
        top: snapshot.top(state.engine.options().leaderboard_size),
        total: snapshot.len(),
        standing,
    }))
}

/// Leaderboard errors
#[derive(Debug)]
pub enum LeaderboardError {
    InvalidIdentity(String),
    StorageUnavailable(String),
}

impl IntoResponse for LeaderboardError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            LeaderboardError::InvalidIdentity(raw) => (
                StatusCode::BAD_REQUEST,
                format!("Invalid identity (1-10 letters or digits): {}", raw),
            ),
            LeaderboardError::StorageUnavailable(msg) => {
                error!("Leaderboard query failed: {}", msg);
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    format!("Score store unavailable: {}", msg),
                )
            }
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}
