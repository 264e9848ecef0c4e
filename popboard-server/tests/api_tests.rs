//! Integration tests for the HTTP surface
//!
//! Tests cover:
//! - Health endpoint
//! - Leaderboard query with and without an identity
//! - Static asset serving
//! - WebSocket route rejecting plain requests

use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use popboard_common::store::{LookupPolicy, MemoryScoreStore, ScoreRecord};
use popboard_server::{build_router, AppState, EngineOptions, SyncEngine};
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;
use tower::util::ServiceExt; // for `oneshot` method

/// Test helper: engine over a seeded in-memory store
fn seeded_engine(options: EngineOptions) -> Arc<SyncEngine> {
    let records = vec![
        ScoreRecord::new("alice", 3),
        ScoreRecord::new("bob", 0),
        ScoreRecord::new("carol", 7),
    ];
    Arc::new(SyncEngine::new(
        Arc::new(MemoryScoreStore::with_records(records)),
        options,
    ))
}

/// Test helper: router with no static assets
fn setup_app(engine: Arc<SyncEngine>) -> axum::Router {
    build_router(AppState::new(engine, PathBuf::from("/nonexistent-popboard-assets")))
}

fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

/// Test helper: Extract JSON body from response
async fn extract_json(body: Body) -> Value {
    let bytes = axum::body::to_bytes(body, usize::MAX)
        .await
        .expect("Should read body");
    serde_json::from_slice(&bytes).expect("Should parse JSON")
}

// =============================================================================
// Health
// =============================================================================

#[tokio::test]
async fn test_health_endpoint() {
    let engine = seeded_engine(EngineOptions::default());
    let _conn = engine.connect().await;
    let app = setup_app(engine);

    let response = app.oneshot(get("/health")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = extract_json(response.into_body()).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["module"], "popboard-server");
    assert_eq!(body["backend"], "memory");
    assert_eq!(body["sessions"], 1);
    assert!(body["version"].is_string());
}

// =============================================================================
// Leaderboard
// =============================================================================

#[tokio::test]
async fn test_leaderboard_top_entries() {
    let app = setup_app(seeded_engine(EngineOptions::default()));

    let response = app.oneshot(get("/api/leaderboard")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = extract_json(response.into_body()).await;
    assert_eq!(body["total"], 3);
    assert!(body.get("standing").is_none());

    let top = body["top"].as_array().unwrap();
    assert_eq!(top.len(), 3);
    assert_eq!(top[0]["identity"], "carol");
    assert_eq!(top[0]["rank"], 1);
    assert_eq!(top[1]["identity"], "alice");
    assert_eq!(top[2]["identity"], "bob");
    assert_eq!(top[2]["score"], 0);
}

#[tokio::test]
async fn test_leaderboard_truncates_to_configured_size() {
    let app = setup_app(seeded_engine(EngineOptions {
        leaderboard_size: 2,
        ..Default::default()
    }));

    let body = extract_json(app.oneshot(get("/api/leaderboard")).await.unwrap().into_body()).await;
    assert_eq!(body["top"].as_array().unwrap().len(), 2);
    assert_eq!(body["total"], 3);
}

#[tokio::test]
async fn test_leaderboard_standing_for_known_identity() {
    let app = setup_app(seeded_engine(EngineOptions::default()));

    let body = extract_json(
        app.oneshot(get("/api/leaderboard?identity=alice"))
            .await
            .unwrap()
            .into_body(),
    )
    .await;

    assert_eq!(body["standing"]["identity"], "alice");
    assert_eq!(body["standing"]["score"], 3);
    assert_eq!(body["standing"]["rank"], 2);
    assert_eq!(body["standing"]["total"], 3);
}

#[tokio::test]
async fn test_leaderboard_standing_for_unknown_identity() {
    let engine = seeded_engine(EngineOptions::default());
    let app = setup_app(engine.clone());

    let body = extract_json(
        app.oneshot(get("/api/leaderboard?identity=nobody"))
            .await
            .unwrap()
            .into_body(),
    )
    .await;

    assert_eq!(body["standing"]["score"], 0);
    assert!(body["standing"]["rank"].is_null());
    assert_eq!(body["total"], 3);
    assert_eq!(engine.store().list_all().await.unwrap().len(), 3);
}

#[tokio::test]
async fn test_leaderboard_upsert_policy_creates_record() {
    let engine = seeded_engine(EngineOptions {
        lookup_policy: LookupPolicy::Upsert,
        ..Default::default()
    });
    let app = setup_app(engine.clone());

    let body = extract_json(
        app.oneshot(get("/api/leaderboard?identity=nobody"))
            .await
            .unwrap()
            .into_body(),
    )
    .await;

    assert_eq!(body["standing"]["rank"], 4);
    assert_eq!(body["total"], 4);
    assert_eq!(engine.store().list_all().await.unwrap().len(), 4);
}

#[tokio::test]
async fn test_leaderboard_rejects_invalid_identity() {
    let app = setup_app(seeded_engine(EngineOptions::default()));

    let response = app
        .oneshot(get("/api/leaderboard?identity=not%20valid"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let body = extract_json(response.into_body()).await;
    assert!(body["error"].as_str().unwrap().contains("Invalid identity"));
}

// =============================================================================
// Static assets and transport
// =============================================================================

#[tokio::test]
async fn test_serves_static_assets() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("index.html"), "<h1>pop</h1>").unwrap();
    std::fs::write(dir.path().join("script.js"), "console.log('pop');").unwrap();

    let engine = seeded_engine(EngineOptions::default());
    let app = build_router(AppState::new(engine, dir.path().to_path_buf()));

    let response = app.clone().oneshot(get("/")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(&bytes[..], b"<h1>pop</h1>");

    let response = app.clone().oneshot(get("/script.js")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app.oneshot(get("/missing.png")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_ws_route_requires_upgrade() {
    let app = setup_app(seeded_engine(EngineOptions::default()));

    let response = app.oneshot(get("/ws")).await.unwrap();
    assert!(response.status().is_client_error());
}
