//! Integration tests for the viewer API, driven through the axum router

use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use axum::Router;
use context_keeper::config::{AgentConfig, Config};
use context_keeper::store::{ContextStore, DocumentKind};
use context_keeper::{router, updater, FeedbackAgent, ServerState};
use serde_json::Value;
use std::sync::Arc;
use tower::ServiceExt;

fn setup() -> (tempfile::TempDir, Arc<ContextStore>, Router) {
    let dir = tempfile::tempdir().unwrap();
    let mut config = Config::default();
    config.store.base_dir = dir.path().to_path_buf();
    config.viewer.poll_interval_ms = 750;

    let store = Arc::new(ContextStore::from_config(&config.store).unwrap());
    store.init().unwrap();
    let app = router(ServerState::new(Arc::new(config), store.clone()));
    (dir, store, app)
}

async fn get(app: &Router, uri: &str) -> (StatusCode, axum::http::HeaderMap, Vec<u8>) {
    let response = app.clone()
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, headers, body.to_vec())
}

async fn post_json(app: &Router, uri: &str, body: Value) -> (StatusCode, Value) {
    let response = app.clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(uri)
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    let status = response.status();
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json = serde_json::from_slice(&body).unwrap_or(Value::Null);
    (status, json)
}

#[tokio::test]
async fn test_polls_without_writes_are_identical() {
    let (_dir, _store, app) = setup();

    let (status_a, headers_a, body_a) = get(&app, "/api/state").await;
    let (status_b, headers_b, body_b) = get(&app, "/api/state").await;

    assert_eq!(status_a, StatusCode::OK);
    assert_eq!(status_b, StatusCode::OK);
    assert_eq!(body_a, body_b);
    assert_eq!(headers_a[header::ETAG], headers_b[header::ETAG]);
}

#[tokio::test]
async fn test_etag_returns_not_modified() {
    let (_dir, _store, app) = setup();
    let (_, headers, _) = get(&app, "/api/state").await;
    let etag = headers[header::ETAG].to_str().unwrap().to_string();

    let response = app.clone()
        .oneshot(
            Request::builder()
                .uri("/api/state")
                .header(header::IF_NONE_MATCH, &etag)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_MODIFIED);
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert!(body.is_empty());
}

#[tokio::test]
async fn test_submit_feedback_queues_query() {
    let (_dir, store, app) = setup();
    let (_, before, _) = get(&app, "/api/state").await;

    let (status, body) = post_json(&app, "/api/feedback", serde_json::json!({"note": "make it dark"})).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["status"], "queued");
    assert!(body["query_id"].as_str().is_some());

    let (_, after, state) = get(&app, "/api/state").await;
    assert_ne!(before[header::ETAG], after[header::ETAG]);
    let state: Value = serde_json::from_slice(&state).unwrap();
    assert_eq!(state["pending_queries"], 1);
    assert_eq!(state["documents"]["feedback"]["feedback_log"][0]["note"], "make it dark");
    assert_eq!(state["documents"]["feedback"]["feedback_log"][0]["source"], "auto");

    // The agent picks it up and the viewer sees the new theme
    let agent = FeedbackAgent::new(store.clone(), &AgentConfig::default());
    agent.tick();
    let (_, _, ux) = get(&app, "/api/ux_config").await;
    let ux: Value = serde_json::from_slice(&ux).unwrap();
    assert_eq!(ux["theme"], "dark");
    assert_eq!(ux["colors"]["background"], "#000000");
}

#[tokio::test]
async fn test_empty_feedback_is_rejected() {
    let (_dir, store, app) = setup();
    let (status, body) = post_json(&app, "/api/feedback", serde_json::json!({"note": "   "})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());

    let queue = std::fs::read_to_string(store.path(DocumentKind::IdentityQueries)).unwrap();
    assert!(!queue.contains("\"id\""));
}

#[tokio::test]
async fn test_updater_writes_read_back_through_server() {
    let (_dir, store, app) = setup();
    updater::update_focus(&store, "Viewer polish", Some("in progress"), Some("ship it")).unwrap();
    updater::record_decision(&store, "Poll instead of push", "No extra services to run").unwrap();

    let (_, _, body) = get(&app, "/api/state").await;
    let state: Value = serde_json::from_slice(&body).unwrap();
    let context = &state["documents"]["context"];
    assert_eq!(context["current_context"]["active_focus"], "Viewer polish");
    assert_eq!(context["current_context"]["next_priority"], "ship it");
    assert_eq!(context["decisions"][0]["rationale"], "No extra services to run");

    let (status, _, body) = get(&app, "/api/context").await;
    assert_eq!(status, StatusCode::OK);
    let context: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(context["current_context"]["progress_status"], "in progress");
}

#[tokio::test]
async fn test_focus_endpoint() {
    let (_dir, _store, app) = setup();
    let (status, body) = post_json(&app, "/api/focus", serde_json::json!({
        "active_focus": "Write tests",
        "progress_status": "started"
    })).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["active_focus"], "Write tests");
    assert_eq!(body["progress_status"], "started");

    let (status, _) = post_json(&app, "/api/focus", serde_json::json!({"active_focus": ""})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_corrupt_document_keeps_serving_last_snapshot() {
    let (_dir, store, app) = setup();
    let (_, headers, good) = get(&app, "/api/state").await;

    std::fs::write(store.path(DocumentKind::Feedback), "{\"feedback_log\": [").unwrap();
    let (status, headers_after, body) = get(&app, "/api/state").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers[header::ETAG], headers_after[header::ETAG]);
    assert_eq!(good, body);

    // Single-document endpoints report the problem
    let (status, _, body) = get(&app, "/api/feedback").await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    let body: Value = serde_json::from_slice(&body).unwrap();
    assert!(body["details"].as_str().unwrap().contains("feedback.json"));
}

#[tokio::test]
async fn test_status_and_assets() {
    let (_dir, _store, app) = setup();

    let (status, _, body) = get(&app, "/api/status").await;
    assert_eq!(status, StatusCode::OK);
    let body: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(body["status"], "running");
    assert_eq!(body["pending_queries"], 0);
    assert_eq!(body["poll_interval_ms"], 750);

    let (status, _, body) = get(&app, "/").await;
    assert_eq!(status, StatusCode::OK);
    assert!(String::from_utf8(body).unwrap().contains("Context Keeper"));

    let (status, headers, _) = get(&app, "/app.js").await;
    assert_eq!(status, StatusCode::OK);
    assert!(headers[header::CONTENT_TYPE].to_str().unwrap().starts_with("application/javascript"));

    let (status, headers, body) = get(&app, "/api/memory").await;
    assert_eq!(status, StatusCode::OK);
    assert!(headers[header::CONTENT_TYPE].to_str().unwrap().starts_with("text/markdown"));
    assert!(String::from_utf8(body).unwrap().starts_with("# Memory"));
}

#[tokio::test]
async fn test_static_dir_is_served_when_configured() {
    let dir = tempfile::tempdir().unwrap();
    let assets = tempfile::tempdir().unwrap();
    std::fs::write(assets.path().join("logo.txt"), "logo").unwrap();

    let mut config = Config::default();
    config.store.base_dir = dir.path().to_path_buf();
    config.server.asset_dir = Some(assets.path().to_path_buf());
    let store = Arc::new(ContextStore::from_config(&config.store).unwrap());
    let app = router(ServerState::new(Arc::new(config), store));

    let (status, _, body) = get(&app, "/static/logo.txt").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, b"logo");
}

#[tokio::test]
async fn test_start_fails_when_port_is_taken() {
    let dir = tempfile::tempdir().unwrap();
    let held = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = held.local_addr().unwrap().port();

    let mut config = Config::default();
    config.store.base_dir = dir.path().to_path_buf();
    config.server.port = port;

    let err = context_keeper::start_server(config, false).await.unwrap_err();
    assert!(format!("{:#}", err).contains("Failed to bind"));
    drop(held);
}
