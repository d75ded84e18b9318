//! HTTP handlers for the viewer API

use axum::{
    extract::{Json, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::warn;

use crate::server::ServerState;
use crate::store::{Document, FeedbackDocument, IdentityQueue, SessionContext, StoreError, UxConfig};
use crate::types::{FeedbackKind, FeedbackSource};
use crate::updater;

/// Feedback submitted from the viewer
#[derive(Debug, Deserialize)]
pub struct FeedbackRequest {
    pub note: String,
    #[serde(default, rename = "type")]
    pub kind: Option<FeedbackKind>,
    #[serde(default)]
    pub category: Option<String>,
}

/// Focus update submitted from the viewer
#[derive(Debug, Deserialize)]
pub struct FocusRequest {
    pub active_focus: String,
    #[serde(default)]
    pub progress_status: Option<String>,
    #[serde(default)]
    pub next_priority: Option<String>,
}

/// Status response
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub status: String,
    pub version: String,
    pub base_dir: String,
    pub pending_queries: Option<usize>,
    pub poll_interval_ms: u64,
}

fn error_response(status: StatusCode, error: &str, details: impl std::fmt::Display) -> Response {
    (
        status,
        Json(json!({
            "error": error,
            "details": details.to_string()
        }))
    ).into_response()
}

fn store_error(error: StoreError) -> Response {
    warn!("Store error: {}", error);
    error_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to read context store", error)
}

fn etag_matches(headers: &HeaderMap, etag: &str) -> bool {
    headers
        .get(header::IF_NONE_MATCH)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.split(',').any(|tag| {
            let tag = tag.trim();
            tag == "*" || tag == etag || tag.strip_prefix("W/") == Some(etag)
        }))
        .unwrap_or(false)
}

/// Full snapshot, 304 when the client already has this version
pub async fn state_handler(
    State(state): State<ServerState>,
    headers: HeaderMap,
) -> Response {
    let snapshot = match state.snapshots.current(&state.store) {
        Ok(snapshot) => snapshot,
        Err(e) => return store_error(e),
    };

    let etag = format!("\"{}\"", snapshot.version);
    if etag_matches(&headers, &etag) {
        return (
            StatusCode::NOT_MODIFIED,
            [(header::ETAG, etag), (header::CACHE_CONTROL, "no-cache".to_string())],
        ).into_response();
    }

    (
        [(header::ETAG, etag), (header::CACHE_CONTROL, "no-cache".to_string())],
        Json(&*snapshot),
    ).into_response()
}

fn document_response<D: Document>(state: &ServerState) -> Response {
    match state.store.load::<D>() {
        Ok(doc) => ([(header::CACHE_CONTROL, "no-cache")], Json(doc)).into_response(),
        Err(e) => store_error(e),
    }
}

/// Session context document
pub async fn context_handler(State(state): State<ServerState>) -> Response {
    document_response::<SessionContext>(&state)
}

/// Feedback document
pub async fn feedback_handler(State(state): State<ServerState>) -> Response {
    document_response::<FeedbackDocument>(&state)
}

/// UX configuration document
pub async fn ux_config_handler(State(state): State<ServerState>) -> Response {
    document_response::<UxConfig>(&state)
}

/// Long-term memory as markdown
pub async fn memory_handler(State(state): State<ServerState>) -> Response {
    match state.store.read_memory() {
        Ok(text) => (
            [
                (header::CONTENT_TYPE, "text/markdown; charset=utf-8"),
                (header::CACHE_CONTROL, "no-cache"),
            ],
            text,
        ).into_response(),
        Err(e) => store_error(e),
    }
}

/// Append feedback and queue it for the agent
pub async fn submit_feedback_handler(
    State(state): State<ServerState>,
    Json(req): Json<FeedbackRequest>,
) -> Response {
    if req.note.trim().is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "Invalid feedback", "note must not be empty");
    }

    match updater::add_feedback(
        &state.store,
        &req.note,
        req.kind.unwrap_or(FeedbackKind::Preference),
        req.category.as_deref(),
        FeedbackSource::Auto,
    ) {
        Ok(submitted) => (
            StatusCode::ACCEPTED,
            Json(json!({
                "status": "queued",
                "query_id": submitted.query.id,
                "timestamp": submitted.entry.timestamp,
            }))
        ).into_response(),
        Err(e) => {
            warn!("Feedback submission failed: {:#}", e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to store feedback", format!("{:#}", e))
        }
    }
}

/// Update the current focus
pub async fn focus_handler(
    State(state): State<ServerState>,
    Json(req): Json<FocusRequest>,
) -> Response {
    if req.active_focus.trim().is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "Invalid focus", "active_focus must not be empty");
    }

    match updater::update_focus(
        &state.store,
        &req.active_focus,
        req.progress_status.as_deref(),
        req.next_priority.as_deref(),
    ) {
        Ok(context) => Json(context.current_context).into_response(),
        Err(e) => {
            warn!("Focus update failed: {:#}", e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to update focus", format!("{:#}", e))
        }
    }
}

/// Server status
pub async fn status_handler(State(state): State<ServerState>) -> Json<StatusResponse> {
    let pending_queries = state.store
        .load::<IdentityQueue>()
        .map(|queue| queue.pending_count())
        .ok();

    Json(StatusResponse {
        status: "running".to_string(),
        version: crate::VERSION.to_string(),
        base_dir: state.store.base_dir().display().to_string(),
        pending_queries,
        poll_interval_ms: state.config.viewer.poll_interval_ms,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_etag_matching() {
        let mut headers = HeaderMap::new();
        assert!(!etag_matches(&headers, "\"abc\""));

        headers.insert(header::IF_NONE_MATCH, HeaderValue::from_static("\"abc\""));
        assert!(etag_matches(&headers, "\"abc\""));
        assert!(!etag_matches(&headers, "\"def\""));

        headers.insert(header::IF_NONE_MATCH, HeaderValue::from_static("\"x\", W/\"abc\""));
        assert!(etag_matches(&headers, "\"abc\""));
    }

    #[test]
    fn test_feedback_request_defaults() {
        let req: FeedbackRequest = serde_json::from_str(r#"{"note":"dark"}"#).unwrap();
        assert!(req.kind.is_none());
        assert!(req.category.is_none());

        let req: FeedbackRequest = serde_json::from_str(r#"{"note":"x","type":"performance"}"#).unwrap();
        assert_eq!(req.kind, Some(FeedbackKind::Performance));
    }
}
