use crate::server::AppState;
use axum::extract::Path;
use axum::routing::{get, post};
use axum::{Extension, Json};
use std::sync::Arc;

pub fn router() -> axum::Router {
    axum::Router::new()
        .route("/sessions", get(list_sessions))
        .route("/sessions/{id}", get(get_session).delete(delete_session))
        .route("/sessions/{id}/reset", post(reset_session))
}

#[tracing::instrument(level = "debug", skip_all)]
async fn list_sessions(Extension(state): Extension<Arc<AppState>>) -> Json<serde_json::Value> {
    let sessions = state.sessions.list();
    Json(serde_json::json!({ "sessions": sessions }))
}

#[tracing::instrument(level = "debug", skip_all)]
async fn get_session(
    Extension(state): Extension<Arc<AppState>>,
    Path(id): Path<String>,
) -> Json<serde_json::Value> {
    let Some(session) = state.sessions.get(&id) else {
        return Json(serde_json::json!({ "status": "not_found" }));
    };
    Json(serde_json::json!({ "status": "ok", "session": session.transcript(&id) }))
}

#[tracing::instrument(level = "info", skip_all)]
async fn delete_session(
    Extension(state): Extension<Arc<AppState>>,
    Path(id): Path<String>,
) -> Json<serde_json::Value> {
    let removed = state.sessions.remove(&id);
    tracing::info!(session_id = %id, removed, "session delete");
    Json(serde_json::json!({ "status": if removed { "ok" } else { "not_found" } }))
}

#[tracing::instrument(level = "info", skip_all)]
async fn reset_session(
    Extension(state): Extension<Arc<AppState>>,
    Path(id): Path<String>,
) -> Json<serde_json::Value> {
    let Some(session) = state.sessions.get(&id) else {
        return Json(serde_json::json!({ "status": "not_found" }));
    };
    session.reset().await;
    Json(serde_json::json!({ "status": "ok" }))
}
