use crate::chatbot::EMPTY_MESSAGE_PROMPT;
use crate::server::AppState;
use crate::session::normalize_session_id;
use axum::extract::rejection::JsonRejection;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Extension, Json};
use serde_json::Value;
use std::sync::Arc;

pub const NO_MESSAGE_ERROR: &str = "Nenhuma mensagem fornecida.";
pub const MESSAGE_NOT_TEXT_ERROR: &str = "O campo message deve ser um texto.";
pub const INVALID_SESSION_ERROR: &str = "Cabeçalho x-session-id inválido.";
pub const SESSION_HEADER: &str = "x-session-id";

const INDEX_HTML: &str = include_str!("../../templates/index.html");

pub fn router() -> axum::Router {
    axum::Router::new()
        .route("/", get(index))
        .route("/ask", post(ask))
}

#[tracing::instrument(level = "debug", skip_all)]
async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

#[tracing::instrument(level = "info", skip_all)]
async fn ask(
    Extension(state): Extension<Arc<AppState>>,
    headers: HeaderMap,
    body: Result<Json<Value>, JsonRejection>,
) -> Response {
    let message = match body {
        Ok(Json(body)) => match extract_message(&body) {
            Ok(message) => message.to_string(),
            Err(error) => return bad_request(error),
        },
        Err(rejection) => {
            tracing::debug!(%rejection, "ask body rejected");
            return bad_request(NO_MESSAGE_ERROR);
        }
    };

    let raw_session = match headers.get(SESSION_HEADER).map(|v| v.to_str()) {
        None => None,
        Some(Ok(v)) => Some(v),
        Some(Err(_)) => return bad_request(INVALID_SESSION_ERROR),
    };
    let Some(session_id) = normalize_session_id(raw_session) else {
        return bad_request(INVALID_SESSION_ERROR);
    };

    // Blank input never reaches the registry.
    if message.trim().is_empty() {
        return Json(serde_json::json!({ "response": EMPTY_MESSAGE_PROMPT })).into_response();
    }

    let session = state.sessions.get_or_create(&session_id);
    let reply = session.ask(&message).await;
    tracing::debug!(session_id = %session_id, reply_chars = reply.chars().count(), "ask answered");

    Json(serde_json::json!({ "response": reply })).into_response()
}

/// Pulls `message` out of the request body.
///
/// Absent or falsy values (`null`, `""`, `false`, `0`, `[]`, `{}`) count as no
/// message at all.
fn extract_message(body: &Value) -> Result<&str, &'static str> {
    let Some(value) = body.get("message") else {
        return Err(NO_MESSAGE_ERROR);
    };
    if is_falsy(value) {
        return Err(NO_MESSAGE_ERROR);
    }
    value.as_str().ok_or(MESSAGE_NOT_TEXT_ERROR)
}

fn is_falsy(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::String(s) => s.is_empty(),
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
    }
}

fn bad_request(error: &str) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(serde_json::json!({ "error": error })),
    )
        .into_response()
}
