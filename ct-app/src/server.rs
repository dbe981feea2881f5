//! CruzeiroChat HTTP server.
//!
//! Builds the provider client and the session registry, then mounts the chat
//! routes behind request-id and tracing layers.

use crate::chatbot::{Chatbot, Credential};
use crate::config::{AppConfig, SessionsConfig};
use crate::routes;
use crate::session::SessionManager;
use anyhow::Result;
use axum::Extension;
use axum::Router;
use axum::http::HeaderMap;
use axum::http::Request;
use axum::response::Response;
use ct_llm::{ChatProvider, GeminiClient};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tower_http::classify::ServerErrorsFailureClass;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;

pub struct AppState {
    pub sessions: Arc<SessionManager>,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(provider: Arc<dyn ChatProvider>, limits: &SessionsConfig) -> Self {
        Self {
            sessions: Arc::new(SessionManager::new(provider, limits)),
            started_at: Instant::now(),
        }
    }
}

pub fn build_provider(cfg: &AppConfig, credential: &Credential) -> Arc<dyn ChatProvider> {
    Arc::new(
        GeminiClient::new(credential.expose(), cfg.model.clone())
            .with_base_url(cfg.provider.base_url.clone())
            .with_timeout(Duration::from_secs(cfg.provider.request_timeout_seconds)),
    )
}

pub fn app(state: Arc<AppState>) -> Router {
    let trace_layer = TraceLayer::new_for_http()
        .make_span_with(|request: &Request<_>| {
            tracing::info_span!(
                "http.request",
                method = %request.method(),
                uri = %request.uri(),
                version = ?request.version(),
                request_id = %request_id_from_headers(request.headers())
            )
        })
        .on_request(|request: &Request<_>, _span: &tracing::Span| {
            tracing::info!(
                method = %request.method(),
                uri = %request.uri(),
                request_id = %request_id_from_headers(request.headers()),
                "http request started"
            );
        })
        .on_response(
            |response: &Response, latency: Duration, _span: &tracing::Span| {
                tracing::info!(
                    status = response.status().as_u16(),
                    latency_ms = latency.as_millis() as u64,
                    "http request completed"
                );
            },
        )
        .on_failure(
            |error: ServerErrorsFailureClass, latency: Duration, _span: &tracing::Span| {
                tracing::error!(
                    error_class = %error,
                    latency_ms = latency.as_millis() as u64,
                    "http request failed"
                );
            },
        );

    routes::router()
        .layer(Extension(state))
        .layer(trace_layer)
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
}

/// Checks everything `run` needs short of binding the port.
pub fn doctor(cfg: &AppConfig, config_path: Option<PathBuf>) -> Result<()> {
    cfg.validate()?;
    Chatbot::configure(cfg.keys.google_api_key.as_deref())?;
    tracing::info!(
        model = %cfg.model.model,
        bind_addr = %cfg.bind_addr()?,
        provider_base_url = %cfg.provider.base_url,
        max_sessions = cfg.sessions.max_sessions,
        config_path = ?config_path,
        "config ok"
    );
    Ok(())
}

/// Resolves the provider credential, then serves. A missing credential is
/// returned before any port is bound.
pub async fn run(cfg: AppConfig) -> Result<()> {
    let credential = Chatbot::configure(cfg.keys.google_api_key.as_deref())?;
    serve(cfg, credential).await
}

async fn serve(cfg: AppConfig, credential: Credential) -> Result<()> {
    let addr = cfg.bind_addr()?;
    tracing::info!(
        bind_addr = %addr,
        model = %cfg.model.model,
        temperature = cfg.model.generation.temperature,
        top_p = cfg.model.generation.top_p,
        top_k = cfg.model.generation.top_k,
        max_output_tokens = cfg.model.generation.max_output_tokens,
        safety_settings = ?cfg.model.safety_settings,
        provider_base_url = %cfg.provider.base_url,
        provider_request_timeout_seconds = cfg.provider.request_timeout_seconds,
        max_sessions = cfg.sessions.max_sessions,
        session_idle_timeout_seconds = cfg.sessions.idle_timeout_seconds,
        verbose = cfg.server.debug,
        "server configuration loaded"
    );

    let provider = build_provider(&cfg, &credential);
    let state = Arc::new(AppState::new(provider, &cfg.sessions));
    let listener = bind_listener(addr).await?;

    tracing::info!(%addr, "cruzeiro-chat serving");
    axum::serve(listener, app(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    tracing::info!("http server stopped");
    Ok(())
}

async fn bind_listener(addr: SocketAddr) -> Result<tokio::net::TcpListener> {
    tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| anyhow::anyhow!("could not listen on {addr}: {e}"))
}

fn request_id_from_headers(headers: &HeaderMap) -> &str {
    headers
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("-")
}

/// Resolves on ctrl-c or, on unix, SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "ctrl-c handler unavailable");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "SIGTERM handler unavailable");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::warn!("ctrl-c received; draining connections"),
        _ = terminate => tracing::warn!("SIGTERM received; draining connections"),
    }
}
