use crate::error::Result;
use crate::types::{ChatMessage, ChatResponse};
use async_trait::async_trait;
use std::time::Duration;

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// The one seam between a conversation and the hosted model.
///
/// Implementations receive the whole transcript, user turn last, and return
/// the model's reply. They hold no conversation state of their own.
#[async_trait]
pub trait ChatProvider: Send + Sync {
    /// Model identifier, for logs and health output.
    fn model(&self) -> &str;

    async fn send(&self, transcript: &[ChatMessage]) -> Result<ChatResponse>;
}

#[tracing::instrument(level = "debug", skip_all)]
pub fn build_http_client(timeout: Duration) -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .unwrap_or_else(|e| {
            tracing::warn!(%e, "reqwest client build failed; falling back to default client");
            reqwest::Client::new()
        })
}
