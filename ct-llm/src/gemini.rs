use crate::client::{ChatProvider, DEFAULT_REQUEST_TIMEOUT, build_http_client};
use crate::error::{LlmError, Result};
use crate::types::{ChatMessage, ChatResponse, ModelConfig, Role, SafetySetting, Usage};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const GEMINI_API_BASE_URL: &str = "https://generativelanguage.googleapis.com";

/// Finish reasons that mean the candidate was withheld rather than truncated.
const BLOCKED_FINISH_REASONS: &[&str] = &["SAFETY", "RECITATION", "BLOCKLIST", "PROHIBITED_CONTENT"];

#[derive(Clone)]
pub struct GeminiClient {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
    config: ModelConfig,
}

impl std::fmt::Debug for GeminiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiClient")
            .field("api_key", &"[REDACTED]")
            .field("base_url", &self.base_url)
            .field("config", &self.config)
            .finish()
    }
}

impl GeminiClient {
    #[tracing::instrument(level = "debug", skip_all)]
    pub fn new(api_key: &str, config: ModelConfig) -> Self {
        Self {
            http: build_http_client(DEFAULT_REQUEST_TIMEOUT),
            api_key: api_key.to_string(),
            base_url: GEMINI_API_BASE_URL.to_string(),
            config,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.http = build_http_client(timeout);
        self
    }

    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    fn generate_url(&self) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url, self.config.model
        )
    }
}

#[async_trait]
impl ChatProvider for GeminiClient {
    fn model(&self) -> &str {
        &self.config.model
    }

    #[tracing::instrument(level = "info", skip_all, fields(model = %self.config.model, turns = transcript.len()))]
    async fn send(&self, transcript: &[ChatMessage]) -> Result<ChatResponse> {
        match transcript.last() {
            Some(last) if last.role == Role::User => {}
            Some(_) => {
                return Err(LlmError::InvalidInput(
                    "transcript must end with a user turn".to_string(),
                ));
            }
            None => {
                return Err(LlmError::InvalidInput("transcript is empty".to_string()));
            }
        }

        let req = GeminiRequest::new(&self.config, transcript);

        let response = self
            .http
            .post(self.generate_url())
            .header("x-goog-api-key", &self.api_key)
            .json(&req)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(LlmError::Http(format!(
                "gemini generateContent status={status} body={body}"
            )));
        }

        let parsed: GeminiResponse = serde_json::from_str(&body)?;
        let resp: ChatResponse = parsed.try_into()?;
        tracing::debug!(
            finish_reason = %resp.finish_reason,
            prompt_tokens = resp.usage.prompt_tokens,
            completion_tokens = resp.usage.completion_tokens,
            "gemini reply received"
        );
        Ok(resp)
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
    generation_config: GeminiGenerationConfig,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    safety_settings: Vec<SafetySetting>,
}

impl GeminiRequest {
    fn new(config: &ModelConfig, transcript: &[ChatMessage]) -> Self {
        let g = &config.generation;
        Self {
            contents: transcript.iter().map(to_gemini_content).collect(),
            generation_config: GeminiGenerationConfig {
                temperature: g.temperature,
                top_p: g.top_p,
                top_k: g.top_k,
                max_output_tokens: g.max_output_tokens,
            },
            safety_settings: config.safety_settings.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiGenerationConfig {
    temperature: f32,
    top_p: f32,
    top_k: u32,
    max_output_tokens: u32,
}

#[derive(Debug, Serialize)]
struct GeminiContent {
    role: &'static str,
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Serialize)]
struct GeminiPart {
    text: String,
}

fn to_gemini_content(m: &ChatMessage) -> GeminiContent {
    let role = match m.role {
        Role::User => "user",
        Role::Model => "model",
    };
    GeminiContent {
        role,
        parts: vec![GeminiPart {
            text: m.content.clone(),
        }],
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
    #[serde(default)]
    prompt_feedback: Option<GeminiPromptFeedback>,
    #[serde(default)]
    usage_metadata: Option<GeminiUsage>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiCandidate {
    #[serde(default)]
    content: Option<GeminiCandidateContent>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidateContent {
    #[serde(default)]
    parts: Vec<GeminiCandidatePart>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidatePart {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiPromptFeedback {
    #[serde(default)]
    block_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiUsage {
    #[serde(default)]
    prompt_token_count: u32,
    #[serde(default)]
    candidates_token_count: u32,
}

impl TryFrom<GeminiResponse> for ChatResponse {
    type Error = LlmError;

    fn try_from(v: GeminiResponse) -> Result<Self> {
        if let Some(reason) = v.prompt_feedback.and_then(|f| f.block_reason) {
            return Err(LlmError::Blocked(format!("prompt blocked: {reason}")));
        }

        let candidate = v.candidates.into_iter().next().ok_or_else(|| {
            LlmError::Blocked("gemini response has no candidates".to_string())
        })?;

        let finish_reason = candidate
            .finish_reason
            .unwrap_or_else(|| "unknown".to_string());

        let text: String = candidate
            .content
            .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
            .unwrap_or_default();

        if text.is_empty() {
            if BLOCKED_FINISH_REASONS.contains(&finish_reason.as_str()) {
                return Err(LlmError::Blocked(format!(
                    "candidate withheld: finish_reason={finish_reason}"
                )));
            }
            return Err(LlmError::ResponseFormat(format!(
                "gemini candidate has no text (finish_reason={finish_reason})"
            )));
        }

        let usage = v
            .usage_metadata
            .map(|u| Usage {
                prompt_tokens: u.prompt_token_count,
                completion_tokens: u.candidates_token_count,
            })
            .unwrap_or_default();

        Ok(ChatResponse {
            message: ChatMessage::model(text),
            usage,
            finish_reason,
        })
    }
}
