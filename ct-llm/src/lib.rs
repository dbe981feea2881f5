//! BYO-key chat client for CruzeiroChat.
//!
//! Pure HTTP client, no knowledge of the web layer. The app talks to the
//! provider only through [`ChatProvider`].

mod client;
mod error;
mod gemini;
mod types;

pub use client::{ChatProvider, DEFAULT_REQUEST_TIMEOUT, build_http_client};
pub use error::{LlmError, Result};
pub use gemini::{GEMINI_API_BASE_URL, GeminiClient};
pub use types::{
    ChatMessage, ChatResponse, GenerationConfig, HarmBlockThreshold, HarmCategory, ModelConfig,
    Role, SafetySetting, Usage,
};
