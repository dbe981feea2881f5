//! Conversation client: one transcript plus the provider it talks to.

use crate::config::CREDENTIAL_ENV_VAR;
use ct_llm::{ChatMessage, ChatProvider};
use std::sync::Arc;

pub const EMPTY_MESSAGE_PROMPT: &str = "Por favor, digite uma mensagem.";

/// Provider API key. Never printed.
#[derive(Clone)]
pub struct Credential(String);

impl Credential {
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Credential([REDACTED])")
    }
}

pub struct Chatbot {
    provider: Arc<dyn ChatProvider>,
    history: Vec<ChatMessage>,
}

impl Chatbot {
    /// Startup precondition: the provider credential must be present.
    pub fn configure(raw: Option<&str>) -> anyhow::Result<Credential> {
        match raw.map(str::trim) {
            Some(key) if !key.is_empty() => Ok(Credential(key.to_string())),
            _ => Err(anyhow::anyhow!(
                "A variável de ambiente {CREDENTIAL_ENV_VAR} não foi configurada."
            )),
        }
    }

    /// Opens an empty conversation on top of an already configured provider.
    pub fn initialize(provider: Arc<dyn ChatProvider>) -> Self {
        Self {
            provider,
            history: Vec::new(),
        }
    }

    pub fn history(&self) -> &[ChatMessage] {
        &self.history
    }

    pub fn len(&self) -> usize {
        self.history.len()
    }

    pub fn reset(&mut self) {
        self.history.clear();
    }

    /// Sends `text` with the full transcript and returns the reply.
    ///
    /// Never fails: provider errors come back as conversational text and leave
    /// the transcript untouched.
    #[tracing::instrument(level = "info", skip_all, fields(model = %self.provider.model(), turns = self.history.len()))]
    pub async fn send_message(&mut self, text: &str) -> String {
        if text.trim().is_empty() {
            return EMPTY_MESSAGE_PROMPT.to_string();
        }

        self.history.push(ChatMessage::user(text));
        match self.provider.send(&self.history).await {
            Ok(resp) => {
                let reply = resp.message.content.clone();
                self.history.push(resp.message);
                reply
            }
            Err(e) => {
                self.history.pop();
                tracing::warn!(%e, "provider call failed");
                format!("Desculpe, ocorreu um erro ao processar sua mensagem: {e}")
            }
        }
    }
}
