//! In-memory provider for exercising conversations without the network.

use async_trait::async_trait;
use ct_llm::{ChatMessage, ChatProvider, ChatResponse, LlmError, Usage};
use std::collections::VecDeque;
use std::sync::Mutex;

pub struct ScriptedProvider {
    script: Mutex<VecDeque<Result<String, String>>>,
    transcripts: Mutex<Vec<Vec<ChatMessage>>>,
}

impl ScriptedProvider {
    pub fn new(script: Vec<Result<String, String>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            transcripts: Mutex::new(Vec::new()),
        }
    }

    pub fn replying<const N: usize>(replies: [&str; N]) -> Self {
        Self::new(replies.iter().map(|r| Ok(r.to_string())).collect())
    }

    pub fn calls(&self) -> usize {
        self.transcripts.lock().expect("transcripts lock").len()
    }

    pub fn transcripts(&self) -> Vec<Vec<ChatMessage>> {
        self.transcripts.lock().expect("transcripts lock").clone()
    }
}

#[async_trait]
impl ChatProvider for ScriptedProvider {
    fn model(&self) -> &str {
        "scripted"
    }

    async fn send(&self, transcript: &[ChatMessage]) -> ct_llm::Result<ChatResponse> {
        self.transcripts
            .lock()
            .expect("transcripts lock")
            .push(transcript.to_vec());
        let next = self
            .script
            .lock()
            .expect("script lock")
            .pop_front()
            .unwrap_or_else(|| Err("script exhausted".to_string()));
        match next {
            Ok(text) => Ok(ChatResponse {
                message: ChatMessage::model(text),
                usage: Usage::default(),
                finish_reason: "STOP".to_string(),
            }),
            Err(e) => Err(LlmError::Http(e)),
        }
    }
}

/// Holds every call open until the test releases it.
#[derive(Default)]
pub struct GatedProvider {
    pub entered: tokio::sync::Notify,
    pub release: tokio::sync::Notify,
}

#[async_trait]
impl ChatProvider for GatedProvider {
    fn model(&self) -> &str {
        "gated"
    }

    async fn send(&self, _transcript: &[ChatMessage]) -> ct_llm::Result<ChatResponse> {
        self.entered.notify_one();
        self.release.notified().await;
        Ok(ChatResponse {
            message: ChatMessage::model("liberado"),
            usage: Usage::default(),
            finish_reason: "STOP".to_string(),
        })
    }
}
