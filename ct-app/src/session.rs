//! Session registry: one `Chatbot` per session id.
//!
//! Requests without a session id share the `default` session. The registry is
//! bounded: idle sessions are dropped and, past `max_sessions`, the least
//! recently active one is evicted to make room.

use crate::chatbot::Chatbot;
use crate::config::SessionsConfig;
use chrono::{DateTime, Utc};
use ct_llm::{ChatMessage, ChatProvider};
use dashmap::DashMap;
use serde::Serialize;
use std::sync::{Arc, MutexGuard};
use std::time::Duration;
use tokio::sync::Mutex;

pub const DEFAULT_SESSION_ID: &str = "default";
pub const MAX_SESSION_ID_LEN: usize = 64;

/// A conversation plus the metadata readers need while it is busy.
///
/// `chatbot` is held for a whole provider round trip. `state` is only ever
/// locked briefly, so listing and inspection never wait on an exchange.
pub struct Session {
    chatbot: Mutex<Chatbot>,
    state: std::sync::Mutex<SessionState>,
}

struct SessionState {
    created_at: DateTime<Utc>,
    last_active: DateTime<Utc>,
    history: Vec<ChatMessage>,
}

impl Session {
    fn new(provider: Arc<dyn ChatProvider>) -> Self {
        let now = Utc::now();
        Self {
            chatbot: Mutex::new(Chatbot::initialize(provider)),
            state: std::sync::Mutex::new(SessionState {
                created_at: now,
                last_active: now,
                history: Vec::new(),
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, SessionState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub async fn ask(&self, text: &str) -> String {
        self.state().last_active = Utc::now();
        let mut chatbot = self.chatbot.lock().await;
        let reply = chatbot.send_message(text).await;
        tracing::debug!(turns = chatbot.len(), "exchange finished");
        self.publish(&chatbot);
        reply
    }

    pub async fn reset(&self) {
        let mut chatbot = self.chatbot.lock().await;
        chatbot.reset();
        self.publish(&chatbot);
    }

    fn publish(&self, chatbot: &Chatbot) {
        let mut state = self.state();
        state.history = chatbot.history().to_vec();
        state.last_active = Utc::now();
    }

    pub fn last_active(&self) -> DateTime<Utc> {
        self.state().last_active
    }

    /// Completed turns; an exchange in flight is not counted until it ends.
    pub fn message_count(&self) -> usize {
        self.state().history.len()
    }

    pub fn summary(&self, id: &str) -> SessionSummary {
        let state = self.state();
        SessionSummary {
            id: id.to_string(),
            created_at: state.created_at,
            last_active: state.last_active,
            messages: state.history.len(),
        }
    }

    pub fn transcript(&self, id: &str) -> SessionTranscript {
        let state = self.state();
        SessionTranscript {
            id: id.to_string(),
            created_at: state.created_at,
            last_active: state.last_active,
            messages: state.history.clone(),
        }
    }
}

/// Normalizes a caller-supplied session id. `None` means the id is unusable.
pub fn normalize_session_id(raw: Option<&str>) -> Option<String> {
    let Some(raw) = raw else {
        return Some(DEFAULT_SESSION_ID.to_string());
    };
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Some(DEFAULT_SESSION_ID.to_string());
    }
    if trimmed.len() > MAX_SESSION_ID_LEN
        || !trimmed
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return None;
    }
    Some(trimmed.to_string())
}

pub struct SessionManager {
    sessions: DashMap<String, Arc<Session>>,
    provider: Arc<dyn ChatProvider>,
    max_sessions: usize,
    idle_timeout: Duration,
}

impl SessionManager {
    pub fn new(provider: Arc<dyn ChatProvider>, limits: &SessionsConfig) -> Self {
        Self {
            sessions: DashMap::new(),
            provider,
            max_sessions: limits.max_sessions.max(1),
            idle_timeout: Duration::from_secs(limits.idle_timeout_seconds),
        }
    }

    pub fn model(&self) -> &str {
        self.provider.model()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Concurrent creations may overshoot `max_sessions` by a few entries
    /// until the next creation evicts again.
    pub fn get_or_create(&self, id: &str) -> Arc<Session> {
        if let Some(existing) = self.get(id) {
            return existing;
        }
        self.make_room();
        self.sessions
            .entry(id.to_string())
            .or_insert_with(|| {
                tracing::debug!(session_id = %id, "session created");
                Arc::new(Session::new(self.provider.clone()))
            })
            .clone()
    }

    pub fn get(&self, id: &str) -> Option<Arc<Session>> {
        self.sessions.get(id).map(|entry| entry.value().clone())
    }

    pub fn remove(&self, id: &str) -> bool {
        self.sessions.remove(id).is_some()
    }

    pub fn list(&self) -> Vec<SessionSummary> {
        let mut out: Vec<SessionSummary> = self
            .sessions
            .iter()
            .map(|entry| entry.value().summary(entry.key()))
            .collect();
        out.sort_by_key(|s| s.last_active);
        out.reverse();
        out
    }

    fn make_room(&self) {
        let now = Utc::now();
        let before = self.sessions.len();
        self.sessions.retain(|_, session| {
            now.signed_duration_since(session.last_active())
                .to_std()
                .map_or(true, |idle| idle <= self.idle_timeout)
        });
        let expired = before.saturating_sub(self.sessions.len());
        if expired > 0 {
            tracing::debug!(expired, "idle sessions dropped");
        }

        while self.sessions.len() >= self.max_sessions {
            let oldest = self
                .sessions
                .iter()
                .min_by_key(|entry| entry.value().last_active())
                .map(|entry| entry.key().clone());
            let Some(oldest) = oldest else { break };
            self.sessions.remove(&oldest);
            tracing::info!(session_id = %oldest, max_sessions = self.max_sessions, "session evicted");
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionSummary {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub last_active: DateTime<Utc>,
    pub messages: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionTranscript {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub last_active: DateTime<Utc>,
    pub messages: Vec<ChatMessage>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{GatedProvider, ScriptedProvider};

    fn manager(provider: impl ChatProvider + 'static, max_sessions: usize) -> SessionManager {
        SessionManager::new(
            Arc::new(provider),
            &SessionsConfig {
                max_sessions,
                ..SessionsConfig::default()
            },
        )
    }

    #[test]
    fn session_ids_default_and_reject_garbage() {
        assert_eq!(normalize_session_id(None).as_deref(), Some("default"));
        assert_eq!(normalize_session_id(Some("  ")).as_deref(), Some("default"));
        assert_eq!(
            normalize_session_id(Some(" 3f2b-aa_01 ")).as_deref(),
            Some("3f2b-aa_01")
        );
        assert_eq!(normalize_session_id(Some("../etc")), None);
        assert_eq!(normalize_session_id(Some(&"a".repeat(65))), None);
    }

    #[tokio::test]
    async fn sessions_keep_independent_transcripts() {
        let manager = manager(
            ScriptedProvider::replying(["resposta A", "resposta B", "resposta A2"]),
            10,
        );

        let a = manager.get_or_create("a");
        let b = manager.get_or_create("b");
        assert_eq!(a.ask("oi").await, "resposta A");
        assert_eq!(b.ask("olá").await, "resposta B");
        assert_eq!(a.ask("e aí").await, "resposta A2");

        assert_eq!(a.message_count(), 4);
        assert_eq!(b.message_count(), 2);
        assert_eq!(manager.len(), 2);

        // same id resolves to the same session
        assert!(Arc::ptr_eq(&a, &manager.get_or_create("a")));
    }

    #[tokio::test]
    async fn list_is_most_recent_first_and_remove_drops_session() {
        let manager = manager(ScriptedProvider::replying(["x", "y"]), 10);
        manager.get_or_create("old").ask("1").await;
        tokio::time::sleep(Duration::from_millis(5)).await;
        manager.get_or_create("new").ask("2").await;

        let listed = manager.list();
        let ids: Vec<&str> = listed.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["new", "old"]);
        assert_eq!(listed[0].messages, 2);

        assert!(manager.remove("old"));
        assert!(!manager.remove("old"));
        assert!(manager.get("old").is_none());
    }

    #[tokio::test]
    async fn full_registry_evicts_least_recently_active() {
        let manager = manager(ScriptedProvider::replying(["x"]), 2);
        let a = manager.get_or_create("a");
        manager.get_or_create("b");
        tokio::time::sleep(Duration::from_millis(5)).await;
        a.ask("oi").await;

        manager.get_or_create("c");

        assert_eq!(manager.len(), 2);
        assert!(manager.get("a").is_some());
        assert!(manager.get("b").is_none());
        assert!(manager.get("c").is_some());
    }

    #[tokio::test]
    async fn idle_sessions_are_dropped_on_creation() {
        let mut manager = manager(ScriptedProvider::replying([]), 10);
        manager.idle_timeout = Duration::from_millis(10);
        manager.get_or_create("stale");
        tokio::time::sleep(Duration::from_millis(30)).await;

        manager.get_or_create("fresh");

        assert!(manager.get("stale").is_none());
        assert_eq!(manager.len(), 1);
    }

    #[tokio::test]
    async fn inspection_does_not_wait_for_exchange_in_flight() {
        let provider = Arc::new(GatedProvider::default());
        let manager = Arc::new(SessionManager::new(
            provider.clone(),
            &SessionsConfig::default(),
        ));
        let session = manager.get_or_create("busy");

        let exchange = tokio::spawn({
            let session = session.clone();
            async move { session.ask("oi").await }
        });
        provider.entered.notified().await;

        let listed = tokio::time::timeout(Duration::from_millis(500), async { manager.list() })
            .await
            .expect("list while busy");
        assert_eq!(listed[0].id, "busy");
        assert_eq!(listed[0].messages, 0);
        assert!(session.transcript("busy").messages.is_empty());

        provider.release.notify_one();
        assert_eq!(exchange.await.expect("exchange task"), "liberado");
        assert_eq!(session.message_count(), 2);
    }
}
