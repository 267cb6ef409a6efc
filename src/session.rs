//! Per-browser-session state.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

/// One transcript entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Message body.
    pub text: String,
    /// True for the user's turns, false for the model's.
    pub is_user: bool,
}

impl ChatMessage {
    /// A user turn.
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_user: true,
        }
    }

    /// A model turn.
    pub fn model(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_user: false,
        }
    }
}

/// Everything one browser session remembers.
#[derive(Debug, Clone, Default)]
pub struct SessionState {
    /// Transcript, oldest first.
    pub chat_history: Vec<ChatMessage>,
    /// Credential entered for this session.
    pub api_key: String,
    /// Most recent verified generation result.
    pub last_generated_image: Option<PathBuf>,
    /// Most recent edit result.
    pub last_edited_image: Option<PathBuf>,
    /// Prompt that produced `last_generated_image`.
    pub current_prompt: Option<String>,
    /// Instruction that produced `last_edited_image`.
    pub last_edit_prompt: Option<String>,
}

impl SessionState {
    /// Fresh state seeded with a default credential.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            ..Self::default()
        }
    }

    /// True once a non-blank credential is present.
    pub fn has_api_key(&self) -> bool {
        !self.api_key.trim().is_empty()
    }

    /// Appends a user turn.
    pub fn push_user(&mut self, text: impl Into<String>) {
        self.chat_history.push(ChatMessage::user(text));
    }

    /// Appends a model turn.
    pub fn push_model(&mut self, text: impl Into<String>) {
        self.chat_history.push(ChatMessage::model(text));
    }

    /// Drops the whole transcript.
    pub fn clear_history(&mut self) {
        self.chat_history.clear();
    }
}

/// Opaque session identifier carried in a cookie.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(Uuid);

impl SessionId {
    /// Generates a random id.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parses an id from its cookie form.
    pub fn parse(s: &str) -> Option<Self> {
        Uuid::parse_str(s.trim()).ok().map(Self)
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Shared handle to one session's state.
pub type SessionHandle = Arc<Mutex<SessionState>>;

struct SessionEntry {
    state: SessionHandle,
    last_seen: Instant,
}

/// All live sessions of the server.
///
/// Sessions are created on first contact and discarded explicitly or once
/// idle for longer than the TTL.
pub struct SessionStore {
    sessions: RwLock<HashMap<SessionId, SessionEntry>>,
    default_api_key: String,
    ttl: Duration,
}

impl SessionStore {
    /// Creates an empty store. New sessions start with `default_api_key`.
    pub fn new(default_api_key: impl Into<String>, ttl: Duration) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            default_api_key: default_api_key.into(),
            ttl,
        }
    }

    /// Starts a new session.
    pub async fn create(&self) -> (SessionId, SessionHandle) {
        let id = SessionId::new();
        let state = Arc::new(Mutex::new(SessionState::new(self.default_api_key.clone())));
        let now = Instant::now();

        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, entry| now.duration_since(entry.last_seen) <= self.ttl);
        if sessions.len() < before {
            tracing::debug!(purged = before - sessions.len(), "dropped idle sessions");
        }
        sessions.insert(
            id,
            SessionEntry {
                state: Arc::clone(&state),
                last_seen: now,
            },
        );
        tracing::debug!(session = %id, live = sessions.len(), "session started");

        (id, state)
    }

    /// Looks up a live session and marks it as used.
    pub async fn get(&self, id: SessionId) -> Option<SessionHandle> {
        let mut sessions = self.sessions.write().await;
        let entry = sessions.get_mut(&id)?;
        if entry.last_seen.elapsed() > self.ttl {
            sessions.remove(&id);
            return None;
        }
        entry.last_seen = Instant::now();
        Some(Arc::clone(&entry.state))
    }

    /// Returns the session for `id`, starting a new one if it is unknown.
    pub async fn get_or_create(&self, id: Option<SessionId>) -> (SessionId, SessionHandle, bool) {
        if let Some(id) = id {
            if let Some(state) = self.get(id).await {
                return (id, state, false);
            }
        }
        let (id, state) = self.create().await;
        (id, state, true)
    }

    /// Number of live sessions.
    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_defaults() {
        let state = SessionState::new("");
        assert!(!state.has_api_key());
        assert!(state.chat_history.is_empty());
        assert!(state.last_generated_image.is_none());
        assert!(state.last_edited_image.is_none());

        assert!(SessionState::new("key").has_api_key());
        assert!(!SessionState::new("  ").has_api_key());
    }

    #[test]
    fn test_history_order_and_clear() {
        let mut state = SessionState::default();
        state.push_user("hello");
        state.push_model("hi there");
        assert_eq!(
            state.chat_history,
            vec![ChatMessage::user("hello"), ChatMessage::model("hi there")]
        );
        state.clear_history();
        assert!(state.chat_history.is_empty());
    }

    #[test]
    fn test_session_id_roundtrip() {
        let id = SessionId::new();
        assert_eq!(SessionId::parse(&id.to_string()), Some(id));
        assert_eq!(SessionId::parse("not-a-uuid"), None);
    }

    #[tokio::test]
    async fn test_sessions_are_isolated() {
        let store = SessionStore::new("env-key", Duration::from_secs(60));
        let (a, state_a) = store.create().await;
        let (b, state_b) = store.create().await;
        assert_ne!(a, b);

        state_a.lock().await.push_user("only in a");
        assert_eq!(state_a.lock().await.api_key, "env-key");
        assert!(state_b.lock().await.chat_history.is_empty());

        let again = store.get(a).await.unwrap();
        assert_eq!(again.lock().await.chat_history.len(), 1);
    }

    #[tokio::test]
    async fn test_get_or_create_unknown_id() {
        let store = SessionStore::new("", Duration::from_secs(60));
        let (id, _, created) = store.get_or_create(Some(SessionId::new())).await;
        assert!(created);
        let (same, _, created) = store.get_or_create(Some(id)).await;
        assert!(!created);
        assert_eq!(same, id);
    }

    #[tokio::test]
    async fn test_idle_sessions_expire() {
        let store = SessionStore::new("", Duration::from_millis(10));
        let (id, _) = store.create().await;
        tokio::time::sleep(Duration::from_millis(30)).await;

        assert!(store.get(id).await.is_none());
        store.create().await;
        assert_eq!(store.len().await, 1);
    }
}
