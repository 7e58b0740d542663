use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use uuid::Uuid;

pub const SESSION_COOKIE: &str = "SNO2_SESSION";
pub const FLASH_COOKIE: &str = "SNO2_FLASH";

/// Sessions untouched for this long are dropped.
pub const DEFAULT_IDLE_TTL: Duration = Duration::from_secs(8 * 60 * 60);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlashKind {
    Success,
    Info,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlashMessage {
    pub kind: FlashKind,
    pub message: String,
}

impl FlashMessage {
    pub fn new(kind: FlashKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

/// Flashes for callers without a session travel in [`FLASH_COOKIE`] as
/// hex-encoded JSON.
pub fn encode_flashes(flashes: &[FlashMessage]) -> String {
    hex::encode(serde_json::to_vec(flashes).unwrap_or_default())
}

/// Malformed cookie values decode to no flashes.
pub fn decode_flashes(value: &str) -> Vec<FlashMessage> {
    hex::decode(value)
        .ok()
        .and_then(|bytes| serde_json::from_slice(&bytes).ok())
        .unwrap_or_default()
}

#[derive(Debug, Clone)]
struct SessionState {
    username: String,
    flashes: Vec<FlashMessage>,
    last_seen: Instant,
}

/// Server-side sessions for signed-in users, keyed by the id carried in the
/// session cookie.
#[derive(Clone)]
pub struct SessionManager {
    sessions: Arc<Mutex<HashMap<String, SessionState>>>,
    idle_ttl: Duration,
}

impl Default for SessionManager {
    fn default() -> Self {
        Self::with_idle_ttl(DEFAULT_IDLE_TTL)
    }
}

impl SessionManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_idle_ttl(idle_ttl: Duration) -> Self {
        Self {
            sessions: Arc::new(Mutex::new(HashMap::new())),
            idle_ttl,
        }
    }

    /// Opens a session for `username`, sweeping idle sessions first.
    pub async fn open_session(&self, username: &str) -> String {
        let session_id = Uuid::new_v4().to_string();
        let state = SessionState {
            username: username.to_string(),
            flashes: Vec::new(),
            last_seen: Instant::now(),
        };
        let mut sessions = self.sessions.lock().await;
        let idle_ttl = self.idle_ttl;
        let before = sessions.len();
        sessions.retain(|_, state| state.last_seen.elapsed() < idle_ttl);
        if sessions.len() < before {
            tracing::debug!(expired = before - sessions.len(), "swept idle sessions");
        }
        sessions.insert(session_id.clone(), state);
        session_id
    }

    /// Live session state, refreshing its idle clock. Expired sessions are removed.
    fn touch<'a>(
        sessions: &'a mut HashMap<String, SessionState>,
        session_id: &str,
        idle_ttl: Duration,
    ) -> Option<&'a mut SessionState> {
        let expired = sessions
            .get(session_id)
            .is_some_and(|state| state.last_seen.elapsed() >= idle_ttl);
        if expired {
            sessions.remove(session_id);
            return None;
        }
        let state = sessions.get_mut(session_id)?;
        state.last_seen = Instant::now();
        Some(state)
    }

    pub async fn username(&self, session_id: &str) -> Option<String> {
        let mut sessions = self.sessions.lock().await;
        Self::touch(&mut sessions, session_id, self.idle_ttl).map(|state| state.username.clone())
    }

    /// Keeps a signed-in session valid after the user renames themself.
    pub async fn set_username(&self, session_id: &str, username: &str) {
        let mut sessions = self.sessions.lock().await;
        if let Some(state) = Self::touch(&mut sessions, session_id, self.idle_ttl) {
            state.username = username.to_string();
        }
    }

    pub async fn is_open(&self, session_id: &str) -> bool {
        let mut sessions = self.sessions.lock().await;
        Self::touch(&mut sessions, session_id, self.idle_ttl).is_some()
    }

    /// Unknown or expired session ids are ignored.
    pub async fn push_flash(&self, session_id: &str, flash: FlashMessage) {
        let mut sessions = self.sessions.lock().await;
        if let Some(state) = Self::touch(&mut sessions, session_id, self.idle_ttl) {
            state.flashes.push(flash);
        }
    }

    /// Flash messages are shown once: reading them empties the queue.
    pub async fn take_flashes(&self, session_id: &str) -> Vec<FlashMessage> {
        let mut sessions = self.sessions.lock().await;
        match Self::touch(&mut sessions, session_id, self.idle_ttl) {
            Some(state) => std::mem::take(&mut state.flashes),
            None => Vec::new(),
        }
    }

    pub async fn close_session(&self, session_id: &str) {
        let mut sessions = self.sessions.lock().await;
        sessions.remove(session_id);
    }
}

#[cfg(test)]
mod tests {
    use super::{decode_flashes, encode_flashes, FlashKind, FlashMessage, SessionManager};
    use std::time::Duration;

    #[tokio::test]
    async fn flashes_are_consumed_once() {
        let manager = SessionManager::new();
        let session_id = manager.open_session("savbalac").await;
        assert_eq!(manager.username(&session_id).await.as_deref(), Some("savbalac"));

        manager
            .push_flash(&session_id, FlashMessage::new(FlashKind::Success, "Saved."))
            .await;
        let flashes = manager.take_flashes(&session_id).await;
        assert_eq!(flashes, vec![FlashMessage::new(FlashKind::Success, "Saved.")]);
        assert!(manager.take_flashes(&session_id).await.is_empty());
    }

    #[tokio::test]
    async fn closed_session_forgets_username() {
        let manager = SessionManager::new();
        let session_id = manager.open_session("savbalac").await;
        manager.close_session(&session_id).await;
        assert!(!manager.is_open(&session_id).await);
        assert!(manager.username(&session_id).await.is_none());
    }

    #[tokio::test]
    async fn flash_for_unknown_id_opens_nothing() {
        let manager = SessionManager::new();
        manager
            .push_flash("forged-cookie", FlashMessage::new(FlashKind::Error, "Nope."))
            .await;
        assert!(!manager.is_open("forged-cookie").await);
        assert!(manager.take_flashes("forged-cookie").await.is_empty());
    }

    #[tokio::test]
    async fn idle_sessions_expire() {
        let manager = SessionManager::with_idle_ttl(Duration::ZERO);
        let session_id = manager.open_session("savbalac").await;
        assert!(manager.username(&session_id).await.is_none());
        assert!(!manager.is_open(&session_id).await);

        let live = SessionManager::with_idle_ttl(Duration::from_secs(60));
        let session_id = live.open_session("savbalac").await;
        assert!(live.is_open(&session_id).await);
    }

    #[test]
    fn cookie_flashes_survive_encoding() {
        let flashes = vec![FlashMessage::new(FlashKind::Info, "You have signed out.")];
        let encoded = encode_flashes(&flashes);
        assert!(encoded.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(decode_flashes(&encoded), flashes);
        assert!(decode_flashes("not hex at all").is_empty());
    }
}
