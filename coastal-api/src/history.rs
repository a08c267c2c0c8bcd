//! Conversation history storage.
//!
//! Sessions map to append-only message lists capped at the most recent 100
//! entries. The file-backed store degrades to in-memory operation when the
//! filesystem is read-only (serverless deploys), so a write failure never
//! takes the chatbot down.

use coastal_common::util::now_iso;
use coastal_common::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;
use std::sync::Mutex;
use tracing::warn;

/// Per-session message cap. Oldest entries are dropped first.
pub const SESSION_MESSAGE_CAP: usize = 100;

/// A single message in a conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationMessage {
    /// "user" or "assistant"
    pub role: String,
    pub content: String,
    pub timestamp: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

impl ConversationMessage {
    /// Whether this entry was produced by the system rather than the
    /// user/assistant exchange (seeded safety info, internal markers).
    fn is_system_generated(&self) -> bool {
        let Some(meta) = &self.metadata else {
            return false;
        };
        if meta
            .get("is_system_generated")
            .and_then(Value::as_bool)
            .unwrap_or(false)
        {
            return true;
        }
        matches!(
            meta.get("type").and_then(Value::as_str),
            Some("general_safety_info")
        )
    }
}

type Sessions = BTreeMap<String, Vec<ConversationMessage>>;

/// Storage abstraction for conversation history.
///
/// The pipeline must tolerate either backing; handlers hold this behind a
/// trait object.
pub trait HistoryStore: Send + Sync {
    /// Get history for a session, excluding system-generated entries when
    /// `exclude_system` is set. Unknown sessions return an empty list.
    fn get_history(&self, session_id: &str, exclude_system: bool)
        -> Result<Vec<ConversationMessage>>;

    /// Append a message, evicting the oldest entries past the session cap.
    fn append(
        &self,
        session_id: &str,
        role: &str,
        content: &str,
        metadata: Option<Value>,
    ) -> Result<()>;

    /// Clear a session's history. Clearing an unknown session is a no-op.
    fn clear_session(&self, session_id: &str) -> Result<()>;

    /// List all known session ids.
    fn sessions(&self) -> Result<Vec<String>>;
}

fn push_capped(messages: &mut Vec<ConversationMessage>, message: ConversationMessage) {
    messages.push(message);
    if messages.len() > SESSION_MESSAGE_CAP {
        let excess = messages.len() - SESSION_MESSAGE_CAP;
        messages.drain(..excess);
    }
}

fn filter_history(
    messages: &[ConversationMessage],
    exclude_system: bool,
) -> Vec<ConversationMessage> {
    messages
        .iter()
        .filter(|m| !exclude_system || !m.is_system_generated())
        .cloned()
        .collect()
}

// ============================================================================
// In-Memory Store
// ============================================================================

/// Pure in-memory store for ephemeral deployments and tests.
#[derive(Default)]
pub struct MemoryHistoryStore {
    sessions: Mutex<Sessions>,
}

impl MemoryHistoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl HistoryStore for MemoryHistoryStore {
    fn get_history(
        &self,
        session_id: &str,
        exclude_system: bool,
    ) -> Result<Vec<ConversationMessage>> {
        let sessions = self.sessions.lock().map_err(|_| poisoned())?;
        Ok(sessions
            .get(session_id)
            .map(|msgs| filter_history(msgs, exclude_system))
            .unwrap_or_default())
    }

    fn append(
        &self,
        session_id: &str,
        role: &str,
        content: &str,
        metadata: Option<Value>,
    ) -> Result<()> {
        let mut sessions = self.sessions.lock().map_err(|_| poisoned())?;
        let entry = sessions.entry(session_id.to_string()).or_default();
        push_capped(
            entry,
            ConversationMessage {
                role: role.to_string(),
                content: content.to_string(),
                timestamp: now_iso(),
                metadata,
            },
        );
        Ok(())
    }

    fn clear_session(&self, session_id: &str) -> Result<()> {
        let mut sessions = self.sessions.lock().map_err(|_| poisoned())?;
        if let Some(entry) = sessions.get_mut(session_id) {
            entry.clear();
        }
        Ok(())
    }

    fn sessions(&self) -> Result<Vec<String>> {
        let sessions = self.sessions.lock().map_err(|_| poisoned())?;
        Ok(sessions.keys().cloned().collect())
    }
}

// ============================================================================
// File-Backed Store
// ============================================================================

/// JSON-file-backed store that falls back to in-memory operation when the
/// filesystem rejects writes.
pub struct FileHistoryStore {
    path: PathBuf,
    state: Mutex<FileState>,
}

struct FileState {
    sessions: Sessions,
    degraded: bool,
}

impl FileHistoryStore {
    /// Open (or create) the store at `path`. A missing or corrupt file
    /// starts empty; an unwritable location degrades to in-memory.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let sessions = Self::load_from_disk(&path);
        let degraded = Self::probe_writable(&path, &sessions);
        Self {
            path,
            state: Mutex::new(FileState { sessions, degraded }),
        }
    }

    fn load_from_disk(path: &PathBuf) -> Sessions {
        match fs::read_to_string(path) {
            Ok(raw) => serde_json::from_str(&raw).unwrap_or_default(),
            Err(_) => Sessions::default(),
        }
    }

    fn probe_writable(path: &PathBuf, sessions: &Sessions) -> bool {
        if path.exists() {
            return false;
        }
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                if let Err(e) = fs::create_dir_all(parent) {
                    warn!(path = %path.display(), error = %e, "History directory not writable, using in-memory storage");
                    return true;
                }
            }
        }
        match serde_json::to_string_pretty(sessions) {
            Ok(raw) => {
                if let Err(e) = fs::write(path, raw) {
                    warn!(path = %path.display(), error = %e, "History file not writable, using in-memory storage");
                    return true;
                }
                false
            }
            Err(_) => true,
        }
    }

    fn persist(&self, state: &mut FileState) {
        if state.degraded {
            return;
        }
        let raw = match serde_json::to_string_pretty(&state.sessions) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(error = %e, "Could not serialize history");
                return;
            }
        };
        if let Err(e) = fs::write(&self.path, raw) {
            warn!(path = %self.path.display(), error = %e, "Could not save history, switching to in-memory storage");
            state.degraded = true;
        }
    }
}

impl HistoryStore for FileHistoryStore {
    fn get_history(
        &self,
        session_id: &str,
        exclude_system: bool,
    ) -> Result<Vec<ConversationMessage>> {
        let state = self.state.lock().map_err(|_| poisoned())?;
        Ok(state
            .sessions
            .get(session_id)
            .map(|msgs| filter_history(msgs, exclude_system))
            .unwrap_or_default())
    }

    fn append(
        &self,
        session_id: &str,
        role: &str,
        content: &str,
        metadata: Option<Value>,
    ) -> Result<()> {
        let mut state = self.state.lock().map_err(|_| poisoned())?;
        let entry = state.sessions.entry(session_id.to_string()).or_default();
        push_capped(
            entry,
            ConversationMessage {
                role: role.to_string(),
                content: content.to_string(),
                timestamp: now_iso(),
                metadata,
            },
        );
        self.persist(&mut state);
        Ok(())
    }

    fn clear_session(&self, session_id: &str) -> Result<()> {
        let mut state = self.state.lock().map_err(|_| poisoned())?;
        if let Some(entry) = state.sessions.get_mut(session_id) {
            entry.clear();
            self.persist(&mut state);
        }
        Ok(())
    }

    fn sessions(&self) -> Result<Vec<String>> {
        let state = self.state.lock().map_err(|_| poisoned())?;
        Ok(state.sessions.keys().cloned().collect())
    }
}

fn poisoned() -> Error {
    Error::Internal("history store lock poisoned".into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn memory_store_round_trip() {
        let store = MemoryHistoryStore::new();
        store.append("s1", "user", "hello", None).unwrap();
        store.append("s1", "assistant", "hi there", None).unwrap();

        let history = store.get_history("s1", true).unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].role, "user");
        assert_eq!(history[1].content, "hi there");
    }

    #[test]
    fn unknown_session_is_empty() {
        let store = MemoryHistoryStore::new();
        assert!(store.get_history("nope", true).unwrap().is_empty());
    }

    #[test]
    fn session_cap_drops_oldest_first() {
        let store = MemoryHistoryStore::new();
        for i in 0..(SESSION_MESSAGE_CAP + 5) {
            store
                .append("s1", "user", &format!("msg {}", i), None)
                .unwrap();
        }
        let history = store.get_history("s1", false).unwrap();
        assert_eq!(history.len(), SESSION_MESSAGE_CAP);
        assert_eq!(history[0].content, "msg 5");
        assert_eq!(
            history.last().unwrap().content,
            format!("msg {}", SESSION_MESSAGE_CAP + 4)
        );
    }

    #[test]
    fn excludes_system_generated_messages() {
        let store = MemoryHistoryStore::new();
        store.append("s1", "user", "question", None).unwrap();
        store
            .append(
                "s1",
                "assistant",
                "seeded info",
                Some(json!({"is_system_generated": true})),
            )
            .unwrap();
        store
            .append(
                "s1",
                "assistant",
                "general info",
                Some(json!({"type": "general_safety_info"})),
            )
            .unwrap();

        assert_eq!(store.get_history("s1", true).unwrap().len(), 1);
        assert_eq!(store.get_history("s1", false).unwrap().len(), 3);
    }

    #[test]
    fn clear_session_empties_only_that_session() {
        let store = MemoryHistoryStore::new();
        store.append("a", "user", "one", None).unwrap();
        store.append("b", "user", "two", None).unwrap();
        store.clear_session("a").unwrap();

        assert!(store.get_history("a", true).unwrap().is_empty());
        assert_eq!(store.get_history("b", true).unwrap().len(), 1);
    }

    #[test]
    fn lists_sessions() {
        let store = MemoryHistoryStore::new();
        store.append("a", "user", "x", None).unwrap();
        store.append("b", "user", "y", None).unwrap();
        let mut sessions = store.sessions().unwrap();
        sessions.sort();
        assert_eq!(sessions, vec!["a", "b"]);
    }

    #[test]
    fn file_store_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.json");

        {
            let store = FileHistoryStore::open(&path);
            store.append("s1", "user", "saved", None).unwrap();
        }

        let reopened = FileHistoryStore::open(&path);
        let history = reopened.get_history("s1", true).unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].content, "saved");
    }

    #[test]
    fn file_store_tolerates_corrupt_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.json");
        fs::write(&path, "not json at all").unwrap();

        let store = FileHistoryStore::open(&path);
        assert!(store.get_history("s1", true).unwrap().is_empty());
        store.append("s1", "user", "recovered", None).unwrap();
        assert_eq!(store.get_history("s1", true).unwrap().len(), 1);
    }

    #[test]
    fn file_store_applies_session_cap() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileHistoryStore::open(dir.path().join("history.json"));
        for i in 0..(SESSION_MESSAGE_CAP + 2) {
            store
                .append("s1", "user", &format!("m{}", i), None)
                .unwrap();
        }
        let history = store.get_history("s1", false).unwrap();
        assert_eq!(history.len(), SESSION_MESSAGE_CAP);
        assert_eq!(history[0].content, "m2");
    }
}
