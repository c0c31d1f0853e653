//! Session-scoped conversation memory.
//!
//! [`Memory`] stores an ordered list of [`MemoryEntry`]s per session. A
//! `None` session id addresses the default session. Entries can be tagged
//! so that a generator can later drop corrective turns
//! ([`Memory::remove_by_tag`]) or roll back a whole attempt
//! ([`Memory::rewind_to_tag`]).
//!
//! Only one `forward` call may drive a session at a time; callers claim a
//! session with [`Memory::try_lock_session`] and release it by dropping the
//! returned [`SessionGuard`].

use parking_lot::{Mutex, RwLock};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::errors::MemoryError;
use crate::messages::ChatMessage;

// Conditional tracing - use no-op macros when tracing feature is disabled
#[cfg(feature = "tracing-integration")]
use tracing::debug;

#[cfg(not(feature = "tracing-integration"))]
macro_rules! debug { ($($arg:tt)*) => {} }

const DEFAULT_SESSION: &str = "__default__";

/// A message plus the tags applied to it.
#[derive(Debug, Clone, PartialEq)]
pub struct MemoryEntry {
    /// The stored message.
    pub message: ChatMessage,
    /// Tags applied to this entry.
    pub tags: Vec<String>,
}

impl MemoryEntry {
    /// Check whether the entry carries `tag`.
    #[must_use]
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }
}

#[derive(Debug, Default)]
struct Session {
    entries: Vec<MemoryEntry>,
    seen_tags: HashSet<String>,
}

/// In-process conversation history, partitioned by session id.
#[derive(Debug, Default)]
pub struct Memory {
    sessions: RwLock<HashMap<String, Session>>,
    busy: Arc<Mutex<HashSet<String>>>,
}

fn key(session_id: Option<&str>) -> String {
    session_id.unwrap_or(DEFAULT_SESSION).to_string()
}

impl Memory {
    /// Create an empty memory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a message.
    pub fn add(&self, message: ChatMessage, session_id: Option<&str>) {
        self.sessions
            .write()
            .entry(key(session_id))
            .or_default()
            .entries
            .push(MemoryEntry {
                message,
                tags: Vec::new(),
            });
    }

    /// Append several messages in order.
    pub fn extend(&self, messages: impl IntoIterator<Item = ChatMessage>, session_id: Option<&str>) {
        let mut sessions = self.sessions.write();
        let session = sessions.entry(key(session_id)).or_default();
        session
            .entries
            .extend(messages.into_iter().map(|message| MemoryEntry {
                message,
                tags: Vec::new(),
            }));
    }

    /// Tag the most recent entry. Does nothing on an empty session.
    pub fn add_tag(&self, tag: &str, session_id: Option<&str>) {
        let mut sessions = self.sessions.write();
        let session = sessions.entry(key(session_id)).or_default();
        if let Some(last) = session.entries.last_mut() {
            if !last.has_tag(tag) {
                last.tags.push(tag.to_string());
            }
            session.seen_tags.insert(tag.to_string());
        }
    }

    /// Remove every entry carrying `tag`, returning them in order.
    pub fn remove_by_tag(&self, tag: &str, session_id: Option<&str>) -> Vec<MemoryEntry> {
        let mut sessions = self.sessions.write();
        let Some(session) = sessions.get_mut(&key(session_id)) else {
            return Vec::new();
        };
        let (removed, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut session.entries)
            .into_iter()
            .partition(|e| e.has_tag(tag));
        session.entries = kept;
        if !removed.is_empty() {
            debug!(tag, count = removed.len(), "Removed tagged memory entries");
        }
        removed
    }

    /// Remove the first entry carrying `tag` and everything after it.
    ///
    /// Returns the removed entries. Fails only when the tag was never
    /// applied in this session; a tag whose entries are already gone
    /// yields an empty list.
    pub fn rewind_to_tag(
        &self,
        tag: &str,
        session_id: Option<&str>,
    ) -> Result<Vec<MemoryEntry>, MemoryError> {
        let mut sessions = self.sessions.write();
        let session = sessions.entry(key(session_id)).or_default();
        match session.entries.iter().position(|e| e.has_tag(tag)) {
            Some(idx) => {
                debug!(tag, index = idx, "Rewinding memory");
                Ok(session.entries.split_off(idx))
            }
            None if session.seen_tags.contains(tag) => Ok(Vec::new()),
            None => Err(MemoryError::TagNotFound(tag.to_string())),
        }
    }

    /// Messages of a session, oldest first.
    #[must_use]
    pub fn history(&self, session_id: Option<&str>) -> Vec<ChatMessage> {
        self.sessions
            .read()
            .get(&key(session_id))
            .map(|s| s.entries.iter().map(|e| e.message.clone()).collect())
            .unwrap_or_default()
    }

    /// Entries (with tags) of a session, oldest first.
    #[must_use]
    pub fn entries(&self, session_id: Option<&str>) -> Vec<MemoryEntry> {
        self.sessions
            .read()
            .get(&key(session_id))
            .map(|s| s.entries.clone())
            .unwrap_or_default()
    }

    /// Most recent entry of a session.
    #[must_use]
    pub fn last(&self, session_id: Option<&str>) -> Option<MemoryEntry> {
        self.sessions
            .read()
            .get(&key(session_id))
            .and_then(|s| s.entries.last().cloned())
    }

    /// Number of entries in a session.
    #[must_use]
    pub fn len(&self, session_id: Option<&str>) -> usize {
        self.sessions
            .read()
            .get(&key(session_id))
            .map_or(0, |s| s.entries.len())
    }

    /// Check if a session has no entries.
    #[must_use]
    pub fn is_empty(&self, session_id: Option<&str>) -> bool {
        self.len(session_id) == 0
    }

    /// Drop all entries and tags of a session.
    pub fn reset(&self, session_id: Option<&str>) {
        self.sessions.write().remove(&key(session_id));
    }

    /// Claim exclusive use of a session.
    ///
    /// Returns `None` if another caller holds the session.
    #[must_use]
    pub fn try_lock_session(&self, session_id: Option<&str>) -> Option<SessionGuard> {
        let k = key(session_id);
        let mut busy = self.busy.lock();
        if !busy.insert(k.clone()) {
            return None;
        }
        Some(SessionGuard {
            busy: Arc::clone(&self.busy),
            key: k,
        })
    }
}

/// Exclusive claim on a memory session, released on drop.
#[derive(Debug)]
pub struct SessionGuard {
    busy: Arc<Mutex<HashSet<String>>>,
    key: String,
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.busy.lock().remove(&self.key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::ChatRole;
    use pretty_assertions::assert_eq;

    fn texts(memory: &Memory, session: Option<&str>) -> Vec<String> {
        memory.history(session).iter().map(|m| m.text()).collect()
    }

    #[test]
    fn test_sessions_are_isolated() {
        let memory = Memory::new();
        memory.add(ChatMessage::user("a"), None);
        memory.add(ChatMessage::user("b"), Some("s1"));
        memory.add(ChatMessage::assistant("c"), Some("s1"));

        assert_eq!(texts(&memory, None), vec!["a"]);
        assert_eq!(texts(&memory, Some("s1")), vec!["b", "c"]);
        assert_eq!(memory.len(Some("s2")), 0);
    }

    #[test]
    fn test_remove_by_tag() {
        let memory = Memory::new();
        memory.add(ChatMessage::user("prompt"), None);
        memory.add(ChatMessage::assistant("bad"), None);
        memory.add_tag("correction", None);
        memory.add(ChatMessage::user("fix it"), None);
        memory.add_tag("correction", None);
        memory.add(ChatMessage::assistant("good"), None);

        let removed = memory.remove_by_tag("correction", None);
        assert_eq!(removed.len(), 2);
        assert_eq!(texts(&memory, None), vec!["prompt", "good"]);
    }

    #[test]
    fn test_rewind_to_tag() {
        let memory = Memory::new();
        memory.add(ChatMessage::system("sys"), None);
        memory.add(ChatMessage::user("q"), None);
        memory.add_tag("attempt", None);
        memory.add(ChatMessage::assistant("a"), None);

        let removed = memory.rewind_to_tag("attempt", None).unwrap();
        assert_eq!(removed.len(), 2);
        assert_eq!(removed[0].message.role, ChatRole::User);
        assert_eq!(texts(&memory, None), vec!["sys"]);

        // Seen before, nothing left to remove.
        assert!(memory.rewind_to_tag("attempt", None).unwrap().is_empty());
        assert_eq!(
            memory.rewind_to_tag("never", None),
            Err(MemoryError::TagNotFound("never".into()))
        );
    }

    #[test]
    fn test_add_tag_on_empty_session_is_noop() {
        let memory = Memory::new();
        memory.add_tag("x", None);
        assert!(memory.is_empty(None));
        assert!(memory.rewind_to_tag("x", None).is_err());
    }

    #[test]
    fn test_reset() {
        let memory = Memory::new();
        memory.extend([ChatMessage::user("a"), ChatMessage::user("b")], Some("s"));
        assert_eq!(memory.len(Some("s")), 2);
        memory.reset(Some("s"));
        assert!(memory.is_empty(Some("s")));
    }

    #[test]
    fn test_session_guard() {
        let memory = Memory::new();
        let guard = memory.try_lock_session(Some("s"));
        assert!(guard.is_some());
        assert!(memory.try_lock_session(Some("s")).is_none());
        assert!(memory.try_lock_session(Some("other")).is_some());
        drop(guard);
        assert!(memory.try_lock_session(Some("s")).is_some());
    }
}
