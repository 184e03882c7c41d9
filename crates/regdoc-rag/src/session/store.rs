//! Per-conversation memory for concurrent requests

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::memory::ConversationMemory;

/// Shared handle to one conversation's memory
pub type SessionHandle = Arc<Mutex<ConversationMemory>>;

struct SessionEntry {
    memory: SessionHandle,
    /// Value of the store's clock at the last access
    last_used: AtomicU64,
}

/// Conversation memories keyed by session id.
///
/// Each session has its own lock, so requests within a session run one at a
/// time while different sessions proceed independently. At most `max_sessions`
/// are kept; opening one more evicts the least recently used.
pub struct SessionStore {
    sessions: DashMap<String, SessionEntry>,
    clock: AtomicU64,
    max_turns: usize,
    max_sessions: usize,
}

impl SessionStore {
    pub fn new(max_turns: usize, max_sessions: usize) -> Self {
        Self {
            sessions: DashMap::new(),
            clock: AtomicU64::new(0),
            max_turns,
            max_sessions: max_sessions.max(1),
        }
    }

    /// Fresh random session id
    pub fn new_session_id() -> String {
        Uuid::new_v4().to_string()
    }

    fn tick(&self) -> u64 {
        self.clock.fetch_add(1, Ordering::Relaxed)
    }

    /// Memory for `id`, created empty on first use
    pub fn get_or_create(&self, id: &str) -> SessionHandle {
        let now = self.tick();
        if let Some(entry) = self.sessions.get(id) {
            entry.last_used.store(now, Ordering::Relaxed);
            return entry.memory.clone();
        }

        let memory = self
            .sessions
            .entry(id.to_string())
            .or_insert_with(|| SessionEntry {
                memory: Arc::new(Mutex::new(ConversationMemory::new(self.max_turns))),
                last_used: AtomicU64::new(now),
            })
            .memory
            .clone();

        self.evict_excess(id);
        memory
    }

    /// Drop least recently used sessions other than `keep` until within bounds
    fn evict_excess(&self, keep: &str) {
        while self.sessions.len() > self.max_sessions {
            let oldest = self
                .sessions
                .iter()
                .filter(|entry| entry.key() != keep)
                .min_by_key(|entry| entry.last_used.load(Ordering::Relaxed))
                .map(|entry| entry.key().clone());

            match oldest {
                Some(id) => {
                    self.sessions.remove(&id);
                    tracing::debug!("Evicted idle session {}", id);
                }
                None => break,
            }
        }
    }

    /// Forget a session and its history; returns false if the session is unknown
    pub fn remove(&self, id: &str) -> bool {
        self.sessions.remove(id).is_some()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.sessions.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_sessions_are_isolated() {
        let store = SessionStore::new(100, 10);
        store.get_or_create("alice").lock().await.append("q1", "a1");
        store.get_or_create("bob").lock().await.append("q2", "a2");

        let alice = store.get_or_create("alice");
        let alice = alice.lock().await;
        assert_eq!(alice.len(), 1);
        assert_eq!(alice.recent(5)[0].question, "q1");
        assert_eq!(store.len(), 2);
    }

    #[tokio::test]
    async fn test_same_id_shares_memory() {
        let store = SessionStore::new(100, 10);
        let first = store.get_or_create("s");
        let second = store.get_or_create("s");
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[tokio::test]
    async fn test_remove_forgets_history() {
        let store = SessionStore::new(100, 10);
        store.get_or_create("s").lock().await.append("q", "a");

        assert!(store.remove("s"));
        assert!(!store.remove("s"));
        assert!(store.is_empty());
        assert!(store.get_or_create("s").lock().await.is_empty());
    }

    #[test]
    fn test_store_never_exceeds_max_sessions() {
        let store = SessionStore::new(100, 3);
        for _ in 0..500 {
            store.get_or_create(&SessionStore::new_session_id());
        }
        assert_eq!(store.len(), 3);
    }

    #[test]
    fn test_least_recently_used_is_evicted() {
        let store = SessionStore::new(100, 2);
        store.get_or_create("a");
        store.get_or_create("b");
        store.get_or_create("a");
        store.get_or_create("c");

        assert!(store.contains("a"));
        assert!(!store.contains("b"));
        assert!(store.contains("c"));
    }

    #[test]
    fn test_session_ids_are_unique() {
        assert_ne!(SessionStore::new_session_id(), SessionStore::new_session_id());
    }
}
