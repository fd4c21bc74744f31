//! Session lifecycle: lazy creation, per-session locking, idle eviction.
//!
//! Sweeping happens at the start of every request instead of on a
//! background timer. Eviction only frees memory, so a slightly late sweep
//! never affects correctness.

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info};

use crate::conversation::ConversationStore;

/// One caller-identified conversation context.
///
/// The manager exclusively owns sessions; callers get an `Arc` for the
/// duration of a turn and take the inner mutex to serialize same-session
/// requests. Different sessions never contend on each other.
pub struct SessionHandle {
    pub id: String,
    pub store: Mutex<ConversationStore>,
    last_active: std::sync::Mutex<DateTime<Utc>>,
}

impl SessionHandle {
    fn new(id: String, max_history: usize, keep_recent: usize) -> Self {
        Self {
            id,
            store: Mutex::new(ConversationStore::new(max_history, keep_recent)),
            last_active: std::sync::Mutex::new(Utc::now()),
        }
    }

    pub fn last_active(&self) -> DateTime<Utc> {
        *self.last_active.lock().expect("last_active lock poisoned")
    }

    fn touch(&self, now: DateTime<Utc>) {
        *self.last_active.lock().expect("last_active lock poisoned") = now;
    }
}

/// Maps session ids to conversation stores, with TTL-based garbage
/// collection of idle sessions.
pub struct SessionManager {
    sessions: RwLock<HashMap<String, Arc<SessionHandle>>>,
    ttl: Duration,
    max_history: usize,
    keep_recent: usize,
}

impl SessionManager {
    pub fn new(ttl_secs: u64, max_history: usize, keep_recent: usize) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            ttl: Duration::seconds(ttl_secs as i64),
            max_history,
            keep_recent,
        }
    }

    /// Fetch a session, creating it lazily on first sight of an id.
    /// Updates `last_active`. The outer map lock is held only for the
    /// lookup/insert, never across a conversational turn.
    pub async fn get_or_create(&self, id: &str) -> Arc<SessionHandle> {
        let now = Utc::now();

        if let Some(session) = self.sessions.read().await.get(id) {
            session.touch(now);
            return Arc::clone(session);
        }

        let mut sessions = self.sessions.write().await;
        // Re-check: another task may have created it between the locks.
        if let Some(session) = sessions.get(id) {
            session.touch(now);
            return Arc::clone(session);
        }

        debug!(session_id = id, "creating session");
        let session = Arc::new(SessionHandle::new(
            id.to_string(),
            self.max_history,
            self.keep_recent,
        ));
        sessions.insert(id.to_string(), Arc::clone(&session));
        session
    }

    /// Remove sessions idle beyond the TTL. O(active sessions).
    pub async fn sweep(&self, now: DateTime<Utc>) {
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, s| now - s.last_active() <= self.ttl);
        let evicted = before - sessions.len();
        if evicted > 0 {
            info!(evicted, remaining = sessions.len(), "swept idle sessions");
        }
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversation::Role;

    #[tokio::test]
    async fn test_lazy_creation_and_reuse() {
        let mgr = SessionManager::new(60, 20, 8);
        let a = mgr.get_or_create("a").await;
        a.store.lock().await.append(Role::User, "hello");

        let a_again = mgr.get_or_create("a").await;
        assert_eq!(a_again.store.lock().await.messages().len(), 1);
        assert_eq!(mgr.len().await, 1);
    }

    #[tokio::test]
    async fn test_distinct_sessions_are_independent() {
        let mgr = SessionManager::new(60, 20, 8);
        let a = mgr.get_or_create("a").await;
        let b = mgr.get_or_create("b").await;
        a.store.lock().await.append(Role::User, "for a");
        assert!(b.store.lock().await.messages().is_empty());
        assert_eq!(mgr.len().await, 2);
    }

    #[tokio::test]
    async fn test_sweep_evicts_only_expired() {
        let mgr = SessionManager::new(3600, 20, 8);
        let stale = mgr.get_or_create("stale").await;
        mgr.get_or_create("fresh").await;

        // Age one session past the TTL
        stale.touch(Utc::now() - Duration::seconds(7200));
        mgr.sweep(Utc::now()).await;

        assert_eq!(mgr.len().await, 1);
        let sessions = mgr.sessions.read().await;
        assert!(sessions.contains_key("fresh"));
        assert!(!sessions.contains_key("stale"));
    }

    #[tokio::test]
    async fn test_get_or_create_refreshes_ttl() {
        let mgr = SessionManager::new(3600, 20, 8);
        let s = mgr.get_or_create("a").await;
        s.touch(Utc::now() - Duration::seconds(7200));

        // A new request on the same id keeps it alive
        mgr.get_or_create("a").await;
        mgr.sweep(Utc::now()).await;
        assert_eq!(mgr.len().await, 1);
    }

    #[tokio::test]
    async fn test_concurrent_creation_same_id() {
        let mgr = Arc::new(SessionManager::new(60, 20, 8));
        let mut handles = Vec::new();
        for _ in 0..8 {
            let mgr = Arc::clone(&mgr);
            handles.push(tokio::spawn(
                async move { mgr.get_or_create("same").await.id.clone() },
            ));
        }
        for h in handles {
            assert_eq!(h.await.unwrap(), "same");
        }
        assert_eq!(mgr.len().await, 1);
    }
}
