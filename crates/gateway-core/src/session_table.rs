//! The process-wide table of live WebSocket proxy sessions (§3, §4.7).
//!
//! Grounded on the teacher's preference for `ahash` over the stdlib hasher
//! anywhere a hot-path map is keyed by an opaque id, and on `routing::registry`'s
//! `parking_lot`-free `std::sync::RwLock` style for a table that's read far
//! more often (idle sweep, invalidation broadcast) than written (one
//! insert/remove per connection lifecycle).

use std::collections::HashMap;
use std::hash::BuildHasherDefault;
use std::sync::RwLock;

use ahash::AHasher;

use crate::model::{CloseIntent, SharedSession};

type AHashMap<K, V> = HashMap<K, V, BuildHasherDefault<AHasher>>;

/// Tracks every live `WebSocketProxySession` by its `session_id`.
///
/// One instance is shared (behind an `Arc`) across the HTTP server's workers;
/// it is the join point between the per-connection pipeline task and
/// cross-cutting actions that only know a `user_id` or `auth_session_id`
/// (logout propagation) or nothing at all (shutdown).
#[derive(Default)]
pub struct SessionTable {
    sessions: RwLock<AHashMap<String, SharedSession>>,
}

impl SessionTable {
    pub fn new() -> Self {
        SessionTable {
            sessions: RwLock::new(AHashMap::default()),
        }
    }

    /// Called once the backend dial and client upgrade both succeed (§4.7).
    pub fn insert(&self, session: SharedSession) {
        let mut sessions = self.sessions.write().expect("session table lock poisoned");
        sessions.insert(session.session_id.clone(), session);
    }

    /// Called when the pipeline task tears the session down, regardless of
    /// which side closed first.
    pub fn remove(&self, session_id: &str) -> Option<SharedSession> {
        let mut sessions = self.sessions.write().expect("session table lock poisoned");
        sessions.remove(session_id)
    }

    pub fn get(&self, session_id: &str) -> Option<SharedSession> {
        let sessions = self.sessions.read().expect("session table lock poisoned");
        sessions.get(session_id).cloned()
    }

    pub fn len(&self) -> usize {
        self.sessions.read().expect("session table lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Sends `intent` to every session belonging to `user_id` or
    /// `auth_session_id`, returning how many were signalled. Used when an
    /// external collaborator reports a logout or session revocation (§4.7).
    pub fn invalidate(
        &self,
        user_id: Option<&str>,
        auth_session_id: Option<&str>,
        intent: CloseIntent,
    ) -> usize {
        let sessions = self.sessions.read().expect("session table lock poisoned");
        let mut signalled = 0;
        for session in sessions.values() {
            if session.matches_invalidation(user_id, auth_session_id) {
                if session.close_sender.send(intent.clone()).is_ok() {
                    signalled += 1;
                }
            }
        }
        signalled
    }

    /// Signals every live session to close; used during graceful shutdown.
    pub fn close_all(&self, intent: CloseIntent) -> usize {
        let sessions = self.sessions.read().expect("session table lock poisoned");
        let mut signalled = 0;
        for session in sessions.values() {
            if session.close_sender.send(intent.clone()).is_ok() {
                signalled += 1;
            }
        }
        signalled
    }

    /// Returns the session ids that have been idle longer than
    /// `idle_timeout_millis`, or are past their max-lifetime deadline, as of
    /// `now_millis`. The caller (an idle-sweep task) is responsible for
    /// actually closing them.
    pub fn expired_sessions(&self, now_millis: i64, idle_timeout_millis: i64) -> Vec<String> {
        let sessions = self.sessions.read().expect("session table lock poisoned");
        sessions
            .values()
            .filter(|s| s.idle_for_millis(now_millis) >= idle_timeout_millis || s.past_max_lifetime(now_millis))
            .map(|s| s.session_id.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicI64;
    use std::sync::Arc;
    use tokio::sync::mpsc::unbounded_channel;

    fn make_session(id: &str, user_id: Option<&str>) -> (SharedSession, tokio::sync::mpsc::UnboundedReceiver<CloseIntent>) {
        let (tx, rx) = unbounded_channel();
        let session = Arc::new(crate::model::WebSocketProxySession {
            session_id: id.to_string(),
            service_id: "orders".to_string(),
            auth_session_id: None,
            user_id: user_id.map(|s| s.to_string()),
            created_at_millis: 0,
            last_activity_millis: AtomicI64::new(0),
            max_lifetime_deadline_millis: i64::MAX,
            close_sender: tx,
        });
        (session, rx)
    }

    #[test]
    fn insert_get_remove_round_trip() {
        let table = SessionTable::new();
        let (session, _rx) = make_session("s1", None);
        table.insert(session.clone());
        assert_eq!(table.len(), 1);
        assert!(table.get("s1").is_some());
        let removed = table.remove("s1");
        assert!(removed.is_some());
        assert!(table.is_empty());
    }

    #[test]
    fn invalidate_signals_only_matching_sessions() {
        let table = SessionTable::new();
        let (alice, mut alice_rx) = make_session("s-alice", Some("alice"));
        let (bob, mut bob_rx) = make_session("s-bob", Some("bob"));
        table.insert(alice);
        table.insert(bob);

        let signalled = table.invalidate(Some("alice"), None, CloseIntent { code: 4001, reason: "logout".to_string() });
        assert_eq!(signalled, 1);
        assert!(alice_rx.try_recv().is_ok());
        assert!(bob_rx.try_recv().is_err());
    }

    #[test]
    fn expired_sessions_reports_past_idle_timeout() {
        let table = SessionTable::new();
        let (session, _rx) = make_session("s1", None);
        session.last_activity_millis.store(0, std::sync::atomic::Ordering::Relaxed);
        table.insert(session);

        let expired = table.expired_sessions(10_000, 5_000);
        assert_eq!(expired, vec!["s1".to_string()]);
    }

    #[test]
    fn close_all_signals_every_session() {
        let table = SessionTable::new();
        let (s1, mut rx1) = make_session("s1", None);
        let (s2, mut rx2) = make_session("s2", None);
        table.insert(s1);
        table.insert(s2);

        let signalled = table.close_all(CloseIntent { code: 1001, reason: "shutdown".to_string() });
        assert_eq!(signalled, 2);
        assert!(rx1.try_recv().is_ok());
        assert!(rx2.try_recv().is_ok());
    }
}
