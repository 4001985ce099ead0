//! A live twin-socket WebSocket proxy session (§3, §4.7).

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc::UnboundedSender;

/// Owned by the session table; released when either socket closes (§3).
///
/// `last_activity` is updated by both the client→backend and backend→client
/// relay tasks on every frame, and read by the idle-timeout timer; it is an
/// `AtomicI64` (millis since epoch) rather than behind a lock because both
/// relay directions and the timer task touch it independently and only ever
/// need the latest value, never a consistent read-modify-write.
pub struct WebSocketProxySession {
    pub session_id: String,
    pub service_id: String,
    pub auth_session_id: Option<String>,
    pub user_id: Option<String>,
    pub created_at_millis: i64,
    pub last_activity_millis: AtomicI64,
    pub max_lifetime_deadline_millis: i64,
    /// Sends a close intent to this session's own task; used by cross-session
    /// actions (logout propagation, shutdown) that only hold a table snapshot.
    pub close_sender: UnboundedSender<CloseIntent>,
}

#[derive(Debug, Clone)]
pub struct CloseIntent {
    pub code: u16,
    pub reason: String,
}

impl WebSocketProxySession {
    pub fn touch(&self, now_millis: i64) {
        self.last_activity_millis.store(now_millis, Ordering::Relaxed);
    }

    pub fn idle_for_millis(&self, now_millis: i64) -> i64 {
        now_millis - self.last_activity_millis.load(Ordering::Relaxed)
    }

    pub fn past_max_lifetime(&self, now_millis: i64) -> bool {
        now_millis >= self.max_lifetime_deadline_millis
    }

    pub fn matches_invalidation(&self, user_id: Option<&str>, auth_session_id: Option<&str>) -> bool {
        let user_match = user_id.is_some() && self.user_id.as_deref() == user_id;
        let session_match = auth_session_id.is_some() && self.auth_session_id.as_deref() == auth_session_id;
        user_match || session_match
    }
}

pub type SharedSession = Arc<WebSocketProxySession>;
