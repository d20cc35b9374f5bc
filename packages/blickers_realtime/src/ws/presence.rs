//! Presence tracker
//!
//! Process-wide online/offline state, reference-counted per user: a user
//! with sessions open in several rooms stays online until the last one
//! detaches. Created at startup and injected; no globals, no expiry.

use std::collections::HashMap;
use tokio::sync::RwLock;

#[derive(Debug, Default)]
struct PresenceEntry {
    active_sessions: usize,
    last_seen: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PresenceSnapshot {
    pub online: bool,
    /// Set only on the transition to offline.
    pub last_seen: Option<i64>,
}

#[derive(Default)]
pub struct PresenceTracker {
    users: RwLock<HashMap<String, PresenceEntry>>,
}

impl PresenceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a session coming up for `user_id`. Returns true when this
    /// was the offline→online transition.
    pub async fn connect(&self, user_id: &str) -> bool {
        let mut users = self.users.write().await;
        let entry = users.entry(user_id.to_string()).or_default();
        entry.active_sessions += 1;
        entry.active_sessions == 1
    }

    /// Record a session going away. Returns true when this was the last
    /// session (online→offline); only then is `last_seen` stamped.
    pub async fn disconnect(&self, user_id: &str) -> bool {
        let mut users = self.users.write().await;
        let Some(entry) = users.get_mut(user_id) else {
            return false;
        };
        entry.active_sessions = entry.active_sessions.saturating_sub(1);
        if entry.active_sessions == 0 {
            entry.last_seen = Some(chrono::Utc::now().timestamp());
            true
        } else {
            false
        }
    }

    pub async fn get(&self, user_id: &str) -> PresenceSnapshot {
        let users = self.users.read().await;
        match users.get(user_id) {
            Some(entry) => PresenceSnapshot {
                online: entry.active_sessions > 0,
                last_seen: entry.last_seen,
            },
            None => PresenceSnapshot {
                online: false,
                last_seen: None,
            },
        }
    }
}
