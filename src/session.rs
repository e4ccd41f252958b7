// vermon: User <-> session cookie tracking with TTL expiry

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use crate::table;

/// Cookie carrying the shop session id between client and downstream.
pub const SESSION_COOKIE: &str = "shop_session-id";

#[derive(Debug, Clone)]
pub struct SessionEntry {
    pub session_id: String,
    pub created: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub last_change: DateTime<Utc>,
}

/// Bijective user <-> session map.
///
/// `last_seen` moves on every interaction; `last_change` only when the
/// session id actually differs. Idle entries expire after the TTL.
pub struct SessionTracker {
    by_user: HashMap<String, SessionEntry>,
    by_session: HashMap<String, String>,
    ttl: Duration,
}

impl SessionTracker {
    pub fn new(ttl: Duration) -> Self {
        Self {
            by_user: HashMap::new(),
            by_session: HashMap::new(),
            ttl,
        }
    }

    /// Bind `user` to `session_id`, replacing any previous binding on either
    /// side so the map stays a bijection.
    pub fn bind(&mut self, user: &str, session_id: &str) {
        let now = Utc::now();

        if let Some(previous_user) = self.by_session.get(session_id) {
            if previous_user != user {
                let previous_user = previous_user.clone();
                self.by_user.remove(&previous_user);
                self.by_session.remove(session_id);
            }
        }

        match self.by_user.get_mut(user) {
            Some(entry) if entry.session_id == session_id => {
                entry.last_seen = now;
            }
            Some(entry) => {
                debug!(user, old = %entry.session_id, new = session_id, "session id changed");
                self.by_session.remove(&entry.session_id);
                entry.session_id = session_id.to_string();
                entry.last_seen = now;
                entry.last_change = now;
                self.by_session.insert(session_id.to_string(), user.to_string());
            }
            None => {
                self.by_user.insert(
                    user.to_string(),
                    SessionEntry {
                        session_id: session_id.to_string(),
                        created: now,
                        last_seen: now,
                        last_change: now,
                    },
                );
                self.by_session.insert(session_id.to_string(), user.to_string());
            }
        }
    }

    /// Refresh `last_seen` for a user we saw without a new cookie.
    pub fn touch(&mut self, user: &str) {
        if let Some(entry) = self.by_user.get_mut(user) {
            entry.last_seen = Utc::now();
        }
    }

    pub fn session_for(&self, user: &str) -> Option<String> {
        self.by_user.get(user).map(|e| e.session_id.clone())
    }

    pub fn user_for(&self, session_id: &str) -> Option<String> {
        self.by_session.get(session_id).cloned()
    }

    pub fn len(&self) -> usize {
        self.by_user.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_user.is_empty()
    }

    /// Drop users idle longer than the TTL. Returns the removed user names.
    pub fn sweep(&mut self) -> Vec<String> {
        let now = Utc::now();
        let ttl = chrono::Duration::from_std(self.ttl).unwrap_or(chrono::Duration::seconds(60));
        let expired: Vec<String> = self
            .by_user
            .iter()
            .filter(|(_, entry)| now - entry.last_seen > ttl)
            .map(|(user, _)| user.clone())
            .collect();
        for user in &expired {
            if let Some(entry) = self.by_user.remove(user) {
                self.by_session.remove(&entry.session_id);
            }
        }
        expired
    }

    /// Grid table of the live sessions.
    pub fn render_table(&self) -> String {
        let mut rows: Vec<Vec<String>> = self
            .by_user
            .iter()
            .map(|(user, entry)| {
                vec![
                    user.clone(),
                    entry.session_id.clone(),
                    entry.created.format("%H:%M:%S").to_string(),
                    entry.last_seen.format("%H:%M:%S").to_string(),
                    entry.last_change.format("%H:%M:%S").to_string(),
                ]
            })
            .collect();
        rows.sort();
        table::grid(
            &["User", "Session", "Created", "Last seen", "Last change"],
            &rows,
        )
    }
}

/// Periodically expire idle sessions and dump the live table.
pub fn spawn_sweeper(
    core: std::sync::Arc<crate::core::Core>,
    interval: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(interval);
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tick.tick().await;
            let (removed, table) = {
                let mut tracker = core.sessions.lock();
                (tracker.sweep(), tracker.render_table())
            };
            if !removed.is_empty() {
                info!(?removed, "expired idle sessions");
            }
            info!("live sessions:\n{table}");
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tracker() -> SessionTracker {
        SessionTracker::new(Duration::from_secs(60))
    }

    #[test]
    fn bind_creates_bijection() {
        let mut t = tracker();
        t.bind("alice", "s1");
        assert_eq!(t.session_for("alice").as_deref(), Some("s1"));
        assert_eq!(t.user_for("s1").as_deref(), Some("alice"));
        assert_eq!(t.len(), 1);
    }

    #[test]
    fn rebinding_user_replaces_old_session() {
        let mut t = tracker();
        t.bind("alice", "s1");
        t.bind("alice", "s2");
        assert_eq!(t.session_for("alice").as_deref(), Some("s2"));
        assert_eq!(t.user_for("s2").as_deref(), Some("alice"));
        assert!(t.user_for("s1").is_none());
        assert_eq!(t.len(), 1);
    }

    #[test]
    fn stealing_a_session_unbinds_previous_user() {
        let mut t = tracker();
        t.bind("alice", "s1");
        t.bind("bob", "s1");
        assert_eq!(t.user_for("s1").as_deref(), Some("bob"));
        assert!(t.session_for("alice").is_none());
        assert_eq!(t.len(), 1);
    }

    #[test]
    fn last_change_moves_only_when_id_differs() {
        let mut t = tracker();
        t.bind("alice", "s1");
        let first_change = t.by_user["alice"].last_change;

        t.bind("alice", "s1");
        assert_eq!(t.by_user["alice"].last_change, first_change);
        assert!(t.by_user["alice"].last_seen >= first_change);

        t.bind("alice", "s2");
        assert!(t.by_user["alice"].last_change >= first_change);
        assert_ne!(t.by_user["alice"].session_id, "s1");
    }

    #[test]
    fn sweep_removes_idle_users_both_ways() {
        let mut t = SessionTracker::new(Duration::from_secs(0));
        t.bind("alice", "s1");
        std::thread::sleep(std::time::Duration::from_millis(10));
        let removed = t.sweep();
        assert_eq!(removed, vec!["alice".to_string()]);
        assert!(t.is_empty());
        assert!(t.user_for("s1").is_none());
    }

    #[test]
    fn touch_keeps_user_alive() {
        let mut t = SessionTracker::new(Duration::from_secs(60));
        t.bind("alice", "s1");
        t.touch("alice");
        assert!(t.sweep().is_empty());
    }
}
