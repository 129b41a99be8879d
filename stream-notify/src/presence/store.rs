//! In-memory presence store.
//!
//! Maps a user to the last streaming session observed for them. The store is
//! both the dedup ledger for announcements and the liveness record read by the
//! [`Expirer`](super::Expirer).
//!
//! All access goes through a single mutex. Multi-step updates (sweep, lookup,
//! insert) should take the lock once via [`PresenceStore::lock`] so that two
//! events for the same user cannot interleave.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, MutexGuard};

/// One user's tracked streaming session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamSession {
    pub user_id: String,
    pub display_name: String,
    pub guild_id: String,
    pub voice_channel_id: String,
    /// Last time an event for this user was processed.
    pub last_seen: DateTime<Utc>,
}

/// Shared, lock-guarded presence map.
#[derive(Debug, Default)]
pub struct PresenceStore {
    sessions: Mutex<HashMap<String, StreamSession>>,
}

impl PresenceStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire the store lock for a multi-step update.
    pub fn lock(&self) -> PresenceGuard<'_> {
        PresenceGuard {
            sessions: self.sessions.lock(),
        }
    }

    pub fn get(&self, user_id: &str) -> Option<StreamSession> {
        self.lock().get(user_id).cloned()
    }

    pub fn put(&self, session: StreamSession) {
        self.lock().put(session);
    }

    /// Remove sessions last seen at or before `threshold`, returning the count.
    pub fn remove_if_older_than(&self, threshold: DateTime<Utc>) -> usize {
        self.lock().remove_if_older_than(threshold).len()
    }

    pub fn len(&self) -> usize {
        self.sessions.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.lock().is_empty()
    }
}

/// Exclusive view of the presence map, held for one classification unit.
pub struct PresenceGuard<'a> {
    sessions: MutexGuard<'a, HashMap<String, StreamSession>>,
}

impl PresenceGuard<'_> {
    pub fn get(&self, user_id: &str) -> Option<&StreamSession> {
        self.sessions.get(user_id)
    }

    pub fn contains(&self, user_id: &str) -> bool {
        self.sessions.contains_key(user_id)
    }

    /// Insert or overwrite the session for `session.user_id`.
    ///
    /// `last_seen` never moves backwards: an update carrying an older
    /// timestamp keeps the stored one.
    pub fn put(&mut self, mut session: StreamSession) {
        if let Some(existing) = self.sessions.get(&session.user_id)
            && existing.last_seen > session.last_seen
        {
            session.last_seen = existing.last_seen;
        }
        self.sessions.insert(session.user_id.clone(), session);
    }

    /// Remove every session whose `last_seen` is at or before `threshold`.
    ///
    /// Returns the removed sessions.
    pub fn remove_if_older_than(&mut self, threshold: DateTime<Utc>) -> Vec<StreamSession> {
        let stale: Vec<String> = self
            .sessions
            .iter()
            .filter(|(_, session)| session.last_seen <= threshold)
            .map(|(user_id, _)| user_id.clone())
            .collect();

        stale
            .into_iter()
            .filter_map(|user_id| self.sessions.remove(&user_id))
            .collect()
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
    use chrono::Duration;

    fn session(user_id: &str, name: &str, last_seen: DateTime<Utc>) -> StreamSession {
        StreamSession {
            user_id: user_id.to_string(),
            display_name: name.to_string(),
            guild_id: "g1".to_string(),
            voice_channel_id: "v1".to_string(),
            last_seen,
        }
    }

    #[test]
    fn test_put_overwrites_by_user_id() {
        let store = PresenceStore::new();
        let t0 = Utc::now();

        store.put(session("u1", "first", t0));
        store.put(session("u1", "second", t0 + Duration::seconds(5)));

        assert_eq!(store.len(), 1);
        let stored = store.get("u1").unwrap();
        assert_eq!(stored.display_name, "second");
        assert_eq!(stored.last_seen, t0 + Duration::seconds(5));
    }

    #[test]
    fn test_put_keeps_last_seen_monotonic() {
        let store = PresenceStore::new();
        let t0 = Utc::now();

        store.put(session("u1", "first", t0 + Duration::seconds(30)));
        store.put(session("u1", "late", t0));

        let stored = store.get("u1").unwrap();
        assert_eq!(stored.display_name, "late");
        assert_eq!(stored.last_seen, t0 + Duration::seconds(30));
    }

    #[test]
    fn test_get_missing_user() {
        let store = PresenceStore::new();
        assert!(store.get("nobody").is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn test_remove_if_older_than_is_inclusive() {
        let store = PresenceStore::new();
        let t0 = Utc::now();

        store.put(session("old", "old", t0 - Duration::seconds(1)));
        store.put(session("edge", "edge", t0));
        store.put(session("fresh", "fresh", t0 + Duration::seconds(1)));

        assert_eq!(store.remove_if_older_than(t0 - Duration::seconds(5)), 0);

        let mut removed: Vec<String> = store
            .lock()
            .remove_if_older_than(t0)
            .into_iter()
            .map(|s| s.user_id)
            .collect();
        removed.sort();

        assert_eq!(removed, vec!["edge".to_string(), "old".to_string()]);
        assert_eq!(store.len(), 1);
        assert!(store.get("fresh").is_some());
    }

    #[test]
    fn test_guard_sees_its_own_writes() {
        let store = PresenceStore::new();
        let t0 = Utc::now();

        let mut guard = store.lock();
        assert!(!guard.contains("u1"));
        guard.put(session("u1", "name", t0));
        assert!(guard.contains("u1"));
        assert_eq!(guard.get("u1").map(|s| s.last_seen), Some(t0));
        drop(guard);

        assert_eq!(store.len(), 1);
    }
}
