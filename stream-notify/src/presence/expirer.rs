//! Stale session eviction.
//!
//! The sweep is pull-based: it only runs when an accepted event arrives. During
//! quiet periods entries can outlive the TTL until the next one.

use chrono::{DateTime, Utc};
use tracing::info;

use super::store::PresenceGuard;

/// Default inactivity window (1 hour).
pub const DEFAULT_SESSION_TTL: std::time::Duration = std::time::Duration::from_secs(3600);

/// Removes sessions that have not been seen within the TTL.
#[derive(Debug, Clone)]
pub struct Expirer {
    ttl: chrono::Duration,
}

impl Expirer {
    pub fn new(ttl: std::time::Duration) -> Self {
        let ttl = chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::MAX);
        Self { ttl }
    }

    /// Sessions last seen at or before this instant are stale.
    pub fn threshold(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now.checked_sub_signed(self.ttl)
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }

    /// Evict stale sessions. Returns how many were removed.
    pub fn sweep(&self, sessions: &mut PresenceGuard<'_>, now: DateTime<Utc>) -> usize {
        let removed = sessions.remove_if_older_than(self.threshold(now));
        for session in &removed {
            info!(
                user_id = %session.user_id,
                display_name = %session.display_name,
                last_seen = %session.last_seen,
                "Removing inactive user from presence cache"
            );
        }
        removed.len()
    }
}

impl Default for Expirer {
    fn default() -> Self {
        Self::new(DEFAULT_SESSION_TTL)
    }
}
