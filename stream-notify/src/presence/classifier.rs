//! Go-live session classification.
//!
//! Decides whether a presence-change event starts a new streaming session,
//! continues a known one, or should be ignored.

use chrono::{DateTime, Utc};
use tracing::{debug, info, trace};

use super::events::PresenceEvent;
use super::policy::GuildPolicy;
use super::store::{PresenceGuard, StreamSession};

/// Why an event was dropped before classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterReason {
    /// No policy for the guild, or the policy is disabled.
    GuildDisabled,
    /// The user is not streaming.
    NotStreaming,
    /// The event has no voice channel (e.g. client force-quit).
    MissingChannel,
}

/// Outcome of classifying one event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    Ignored(FilterReason),
    /// Known session refreshed; no announcement.
    Updated(StreamSession),
    /// First sighting since the last expiry; announce it.
    New(StreamSession),
}

impl Classification {
    pub fn is_new(&self) -> bool {
        matches!(self, Self::New(_))
    }
}

/// Stateless classifier over a locked [`PresenceStore`](super::PresenceStore).
#[derive(Debug, Clone, Copy, Default)]
pub struct SessionClassifier;

impl SessionClassifier {
    pub fn new() -> Self {
        Self
    }

    /// Apply the event filters in order, short-circuiting on the first match.
    pub fn filter(
        &self,
        event: &PresenceEvent,
        policy: Option<&GuildPolicy>,
    ) -> Option<FilterReason> {
        let reason = if !policy.is_some_and(|p| p.enabled) {
            FilterReason::GuildDisabled
        } else if !event.self_stream {
            FilterReason::NotStreaming
        } else if event.voice_channel().is_none() {
            FilterReason::MissingChannel
        } else {
            return None;
        };

        trace!(
            user_id = %event.user_id,
            guild_id = %event.guild_id,
            ?reason,
            "Ignoring presence event"
        );
        Some(reason)
    }

    /// Classify `event` and record it in the store.
    ///
    /// The caller must hold the store lock for the whole call so the lookup and
    /// the write are atomic with respect to other events.
    pub fn classify(
        &self,
        event: &PresenceEvent,
        policy: Option<&GuildPolicy>,
        sessions: &mut PresenceGuard<'_>,
        now: DateTime<Utc>,
    ) -> Classification {
        if let Some(reason) = self.filter(event, policy) {
            return Classification::Ignored(reason);
        }

        let session = StreamSession {
            user_id: event.user_id.clone(),
            display_name: event.display_name().to_string(),
            guild_id: event.guild_id.clone(),
            voice_channel_id: event.voice_channel().unwrap_or_default().to_string(),
            last_seen: now,
        };

        if sessions.contains(&session.user_id) {
            debug!(
                user_id = %session.user_id,
                display_name = %session.display_name,
                "Updating known user in presence cache"
            );
            sessions.put(session.clone());
            Classification::Updated(session)
        } else {
            info!(
                user_id = %session.user_id,
                display_name = %session.display_name,
                "Adding unknown user to presence cache with notification"
            );
            sessions.put(session.clone());
            Classification::New(session)
        }
    }
}
