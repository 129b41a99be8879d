//! Presence-change events consumed by the stream notifier.
//!
//! These are produced by the gateway client (or by tests) and carry only the
//! fields the session bookkeeping needs.

/// A user's voice state changed inside a guild.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PresenceEvent {
    pub user_id: String,
    /// Global account username.
    pub username: String,
    /// Guild-specific nickname, if the member has one.
    pub nickname: Option<String>,
    pub guild_id: String,
    /// Voice channel the user is in. Missing on some disconnects.
    pub channel_id: Option<String>,
    /// Whether the user is currently streaming ("Go Live").
    pub self_stream: bool,
}

impl PresenceEvent {
    /// Best available human-readable name.
    ///
    /// A non-empty guild nickname wins over the global username.
    pub fn display_name(&self) -> &str {
        match self.nickname.as_deref() {
            Some(nick) if !nick.is_empty() => nick,
            _ => &self.username,
        }
    }

    /// The voice channel id, treating an empty string as absent.
    pub fn voice_channel(&self) -> Option<&str> {
        self.channel_id.as_deref().filter(|id| !id.is_empty())
    }
}

/// Entry point the event source drives.
///
/// Implementations must tolerate concurrent calls and repeated or
/// out-of-order events.
pub trait PresenceListener: Send + Sync {
    fn on_presence_change(&self, event: PresenceEvent);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(nickname: Option<&str>) -> PresenceEvent {
        PresenceEvent {
            user_id: "u1".to_string(),
            username: "bar".to_string(),
            nickname: nickname.map(str::to_string),
            guild_id: "g1".to_string(),
            channel_id: Some("c1".to_string()),
            self_stream: true,
        }
    }

    #[test]
    fn test_display_name_prefers_nickname() {
        assert_eq!(event(Some("Foo")).display_name(), "Foo");
    }

    #[test]
    fn test_display_name_falls_back_to_username() {
        assert_eq!(event(Some("")).display_name(), "bar");
        assert_eq!(event(None).display_name(), "bar");
    }

    #[test]
    fn test_empty_channel_is_absent() {
        let mut ev = event(None);
        ev.channel_id = Some(String::new());
        assert_eq!(ev.voice_channel(), None);

        ev.channel_id = None;
        assert_eq!(ev.voice_channel(), None);

        ev.channel_id = Some("c9".to_string());
        assert_eq!(ev.voice_channel(), Some("c9"));
    }
}
