//! Per-guild notification policy.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Notification settings for one guild.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuildPolicy {
    /// Whether go-live announcements are sent for this guild.
    #[serde(default)]
    pub enabled: bool,
    /// Dump every processed event for this guild.
    #[serde(default)]
    pub debug: bool,
    /// Announcement channel id.
    #[serde(default)]
    pub channel: String,
    /// Role mentioned in announcements.
    #[serde(default)]
    pub role: String,
}

/// Read-only lookup of guild policies.
pub trait GuildPolicyLookup: Send + Sync {
    fn policy(&self, guild_id: &str) -> Option<GuildPolicy>;
}

impl GuildPolicyLookup for HashMap<String, GuildPolicy> {
    fn policy(&self, guild_id: &str) -> Option<GuildPolicy> {
        self.get(guild_id).cloned()
    }
}
