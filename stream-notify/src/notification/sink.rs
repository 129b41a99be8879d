//! Message delivery sink.

use async_trait::async_trait;

use crate::Result;

/// Where announcements are delivered.
#[async_trait]
pub trait MessageSink: Send + Sync {
    /// Post `text` to `channel_id`.
    async fn send(&self, channel_id: &str, text: &str) -> Result<()>;

    /// Look up the human-readable name of a channel.
    ///
    /// Only used best-effort; callers tolerate failures.
    async fn resolve_channel_name(&self, channel_id: &str) -> Result<String>;
}
