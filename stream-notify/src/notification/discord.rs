//! Discord REST message sink.
//!
//! Posts announcements with the bot's credentials and resolves voice channel
//! names. Retries are left to the dispatcher.

use async_trait::async_trait;
use reqwest::Client;
use reqwest::header::AUTHORIZATION;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, trace};

use super::sink::MessageSink;
use crate::Result;
use crate::utils::http_client;

/// Discord REST API base.
pub const DISCORD_API_BASE: &str = "https://discord.com/api/v10";

#[derive(Debug, Deserialize)]
struct ChannelResponse {
    #[serde(default)]
    name: Option<String>,
}

/// [`MessageSink`] backed by the Discord REST API.
pub struct DiscordRestSink {
    client: Client,
    authorization: String,
    api_base: String,
}

impl DiscordRestSink {
    /// Create a sink that authenticates with `authorization`
    /// (`"Bot <token>"` or `"Bearer <token>"`).
    pub fn new(authorization: impl Into<String>) -> Result<Self> {
        Ok(Self {
            client: http_client::build_client(concat!(
                "DiscordBot (stream-notify, ",
                env!("CARGO_PKG_VERSION"),
                ")"
            ))?,
            authorization: authorization.into(),
            api_base: DISCORD_API_BASE.to_string(),
        })
    }

    /// Point the sink at a different API base (e.g. a proxy).
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    fn channel_url(&self, channel_id: &str) -> String {
        format!("{}/channels/{}", self.api_base, channel_id)
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(crate::Error::http(status.as_u16(), body))
    }
}

#[async_trait]
impl MessageSink for DiscordRestSink {
    async fn send(&self, channel_id: &str, text: &str) -> Result<()> {
        let url = format!("{}/messages", self.channel_url(channel_id));
        trace!(%url, "Posting channel message");

        let response = self
            .client
            .post(&url)
            .header(AUTHORIZATION, &self.authorization)
            .json(&json!({ "content": text }))
            .send()
            .await?;

        Self::check(response).await?;
        debug!(channel_id, "Channel message posted");
        Ok(())
    }

    async fn resolve_channel_name(&self, channel_id: &str) -> Result<String> {
        let response = self
            .client
            .get(self.channel_url(channel_id))
            .header(AUTHORIZATION, &self.authorization)
            .send()
            .await?;

        let channel: ChannelResponse = Self::check(response).await?.json().await?;
        channel
            .name
            .filter(|name| !name.is_empty())
            .ok_or_else(|| crate::Error::Other(format!("Channel {} has no name", channel_id)))
    }
}
