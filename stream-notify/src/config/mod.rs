//! Application configuration.
//!
//! Loaded from a TOML file; credentials and the ready message can be
//! overridden from the command line or environment.

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::notification::RetryPolicy;
use crate::notification::dispatcher::DEFAULT_MAX_IN_FLIGHT;
use crate::notification::retry::{DEFAULT_MAX_ATTEMPTS, DEFAULT_RETRY_INTERVAL};
use crate::presence::{DEFAULT_SESSION_TTL, GuildPolicy};
use crate::{Error, Result};

/// Default config file location.
pub const DEFAULT_CONFIG_PATH: &str = "./stream-notify.toml";

/// Default bot status text.
pub const DEFAULT_READY_MESSAGE: &str = "Discord Stream Notify";

/// Discord credentials.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Bot token.
    #[serde(default)]
    pub token: String,
    /// OAuth2 bearer token. Takes precedence over `token`.
    #[serde(default)]
    pub oauth2: String,
}

impl AuthConfig {
    /// Value for the `Authorization` header, if any credential is configured.
    pub fn authorization(&self) -> Option<String> {
        if !self.oauth2.is_empty() {
            Some(format!("Bearer {}", self.oauth2))
        } else if !self.token.is_empty() {
            Some(format!("Bot {}", self.token))
        } else {
            None
        }
    }

    /// Credential sent in the gateway Identify.
    pub fn gateway_token(&self) -> &str {
        if !self.oauth2.is_empty() {
            &self.oauth2
        } else {
            &self.token
        }
    }
}

/// Presence cache settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PresenceSettings {
    /// Seconds of inactivity before a tracked session is evicted.
    pub ttl_secs: u64,
}

impl Default for PresenceSettings {
    fn default() -> Self {
        Self {
            ttl_secs: DEFAULT_SESSION_TTL.as_secs(),
        }
    }
}

impl PresenceSettings {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

/// Notification delivery settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationSettings {
    /// Total delivery attempts per announcement.
    pub max_attempts: u32,
    /// Seconds to wait between attempts.
    pub retry_interval_secs: u64,
    /// Deliveries allowed to run at once.
    pub max_in_flight: usize,
}

impl Default for NotificationSettings {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            retry_interval_secs: DEFAULT_RETRY_INTERVAL.as_secs(),
            max_in_flight: DEFAULT_MAX_IN_FLIGHT,
        }
    }
}

impl NotificationSettings {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            interval: Duration::from_secs(self.retry_interval_secs),
        }
    }
}

/// Top-level configuration file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub auth: AuthConfig,
    /// Status text shown on the bot's profile.
    #[serde(default)]
    pub ready_message: Option<String>,
    #[serde(default)]
    pub presence: PresenceSettings,
    #[serde(default)]
    pub notification: NotificationSettings,
    /// Guild id → policy.
    #[serde(default)]
    pub guilds: HashMap<String, GuildPolicy>,
}

impl AppConfig {
    /// Read the config file at `path`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            Error::config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        let config = Self::from_toml(&raw)?;
        debug!(
            path = %path.display(),
            guilds = config.guilds.len(),
            "Loaded configuration"
        );
        Ok(config)
    }

    /// Parse without validating credentials.
    pub fn from_toml(raw: &str) -> Result<Self> {
        Ok(toml::from_str(raw)?)
    }

    /// Check the settings the bot cannot run without.
    pub fn validate(&self) -> Result<()> {
        if self.auth.authorization().is_none() {
            return Err(Error::config(
                "No Discord credentials configured (auth.token or auth.oauth2)",
            ));
        }
        if self.presence.ttl_secs == 0 {
            return Err(Error::config("presence.ttl_secs must be greater than 0"));
        }
        if self.notification.max_attempts == 0 {
            return Err(Error::config(
                "notification.max_attempts must be at least 1",
            ));
        }
        for (guild_id, policy) in &self.guilds {
            if policy.enabled && policy.channel.is_empty() {
                return Err(Error::config(format!(
                    "Guild {} is enabled but has no announcement channel",
                    guild_id
                )));
            }
        }
        Ok(())
    }

    pub fn ready_message(&self) -> &str {
        self.ready_message
            .as_deref()
            .filter(|msg| !msg.is_empty())
            .unwrap_or(DEFAULT_READY_MESSAGE)
    }
}
