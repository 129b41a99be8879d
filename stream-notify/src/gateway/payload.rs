//! Discord gateway wire types.
//!
//! Only the opcodes and dispatch events the notifier needs are modelled.

use serde::Deserialize;
use serde_json::{Value, json};

use crate::presence::PresenceEvent;

pub mod opcode {
    pub const DISPATCH: u8 = 0;
    pub const HEARTBEAT: u8 = 1;
    pub const IDENTIFY: u8 = 2;
    pub const RECONNECT: u8 = 7;
    pub const INVALID_SESSION: u8 = 9;
    pub const HELLO: u8 = 10;
    pub const HEARTBEAT_ACK: u8 = 11;
}

pub mod intents {
    pub const GUILDS: u64 = 1 << 0;
    pub const GUILD_VOICE_STATES: u64 = 1 << 7;
}

/// Envelope of every gateway message.
#[derive(Debug, Clone, Deserialize)]
pub struct GatewayPayload {
    pub op: u8,
    #[serde(default)]
    pub d: Value,
    #[serde(default)]
    pub s: Option<u64>,
    #[serde(default)]
    pub t: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Hello {
    /// Milliseconds between heartbeats.
    pub heartbeat_interval: u64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct User {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub username: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Member {
    #[serde(default)]
    pub nick: Option<String>,
    #[serde(default)]
    pub user: Option<User>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Ready {
    pub user: User,
    #[serde(default)]
    pub session_id: String,
}

/// `VOICE_STATE_UPDATE` dispatch body.
#[derive(Debug, Clone, Deserialize)]
pub struct VoiceStateUpdate {
    #[serde(default)]
    pub guild_id: Option<String>,
    #[serde(default)]
    pub channel_id: Option<String>,
    pub user_id: String,
    #[serde(default)]
    pub member: Option<Member>,
    #[serde(default)]
    pub self_stream: bool,
}

impl VoiceStateUpdate {
    /// Convert to a presence event. Voice states outside a guild are dropped.
    pub fn into_event(self) -> Option<PresenceEvent> {
        let guild_id = self.guild_id?;
        let (nickname, username) = match self.member {
            Some(member) => (
                member.nick,
                member.user.map(|u| u.username).unwrap_or_default(),
            ),
            None => (None, String::new()),
        };
        let username = if username.is_empty() {
            self.user_id.clone()
        } else {
            username
        };

        Some(PresenceEvent {
            user_id: self.user_id,
            username,
            nickname,
            guild_id,
            channel_id: self.channel_id,
            self_stream: self.self_stream,
        })
    }
}

/// Build the op 2 Identify payload, advertising `status_text` as the bot's
/// current game.
pub fn identify(token: &str, intents: u64, status_text: &str) -> Value {
    json!({
        "op": opcode::IDENTIFY,
        "d": {
            "token": token,
            "intents": intents,
            "properties": {
                "os": std::env::consts::OS,
                "browser": "stream-notify",
                "device": "stream-notify",
            },
            "presence": {
                "since": null,
                "activities": [{ "name": status_text, "type": 0 }],
                "status": "online",
                "afk": false,
            },
        },
    })
}

/// Build an op 1 Heartbeat payload.
pub fn heartbeat(sequence: Option<u64>) -> Value {
    json!({ "op": opcode::HEARTBEAT, "d": sequence })
}
