//! Discord gateway connection.
//!
//! Maintains one websocket session: identify, heartbeat, and forward voice
//! state updates to a [`PresenceListener`]. Any loss of the session ends
//! [`GatewayClient::run`] with an error; reconnecting is left to the caller.

use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::time::{Instant, MissedTickBehavior, interval_at, timeout};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async, tungstenite::Message};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use super::payload::{self, GatewayPayload, Hello, Ready, VoiceStateUpdate, intents, opcode};
use crate::presence::PresenceListener;
use crate::utils::http_client::install_rustls_provider;
use crate::{Error, Result};

/// Default gateway endpoint (API v10, JSON encoding).
pub const DEFAULT_GATEWAY_URL: &str = "wss://gateway.discord.gg/?v=10&encoding=json";

/// How long to wait for the initial Hello.
const HELLO_TIMEOUT: Duration = Duration::from_secs(30);

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Gateway connection settings.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub url: String,
    /// Token sent in Identify.
    pub token: String,
    pub intents: u64,
    /// Playing-status text shown once connected.
    pub status_text: String,
}

impl GatewayConfig {
    pub fn new(token: impl Into<String>, status_text: impl Into<String>) -> Self {
        Self {
            url: DEFAULT_GATEWAY_URL.to_string(),
            token: token.into(),
            intents: intents::GUILDS | intents::GUILD_VOICE_STATES,
            status_text: status_text.into(),
        }
    }
}

/// What the read loop should do after handling one payload.
#[derive(Debug, PartialEq, Eq)]
enum Control {
    Continue,
    HeartbeatNow,
}

/// Session-scoped state.
#[derive(Debug, Default)]
struct SessionState {
    sequence: Option<u64>,
    awaiting_ack: bool,
}

pub struct GatewayClient {
    config: GatewayConfig,
    listener: Arc<dyn PresenceListener>,
}

impl GatewayClient {
    pub fn new(config: GatewayConfig, listener: Arc<dyn PresenceListener>) -> Self {
        Self { config, listener }
    }

    /// Run one gateway session until it fails or `cancel` fires.
    pub async fn run(&self, cancel: CancellationToken) -> Result<()> {
        install_rustls_provider();

        info!("Connecting to Discord gateway");
        let (mut ws, _) = connect_async(self.config.url.as_str()).await?;

        let hello = match timeout(HELLO_TIMEOUT, Self::read_hello(&mut ws)).await {
            Ok(hello) => hello?,
            Err(_) => return Err(Error::gateway("Timed out waiting for Hello")),
        };
        let heartbeat_every = Duration::from_millis(hello.heartbeat_interval.max(1));
        debug!(interval = ?heartbeat_every, "Received Hello");

        let identify = payload::identify(
            &self.config.token,
            self.config.intents,
            &self.config.status_text,
        );
        Self::send_json(&mut ws, &identify).await?;

        let mut heartbeat = interval_at(Instant::now() + heartbeat_every, heartbeat_every);
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut state = SessionState::default();

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("Gateway shutting down");
                    let _ = ws.close(None).await;
                    return Ok(());
                }

                _ = heartbeat.tick() => {
                    if state.awaiting_ack {
                        return Err(Error::gateway("Heartbeat was not acknowledged"));
                    }
                    Self::send_json(&mut ws, &payload::heartbeat(state.sequence)).await?;
                    state.awaiting_ack = true;
                    trace!(sequence = ?state.sequence, "Sent heartbeat");
                }

                msg = ws.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            let incoming: GatewayPayload = match serde_json::from_str(text.as_str()) {
                                Ok(incoming) => incoming,
                                Err(e) => {
                                    warn!(error = %e, "Discarding malformed gateway payload");
                                    continue;
                                }
                            };
                            if self.handle_payload(incoming, &mut state)? == Control::HeartbeatNow {
                                Self::send_json(&mut ws, &payload::heartbeat(state.sequence)).await?;
                            }
                        }
                        Some(Ok(Message::Close(frame))) => {
                            return Err(Error::gateway(format!("Connection closed: {:?}", frame)));
                        }
                        Some(Ok(_)) => {}
                        Some(Err(e)) => return Err(e.into()),
                        None => return Err(Error::gateway("Gateway stream ended")),
                    }
                }
            }
        }
    }

    async fn read_hello(ws: &mut WsStream) -> Result<Hello> {
        while let Some(msg) = ws.next().await {
            if let Message::Text(text) = msg? {
                let incoming: GatewayPayload = serde_json::from_str(text.as_str())?;
                if incoming.op == opcode::HELLO {
                    return Ok(serde_json::from_value(incoming.d)?);
                }
                warn!(op = incoming.op, "Unexpected payload before Hello");
            }
        }
        Err(Error::gateway("Connection closed before Hello"))
    }

    async fn send_json(ws: &mut WsStream, value: &Value) -> Result<()> {
        ws.send(Message::text(value.to_string())).await?;
        Ok(())
    }

    fn handle_payload(&self, payload: GatewayPayload, state: &mut SessionState) -> Result<Control> {
        match payload.op {
            opcode::DISPATCH => {
                if payload.s.is_some() {
                    state.sequence = payload.s;
                }
                if let Some(event_name) = payload.t.as_deref()
                    && let Err(e) = self.handle_dispatch(event_name, payload.d)
                {
                    warn!(event = event_name, error = %e, "Failed to decode dispatch");
                }
                Ok(Control::Continue)
            }
            opcode::HEARTBEAT => Ok(Control::HeartbeatNow),
            opcode::HEARTBEAT_ACK => {
                state.awaiting_ack = false;
                Ok(Control::Continue)
            }
            opcode::RECONNECT => Err(Error::gateway("Gateway requested reconnect")),
            opcode::INVALID_SESSION => Err(Error::gateway("Gateway session invalidated")),
            other => {
                trace!(op = other, "Ignoring gateway opcode");
                Ok(Control::Continue)
            }
        }
    }

    fn handle_dispatch(&self, event_name: &str, data: Value) -> Result<()> {
        match event_name {
            "READY" => {
                let ready: Ready = serde_json::from_value(data)?;
                info!(
                    user = %ready.user.username,
                    session_id = %ready.session_id,
                    "Connected to Discord gateway"
                );
            }
            "VOICE_STATE_UPDATE" => {
                let update: VoiceStateUpdate = serde_json::from_value(data)?;
                if let Some(event) = update.into_event() {
                    self.listener.on_presence_change(event);
                }
            }
            _ => trace!(event = event_name, "Ignoring dispatch"),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::presence::PresenceEvent;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct RecordingListener {
        events: Mutex<Vec<PresenceEvent>>,
    }

    impl PresenceListener for RecordingListener {
        fn on_presence_change(&self, event: PresenceEvent) {
            self.events.lock().push(event);
        }
    }

    fn client() -> (GatewayClient, Arc<RecordingListener>) {
        let listener = Arc::new(RecordingListener::default());
        let client = GatewayClient::new(GatewayConfig::new("token", "status"), listener.clone());
        (client, listener)
    }

    fn payload(raw: &str) -> GatewayPayload {
        serde_json::from_str(raw).unwrap()
    }

    #[test]
    fn test_voice_state_dispatch_reaches_listener() {
        let (client, listener) = client();
        let mut state = SessionState::default();

        let control = client
            .handle_payload(
                payload(
                    r#"{"op":0,"s":7,"t":"VOICE_STATE_UPDATE","d":{
                        "guild_id":"g1","channel_id":"v1","user_id":"u1",
                        "member":{"nick":"Foo","user":{"id":"u1","username":"bar"}},
                        "self_stream":true}}"#,
                ),
                &mut state,
            )
            .unwrap();

        assert_eq!(control, Control::Continue);
        assert_eq!(state.sequence, Some(7));
        let events = listener.events.lock();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].display_name(), "Foo");
    }

    #[test]
    fn test_other_dispatch_is_ignored() {
        let (client, listener) = client();
        let mut state = SessionState::default();

        client
            .handle_payload(
                payload(r#"{"op":0,"s":3,"t":"MESSAGE_CREATE","d":{"id":"1"}}"#),
                &mut state,
            )
            .unwrap();

        assert_eq!(state.sequence, Some(3));
        assert!(listener.events.lock().is_empty());
    }

    #[test]
    fn test_heartbeat_request_and_ack() {
        let (client, _) = client();
        let mut state = SessionState {
            sequence: None,
            awaiting_ack: true,
        };

        assert_eq!(
            client
                .handle_payload(payload(r#"{"op":1,"d":null}"#), &mut state)
                .unwrap(),
            Control::HeartbeatNow
        );
        client
            .handle_payload(payload(r#"{"op":11}"#), &mut state)
            .unwrap();
        assert!(!state.awaiting_ack);
    }

    #[test]
    fn test_malformed_dispatch_is_not_fatal() {
        let (client, listener) = client();
        let mut state = SessionState::default();

        let control = client
            .handle_payload(
                payload(r#"{"op":0,"s":9,"t":"VOICE_STATE_UPDATE","d":{"guild_id":"g1"}}"#),
                &mut state,
            )
            .unwrap();

        assert_eq!(control, Control::Continue);
        assert!(listener.events.lock().is_empty());
    }

    #[test]
    fn test_reconnect_and_invalid_session_are_fatal() {
        let (client, _) = client();
        let mut state = SessionState::default();

        assert!(matches!(
            client.handle_payload(payload(r#"{"op":7,"d":null}"#), &mut state),
            Err(Error::Gateway(_))
        ));
        assert!(matches!(
            client.handle_payload(payload(r#"{"op":9,"d":false}"#), &mut state),
            Err(Error::Gateway(_))
        ));
    }
}
