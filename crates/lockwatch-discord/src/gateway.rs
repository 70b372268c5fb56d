//! Discord Gateway listener for "lock all" button clicks.
//!
//! Keeps one WebSocket session open, heartbeating at the interval the
//! server announces, and reconnects with exponential backoff (5 s up to
//! 60 s) whenever the session drops. Every matching click is acknowledged
//! with a deferred private response and forwarded as an [`ActionEvent`].
//!
//! # Panic-Free Guarantees
//!
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - Undecodable frames are skipped, never propagated

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use lockwatch_core::{ActionEvent, MessageHandle, NotifierError};
use serde::Deserialize;
use serde_json::{json, Value};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval, Interval, MissedTickBehavior};
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use crate::render;
use crate::rest::RestClient;
use crate::LOCK_ALL_CUSTOM_ID;

// ============================================================================
// Constants
// ============================================================================

const INITIAL_BACKOFF: Duration = Duration::from_secs(5);
const MAX_BACKOFF: Duration = Duration::from_secs(60);

/// Heartbeat interval used until the server's Hello arrives.
const DEFAULT_HEARTBEAT: Duration = Duration::from_millis(41_250);

/// Interactions arrive without privileged intents; GUILDS keeps the
/// session valid.
const INTENTS: u64 = 1;

const EVENT_BUFFER: usize = 32;

/// Close code Discord sends when the token is rejected.
const CLOSE_AUTHENTICATION_FAILED: u16 = 4004;

mod op {
    pub const DISPATCH: u8 = 0;
    pub const HEARTBEAT: u8 = 1;
    pub const IDENTIFY: u8 = 2;
    pub const RECONNECT: u8 = 7;
    pub const INVALID_SESSION: u8 = 9;
    pub const HELLO: u8 = 10;
    pub const HEARTBEAT_ACK: u8 = 11;
}

/// Interaction type for message components.
const MESSAGE_COMPONENT: u8 = 3;

// ============================================================================
// Errors
// ============================================================================

/// Errors that end one gateway session, or the listener itself.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Fetching the gateway URL failed.
    #[error("failed to resolve gateway URL: {0}")]
    Resolve(String),

    /// The WebSocket connection failed or broke.
    #[error("websocket error: {0}")]
    WebSocket(String),

    /// The server closed the session.
    #[error("gateway closed the session")]
    Closed,

    /// The bot token was rejected, by REST (401) or by the Gateway (close
    /// code 4004). Not retried.
    #[error("gateway rejected the bot token")]
    AuthenticationFailed,
}

// ============================================================================
// Wire types
// ============================================================================

#[derive(Debug, Deserialize)]
struct Payload {
    op: u8,
    #[serde(default)]
    d: Value,
    s: Option<u64>,
    t: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GatewayBot {
    url: String,
}

#[derive(Debug, Deserialize)]
struct RawInteraction {
    id: String,
    #[serde(rename = "type")]
    kind: u8,
    token: String,
    application_id: Option<String>,
    channel_id: Option<String>,
    data: Option<RawComponentData>,
    message: Option<RawMessage>,
    member: Option<RawMember>,
    user: Option<RawUser>,
}

#[derive(Debug, Deserialize)]
struct RawComponentData {
    custom_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawMessage {
    id: String,
    channel_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawMember {
    user: Option<RawUser>,
}

#[derive(Debug, Deserialize)]
struct RawUser {
    username: String,
}

/// A "lock all" click decoded from `INTERACTION_CREATE`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Interaction {
    pub id: String,
    pub token: String,
    pub application_id: Option<String>,
    pub message: MessageHandle,
    pub user: Option<String>,
}

impl Interaction {
    /// Converts the click into the event handed to the dispatcher.
    pub fn into_event(self) -> ActionEvent {
        ActionEvent {
            correlation_id: self.id,
            message: self.message,
            reply_token: Some(self.token),
            actor: self.user,
        }
    }
}

/// Decodes an `INTERACTION_CREATE` payload.
///
/// Returns `None` for anything other than a click on the "lock all" button.
pub fn parse_interaction(d: &Value) -> Option<Interaction> {
    let raw: RawInteraction = match serde_json::from_value(d.clone()) {
        Ok(raw) => raw,
        Err(e) => {
            debug!(error = %e, "Undecodable interaction payload");
            return None;
        }
    };

    if raw.kind != MESSAGE_COMPONENT {
        return None;
    }
    if raw.data.as_ref().and_then(|d| d.custom_id.as_deref()) != Some(LOCK_ALL_CUSTOM_ID) {
        return None;
    }

    let message = raw.message?;
    let channel_id = message.channel_id.or(raw.channel_id)?;
    let user = raw
        .member
        .and_then(|m| m.user)
        .or(raw.user)
        .map(|u| u.username);

    Some(Interaction {
        id: raw.id,
        token: raw.token,
        application_id: raw.application_id,
        message: MessageHandle {
            channel_id,
            message_id: message.id,
        },
        user,
    })
}

// ============================================================================
// Gateway
// ============================================================================

enum SessionEnd {
    Reconnect,
    Cancelled,
    ReceiverClosed,
}

/// Gateway listener; see [`crate::DiscordNotifier::gateway`].
pub struct Gateway {
    rest: RestClient,
    bot_token: String,
    application_id: Arc<OnceLock<String>>,
}

impl Gateway {
    pub(crate) fn new(
        rest: RestClient,
        bot_token: String,
        application_id: Arc<OnceLock<String>>,
    ) -> Self {
        Self {
            rest,
            bot_token,
            application_id,
        }
    }

    /// Spawns the listener and returns the stream of click events.
    ///
    /// The task stops when `cancel_token` fires, the receiver is dropped,
    /// or the token is rejected. Only the last case yields an error.
    pub fn spawn(
        self,
        cancel_token: CancellationToken,
    ) -> (mpsc::Receiver<ActionEvent>, JoinHandle<Result<(), GatewayError>>) {
        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        let handle = tokio::spawn(self.run(tx, cancel_token));
        (rx, handle)
    }

    async fn run(
        self,
        tx: mpsc::Sender<ActionEvent>,
        cancel_token: CancellationToken,
    ) -> Result<(), GatewayError> {
        let mut backoff = INITIAL_BACKOFF;

        loop {
            info!("Discord Gateway connecting");

            match self.session(&tx, &cancel_token, &mut backoff).await {
                Ok(SessionEnd::Cancelled) => {
                    info!("Discord Gateway shutting down");
                    return Ok(());
                }
                Ok(SessionEnd::ReceiverClosed) => {
                    debug!("Action receiver dropped; stopping gateway");
                    return Ok(());
                }
                Ok(SessionEnd::Reconnect) => {}
                Err(GatewayError::AuthenticationFailed) => {
                    error!("Discord rejected the bot token; gateway stopped");
                    return Err(GatewayError::AuthenticationFailed);
                }
                Err(e) => warn!(error = %e, "Discord Gateway session ended"),
            }

            info!(retry_in_secs = backoff.as_secs(), "Discord Gateway reconnecting");
            tokio::select! {
                _ = cancel_token.cancelled() => {
                    info!("Discord Gateway shutting down");
                    return Ok(());
                }
                _ = tokio::time::sleep(backoff) => {}
            }
            backoff = (backoff * 2).min(MAX_BACKOFF);
        }
    }

    async fn resolve_url(&self) -> Result<String, GatewayError> {
        let bot: GatewayBot = match self.rest.get("/gateway/bot").await {
            Ok(bot) => bot,
            Err(NotifierError::Unavailable(reason)) if reason.starts_with("HTTP 401") => {
                return Err(GatewayError::AuthenticationFailed);
            }
            Err(e) => return Err(GatewayError::Resolve(e.to_string())),
        };
        Ok(format!("{}/?v=10&encoding=json", bot.url.trim_end_matches('/')))
    }

    async fn session(
        &self,
        tx: &mpsc::Sender<ActionEvent>,
        cancel_token: &CancellationToken,
        backoff: &mut Duration,
    ) -> Result<SessionEnd, GatewayError> {
        let url = self.resolve_url().await?;
        let (mut ws, _) = tokio_tungstenite::connect_async(url.as_str())
            .await
            .map_err(|e| GatewayError::WebSocket(e.to_string()))?;

        *backoff = INITIAL_BACKOFF;
        info!("Discord Gateway connected");

        let mut heartbeat: Option<Interval> = None;
        let mut seq: Option<u64> = None;
        let mut identified = false;

        loop {
            if tx.is_closed() {
                let _ = ws.close(None).await;
                return Ok(SessionEnd::ReceiverClosed);
            }

            tokio::select! {
                biased;

                _ = cancel_token.cancelled() => {
                    let _ = ws.close(None).await;
                    return Ok(SessionEnd::Cancelled);
                }

                _ = next_heartbeat(&mut heartbeat) => {
                    let beat = json!({ "op": op::HEARTBEAT, "d": seq });
                    ws.send(WsMessage::Text(beat.to_string()))
                        .await
                        .map_err(|e| GatewayError::WebSocket(e.to_string()))?;
                    trace!(seq = ?seq, "Heartbeat sent");
                }

                frame = ws.next() => {
                    let text = match frame {
                        Some(Ok(WsMessage::Text(text))) => text,
                        Some(Ok(WsMessage::Close(frame))) => {
                            let code = frame.map(|f| u16::from(f.code));
                            warn!(code = ?code, "Discord Gateway closed by server");
                            if code == Some(CLOSE_AUTHENTICATION_FAILED) {
                                return Err(GatewayError::AuthenticationFailed);
                            }
                            return Err(GatewayError::Closed);
                        }
                        Some(Ok(_)) => continue,
                        Some(Err(e)) => return Err(GatewayError::WebSocket(e.to_string())),
                        None => return Err(GatewayError::Closed),
                    };

                    let payload: Payload = match serde_json::from_str(&text) {
                        Ok(p) => p,
                        Err(e) => {
                            debug!(error = %e, "Skipping undecodable gateway frame");
                            continue;
                        }
                    };
                    if let Some(s) = payload.s {
                        seq = Some(s);
                    }

                    match payload.op {
                        op::HELLO => {
                            let period = payload.d["heartbeat_interval"]
                                .as_u64()
                                .filter(|ms| *ms > 0)
                                .map(Duration::from_millis)
                                .unwrap_or(DEFAULT_HEARTBEAT);
                            debug!(interval_ms = period.as_millis() as u64, "Gateway Hello");

                            let mut beat = interval(period);
                            beat.set_missed_tick_behavior(MissedTickBehavior::Delay);
                            heartbeat = Some(beat);

                            if !identified {
                                self.identify(&mut ws).await?;
                                identified = true;
                            }
                        }
                        op::HEARTBEAT => {
                            let beat = json!({ "op": op::HEARTBEAT, "d": seq });
                            ws.send(WsMessage::Text(beat.to_string()))
                                .await
                                .map_err(|e| GatewayError::WebSocket(e.to_string()))?;
                        }
                        op::HEARTBEAT_ACK => trace!("Heartbeat ACK"),
                        op::DISPATCH => {
                            self.dispatch(payload.t.as_deref().unwrap_or(""), &payload.d, tx);
                        }
                        op::RECONNECT => {
                            warn!("Gateway requested reconnect");
                            let _ = ws.close(None).await;
                            return Ok(SessionEnd::Reconnect);
                        }
                        op::INVALID_SESSION => {
                            warn!("Invalid session, re-identifying");
                            self.identify(&mut ws).await?;
                        }
                        other => trace!(op = other, "Ignoring gateway opcode"),
                    }
                }
            }
        }
    }

    async fn identify<S>(&self, ws: &mut S) -> Result<(), GatewayError>
    where
        S: futures::Sink<WsMessage> + Unpin,
        S::Error: std::fmt::Display,
    {
        let identify = json!({
            "op": op::IDENTIFY,
            "d": {
                "token": self.bot_token,
                "intents": INTENTS,
                "properties": {
                    "os": std::env::consts::OS,
                    "browser": "lockwatch",
                    "device": "lockwatch",
                }
            }
        });
        ws.send(WsMessage::Text(identify.to_string()))
            .await
            .map_err(|e| GatewayError::WebSocket(e.to_string()))
    }

    fn dispatch(&self, event: &str, d: &Value, tx: &mpsc::Sender<ActionEvent>) {
        match event {
            "READY" => {
                let user = d["user"]["username"].as_str().unwrap_or("unknown");
                if let Some(app_id) = d["application"]["id"].as_str() {
                    let _ = self.application_id.set(app_id.to_string());
                }
                info!(user, "Discord Gateway READY");
            }
            "INTERACTION_CREATE" => {
                let Some(interaction) = parse_interaction(d) else {
                    trace!("Ignoring unrelated interaction");
                    return;
                };
                if let Some(app_id) = &interaction.application_id {
                    let _ = self.application_id.set(app_id.clone());
                }
                self.spawn_ack_and_forward(interaction, tx.clone());
            }
            other => trace!(event = other, "Ignoring gateway event"),
        }
    }

    /// Acknowledges the click, then forwards it.
    ///
    /// Runs off the session loop so heartbeats are never delayed.
    fn spawn_ack_and_forward(&self, interaction: Interaction, tx: mpsc::Sender<ActionEvent>) {
        let rest = self.rest.clone();
        tokio::spawn(async move {
            let path = format!(
                "/interactions/{}/{}/callback",
                interaction.id, interaction.token
            );
            if let Err(e) = rest.post_empty(&path, &render::deferred_ack()).await {
                warn!(
                    correlation_id = %interaction.id,
                    error = %e,
                    "Failed to acknowledge interaction"
                );
            }

            info!(
                correlation_id = %interaction.id,
                user = interaction.user.as_deref().unwrap_or("unknown"),
                "Lock-all button pressed"
            );
            if tx.send(interaction.into_event()).await.is_err() {
                debug!("Action receiver dropped");
            }
        });
    }
}

/// Waits for the next heartbeat tick, or forever before Hello.
async fn next_heartbeat(heartbeat: &mut Option<Interval>) {
    match heartbeat {
        Some(beat) => {
            beat.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}
