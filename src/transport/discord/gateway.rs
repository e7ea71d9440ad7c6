use anyhow::{Context, Result, bail};
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use serde::Deserialize;
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, mpsc};
use tokio::time::{Instant, MissedTickBehavior, interval};
use tokio_tungstenite::tungstenite::{self, Message};

use super::http_client::DiscordHttpClient;
use super::types::{DEFAULT_HEARTBEAT_INTERVAL_MS, GatewayOpcode};
use crate::transport::traits::{ChannelId, GuildId, RoleId, UserId};

const FALLBACK_GATEWAY_URL: &str = "wss://gateway.discord.gg";

/// A READY session that can be resumed after a dropped connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResumableSession {
    pub session_id: String,
    pub resume_gateway_url: String,
    pub sequence: Option<i64>,
}

/// Survives reconnects: the supervisor hands the same state to every session.
#[derive(Debug, Default)]
pub struct DiscordGatewayState {
    session: Mutex<Option<ResumableSession>>,
}

impl DiscordGatewayState {
    pub async fn session(&self) -> Option<ResumableSession> {
        self.session.lock().await.clone()
    }

    async fn record_ready(&self, session_id: &str, resume_gateway_url: &str) {
        *self.session.lock().await = Some(ResumableSession {
            session_id: session_id.to_string(),
            resume_gateway_url: resume_gateway_url.to_string(),
            sequence: None,
        });
    }

    async fn record_sequence(&self, sequence: i64) {
        if let Some(session) = self.session.lock().await.as_mut() {
            session.sequence = Some(sequence);
        }
    }

    async fn forget(&self) {
        *self.session.lock().await = None;
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayEvent {
    MessageCreate {
        channel_id: ChannelId,
        guild_id: Option<GuildId>,
        author_id: UserId,
        author_name: String,
        author_is_bot: bool,
        role_ids: Vec<RoleId>,
        content: String,
    },
    Ready {
        session_id: String,
        resume_gateway_url: String,
        user_name: String,
    },
}

/// One decoded gateway frame.
#[derive(Debug, Deserialize)]
struct Frame {
    op: u64,
    #[serde(default)]
    d: Value,
    #[serde(default)]
    s: Option<i64>,
    #[serde(default)]
    t: Option<String>,
}

impl Frame {
    fn decode(message: Message) -> Result<Option<Self>> {
        let raw = match message {
            Message::Text(text) => text.to_string(),
            Message::Binary(bytes) => match String::from_utf8(bytes.to_vec()) {
                Ok(text) => text,
                Err(_) => return Ok(None),
            },
            _ => return Ok(None),
        };
        serde_json::from_str(&raw)
            .map(Some)
            .context("parse Discord gateway payload")
    }

    fn opcode(&self) -> Option<GatewayOpcode> {
        GatewayOpcode::from_u64(self.op)
    }
}

/// Heartbeat bookkeeping for one connection.
///
/// A beat is only sent once the previous one was acknowledged; a missing ACK
/// by the next beat (or by the deadline) ends the session.
#[derive(Debug)]
struct Heartbeat {
    period: Duration,
    awaiting_ack: bool,
    deadline: Option<Instant>,
}

impl Heartbeat {
    fn new(period: Duration) -> Self {
        Self {
            period,
            awaiting_ack: false,
            deadline: None,
        }
    }

    /// `false` when the previous beat is still unacknowledged.
    fn begin_beat(&mut self, now: Instant) -> bool {
        if self.awaiting_ack {
            return false;
        }
        self.awaiting_ack = true;
        self.deadline = Some(now + self.period);
        true
    }

    fn acknowledge(&mut self) {
        self.awaiting_ack = false;
        self.deadline = None;
    }

    fn expired(&self, now: Instant) -> bool {
        self.awaiting_ack && self.deadline.is_some_and(|deadline| now >= deadline)
    }

    async fn until_deadline(&self) {
        match self.deadline {
            Some(deadline) => tokio::time::sleep_until(deadline).await,
            None => futures_util::future::pending::<()>().await,
        }
    }
}

/// What the listen loop does after a frame.
#[derive(Debug, PartialEq, Eq)]
enum Flow {
    Continue,
    Reconnect,
}

pub struct DiscordGateway {
    bot_token: String,
    intents: u64,
    state: Arc<DiscordGatewayState>,
}

impl DiscordGateway {
    pub fn new(bot_token: String, intents: u64, state: Arc<DiscordGatewayState>) -> Self {
        Self {
            bot_token,
            intents,
            state,
        }
    }

    /// Run one gateway session. Returns `Ok(())` when the session should be
    /// re-established (reconnect request, missed heartbeat ACK, closed socket).
    pub async fn connect_and_listen(
        &self,
        http: &DiscordHttpClient,
        tx: &mpsc::Sender<GatewayEvent>,
    ) -> Result<()> {
        let resumable = self.state.session().await;
        let base_url = match &resumable {
            Some(session) if !session.resume_gateway_url.is_empty() => {
                session.resume_gateway_url.clone()
            }
            _ => Self::fetch_gateway_url(http).await?,
        };
        let ws_url = build_gateway_ws_url(&base_url);

        let (ws_stream, _) = tokio_tungstenite::connect_async(&ws_url)
            .await
            .with_context(|| format!("connect Discord gateway websocket: {ws_url}"))?;
        let (mut write, mut read) = ws_stream.split();

        let period = Duration::from_millis(await_hello(&mut read).await?);
        let opening = match &resumable {
            Some(session) => resume_payload(&self.bot_token, session),
            None => identify_payload(&self.bot_token, self.intents),
        };
        send_json(&mut write, &opening)
            .await
            .context("send Discord gateway identify/resume")?;

        let mut heartbeat = Heartbeat::new(period);
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            let flow = tokio::select! {
                _ = ticker.tick() => self.beat(&mut write, &mut heartbeat).await?,
                () = heartbeat.until_deadline() => {
                    if heartbeat.expired(Instant::now()) {
                        tracing::warn!("discord.gateway.heartbeat_timeout");
                        Flow::Reconnect
                    } else {
                        Flow::Continue
                    }
                }
                message = read.next() => match message {
                    None => {
                        tracing::warn!("discord.gateway.socket_closed");
                        Flow::Reconnect
                    }
                    Some(message) => {
                        let message = message.context("read Discord gateway message")?;
                        match Frame::decode(message)? {
                            Some(frame) => self.on_frame(frame, tx, &mut write, &mut heartbeat).await?,
                            None => Flow::Continue,
                        }
                    }
                },
            };
            if flow == Flow::Reconnect {
                return Ok(());
            }
        }
    }

    async fn fetch_gateway_url(http: &DiscordHttpClient) -> Result<String> {
        let body = http
            .get_gateway_bot()
            .await
            .context("fetch Discord gateway/bot URL")?;
        Ok(body
            .get("url")
            .and_then(Value::as_str)
            .unwrap_or(FALLBACK_GATEWAY_URL)
            .to_string())
    }

    async fn beat<W>(&self, write: &mut W, heartbeat: &mut Heartbeat) -> Result<Flow>
    where
        W: Sink<Message, Error = tungstenite::Error> + Unpin,
    {
        if !heartbeat.begin_beat(Instant::now()) {
            tracing::warn!("discord.gateway.heartbeat_unacknowledged");
            return Ok(Flow::Reconnect);
        }
        let sequence = self.state.session().await.and_then(|s| s.sequence);
        send_json(write, &heartbeat_payload(sequence))
            .await
            .context("send Discord gateway heartbeat")?;
        Ok(Flow::Continue)
    }

    async fn on_frame<W>(
        &self,
        frame: Frame,
        tx: &mpsc::Sender<GatewayEvent>,
        write: &mut W,
        heartbeat: &mut Heartbeat,
    ) -> Result<Flow>
    where
        W: Sink<Message, Error = tungstenite::Error> + Unpin,
    {
        if let Some(sequence) = frame.s {
            self.state.record_sequence(sequence).await;
        }

        match frame.opcode() {
            Some(GatewayOpcode::Dispatch) => {
                let event_type = frame.t.as_deref().unwrap_or_default();
                if let Some(event) = parse_dispatch_event(event_type, &frame.d) {
                    if let GatewayEvent::Ready {
                        session_id,
                        resume_gateway_url,
                        ..
                    } = &event
                    {
                        self.state.record_ready(session_id, resume_gateway_url).await;
                        if let Some(sequence) = frame.s {
                            self.state.record_sequence(sequence).await;
                        }
                    }
                    tx.send(event)
                        .await
                        .context("forward Discord gateway event")?;
                }
                Ok(Flow::Continue)
            }
            // The server may ask for a beat out of schedule.
            Some(GatewayOpcode::Heartbeat) => {
                heartbeat.acknowledge();
                self.beat(write, heartbeat).await
            }
            Some(GatewayOpcode::HeartbeatAck) => {
                heartbeat.acknowledge();
                Ok(Flow::Continue)
            }
            Some(GatewayOpcode::Reconnect) => {
                tracing::info!("discord.gateway.reconnect_requested");
                Ok(Flow::Reconnect)
            }
            Some(GatewayOpcode::InvalidSession) => {
                let resumable = frame.d.as_bool().unwrap_or(false);
                // Either way the next connection identifies from scratch.
                self.state.forget().await;
                let wait = invalid_session_backoff();
                tracing::warn!(
                    resumable,
                    wait_secs = wait.as_secs(),
                    "discord.gateway.invalid_session"
                );
                tokio::time::sleep(wait).await;
                Ok(Flow::Reconnect)
            }
            _ => Ok(Flow::Continue),
        }
    }
}

async fn send_json<W>(write: &mut W, payload: &Value) -> std::result::Result<(), tungstenite::Error>
where
    W: Sink<Message, Error = tungstenite::Error> + Unpin,
{
    write.send(Message::Text(payload.to_string().into())).await
}

fn identify_payload(token: &str, intents: u64) -> Value {
    json!({
        "op": GatewayOpcode::Identify as u8,
        "d": {
            "token": token,
            "intents": intents,
            "properties": {
                "os": std::env::consts::OS,
                "browser": "cleanbot",
                "device": "cleanbot"
            }
        }
    })
}

fn resume_payload(token: &str, session: &ResumableSession) -> Value {
    json!({
        "op": GatewayOpcode::Resume as u8,
        "d": {
            "token": token,
            "session_id": session.session_id,
            "seq": session.sequence,
        }
    })
}

fn heartbeat_payload(sequence: Option<i64>) -> Value {
    json!({ "op": GatewayOpcode::Heartbeat as u8, "d": sequence })
}

/// Wait for HELLO and return its heartbeat interval in milliseconds.
async fn await_hello<R>(read: &mut R) -> Result<u64>
where
    R: Stream<Item = std::result::Result<Message, tungstenite::Error>> + Unpin,
{
    while let Some(message) = read.next().await {
        let message = message.context("read Discord gateway hello payload")?;
        let Some(frame) = Frame::decode(message)? else {
            continue;
        };
        if frame.opcode() == Some(GatewayOpcode::Hello) {
            return Ok(frame
                .d
                .get("heartbeat_interval")
                .and_then(Value::as_u64)
                .unwrap_or(DEFAULT_HEARTBEAT_INTERVAL_MS));
        }
    }
    bail!("Discord gateway closed before Hello")
}

fn build_gateway_ws_url(base_url: &str) -> String {
    let trimmed = base_url.trim_end_matches('/');
    format!("{trimmed}/?v=10&encoding=json")
}

fn invalid_session_backoff() -> Duration {
    Duration::from_secs(rand::random_range(1..=5_u64))
}

pub fn parse_dispatch_event(event_type: &str, d: &Value) -> Option<GatewayEvent> {
    match event_type {
        "READY" => parse_ready_event(d),
        "MESSAGE_CREATE" => parse_message_create_event(d),
        "RESUMED" => {
            tracing::info!("Discord gateway session resumed");
            None
        }
        _ => None,
    }
}

fn snowflake<T: std::str::FromStr>(value: &Value) -> Option<T> {
    value.as_str()?.parse().ok()
}

fn parse_ready_event(d: &Value) -> Option<GatewayEvent> {
    let session_id = d.get("session_id")?.as_str()?.to_string();
    let resume_gateway_url = d.get("resume_gateway_url")?.as_str()?.to_string();
    let user_name = d
        .get("user")
        .and_then(|user| user.get("username"))
        .and_then(Value::as_str)
        .unwrap_or("cleanbot")
        .to_string();

    Some(GatewayEvent::Ready {
        session_id,
        resume_gateway_url,
        user_name,
    })
}

fn parse_message_create_event(d: &Value) -> Option<GatewayEvent> {
    let channel_id = snowflake(d.get("channel_id")?)?;
    let author = d.get("author")?;
    let author_id = snowflake(author.get("id")?)?;
    let author_name = author
        .get("username")
        .and_then(Value::as_str)
        .unwrap_or("unknown")
        .to_string();
    let author_is_bot = author
        .get("bot")
        .and_then(Value::as_bool)
        .unwrap_or(false);
    let content = d
        .get("content")
        .and_then(Value::as_str)
        .unwrap_or("")
        .to_string();
    let guild_id = d.get("guild_id").and_then(snowflake);
    let role_ids = d
        .get("member")
        .and_then(|member| member.get("roles"))
        .and_then(Value::as_array)
        .map(|roles| roles.iter().filter_map(snowflake).collect())
        .unwrap_or_default();

    Some(GatewayEvent::MessageCreate {
        channel_id,
        guild_id,
        author_id,
        author_name,
        author_is_bot,
        role_ids,
        content,
    })
}
