//! [`AudioNode`] over a Lavalink v4 node.
//!
//! Commands go through the node's REST API; events arrive on its websocket and
//! are forwarded as [`NodeEvent`]s. Discord voice is joined with songbird in
//! gateway-only mode and the resulting voice credentials are handed to the node.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use dashmap::DashSet;
use futures::StreamExt;
use parking_lot::RwLock;
use serde::Deserialize;
use serde_json::json;
use serenity::model::id::{ChannelId, GuildId, UserId};
use songbird::Songbird;
use std::{sync::Arc, time::Duration};
use tokio::{net::TcpStream, sync::mpsc::UnboundedSender, task::JoinHandle};
use tokio_tungstenite::{
    tungstenite::{client::IntoClientRequest, http::HeaderValue, Message as WebsocketMessage},
    MaybeTlsStream, WebSocketStream,
};
use tracing::{debug, error, info, trace, warn};

use super::{
    node::{AudioNode, LoadResult, LoadStatus, NodeEvent, SearchType, TrackEndReason},
    track::Track,
};
use crate::config::Config;

const CLIENT_NAME: &str = concat!("guildtune/", env!("CARGO_PKG_VERSION"));
const INITIAL_RECONNECT_DELAY: Duration = Duration::from_secs(1);
const MAX_RECONNECT_DELAY: Duration = Duration::from_secs(30);
// Discord's "session no longer valid" close code.
const SESSION_LOST_CODE: u16 = 4006;

type NodeStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

pub struct LavalinkNode {
    http: reqwest::Client,
    rest_base: String,
    ws_url: String,
    password: String,
    user_id: UserId,
    songbird: Arc<Songbird>,
    // Assigned by the node's `ready` message; `None` while disconnected.
    session_id: RwLock<Option<String>>,
    // Guilds with a player on the current session.
    players: DashSet<GuildId>,
}

impl LavalinkNode {
    pub fn new(config: &Config, user_id: UserId, songbird: Arc<Songbird>) -> Result<Self> {
        let (http_scheme, ws_scheme) = if config.lavalink_ssl {
            ("https", "wss")
        } else {
            ("http", "ws")
        };
        let address = format!("{}:{}", config.lavalink_host, config.lavalink_port);

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .user_agent(CLIENT_NAME)
            .build()
            .context("Error building Lavalink HTTP client")?;

        info!("Lavalink node at {}", address);

        Ok(Self {
            http,
            rest_base: format!("{http_scheme}://{address}/v4"),
            ws_url: format!("{ws_scheme}://{address}/v4/websocket"),
            password: config.lavalink_password.clone(),
            user_id,
            songbird,
            session_id: RwLock::new(None),
            players: DashSet::new(),
        })
    }

    /// Keeps the event websocket connected, forwarding events until `events` closes.
    pub fn spawn_event_stream(self: Arc<Self>, events: UnboundedSender<NodeEvent>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut backoff = Backoff::default();

            loop {
                match self.connect().await {
                    Ok(stream) => {
                        backoff.reset();
                        match self.stream_events(stream, &events).await {
                            Ok(()) => info!("Lavalink websocket closed"),
                            Err(e) => error!("Lavalink websocket error: {:?}", e),
                        }
                    }
                    Err(e) => error!("{:?}", e),
                }

                *self.session_id.write() = None;
                if events.is_closed() {
                    break;
                }

                let delay = backoff.next_delay();
                warn!("Reconnecting to Lavalink in {:?}", delay);
                tokio::time::sleep(delay).await;
            }
        })
    }

    async fn connect(&self) -> Result<NodeStream> {
        let mut request = self.ws_url.as_str().into_client_request()?;
        let headers = request.headers_mut();
        headers.insert("Authorization", HeaderValue::from_str(&self.password)?);
        headers.insert("User-Id", HeaderValue::from_str(&self.user_id.to_string())?);
        headers.insert("Client-Name", HeaderValue::from_static(CLIENT_NAME));

        let (stream, _) = tokio_tungstenite::connect_async(request)
            .await
            .context("Error connecting to Lavalink websocket")?;
        info!("🔗 Connected to Lavalink websocket");
        Ok(stream)
    }

    async fn stream_events(
        &self,
        mut stream: NodeStream,
        events: &UnboundedSender<NodeEvent>,
    ) -> Result<()> {
        while let Some(message) = stream.next().await {
            match message? {
                WebsocketMessage::Text(text) => {
                    match serde_json::from_str::<NodeMessage>(text.as_str()) {
                        Ok(message) => {
                            for event in self.handle_message(message) {
                                if events.send(event).is_err() {
                                    return Ok(());
                                }
                            }
                        }
                        Err(e) => {
                            trace!("{text}");
                            warn!("Error parsing Lavalink message: {e}");
                        }
                    }
                }
                WebsocketMessage::Close(frame) => {
                    info!("Lavalink closed the websocket: {frame:?}");
                    break;
                }
                _ => {}
            }
        }

        Ok(())
    }

    /// Events to forward for one websocket message.
    ///
    /// A fresh (non-resumed) session means the node dropped every player of the
    /// previous one; those guilds are reported as closed connections.
    fn handle_message(&self, message: NodeMessage) -> Vec<NodeEvent> {
        match message {
            NodeMessage::Ready(ready) => {
                info!(
                    "✅ Lavalink session {} ready (resumed: {})",
                    ready.session_id, ready.resumed
                );
                *self.session_id.write() = Some(ready.session_id);
                if ready.resumed {
                    return Vec::new();
                }
                self.take_lost_players()
            }
            NodeMessage::PlayerUpdate(update) => update.into_event().into_iter().collect(),
            NodeMessage::Event(event) => {
                let event = event.into_event();
                if let Some(NodeEvent::SocketClosed { guild, .. }) = &event {
                    self.players.remove(guild);
                }
                event.into_iter().collect()
            }
            NodeMessage::Stats {} => Vec::new(),
            NodeMessage::Unknown => {
                debug!("Ignoring unknown Lavalink op");
                Vec::new()
            }
        }
    }

    fn take_lost_players(&self) -> Vec<NodeEvent> {
        let lost: Vec<GuildId> = self.players.iter().map(|guild| *guild).collect();
        lost.into_iter()
            .filter_map(|guild| self.players.remove(&guild))
            .map(|guild| {
                warn!("Lavalink player for guild {} was lost with the session", guild);
                NodeEvent::SocketClosed {
                    guild,
                    code: SESSION_LOST_CODE,
                    reason: "Lavalink session was lost".to_string(),
                    by_remote: true,
                }
            })
            .collect()
    }

    fn session_id(&self) -> Result<String> {
        self.session_id
            .read()
            .clone()
            .ok_or_else(|| anyhow!("Lavalink session is not ready"))
    }

    fn player_url(&self, guild: GuildId) -> Result<String> {
        Ok(format!(
            "{}/sessions/{}/players/{}",
            self.rest_base,
            self.session_id()?,
            guild
        ))
    }

    async fn update_player(&self, guild: GuildId, body: serde_json::Value) -> Result<()> {
        self.http
            .patch(self.player_url(guild)?)
            .header("Authorization", &self.password)
            .json(&body)
            .send()
            .await?
            .error_for_status()
            .with_context(|| format!("Error updating Lavalink player for guild {}", guild))?;
        Ok(())
    }
}

#[async_trait]
impl AudioNode for LavalinkNode {
    async fn join(&self, guild: GuildId, voice_channel: ChannelId) -> Result<()> {
        // A call left over from a lost session would not hand out fresh credentials.
        if !self.players.contains(&guild) && self.songbird.get(guild).is_some() {
            if let Err(e) = self.songbird.remove(guild).await {
                debug!("Error dropping stale call in guild {}: {:?}", guild, e);
            }
        }

        let (connection, _call) = self
            .songbird
            .join_gateway(guild, voice_channel)
            .await
            .map_err(|e| anyhow!("Error joining voice channel {}: {:?}", voice_channel, e))?;

        self.update_player(
            guild,
            json!({
                "voice": {
                    "token": connection.token,
                    "endpoint": connection.endpoint,
                    "sessionId": connection.session_id,
                }
            }),
        )
        .await?;

        self.players.insert(guild);
        Ok(())
    }

    async fn leave(&self, guild: GuildId) -> Result<()> {
        self.players.remove(&guild);
        if let Err(e) = self.songbird.remove(guild).await {
            warn!("Error leaving voice in guild {}: {:?}", guild, e);
        }

        self.http
            .delete(self.player_url(guild)?)
            .header("Authorization", &self.password)
            .send()
            .await?
            .error_for_status()
            .with_context(|| format!("Error destroying Lavalink player for guild {}", guild))?;
        Ok(())
    }

    async fn search(&self, search_type: SearchType, query: &str) -> Result<LoadResult> {
        let identifier = search_type.identifier(query);

        let response: LoadTracksResponse = self
            .http
            .get(format!("{}/loadtracks", self.rest_base))
            .header("Authorization", &self.password)
            .query(&[("identifier", identifier.as_str())])
            .send()
            .await?
            .error_for_status()
            .context("Error loading tracks")?
            .json()
            .await
            .context("Error decoding loadtracks response")?;

        Ok(response.into_load_result())
    }

    async fn play(&self, guild: GuildId, track: &Track) -> Result<()> {
        self.update_player(
            guild,
            json!({ "track": { "encoded": track.encoded }, "paused": false }),
        )
        .await
    }

    async fn stop(&self, guild: GuildId) -> Result<()> {
        self.update_player(guild, json!({ "track": { "encoded": null } }))
            .await
    }

    async fn set_paused(&self, guild: GuildId, paused: bool) -> Result<()> {
        self.update_player(guild, json!({ "paused": paused })).await
    }

    async fn set_volume(&self, guild: GuildId, volume: u16) -> Result<()> {
        self.update_player(guild, json!({ "volume": volume })).await
    }
}

/// Exponential reconnect delay, capped at [`MAX_RECONNECT_DELAY`].
#[derive(Debug)]
struct Backoff {
    delay: Duration,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            delay: INITIAL_RECONNECT_DELAY,
        }
    }
}

impl Backoff {
    fn next_delay(&mut self) -> Duration {
        let delay = self.delay;
        self.delay = (self.delay * 2).min(MAX_RECONNECT_DELAY);
        delay
    }

    fn reset(&mut self) {
        self.delay = INITIAL_RECONNECT_DELAY;
    }
}

fn parse_guild(id: &str) -> Option<GuildId> {
    id.parse::<u64>().ok().filter(|id| *id != 0).map(GuildId::new)
}

#[derive(Debug, Deserialize)]
#[serde(tag = "op", rename_all = "camelCase")]
enum NodeMessage {
    Ready(ReadyPayload),
    PlayerUpdate(PlayerUpdatePayload),
    Stats {},
    Event(EventPayload),
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReadyPayload {
    session_id: String,
    #[serde(default)]
    resumed: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PlayerUpdatePayload {
    guild_id: String,
    state: PlayerStatePayload,
}

#[derive(Debug, Deserialize)]
struct PlayerStatePayload {
    #[serde(default)]
    position: u64,
}

impl PlayerUpdatePayload {
    fn into_event(self) -> Option<NodeEvent> {
        Some(NodeEvent::PlayerUpdate {
            guild: parse_guild(&self.guild_id)?,
            position: Duration::from_millis(self.state.position),
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum EventPayload {
    #[serde(rename_all = "camelCase")]
    TrackStartEvent { guild_id: String, track: TrackPayload },
    #[serde(rename_all = "camelCase")]
    TrackEndEvent {
        guild_id: String,
        track: TrackPayload,
        reason: EndReasonPayload,
    },
    #[serde(rename_all = "camelCase")]
    TrackExceptionEvent {
        guild_id: String,
        track: TrackPayload,
        exception: ExceptionPayload,
    },
    #[serde(rename_all = "camelCase")]
    TrackStuckEvent {
        guild_id: String,
        track: TrackPayload,
        threshold_ms: u64,
    },
    #[serde(rename_all = "camelCase")]
    WebSocketClosedEvent {
        guild_id: String,
        code: u16,
        #[serde(default)]
        reason: String,
        #[serde(default)]
        by_remote: bool,
    },
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "camelCase")]
enum EndReasonPayload {
    Finished,
    LoadFailed,
    Stopped,
    Replaced,
    Cleanup,
}

impl From<EndReasonPayload> for TrackEndReason {
    fn from(reason: EndReasonPayload) -> Self {
        match reason {
            EndReasonPayload::Finished => TrackEndReason::Finished,
            EndReasonPayload::LoadFailed => TrackEndReason::LoadFailed,
            EndReasonPayload::Stopped => TrackEndReason::Stopped,
            EndReasonPayload::Replaced => TrackEndReason::Replaced,
            EndReasonPayload::Cleanup => TrackEndReason::Cleanup,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ExceptionPayload {
    message: Option<String>,
    #[serde(default)]
    severity: String,
}

impl EventPayload {
    fn into_event(self) -> Option<NodeEvent> {
        match self {
            EventPayload::TrackStartEvent { guild_id, track } => Some(NodeEvent::TrackStart {
                guild: parse_guild(&guild_id)?,
                track: track.into(),
            }),
            EventPayload::TrackEndEvent {
                guild_id,
                track,
                reason,
            } => Some(NodeEvent::TrackEnd {
                guild: parse_guild(&guild_id)?,
                track: track.into(),
                reason: reason.into(),
            }),
            EventPayload::TrackExceptionEvent {
                guild_id,
                track,
                exception,
            } => Some(NodeEvent::TrackException {
                guild: parse_guild(&guild_id)?,
                track: track.into(),
                message: format!(
                    "{} ({})",
                    exception.message.unwrap_or_else(|| "unknown error".to_string()),
                    exception.severity
                ),
            }),
            EventPayload::TrackStuckEvent {
                guild_id,
                track,
                threshold_ms,
            } => Some(NodeEvent::TrackStuck {
                guild: parse_guild(&guild_id)?,
                track: track.into(),
                threshold: Duration::from_millis(threshold_ms),
            }),
            EventPayload::WebSocketClosedEvent {
                guild_id,
                code,
                reason,
                by_remote,
            } => Some(NodeEvent::SocketClosed {
                guild: parse_guild(&guild_id)?,
                code,
                reason,
                by_remote,
            }),
            EventPayload::Unknown => None,
        }
    }
}

#[derive(Debug, Deserialize)]
struct TrackPayload {
    encoded: String,
    info: TrackInfoPayload,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TrackInfoPayload {
    identifier: String,
    #[serde(default)]
    author: String,
    #[serde(default)]
    length: u64,
    #[serde(default)]
    is_stream: bool,
    #[serde(default)]
    position: u64,
    title: String,
    uri: Option<String>,
}

impl From<TrackPayload> for Track {
    fn from(payload: TrackPayload) -> Self {
        let info = payload.info;
        Track {
            encoded: payload.encoded,
            identifier: info.identifier,
            title: info.title,
            author: info.author,
            uri: info.uri,
            duration: Duration::from_millis(info.length),
            position: Duration::from_millis(info.position),
            is_stream: info.is_stream,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(tag = "loadType", content = "data", rename_all = "camelCase")]
enum LoadTracksResponse {
    Track(TrackPayload),
    Playlist(PlaylistPayload),
    Search(Vec<TrackPayload>),
    Empty(serde::de::IgnoredAny),
    Error(ExceptionPayload),
}

#[derive(Debug, Deserialize)]
struct PlaylistPayload {
    info: PlaylistInfoPayload,
    tracks: Vec<TrackPayload>,
}

#[derive(Debug, Deserialize)]
struct PlaylistInfoPayload {
    name: String,
}

impl LoadTracksResponse {
    fn into_load_result(self) -> LoadResult {
        match self {
            LoadTracksResponse::Track(track) => LoadResult {
                status: LoadStatus::Success,
                tracks: vec![track.into()],
                playlist_name: None,
            },
            LoadTracksResponse::Playlist(playlist) => LoadResult {
                status: LoadStatus::Success,
                tracks: playlist.tracks.into_iter().map(Track::from).collect(),
                playlist_name: Some(playlist.info.name),
            },
            LoadTracksResponse::Search(tracks) if tracks.is_empty() => {
                LoadResult::empty(LoadStatus::NoMatches)
            }
            LoadTracksResponse::Search(tracks) => LoadResult {
                status: LoadStatus::Success,
                tracks: tracks.into_iter().map(Track::from).collect(),
                playlist_name: None,
            },
            LoadTracksResponse::Empty(_) => LoadResult::empty(LoadStatus::NoMatches),
            LoadTracksResponse::Error(exception) => {
                warn!(
                    "Lavalink failed to load tracks: {} ({})",
                    exception.message.as_deref().unwrap_or("unknown error"),
                    exception.severity
                );
                LoadResult::empty(LoadStatus::LoadFailed)
            }
        }
    }
}
