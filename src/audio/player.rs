use serenity::model::id::{ChannelId, GuildId};
use std::{fmt, sync::Arc, time::Duration};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use super::{
    node::{AudioNode, LoadStatus, NodeEvent, SearchType, TrackEndReason},
    queue::LoopMode,
    registry::{GuildPlaybackState, GuildRegistry, PlayerState},
    track::Track,
};
use crate::bot::gateway::Notifier;

#[derive(Debug, Error)]
pub enum PlaybackError {
    /// The command needs a player and the guild has none.
    #[error("Try playing something first!")]
    NoPlayer,
    /// The node returned no usable result; the queue was left untouched.
    #[error("I wasn't able to find anything for `{query}`.")]
    NothingFound { query: String },
    #[error("audio node request failed: {0}")]
    Node(#[from] anyhow::Error),
}

/// What `play` did with the search result.
#[derive(Debug, Clone, PartialEq)]
pub enum PlayOutcome {
    Queued { track: Track, started: bool },
    PlaylistQueued { name: String, count: usize, started: bool },
}

impl PlayOutcome {
    pub fn started(&self) -> bool {
        match self {
            PlayOutcome::Queued { started, .. } | PlayOutcome::PlaylistQueued { started, .. } => {
                *started
            }
        }
    }
}

impl fmt::Display for PlayOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlayOutcome::Queued { track, .. } => write!(f, "Added '{}' to the queue.", track.title),
            PlayOutcome::PlaylistQueued { name, count, .. } => write!(
                f,
                "Added {count} tracks from the '{name}' playlist to the queue."
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SkipOutcome {
    /// Nothing was streaming, so there was nothing to skip.
    NotPlaying,
    /// The current track was cut; `next` is what replaced it, if anything.
    Skipped { next: Option<Track> },
}

/// Single authority over per-guild queue, loop mode and track transitions.
///
/// User commands and node events both go through the guild's record lock, so a
/// `skip` and a concurrently delivered track end can never interleave.
pub struct PlaybackOrchestrator {
    node: Arc<dyn AudioNode>,
    notifier: Arc<dyn Notifier>,
    registry: GuildRegistry,
    default_volume: u16,
}

impl PlaybackOrchestrator {
    pub fn new(node: Arc<dyn AudioNode>, notifier: Arc<dyn Notifier>, default_volume: u16) -> Self {
        Self {
            node,
            notifier,
            registry: GuildRegistry::new(),
            default_volume,
        }
    }

    pub fn has_player(&self, guild: GuildId) -> bool {
        self.registry.contains(guild)
    }

    pub fn active_players(&self) -> usize {
        self.registry.len()
    }

    /// Connects a player to the invoker's voice channel at the default volume.
    ///
    /// Joining a guild that already has a player only rebinds the text channel.
    pub async fn join(
        &self,
        guild: GuildId,
        voice_channel: ChannelId,
        text_channel: ChannelId,
    ) -> Result<(), PlaybackError> {
        if let Some(handle) = self.registry.get(guild) {
            let mut state = handle.lock().await;
            if state.active {
                if state.voice_channel != voice_channel {
                    debug!(
                        "Already in voice channel {} of guild {}, staying there",
                        state.voice_channel, guild
                    );
                }
                state.text_channel = text_channel;
                return Ok(());
            }
        }

        self.node.join(guild, voice_channel).await?;
        if let Err(e) = self.node.set_volume(guild, self.default_volume).await {
            warn!("Could not set default volume in guild {}: {:?}", guild, e);
        }

        self.registry
            .insert(guild, GuildPlaybackState::new(voice_channel, text_channel))
            .await;

        info!("🔊 Player created in guild {} (voice channel {})", guild, voice_channel);
        Ok(())
    }

    /// Resolves `query`, queues the result and starts playback if the player is idle.
    pub async fn play(
        &self,
        guild: GuildId,
        text_channel: ChannelId,
        query: &str,
    ) -> Result<PlayOutcome, PlaybackError> {
        if !self.has_player(guild) {
            return Err(PlaybackError::NoPlayer);
        }

        let search_type = SearchType::classify(query);
        let result = self.node.search(search_type, query).await?;

        if matches!(result.status, LoadStatus::LoadFailed | LoadStatus::NoMatches)
            || result.tracks.is_empty()
        {
            info!("🔍 Nothing found for '{}' ({:?})", query, result.status);
            return Err(PlaybackError::NothingFound {
                query: query.to_string(),
            });
        }

        let handle = self.registry.get(guild).ok_or(PlaybackError::NoPlayer)?;
        let mut state = handle.lock().await;
        if !state.active {
            return Err(PlaybackError::NoPlayer);
        }
        state.text_channel = text_channel;

        let mut outcome = match result.playlist_name {
            Some(name) if !name.trim().is_empty() => {
                let count = state.queue.extend(result.tracks);
                PlayOutcome::PlaylistQueued {
                    name,
                    count,
                    started: false,
                }
            }
            _ => {
                let track = result.tracks.into_iter().next().ok_or_else(|| {
                    PlaybackError::NothingFound {
                        query: query.to_string(),
                    }
                })?;
                state.queue.push(track.clone());
                PlayOutcome::Queued {
                    track,
                    started: false,
                }
            }
        };

        if state.is_busy() {
            return Ok(outcome);
        }

        if let Some(next) = state.queue.pop() {
            self.start_track(guild, &mut state, next).await?;
            match &mut outcome {
                PlayOutcome::Queued { started, .. } | PlayOutcome::PlaylistQueued { started, .. } => {
                    *started = true
                }
            }
        }

        Ok(outcome)
    }

    /// Pauses the stream. Silently does nothing without a player.
    pub async fn stop(&self, guild: GuildId) -> Result<(), PlaybackError> {
        let Some(handle) = self.registry.get(guild) else {
            return Ok(());
        };
        let mut state = handle.lock().await;

        if state.active && state.state == PlayerState::Playing {
            self.node.set_paused(guild, true).await?;
            state.state = PlayerState::Paused;
            info!("⏸️ Paused playback in guild {}", guild);
        }

        Ok(())
    }

    /// Resumes a paused stream. Silently does nothing without a player.
    pub async fn resume(&self, guild: GuildId) -> Result<(), PlaybackError> {
        let Some(handle) = self.registry.get(guild) else {
            return Ok(());
        };
        let mut state = handle.lock().await;

        if state.active && state.state == PlayerState::Paused {
            self.node.set_paused(guild, false).await?;
            state.state = PlayerState::Playing;
            info!("▶️ Resumed playback in guild {}", guild);
        }

        Ok(())
    }

    pub async fn queue_snapshot(&self, guild: GuildId) -> Vec<Track> {
        match self.registry.get(guild) {
            Some(handle) => handle.lock().await.queue.snapshot(),
            None => Vec::new(),
        }
    }

    pub async fn shuffle(&self, guild: GuildId) {
        if let Some(handle) = self.registry.get(guild) {
            handle.lock().await.queue.shuffle();
            info!("🔀 Queue shuffled in guild {}", guild);
        }
    }

    /// Cuts the current track. Only effective while playing.
    ///
    /// An explicit skip leaves any loop: loop mode is reset to `Off` first.
    pub async fn skip(&self, guild: GuildId) -> Result<SkipOutcome, PlaybackError> {
        let Some(handle) = self.registry.get(guild) else {
            return Ok(SkipOutcome::NotPlaying);
        };
        let mut state = handle.lock().await;

        if !state.active || state.state != PlayerState::Playing {
            return Ok(SkipOutcome::NotPlaying);
        }

        state.loop_mode = LoopMode::Off;

        match state.queue.pop() {
            Some(next) => {
                self.start_track(guild, &mut state, next.clone()).await?;
                info!("⏭️ Skipped to '{}' in guild {}", next.title, guild);
                Ok(SkipOutcome::Skipped { next: Some(next) })
            }
            None => {
                self.node.stop(guild).await?;
                state.current = None;
                state.state = PlayerState::Idle;
                info!("⏭️ Skipped last track in guild {}", guild);
                Ok(SkipOutcome::Skipped { next: None })
            }
        }
    }

    /// Empties the queue; the current track keeps playing.
    pub async fn clear(&self, guild: GuildId) -> usize {
        match self.registry.get(guild) {
            Some(handle) => {
                let cleared = handle.lock().await.queue.clear();
                info!("🗑️ Cleared {} tracks in guild {}", cleared, guild);
                cleared
            }
            None => 0,
        }
    }

    pub async fn now_playing(&self, guild: GuildId) -> Option<Track> {
        let handle = self.registry.get(guild)?;
        let state = handle.lock().await;
        state.current.clone()
    }

    pub async fn player_state(&self, guild: GuildId) -> Option<PlayerState> {
        let handle = self.registry.get(guild)?;
        let state = handle.lock().await;
        Some(state.state)
    }

    /// Leaves the voice channel and drops the guild's loop state.
    pub async fn disconnect(&self, guild: GuildId) -> Result<(), PlaybackError> {
        let Some(handle) = self.registry.get(guild) else {
            return Ok(());
        };
        let mut state = handle.lock().await;

        let left = self.node.leave(guild).await;

        state.active = false;
        state.loop_mode = LoopMode::Off;
        self.registry.remove_if_current(guild, &handle);
        info!(
            "👋 Disconnected from guild {} ({} players left)",
            guild,
            self.registry.len()
        );

        left.map_err(PlaybackError::from)
    }

    /// Drops every repeated track identity, keeping first occurrences in order.
    pub async fn remove_duplicates(&self, guild: GuildId) -> usize {
        match self.registry.get(guild) {
            Some(handle) => {
                let removed = handle.lock().await.queue.remove_duplicates();
                if removed > 0 {
                    info!("🗑️ Removed {} duplicates in guild {}", removed, guild);
                }
                removed
            }
            None => 0,
        }
    }

    pub async fn set_loop(&self, guild: GuildId, mode: LoopMode) -> Result<(), PlaybackError> {
        let handle = self.registry.get(guild).ok_or(PlaybackError::NoPlayer)?;
        let mut state = handle.lock().await;
        if !state.active {
            return Err(PlaybackError::NoPlayer);
        }

        state.loop_mode = mode;
        info!("🔁 Loop mode in guild {} set to {}", guild, mode.as_str());
        Ok(())
    }

    pub async fn get_loop(&self, guild: GuildId) -> LoopMode {
        match self.registry.get(guild) {
            Some(handle) => handle.lock().await.loop_mode,
            None => LoopMode::Off,
        }
    }

    /// Remaining time of the current track plus every queued track.
    pub async fn remaining_duration(&self, guild: GuildId) -> Duration {
        let Some(handle) = self.registry.get(guild) else {
            return Duration::ZERO;
        };
        let state = handle.lock().await;

        let current = state
            .current
            .as_ref()
            .map(Track::remaining)
            .unwrap_or_default();

        current + state.queue.total_duration()
    }

    /// Applies one node event to the guild it concerns.
    pub async fn handle_event(&self, event: NodeEvent) {
        match event {
            NodeEvent::TrackStart { guild, track } => self.on_track_start(guild, track).await,
            NodeEvent::TrackEnd {
                guild,
                track,
                reason,
            } => self.on_track_end(guild, track, reason).await,
            NodeEvent::TrackStuck {
                guild,
                track,
                threshold,
            } => {
                debug!("Track '{}' stuck for {:?} in guild {}", track.title, threshold, guild);
                self.notify(guild, format!("{} is stuck! Skipping.", track.title))
                    .await;
            }
            NodeEvent::TrackException {
                guild,
                track,
                message,
            } => {
                warn!("Track '{}' failed in guild {}: {}", track.title, guild, message);
                self.notify(guild, format!("{} failed to play. Skipping.", track.title))
                    .await;
            }
            NodeEvent::PlayerUpdate { guild, position } => {
                self.on_player_update(guild, position).await
            }
            NodeEvent::SocketClosed {
                guild,
                code,
                reason,
                by_remote,
            } => self.on_socket_closed(guild, code, &reason, by_remote).await,
        }
    }

    async fn on_track_start(&self, guild: GuildId, track: Track) {
        let Some(handle) = self.registry.get(guild) else {
            return;
        };
        let mut state = handle.lock().await;
        if !state.active {
            return;
        }

        let known = state
            .current
            .as_ref()
            .is_some_and(|current| current.identifier == track.identifier);
        if !known {
            state.current = Some(track);
        }
        if state.state == PlayerState::Idle {
            state.state = PlayerState::Playing;
        }
    }

    async fn on_track_end(&self, guild: GuildId, track: Track, reason: TrackEndReason) {
        if reason.is_commanded() {
            debug!("Ignoring {:?} end of '{}' in guild {}", reason, track.title, guild);
            return;
        }

        let Some(handle) = self.registry.get(guild) else {
            debug!("Track end for guild {} without player", guild);
            return;
        };
        let mut state = handle.lock().await;
        if !state.active {
            return;
        }

        // A skip may have replaced the track while this end was in flight.
        let is_current = state.is_busy()
            && state
                .current
                .as_ref()
                .is_some_and(|current| current.encoded == track.encoded);
        if !is_current {
            debug!("Ignoring stale end of '{}' in guild {}", track.title, guild);
            return;
        }

        let next = match state.loop_mode {
            LoopMode::Track => Some(track.rewound()),
            LoopMode::Queue => {
                state.queue.push(track.rewound());
                state.queue.pop()
            }
            LoopMode::Off => state.queue.pop(),
        };

        match next {
            Some(next) => {
                if let Err(e) = self.start_track(guild, &mut state, next).await {
                    error!("Error starting next track in guild {}: {:?}", guild, e);
                    state.current = None;
                    state.state = PlayerState::Idle;
                }
            }
            None => {
                info!("📭 Queue finished in guild {}", guild);
                state.current = None;
                state.state = PlayerState::Idle;
            }
        }
    }

    async fn on_player_update(&self, guild: GuildId, position: Duration) {
        if let Some(handle) = self.registry.get(guild) {
            if let Some(current) = handle.lock().await.current.as_mut() {
                current.position = position;
            }
        }
    }

    async fn on_socket_closed(&self, guild: GuildId, code: u16, reason: &str, by_remote: bool) {
        error!(
            critical = true,
            "Voice socket closed in guild {}: {} {} (by remote: {})",
            guild,
            code,
            reason,
            by_remote
        );

        let Some(handle) = self.registry.get(guild) else {
            return;
        };
        let mut state = handle.lock().await;
        state.loop_mode = LoopMode::Off;
        state.active = false;
        self.registry.remove_if_current(guild, &handle);
    }

    async fn notify(&self, guild: GuildId, message: String) {
        let channel = match self.registry.get(guild) {
            Some(handle) => handle.lock().await.text_channel,
            None => return,
        };

        if let Err(e) = self.notifier.send_message(channel, &message).await {
            warn!("Could not notify channel {}: {:?}", channel, e);
        }
    }

    async fn start_track(
        &self,
        guild: GuildId,
        state: &mut GuildPlaybackState,
        track: Track,
    ) -> Result<(), PlaybackError> {
        self.node.play(guild, &track).await?;
        info!("🎵 Playing '{}' in guild {}", track.title, guild);
        state.current = Some(track);
        state.state = PlayerState::Playing;
        Ok(())
    }
}
