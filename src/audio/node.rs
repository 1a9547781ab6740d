//! Contract with the remote audio node.
//!
//! The orchestrator only talks to the node through [`AudioNode`]; everything the
//! node pushes back arrives as a [`NodeEvent`] on an mpsc channel.

use anyhow::Result;
use async_trait::async_trait;
use serenity::model::id::{ChannelId, GuildId};
use std::time::Duration;

use super::track::Track;

/// How a query is resolved by the node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchType {
    /// The query is a URL the node loads as-is.
    Direct,
    /// The query is free text searched on YouTube.
    YouTube,
}

impl SearchType {
    /// Classifies a user query: absolute URLs with a host are loaded directly,
    /// everything else becomes a YouTube search.
    pub fn classify(query: &str) -> Self {
        match url::Url::parse(query.trim()) {
            Ok(url) if url.has_host() => SearchType::Direct,
            _ => SearchType::YouTube,
        }
    }

    /// Identifier understood by the node's track loader.
    pub fn identifier(&self, query: &str) -> String {
        match self {
            SearchType::Direct => query.trim().to_string(),
            SearchType::YouTube => format!("ytsearch:{}", query.trim()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadStatus {
    Success,
    NoMatches,
    LoadFailed,
}

/// Result of a node search.
#[derive(Debug, Clone)]
pub struct LoadResult {
    pub status: LoadStatus,
    pub tracks: Vec<Track>,
    /// Set when the query resolved to a playlist.
    pub playlist_name: Option<String>,
}

impl LoadResult {
    pub fn empty(status: LoadStatus) -> Self {
        Self {
            status,
            tracks: Vec::new(),
            playlist_name: None,
        }
    }
}

/// Why a track stopped streaming.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackEndReason {
    Finished,
    LoadFailed,
    Stopped,
    Replaced,
    Cleanup,
}

impl TrackEndReason {
    /// The end was requested by us (stop or replace), not reached by the stream.
    pub fn is_commanded(&self) -> bool {
        matches!(self, TrackEndReason::Stopped | TrackEndReason::Replaced)
    }
}

/// Typed events pushed by the audio node.
#[derive(Debug, Clone)]
pub enum NodeEvent {
    TrackStart {
        guild: GuildId,
        track: Track,
    },
    TrackEnd {
        guild: GuildId,
        track: Track,
        reason: TrackEndReason,
    },
    TrackStuck {
        guild: GuildId,
        track: Track,
        threshold: Duration,
    },
    TrackException {
        guild: GuildId,
        track: Track,
        message: String,
    },
    PlayerUpdate {
        guild: GuildId,
        position: Duration,
    },
    SocketClosed {
        guild: GuildId,
        code: u16,
        reason: String,
        by_remote: bool,
    },
}

impl NodeEvent {
    pub fn guild(&self) -> GuildId {
        match self {
            NodeEvent::TrackStart { guild, .. }
            | NodeEvent::TrackEnd { guild, .. }
            | NodeEvent::TrackStuck { guild, .. }
            | NodeEvent::TrackException { guild, .. }
            | NodeEvent::PlayerUpdate { guild, .. }
            | NodeEvent::SocketClosed { guild, .. } => *guild,
        }
    }
}

/// Commands the orchestrator issues to the audio node.
#[async_trait]
pub trait AudioNode: Send + Sync {
    /// Connects a player for `guild` to `voice_channel`.
    async fn join(&self, guild: GuildId, voice_channel: ChannelId) -> Result<()>;

    /// Destroys the guild's player and leaves the voice channel.
    async fn leave(&self, guild: GuildId) -> Result<()>;

    async fn search(&self, search_type: SearchType, query: &str) -> Result<LoadResult>;

    /// Starts `track`, replacing whatever is streaming.
    async fn play(&self, guild: GuildId, track: &Track) -> Result<()>;

    /// Stops the current track without starting another.
    async fn stop(&self, guild: GuildId) -> Result<()>;

    async fn set_paused(&self, guild: GuildId, paused: bool) -> Result<()>;

    async fn set_volume(&self, guild: GuildId, volume: u16) -> Result<()>;
}
