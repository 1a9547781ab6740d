use dashmap::DashMap;
use serenity::model::id::{ChannelId, GuildId};
use std::sync::Arc;
use tokio::sync::Mutex;

use super::{
    queue::{GuildQueue, LoopMode},
    track::Track,
};

/// Streaming state of a guild's player.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerState {
    /// Connected, nothing streaming.
    Idle,
    Playing,
    Paused,
}

/// Everything the orchestrator owns for one guild with a player.
#[derive(Debug)]
pub struct GuildPlaybackState {
    pub queue: GuildQueue,
    pub loop_mode: LoopMode,
    pub current: Option<Track>,
    pub state: PlayerState,
    pub voice_channel: ChannelId,
    /// Channel that receives stuck/exception notices.
    pub text_channel: ChannelId,
    /// Cleared when the record is retired; holders of a stale handle must not act.
    pub active: bool,
}

impl GuildPlaybackState {
    pub fn new(voice_channel: ChannelId, text_channel: ChannelId) -> Self {
        Self {
            queue: GuildQueue::new(),
            loop_mode: LoopMode::Off,
            current: None,
            state: PlayerState::Idle,
            voice_channel,
            text_channel,
            active: true,
        }
    }

    pub fn is_busy(&self) -> bool {
        matches!(self.state, PlayerState::Playing | PlayerState::Paused)
    }
}

pub type GuildHandle = Arc<Mutex<GuildPlaybackState>>;

/// Guild → exclusively owned playback state.
///
/// Each record sits behind its own async mutex, so guilds never contend with
/// each other and every transition of one guild runs alone.
#[derive(Debug, Default)]
pub struct GuildRegistry {
    guilds: DashMap<GuildId, GuildHandle>,
}

impl GuildRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, guild: GuildId) -> Option<GuildHandle> {
        self.guilds.get(&guild).map(|entry| entry.value().clone())
    }

    pub fn contains(&self, guild: GuildId) -> bool {
        self.guilds.contains_key(&guild)
    }

    /// Registers a fresh record, replacing (and retiring) any previous one.
    pub async fn insert(&self, guild: GuildId, state: GuildPlaybackState) -> GuildHandle {
        let handle = Arc::new(Mutex::new(state));
        let previous = self.guilds.insert(guild, handle.clone());
        if let Some(previous) = previous {
            previous.lock().await.active = false;
        }
        handle
    }

    /// Unregisters the guild's record if it is still `handle`.
    pub fn remove_if_current(&self, guild: GuildId, handle: &GuildHandle) {
        self.guilds
            .remove_if(&guild, |_, current| Arc::ptr_eq(current, handle));
    }

    pub fn len(&self) -> usize {
        self.guilds.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_insert_and_remove() {
        let registry = GuildRegistry::new();
        let guild = GuildId::new(1);

        assert!(registry.get(guild).is_none());

        let handle = registry.insert(
            guild,
            GuildPlaybackState::new(ChannelId::new(10), ChannelId::new(20)),
        ).await;
        assert!(registry.contains(guild));
        assert_eq!(handle.lock().await.state, PlayerState::Idle);

        registry.remove_if_current(guild, &handle);
        assert!(!registry.contains(guild));
        assert_eq!(registry.len(), 0);
    }

    #[tokio::test]
    async fn test_replacing_retires_previous_record() {
        let registry = GuildRegistry::new();
        let guild = GuildId::new(1);

        let old = registry.insert(guild, GuildPlaybackState::new(ChannelId::new(1), ChannelId::new(2))).await;
        let new = registry.insert(guild, GuildPlaybackState::new(ChannelId::new(3), ChannelId::new(4))).await;

        assert!(!old.lock().await.active);
        assert!(new.lock().await.active);

        // A stale handle must not unregister the live record.
        registry.remove_if_current(guild, &old);
        assert!(registry.contains(guild));
    }
}
