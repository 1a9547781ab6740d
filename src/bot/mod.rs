//! # Bot Module
//!
//! Discord-facing side of guildtune.
//!
//! [`GuildTuneBot`] implements serenity's [`EventHandler`] and turns gateway
//! events into calls on the playback orchestrator and the reaction-role flow:
//!
//! - `ready`: slash command registration and presence
//! - `interaction_create`: `/music …` and `/reactionrole …`
//! - `reaction_add` / `reaction_remove`: role grants and revocations
//! - `voice_state_update`: cleanup when the bot is dropped from voice

use anyhow::Result;
use serenity::{
    all::{ActivityData, Context, EventHandler, GuildId, Interaction, Reaction, Ready, VoiceState},
    async_trait,
};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

pub mod commands;
pub mod gateway;
pub mod handlers;
pub mod reactions;

use crate::{
    audio::player::PlaybackOrchestrator, cache::EmoteKey, config::Config,
};
use reactions::ReactionRoleService;

/// Main Discord event handler.
///
/// Holds no per-guild state of its own: playback state lives in the
/// [`PlaybackOrchestrator`], bindings in the reaction-role cache.
pub struct GuildTuneBot {
    pub config: Arc<Config>,
    pub player: Arc<PlaybackOrchestrator>,
    pub reactions: Arc<ReactionRoleService>,
}

impl GuildTuneBot {
    pub fn new(
        config: Config,
        player: Arc<PlaybackOrchestrator>,
        reactions: Arc<ReactionRoleService>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            player,
            reactions,
        }
    }

    /// Registers slash commands with Discord.
    ///
    /// With `GUILD_ID` set, commands go to that guild only (instant propagation);
    /// otherwise they are registered globally.
    async fn register_commands(&self, ctx: &Context) -> Result<()> {
        info!("📝 Registering slash commands...");

        match self.config.guild_id {
            Some(guild_id) => {
                let guild_id = GuildId::new(guild_id);
                info!("🏠 Registering commands for guild {}", guild_id);

                commands::register_guild_commands(ctx, guild_id)
                    .await
                    .map_err(|e| {
                        error!("❌ Error registering guild commands: {:?}", e);
                        anyhow::anyhow!(
                            "Could not register guild commands. Check the bot has 'applications.commands' in that guild."
                        )
                    })?;
                info!("✅ Guild commands registered for {}", guild_id);
            }
            None => {
                info!("🌐 Registering commands globally");
                commands::register_global_commands(ctx).await.map_err(|e| {
                    error!("❌ Error registering global commands: {:?}", e);
                    anyhow::anyhow!("Could not register global commands.")
                })?;
                info!("✅ Global commands registered");
            }
        }

        Ok(())
    }

    async fn on_reaction(&self, reaction: Reaction, added: bool) {
        let (Some(guild_id), Some(user_id)) = (reaction.guild_id, reaction.user_id) else {
            return;
        };
        if reaction.member.as_ref().is_some_and(|member| member.user.bot) {
            return;
        }
        let Some(emote) = EmoteKey::from_reaction(&reaction.emoji) else {
            return;
        };

        let result = if added {
            self.reactions
                .on_reaction_added(guild_id, reaction.message_id, user_id, &emote)
                .await
        } else {
            self.reactions
                .on_reaction_removed(guild_id, reaction.message_id, user_id, &emote)
                .await
        };

        match result {
            Ok(outcome) => debug!(
                "Reaction {} on message {} by {}: {:?}",
                emote, reaction.message_id, user_id, outcome
            ),
            Err(e) => error!(
                "Error applying reaction role in guild {}: {:?}",
                guild_id, e
            ),
        }
    }
}

#[async_trait]
impl EventHandler for GuildTuneBot {
    async fn ready(&self, ctx: Context, ready: Ready) {
        info!("🤖 {} is online!", ready.user.name);
        info!("📊 Connected to {} guilds", ready.guilds.len());

        if let Err(e) = self.register_commands(&ctx).await {
            error!("Error registering commands: {:?}", e);
        }

        ctx.set_activity(Some(ActivityData::playing("*screaming geometrically*")));
    }

    /// Errors never escape: they are logged and the deferred response is removed
    /// so the user is not left looking at a stale "thinking…" message.
    async fn interaction_create(&self, ctx: Context, interaction: Interaction) {
        if let Interaction::Command(command) = interaction {
            if let Err(e) = handlers::handle_command(&ctx, &command, self).await {
                error!("Error handling /{}: {:?}", command.data.name, e);

                if let Err(e) = command.delete_response(&ctx.http).await {
                    debug!("No response to clean up: {:?}", e);
                }
            }
        }
    }

    async fn reaction_add(&self, _ctx: Context, add_reaction: Reaction) {
        self.on_reaction(add_reaction, true).await;
    }

    async fn reaction_remove(&self, _ctx: Context, removed_reaction: Reaction) {
        self.on_reaction(removed_reaction, false).await;
    }

    async fn voice_state_update(&self, ctx: Context, old: Option<VoiceState>, new: VoiceState) {
        // Only the bot itself leaving voice matters here.
        let current_user_id = ctx.cache.current_user().id;
        if new.user_id != current_user_id || old.is_none() || new.channel_id.is_some() {
            return;
        }

        if let Some(guild_id) = new.guild_id {
            if self.player.has_player(guild_id) {
                info!("🔌 Bot disconnected from voice in guild {}", guild_id);

                if let Err(e) = self.player.disconnect(guild_id).await {
                    warn!("Error cleaning up player in guild {}: {:?}", guild_id, e);
                }
                debug!("{} players still active", self.player.active_players());
            }
        }
    }
}
