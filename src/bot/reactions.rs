use anyhow::Result;
use serenity::model::id::{GuildId, MessageId, UserId};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::gateway::RoleGateway;
use crate::cache::{EmoteKey, ReactionRoleCache};

/// What a reaction event ended up doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReactionOutcome {
    /// The message has no bindings at all.
    Untracked,
    NoBinding,
    /// The member already is in the state the reaction asks for.
    Unchanged,
    /// The bound role was deleted from the guild; the binding was dropped.
    DanglingRemoved,
    Granted,
    Revoked,
}

/// Grants and revokes bound roles when members react.
pub struct ReactionRoleService {
    cache: Arc<ReactionRoleCache>,
    roles: Arc<dyn RoleGateway>,
    // Process-wide: role edits go out one at a time across every guild.
    role_gate: Mutex<()>,
}

impl ReactionRoleService {
    pub fn new(cache: Arc<ReactionRoleCache>, roles: Arc<dyn RoleGateway>) -> Self {
        Self {
            cache,
            roles,
            role_gate: Mutex::new(()),
        }
    }

    pub fn cache(&self) -> &Arc<ReactionRoleCache> {
        &self.cache
    }

    pub async fn on_reaction_added(
        &self,
        guild: GuildId,
        message: MessageId,
        user: UserId,
        emote: &EmoteKey,
    ) -> Result<ReactionOutcome> {
        self.apply(guild, message, user, emote, true).await
    }

    pub async fn on_reaction_removed(
        &self,
        guild: GuildId,
        message: MessageId,
        user: UserId,
        emote: &EmoteKey,
    ) -> Result<ReactionOutcome> {
        self.apply(guild, message, user, emote, false).await
    }

    async fn apply(
        &self,
        guild: GuildId,
        message: MessageId,
        user: UserId,
        emote: &EmoteKey,
        grant: bool,
    ) -> Result<ReactionOutcome> {
        if !self.cache.is_tracked_message(guild, message) {
            return Ok(ReactionOutcome::Untracked);
        }

        let Some(binding) = self.cache.lookup(guild, message, emote) else {
            debug!("No binding for {} on message {}", emote, message);
            return Ok(ReactionOutcome::NoBinding);
        };

        let has_role = self
            .roles
            .member_has_role(guild, user, binding.role_id)
            .await?;
        if has_role == grant {
            return Ok(ReactionOutcome::Unchanged);
        }

        if !self.roles.role_exists(guild, binding.role_id).await? {
            warn!(
                "Role {} no longer exists in guild {}, dropping its reaction binding",
                binding.role_id, guild
            );
            self.cache.remove(&binding.key()).await?;
            return Ok(ReactionOutcome::DanglingRemoved);
        }

        let _gate = self.role_gate.lock().await;
        if grant {
            self.roles.add_role(guild, user, binding.role_id).await?;
            info!("➕ Granted role {} to {} in guild {}", binding.role_id, user, guild);
            Ok(ReactionOutcome::Granted)
        } else {
            self.roles.remove_role(guild, user, binding.role_id).await?;
            info!("➖ Revoked role {} from {} in guild {}", binding.role_id, user, guild);
            Ok(ReactionOutcome::Revoked)
        }
    }
}
