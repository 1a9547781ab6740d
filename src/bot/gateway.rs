//! Narrow capabilities the core needs from the chat platform.
//!
//! The orchestrator and the reaction-role flow only see [`Notifier`] and
//! [`RoleGateway`]; [`DiscordGateway`] implements both over serenity's HTTP client.

use anyhow::Result;
use async_trait::async_trait;
use serenity::{
    http::Http,
    model::id::{ChannelId, GuildId, RoleId, UserId},
};
use std::sync::Arc;

/// Sends plain text to a channel.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send_message(&self, channel: ChannelId, content: &str) -> Result<()>;
}

/// Role lookups and edits on guild members.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RoleGateway: Send + Sync {
    async fn role_exists(&self, guild: GuildId, role: RoleId) -> Result<bool>;

    async fn member_has_role(&self, guild: GuildId, user: UserId, role: RoleId) -> Result<bool>;

    async fn add_role(&self, guild: GuildId, user: UserId, role: RoleId) -> Result<()>;

    async fn remove_role(&self, guild: GuildId, user: UserId, role: RoleId) -> Result<()>;
}

pub struct DiscordGateway {
    http: Arc<Http>,
}

impl DiscordGateway {
    pub fn new(http: Arc<Http>) -> Self {
        Self { http }
    }
}

#[async_trait]
impl Notifier for DiscordGateway {
    async fn send_message(&self, channel: ChannelId, content: &str) -> Result<()> {
        channel.say(&self.http, content).await?;
        Ok(())
    }
}

#[async_trait]
impl RoleGateway for DiscordGateway {
    async fn role_exists(&self, guild: GuildId, role: RoleId) -> Result<bool> {
        let roles = self.http.get_guild_roles(guild).await?;
        Ok(roles.iter().any(|r| r.id == role))
    }

    async fn member_has_role(&self, guild: GuildId, user: UserId, role: RoleId) -> Result<bool> {
        let member = self.http.get_member(guild, user).await?;
        Ok(member.roles.contains(&role))
    }

    async fn add_role(&self, guild: GuildId, user: UserId, role: RoleId) -> Result<()> {
        self.http
            .add_member_role(guild, user, role, Some("Reaction role"))
            .await?;
        Ok(())
    }

    async fn remove_role(&self, guild: GuildId, user: UserId, role: RoleId) -> Result<()> {
        self.http
            .remove_member_role(guild, user, role, Some("Reaction role"))
            .await?;
        Ok(())
    }
}
