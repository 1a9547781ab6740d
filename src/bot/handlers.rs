use anyhow::{bail, Result};
use serenity::{
    builder::{
        CreateEmbed, CreateInteractionResponse, CreateInteractionResponseMessage,
        EditInteractionResponse,
    },
    model::{
        application::{CommandInteraction, ResolvedOption, ResolvedValue},
        id::{ChannelId, GuildId, MessageId, RoleId, UserId},
    },
    prelude::Context,
};
use thiserror::Error;
use tracing::info;

use crate::{
    audio::{
        player::{PlaybackError, SkipOutcome},
        queue::LoopMode,
    },
    bot::GuildTuneBot,
    cache::{BindingKey, EmoteKey, ReactionRoleBinding},
    ui::embeds,
};

const NEEDS_VOICE: &str = "You must be connected to a voice channel!";
const NOTHING_PLAYING: &str = "Nothing is playing right now.";

/// Invalid admin input for reaction-role commands. Never reaches the cache.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum BindingInputError {
    #[error("Please use a valid message id.")]
    InvalidMessageId,
    #[error("Please use a valid emote.")]
    EmptyEmote,
}

pub fn parse_message_id(input: &str) -> Result<MessageId, BindingInputError> {
    input
        .trim()
        .parse::<u64>()
        .ok()
        .filter(|id| *id != 0)
        .map(MessageId::new)
        .ok_or(BindingInputError::InvalidMessageId)
}

pub fn parse_emote(input: &str) -> Result<EmoteKey, BindingInputError> {
    EmoteKey::parse(input).ok_or(BindingInputError::EmptyEmote)
}

/// Final response of a command.
pub enum Reply {
    Text(String),
    Embed(CreateEmbed),
}

impl From<&str> for Reply {
    fn from(text: &str) -> Self {
        Reply::Text(text.to_string())
    }
}

impl From<String> for Reply {
    fn from(text: String) -> Self {
        Reply::Text(text)
    }
}

/// Handles a slash command
pub async fn handle_command(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &GuildTuneBot,
) -> Result<()> {
    let Some(guild_id) = command.guild_id else {
        command
            .create_response(
                &ctx.http,
                CreateInteractionResponse::Message(
                    CreateInteractionResponseMessage::new()
                        .content("This command only works in a server.")
                        .ephemeral(true),
                ),
            )
            .await?;
        return Ok(());
    };

    info!(
        "📝 /{} used by {} in guild {}",
        command.data.name, command.user.name, guild_id
    );

    // Node and store round trips can exceed the initial response window.
    let ephemeral = command.data.name == "reactionrole";
    command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Defer(
                CreateInteractionResponseMessage::new().ephemeral(ephemeral),
            ),
        )
        .await?;

    let options = command.data.options();
    let Some(ResolvedOption {
        name: subcommand,
        value: ResolvedValue::SubCommand(args),
        ..
    }) = options.first()
    else {
        bail!("/{} invoked without a subcommand", command.data.name);
    };

    let reply = match command.data.name.as_str() {
        "music" => handle_music(ctx, command, bot, guild_id, subcommand, args).await?,
        "reactionrole" => handle_reaction_role(bot, guild_id, subcommand, args).await?,
        other => Reply::Text(format!("Unknown command `{other}`")),
    };

    let response = match reply {
        Reply::Text(content) => EditInteractionResponse::new().content(content),
        Reply::Embed(embed) => EditInteractionResponse::new().embed(embed),
    };
    command.edit_response(&ctx.http, response).await?;

    Ok(())
}

async fn handle_music(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &GuildTuneBot,
    guild_id: GuildId,
    subcommand: &str,
    args: &[ResolvedOption<'_>],
) -> Result<Reply> {
    let player = &bot.player;

    // Read-only views work from anywhere.
    match subcommand {
        "queue" => {
            let current = player.now_playing(guild_id).await;
            let queue = player.queue_snapshot(guild_id).await;
            if current.is_none() && queue.is_empty() {
                return Ok("Queue empty! Add some music!".into());
            }

            let guild_name = guild_id
                .name(&ctx.cache)
                .unwrap_or_else(|| "this server".to_string());
            return Ok(Reply::Embed(embeds::create_queue_embed(
                &guild_name,
                current.as_ref(),
                &queue,
                player.get_loop(guild_id).await,
                player.remaining_duration(guild_id).await,
                bot.config.queue_page_size,
            )));
        }
        "nowplaying" => {
            return Ok(match player.now_playing(guild_id).await {
                Some(track) => Reply::Embed(embeds::create_now_playing_embed(&track)),
                None => NOTHING_PLAYING.into(),
            });
        }
        _ => {}
    }

    let Some(voice_channel) = get_user_voice_channel(ctx, guild_id, command.user.id) else {
        return Ok(NEEDS_VOICE.into());
    };

    if subcommand == "play" {
        let Some(query) = string_arg(args, "query") else {
            bail!("/music play without query");
        };

        if let Err(e) = player
            .join(guild_id, voice_channel, command.channel_id)
            .await
        {
            return Ok(user_message(e)?.into());
        }

        return Ok(match player.play(guild_id, command.channel_id, query).await {
            Ok(outcome) => outcome.to_string().into(),
            Err(e) => user_message(e)?.into(),
        });
    }

    if !player.has_player(guild_id) {
        return Ok(PlaybackError::NoPlayer.to_string().into());
    }

    let reply: Reply = match subcommand {
        "stop" => {
            player.stop(guild_id).await?;
            "Paused playback".into()
        }
        "resume" => {
            player.resume(guild_id).await?;
            "Resumed playback".into()
        }
        "shuffle" => {
            player.shuffle(guild_id).await;
            "Tracks shuffled!".into()
        }
        "skip" => match player.skip(guild_id).await? {
            SkipOutcome::Skipped { .. } => "Skipped track!".into(),
            SkipOutcome::NotPlaying => NOTHING_PLAYING.into(),
        },
        "clear" => {
            player.clear(guild_id).await;
            "Cleared queue".into()
        }
        "disconnect" => {
            player.disconnect(guild_id).await?;
            "See ya!".into()
        }
        "removeduplicates" => {
            player.remove_duplicates(guild_id).await;
            "Duplicate tracks removed".into()
        }
        "loop" => {
            let mode: LoopMode = string_arg(args, "mode").unwrap_or("off").parse()?;
            match player.set_loop(guild_id, mode).await {
                Ok(()) => format!("Loop mode set to `{}`", mode.as_str()).into(),
                Err(e) => user_message(e)?.into(),
            }
        }
        other => format!("Unknown subcommand `{other}`").into(),
    };

    Ok(reply)
}

async fn handle_reaction_role(
    bot: &GuildTuneBot,
    guild_id: GuildId,
    subcommand: &str,
    args: &[ResolvedOption<'_>],
) -> Result<Reply> {
    let cache = bot.reactions.cache();

    let reply: Reply = match subcommand {
        "add" => {
            let (message_id, emote) = match parse_binding_args(args) {
                Ok(parsed) => parsed,
                Err(e) => return Ok(e.to_string().into()),
            };
            let Some(role_id) = role_arg(args, "role") else {
                bail!("/reactionrole add without role");
            };

            cache
                .upsert(ReactionRoleBinding {
                    guild_id,
                    message_id,
                    emote,
                    emote_display: string_arg(args, "emote").unwrap_or_default().trim().to_string(),
                    role_id,
                })
                .await?;
            "Registered!".into()
        }
        "list" => {
            let bindings = cache.list_for_guild(guild_id);
            if bindings.is_empty() {
                "None found.".into()
            } else {
                Reply::Embed(embeds::create_reaction_roles_embed(&bindings))
            }
        }
        "remove" => {
            let (message_id, emote) = match parse_binding_args(args) {
                Ok(parsed) => parsed,
                Err(e) => return Ok(e.to_string().into()),
            };

            let key = BindingKey {
                guild_id,
                message_id,
                emote,
            };
            match cache.remove(&key).await? {
                Some(_) => "Removed!".into(),
                None => "Failed to find a matching reaction role.".into(),
            }
        }
        "clear" => {
            let removed = cache.remove_all_for_guild(guild_id).await?;
            format!("Cleared {removed} reaction roles.").into()
        }
        other => format!("Unknown subcommand `{other}`").into(),
    };

    Ok(reply)
}

fn parse_binding_args(
    args: &[ResolvedOption<'_>],
) -> Result<(MessageId, EmoteKey), BindingInputError> {
    let message_id = parse_message_id(string_arg(args, "messageid").unwrap_or_default())?;
    let emote = parse_emote(string_arg(args, "emote").unwrap_or_default())?;
    Ok((message_id, emote))
}

/// User-facing text for expected playback failures; node failures stay errors.
fn user_message(error: PlaybackError) -> Result<String> {
    match error {
        PlaybackError::Node(e) => Err(e),
        other => Ok(other.to_string()),
    }
}

fn string_arg<'a>(args: &[ResolvedOption<'a>], name: &str) -> Option<&'a str> {
    args.iter().find(|opt| opt.name == name).and_then(|opt| match opt.value {
        ResolvedValue::String(value) => Some(value),
        _ => None,
    })
}

fn role_arg(args: &[ResolvedOption<'_>], name: &str) -> Option<RoleId> {
    args.iter().find(|opt| opt.name == name).and_then(|opt| match opt.value {
        ResolvedValue::Role(role) => Some(role.id),
        _ => None,
    })
}

fn get_user_voice_channel(ctx: &Context, guild_id: GuildId, user_id: UserId) -> Option<ChannelId> {
    let guild = guild_id.to_guild_cached(&ctx.cache)?;

    guild
        .voice_states
        .get(&user_id)
        .and_then(|voice_state| voice_state.channel_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_message_id() {
        assert_eq!(
            parse_message_id(" 1093578310522896455 "),
            Ok(MessageId::new(1093578310522896455))
        );
        assert_eq!(
            parse_message_id("not-a-number"),
            Err(BindingInputError::InvalidMessageId)
        );
        assert_eq!(parse_message_id("0"), Err(BindingInputError::InvalidMessageId));
        assert_eq!(parse_message_id("-5"), Err(BindingInputError::InvalidMessageId));
        assert_eq!(
            BindingInputError::InvalidMessageId.to_string(),
            "Please use a valid message id."
        );
    }

    #[test]
    fn test_parse_emote() {
        assert_eq!(parse_emote("<:party:555>").unwrap().as_str(), "555");
        assert_eq!(parse_emote(""), Err(BindingInputError::EmptyEmote));
    }

    #[test]
    fn test_node_failures_are_not_user_messages() {
        assert_eq!(
            user_message(PlaybackError::NoPlayer).unwrap(),
            "Try playing something first!"
        );
        assert!(user_message(PlaybackError::Node(anyhow::anyhow!("timeout"))).is_err());
    }
}
