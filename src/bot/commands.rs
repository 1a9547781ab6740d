use anyhow::Result;
use serenity::{
    builder::{CreateCommand, CreateCommandOption},
    model::{application::CommandOptionType, id::GuildId, permissions::Permissions},
    prelude::Context,
};

/// Registers the commands globally
pub async fn register_global_commands(ctx: &Context) -> Result<()> {
    for command in all_commands() {
        ctx.http.create_global_command(&command).await?;
    }

    Ok(())
}

/// Registers the commands for a single guild
pub async fn register_guild_commands(ctx: &Context, guild_id: GuildId) -> Result<()> {
    guild_id.set_commands(&ctx.http, all_commands()).await?;

    Ok(())
}

pub fn all_commands() -> Vec<CreateCommand> {
    vec![music_command(), reactionrole_command()]
}

// Music

fn music_command() -> CreateCommand {
    CreateCommand::new("music")
        .description("Music player commands")
        .add_option(
            subcommand("play", "Plays a track or playlist, or adds it to the queue").add_sub_option(
                CreateCommandOption::new(
                    CommandOptionType::String,
                    "query",
                    "URL or search term",
                )
                .required(true),
            ),
        )
        .add_option(subcommand("stop", "Pauses playback"))
        .add_option(subcommand("resume", "Resumes paused playback"))
        .add_option(subcommand("queue", "Shows the queue"))
        .add_option(subcommand("shuffle", "Shuffles the queue"))
        .add_option(subcommand("skip", "Skips the current track"))
        .add_option(subcommand("clear", "Clears the queue"))
        .add_option(subcommand("nowplaying", "Shows the track currently playing"))
        .add_option(subcommand("disconnect", "Leaves the voice channel"))
        .add_option(subcommand(
            "removeduplicates",
            "Removes repeated tracks from the queue",
        ))
        .add_option(
            subcommand("loop", "Sets the loop mode").add_sub_option(
                CreateCommandOption::new(CommandOptionType::String, "mode", "Loop mode")
                    .required(true)
                    .add_string_choice("Off", "off")
                    .add_string_choice("Track", "track")
                    .add_string_choice("Queue", "queue"),
            ),
        )
}

// Reaction roles

fn reactionrole_command() -> CreateCommand {
    CreateCommand::new("reactionrole")
        .description("Grant roles when members react to a message")
        .default_member_permissions(Permissions::MANAGE_ROLES)
        .add_option(
            subcommand("add", "Binds an emote on a message to a role")
                .add_sub_option(message_id_option())
                .add_sub_option(emote_option())
                .add_sub_option(
                    CreateCommandOption::new(CommandOptionType::Role, "role", "Role to grant")
                        .required(true),
                ),
        )
        .add_option(subcommand("list", "Lists the reaction roles of this server"))
        .add_option(
            subcommand("remove", "Removes a reaction role")
                .add_sub_option(message_id_option())
                .add_sub_option(emote_option()),
        )
        .add_option(subcommand("clear", "Removes every reaction role of this server"))
}

fn subcommand(name: &str, description: &str) -> CreateCommandOption {
    CreateCommandOption::new(CommandOptionType::SubCommand, name, description)
}

fn message_id_option() -> CreateCommandOption {
    CreateCommandOption::new(CommandOptionType::String, "messageid", "Id of the message")
        .required(true)
}

fn emote_option() -> CreateCommandOption {
    CreateCommandOption::new(CommandOptionType::String, "emote", "Emote to react with")
        .required(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::Value;

    fn subcommand_names(command: &CreateCommand) -> Vec<String> {
        let json = serde_json::to_value(command).unwrap();
        json["options"]
            .as_array()
            .unwrap()
            .iter()
            .map(|option| option["name"].as_str().unwrap().to_string())
            .collect()
    }

    #[test]
    fn test_music_subcommands() {
        assert_eq!(
            subcommand_names(&music_command()),
            vec![
                "play",
                "stop",
                "resume",
                "queue",
                "shuffle",
                "skip",
                "clear",
                "nowplaying",
                "disconnect",
                "removeduplicates",
                "loop"
            ]
        );
    }

    #[test]
    fn test_reactionrole_requires_manage_roles() {
        let command = reactionrole_command();
        let json = serde_json::to_value(&command).unwrap();

        assert_eq!(
            json["default_member_permissions"],
            Value::String(Permissions::MANAGE_ROLES.bits().to_string())
        );
        assert_eq!(
            subcommand_names(&command),
            vec!["add", "list", "remove", "clear"]
        );
    }
}
