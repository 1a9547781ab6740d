use serenity::{
    all::Timestamp,
    builder::{CreateEmbed, CreateEmbedAuthor, CreateEmbedFooter},
};
use std::{fmt::Write, time::Duration};

use crate::{
    audio::{queue::LoopMode, track::Track},
    cache::ReactionRoleBinding,
};

/// Embed colors
pub mod colors {
    use serenity::all::Colour;

    pub const QUEUE_BLUE: Colour = Colour::new(0x0345fc);
    pub const MUSIC_PURPLE: Colour = Colour::from_rgb(138, 43, 226);
    pub const INFO_BLUE: Colour = Colour::from_rgb(52, 144, 220);
}

const STANDARD_FOOTER: &str = "🎵 guildtune";
const PROGRESS_SEGMENTS: usize = 30;

/// Queue listing: current track, the first `page_size` queued tracks and totals.
pub fn create_queue_embed(
    guild_name: &str,
    current: Option<&Track>,
    queue: &[Track],
    loop_mode: LoopMode,
    remaining: Duration,
    page_size: usize,
) -> CreateEmbed {
    CreateEmbed::default()
        .title(format!("Queue for {}", guild_name))
        .description(queue_description(current, queue, remaining, page_size))
        .color(colors::QUEUE_BLUE)
        .field("Loop", loop_label(loop_mode), true)
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
        .timestamp(Timestamp::now())
}

pub fn create_now_playing_embed(track: &Track) -> CreateEmbed {
    let mut embed = CreateEmbed::default()
        .author(CreateEmbedAuthor::new("Now Playing 🎵"))
        .title(&track.title)
        .description(format!(
            "`{}`\n\n`{}`",
            progress_bar(track.position, track.duration),
            position_label(track)
        ))
        .color(colors::MUSIC_PURPLE)
        .field("Author", &track.author, true)
        .thumbnail(track.thumbnail_url())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER));

    if let Some(uri) = &track.uri {
        embed = embed.url(uri);
    }

    embed
}

pub fn create_reaction_roles_embed(bindings: &[ReactionRoleBinding]) -> CreateEmbed {
    CreateEmbed::default()
        .title("Reaction Roles")
        .description(reaction_role_lines(bindings))
        .color(colors::INFO_BLUE)
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

fn queue_description(
    current: Option<&Track>,
    queue: &[Track],
    remaining: Duration,
    page_size: usize,
) -> String {
    let mut description = String::new();

    if let Some(track) = current {
        let _ = writeln!(description, "__Now Playing:__\n{}\n", track_line(track));
    }

    if !queue.is_empty() {
        description.push_str("__Up Next:__\n");
        for (i, track) in queue.iter().take(page_size).enumerate() {
            let _ = writeln!(description, "`{}.` {}", i + 1, track_line(track));
        }
        if queue.len() > page_size {
            let _ = writeln!(description, "*…and {} more*", queue.len() - page_size);
        }
        description.push('\n');
    }

    let _ = write!(
        description,
        "**{} tracks in queue | {} total length**",
        queue.len(),
        format_duration(remaining)
    );

    description
}

fn track_line(track: &Track) -> String {
    let length = if track.is_stream {
        "LIVE".to_string()
    } else {
        format_duration(track.duration)
    };

    match &track.uri {
        Some(uri) => format!("[{}]({}) | `{}`", track.title, uri, length),
        None => format!("{} | `{}`", track.title, length),
    }
}

fn loop_label(mode: LoopMode) -> &'static str {
    match mode {
        LoopMode::Off => "▶️ Off",
        LoopMode::Track => "🔂 Track",
        LoopMode::Queue => "🔁 Queue",
    }
}

fn position_label(track: &Track) -> String {
    if track.is_stream {
        return format!("{} / LIVE", format_duration(track.position));
    }
    format!(
        "{} / {}",
        format_duration(track.position),
        format_duration(track.duration)
    )
}

/// Bar of `PROGRESS_SEGMENTS + 1` cells with a knob at the current position.
pub fn progress_bar(position: Duration, duration: Duration) -> String {
    let knob = if duration.is_zero() {
        0
    } else {
        let step = duration.as_secs_f64() / PROGRESS_SEGMENTS as f64;
        ((position.as_secs_f64() / step).round() as usize).min(PROGRESS_SEGMENTS)
    };

    (0..=PROGRESS_SEGMENTS)
        .map(|i| if i == knob { "🔘" } else { "▬" })
        .collect()
}

fn reaction_role_lines(bindings: &[ReactionRoleBinding]) -> String {
    let mut lines = String::from("MessageId, EmoteId, Role");
    for binding in bindings {
        let _ = write!(
            lines,
            "\n{}, {}, <@&{}>",
            binding.message_id, binding.emote_display, binding.role_id
        );
    }
    lines
}

/// `m:ss`, or `h:mm:ss` from one hour up.
pub fn format_duration(duration: Duration) -> String {
    let total_seconds = duration.as_secs();
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;

    if hours > 0 {
        format!("{}:{:02}:{:02}", hours, minutes, seconds)
    } else {
        format!("{}:{:02}", minutes, seconds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{audio::track::test_track, cache::EmoteKey};
    use pretty_assertions::assert_eq;
    use serenity::model::id::{GuildId, MessageId, RoleId};

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_secs(0)), "0:00");
        assert_eq!(format_duration(Duration::from_secs(65)), "1:05");
        assert_eq!(format_duration(Duration::from_secs(3600 + 61)), "1:01:01");
    }

    #[test]
    fn test_progress_bar() {
        let start = progress_bar(Duration::ZERO, Duration::from_secs(300));
        assert_eq!(start.chars().count(), PROGRESS_SEGMENTS + 1);
        assert!(start.starts_with('🔘'));

        let middle = progress_bar(Duration::from_secs(150), Duration::from_secs(300));
        assert_eq!(middle.chars().position(|c| c == '🔘'), Some(15));

        let past_end = progress_bar(Duration::from_secs(400), Duration::from_secs(300));
        assert!(past_end.ends_with('🔘'));
    }

    #[test]
    fn test_queue_description() {
        let mut current = test_track("now", 90);
        current.position = Duration::from_secs(30);
        let queue = vec![test_track("a", 60), test_track("b", 3600)];

        let description = queue_description(Some(&current), &queue, Duration::from_secs(3720), 10);

        assert_eq!(
            description,
            "__Now Playing:__\n[Track now](https://example.com/now) | `1:30`\n\n\
             __Up Next:__\n\
             `1.` [Track a](https://example.com/a) | `1:00`\n\
             `2.` [Track b](https://example.com/b) | `1:00:00`\n\n\
             **2 tracks in queue | 1:02:00 total length**"
        );
    }

    #[test]
    fn test_queue_description_truncates_to_page() {
        let queue: Vec<Track> = (0..5).map(|i| test_track(&i.to_string(), 10)).collect();

        let description = queue_description(None, &queue, Duration::from_secs(50), 2);

        assert!(description.contains("`2.`"));
        assert!(!description.contains("`3.`"));
        assert!(description.contains("*…and 3 more*"));
        assert!(description.ends_with("**5 tracks in queue | 0:50 total length**"));
    }

    #[test]
    fn test_reaction_role_lines() {
        let bindings = vec![ReactionRoleBinding {
            guild_id: GuildId::new(1),
            message_id: MessageId::new(100),
            emote: EmoteKey::parse("<:party:555>").unwrap(),
            emote_display: "<:party:555>".to_string(),
            role_id: RoleId::new(7),
        }];

        assert_eq!(
            reaction_role_lines(&bindings),
            "MessageId, EmoteId, Role\n100, <:party:555>, <@&7>"
        );
    }
}
