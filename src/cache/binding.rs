use serde::{Deserialize, Serialize};
use serenity::model::{
    channel::ReactionType,
    id::{GuildId, MessageId, RoleId},
};
use std::fmt;

/// Identity of an emote inside a binding key.
///
/// Custom emotes are keyed by their numeric id so renames do not orphan a
/// binding; unicode emotes are keyed by their literal text.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EmoteKey(String);

impl EmoteKey {
    /// Parses an emote as typed in a command (`<:name:id>`, `<a:name:id>` or unicode).
    pub fn parse(input: &str) -> Option<Self> {
        let input = input.trim();
        if input.is_empty() {
            return None;
        }

        if let Some(inner) = input.strip_prefix('<').and_then(|s| s.strip_suffix('>')) {
            let parts: Vec<&str> = inner.split(':').collect();
            if let [animated, name, id] = parts.as_slice() {
                let is_custom = (animated.is_empty() || *animated == "a")
                    && !name.is_empty()
                    && !id.is_empty()
                    && id.bytes().all(|b| b.is_ascii_digit());
                if is_custom {
                    return Some(Self(id.to_string()));
                }
            }
        }

        Some(Self(input.to_string()))
    }

    /// Key of the emote carried by a gateway reaction event.
    pub fn from_reaction(reaction: &ReactionType) -> Option<Self> {
        match reaction {
            ReactionType::Custom { id, .. } => Some(Self(id.to_string())),
            ReactionType::Unicode(text) => Self::parse(text),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EmoteKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BindingKey {
    pub guild_id: GuildId,
    pub message_id: MessageId,
    pub emote: EmoteKey,
}

/// (guild, message, emote) → role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReactionRoleBinding {
    pub guild_id: GuildId,
    pub message_id: MessageId,
    pub emote: EmoteKey,
    /// Emote exactly as the admin typed it, used for listings.
    pub emote_display: String,
    pub role_id: RoleId,
}

impl ReactionRoleBinding {
    pub fn key(&self) -> BindingKey {
        BindingKey {
            guild_id: self.guild_id,
            message_id: self.message_id,
            emote: self.emote.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serenity::model::id::EmojiId;

    #[test]
    fn test_custom_emotes_key_by_id() {
        assert_eq!(EmoteKey::parse("<:party:12345>").unwrap().as_str(), "12345");
        assert_eq!(EmoteKey::parse("<a:dance:678>").unwrap().as_str(), "678");
    }

    #[test]
    fn test_unicode_and_malformed_emotes_key_by_text() {
        assert_eq!(EmoteKey::parse(" 👍 ").unwrap().as_str(), "👍");
        assert_eq!(EmoteKey::parse("<:broken>").unwrap().as_str(), "<:broken>");
        assert_eq!(EmoteKey::parse("<:name:abc>").unwrap().as_str(), "<:name:abc>");
        assert!(EmoteKey::parse("   ").is_none());
    }

    #[test]
    fn test_reaction_keys_match_typed_emotes() {
        let custom = ReactionType::Custom {
            animated: false,
            id: EmojiId::new(12345),
            name: Some("party".to_string()),
        };
        assert_eq!(EmoteKey::from_reaction(&custom), EmoteKey::parse("<:party:12345>"));

        let unicode = ReactionType::Unicode("🎵".to_string());
        assert_eq!(EmoteKey::from_reaction(&unicode), EmoteKey::parse("🎵"));
    }
}
