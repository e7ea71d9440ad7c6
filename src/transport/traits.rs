use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::PlatformError;

macro_rules! snowflake_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub u64);

        impl $name {
            pub const fn get(self) -> u64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = std::num::ParseIntError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                s.trim().parse::<u64>().map(Self)
            }
        }

        impl From<u64> for $name {
            fn from(value: u64) -> Self {
                Self(value)
            }
        }

        // Discord serializes snowflakes as strings; so does the state file.
        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.collect_str(&self.0)
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let raw = String::deserialize(deserializer)?;
                raw.parse().map_err(serde::de::Error::custom)
            }
        }
    };
}

snowflake_id!(
    /// Stable handle of a text channel on the host platform.
    ChannelId
);
snowflake_id!(
    /// Message identifier; also the pagination cursor.
    MessageId
);
snowflake_id!(GuildId);
snowflake_id!(UserId);
snowflake_id!(RoleId);

/// One item of a history page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryMessage {
    pub id: MessageId,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelSummary {
    pub id: ChannelId,
    pub name: String,
}

/// A simple embed reply (used by the help command).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Embed {
    pub title: String,
    pub description: String,
    pub color: Option<u32>,
    pub footer: Option<String>,
    pub author: Option<EmbedAuthor>,
    pub thumbnail_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmbedAuthor {
    pub name: String,
    pub icon_url: Option<String>,
}

/// Discord permission bitset.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Permissions(pub u64);

impl Permissions {
    pub const NONE: Self = Self(0);
    pub const ALL: Self = Self(u64::MAX);
    pub const ADMINISTRATOR: Self = Self(1 << 3);
    pub const MANAGE_CHANNELS: Self = Self(1 << 4);
    pub const VIEW_CHANNEL: Self = Self(1 << 10);
    pub const SEND_MESSAGES: Self = Self(1 << 11);
    pub const MANAGE_MESSAGES: Self = Self(1 << 13);
    pub const READ_MESSAGE_HISTORY: Self = Self(1 << 16);

    const NAMED: [(Self, &'static str); 6] = [
        (Self::ADMINISTRATOR, "administrator"),
        (Self::MANAGE_CHANNELS, "manage_channels"),
        (Self::VIEW_CHANNEL, "view_channel"),
        (Self::SEND_MESSAGES, "send_messages"),
        (Self::MANAGE_MESSAGES, "manage_messages"),
        (Self::READ_MESSAGE_HISTORY, "read_message_history"),
    ];

    pub const fn bits(self) -> u64 {
        self.0
    }

    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Everything a retention sweep needs in a channel.
    pub const fn can_clean(self) -> bool {
        self.contains(Self(
            Self::VIEW_CHANNEL.0 | Self::READ_MESSAGE_HISTORY.0 | Self::MANAGE_MESSAGES.0,
        ))
    }

    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    /// Apply a deny mask, then an allow mask.
    pub const fn overwrite(self, allow: u64, deny: u64) -> Self {
        Self((self.0 & !deny) | allow)
    }
}

impl std::ops::BitOr for Permissions {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        self.union(rhs)
    }
}

impl fmt::Display for Permissions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "value={}", self.0)?;
        let names: Vec<&str> = Self::NAMED
            .iter()
            .filter(|(flag, _)| self.contains(*flag))
            .map(|(_, name)| *name)
            .collect();
        if !names.is_empty() {
            write!(f, " ({})", names.join(", "))?;
        }
        Ok(())
    }
}

/// Everything the cleaner needs from the chat platform.
///
/// History pages are returned newest-first; `before` is an exclusive cursor.
#[async_trait]
pub trait ChatPlatform: Send + Sync {
    /// Fetch up to `limit` messages older than `before` (or the newest ones).
    async fn fetch_history(
        &self,
        channel: ChannelId,
        before: Option<MessageId>,
        limit: usize,
    ) -> Result<Vec<HistoryMessage>, PlatformError>;

    async fn delete_message(
        &self,
        channel: ChannelId,
        message: MessageId,
    ) -> Result<(), PlatformError>;

    /// `Ok(false)` when the channel is gone, inaccessible, or not a text channel.
    async fn resolve_text_channel(&self, channel: ChannelId) -> Result<bool, PlatformError>;

    async fn guild_text_channels(
        &self,
        guild: GuildId,
    ) -> Result<Vec<ChannelSummary>, PlatformError>;

    /// Names of the given roles within `guild`; unknown ids are skipped.
    async fn guild_role_names(
        &self,
        guild: GuildId,
        roles: &[RoleId],
    ) -> Result<Vec<String>, PlatformError>;

    /// Effective permissions of the bot's own member in `channel`.
    async fn bot_channel_permissions(
        &self,
        channel: ChannelId,
    ) -> Result<Permissions, PlatformError>;

    /// Guild-level permissions of `member` (roles only, no channel overwrites).
    async fn member_guild_permissions(
        &self,
        guild: GuildId,
        member: UserId,
    ) -> Result<Permissions, PlatformError>;

    async fn guild_icon_url(&self, _guild: GuildId) -> Result<Option<String>, PlatformError> {
        Ok(None)
    }

    async fn send_message(&self, channel: ChannelId, content: &str) -> Result<(), PlatformError>;

    async fn send_embed(&self, channel: ChannelId, embed: &Embed) -> Result<(), PlatformError> {
        let text = format!("**{}**\n{}", embed.title, embed.description);
        self.send_message(channel, &text).await
    }
}
