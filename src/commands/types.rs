use crate::cleaner::TestSelector;
use crate::transport::{ChannelId, Embed, GuildId, RoleId, UserId};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// `enablecleaner [CHANNEL_ID]`; `None` targets the current channel.
    EnableCleaner { channel: Option<ChannelId> },
    DisableCleaner { channel: Option<ChannelId> },
    /// Raw value; the range is checked by the handler so the reply can say why.
    SetCleaningTime { hours: i64 },
    TestCleaner { selector: TestSelector },
    CleanerSetting,
    ListChannels,
    /// Report the caller's guild-level permissions.
    CheckPermissions,
    Help,
    /// A known command with arguments that do not parse.
    Malformed { name: &'static str },
}

impl Command {
    /// Stable name, used for cooldown buckets and logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::EnableCleaner { .. } => "enablecleaner",
            Self::DisableCleaner { .. } => "disablecleaner",
            Self::SetCleaningTime { .. } => "setcleaningtime",
            Self::TestCleaner { .. } => "testcleaner",
            Self::CleanerSetting => "cleanersetting",
            Self::ListChannels => "listchannels",
            Self::CheckPermissions => "checkpermissions",
            Self::Help => "cleanerhelp",
            Self::Malformed { name } => *name,
        }
    }

    /// Commands anyone may run.
    pub fn is_public(&self) -> bool {
        matches!(
            self,
            Self::CleanerSetting | Self::CheckPermissions | Self::Help
        )
    }
}

/// Usage line for `name`, rendered with the configured prefix.
pub fn usage(prefix: &str, name: &str) -> String {
    match name {
        "enablecleaner" => format!("Usage: `{prefix}enablecleaner [CHANNEL_ID]`"),
        "disablecleaner" => format!("Usage: `{prefix}disablecleaner [CHANNEL_ID]`"),
        "setcleaningtime" => format!("Usage: `{prefix}setcleaningtime HOURS` (1-72)"),
        "testcleaner" => "Invalid time. Use 'all', a number of hours (e.g., `12`), or \
             `last<Nd><Nh><Nm>` like `last35m`, `last1h25m`, `last2d`."
            .to_string(),
        other => format!("Usage: `{prefix}{other}`"),
    }
}

/// Where a command came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandContext {
    pub channel: ChannelId,
    pub guild: Option<GuildId>,
    pub author: UserId,
    pub author_name: String,
    pub role_ids: Vec<RoleId>,
}

/// The terminal reply of a command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandResult {
    Text(String),
    Embed(Embed),
}

impl CommandResult {
    pub fn text(content: impl Into<String>) -> Self {
        Self::Text(content.into())
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            Self::Embed(_) => None,
        }
    }
}
