//! Discord API constants and type definitions.

/// Discord API base URL (v10).
pub const API_BASE: &str = "https://discord.com/api/v10";

/// Discord CDN root for guild icons.
pub const CDN_BASE: &str = "https://cdn.discordapp.com";

/// Default Gateway intents bitmask.
///
/// GUILDS (1) | `GUILD_MESSAGES` (512) | `MESSAGE_CONTENT` (32768) = 33281
pub const DEFAULT_INTENTS: u64 = 33281;

/// Default heartbeat interval when server does not provide one (ms).
pub const DEFAULT_HEARTBEAT_INTERVAL_MS: u64 = 41250;

/// Discord maximum message length (characters).
pub const MAX_MESSAGE_LENGTH: usize = 2000;

/// Maximum page size accepted by `GET /channels/{id}/messages`.
pub const MAX_HISTORY_PAGE: usize = 100;

/// Gateway opcodes used in the Discord WebSocket protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum GatewayOpcode {
    /// An event was dispatched (server → client).
    Dispatch = 0,
    /// Fired periodically to keep the connection alive.
    Heartbeat = 1,
    /// Starts a new session during the initial handshake.
    Identify = 2,
    /// Resume a previous session that was disconnected.
    Resume = 6,
    /// Server is telling the client to reconnect.
    Reconnect = 7,
    /// The session has been invalidated.
    InvalidSession = 9,
    /// Sent immediately after connecting; contains heartbeat interval.
    Hello = 10,
    /// Acknowledges a received heartbeat.
    HeartbeatAck = 11,
}

impl GatewayOpcode {
    /// Convert a raw u64 value to an opcode, if valid.
    pub fn from_u64(value: u64) -> Option<Self> {
        match value {
            0 => Some(Self::Dispatch),
            1 => Some(Self::Heartbeat),
            2 => Some(Self::Identify),
            6 => Some(Self::Resume),
            7 => Some(Self::Reconnect),
            9 => Some(Self::InvalidSession),
            10 => Some(Self::Hello),
            11 => Some(Self::HeartbeatAck),
            _ => None,
        }
    }
}

/// Discord channel types relevant for retention.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum DiscordChannelType {
    GuildText = 0,
    Dm = 1,
    GuildVoice = 2,
    GroupDm = 3,
    GuildCategory = 4,
    GuildAnnouncement = 5,
    AnnouncementThread = 10,
    PublicThread = 11,
    PrivateThread = 12,
    GuildStageVoice = 13,
    GuildForum = 15,
}

impl DiscordChannelType {
    pub fn from_u64(value: u64) -> Option<Self> {
        match value {
            0 => Some(Self::GuildText),
            1 => Some(Self::Dm),
            2 => Some(Self::GuildVoice),
            3 => Some(Self::GroupDm),
            4 => Some(Self::GuildCategory),
            5 => Some(Self::GuildAnnouncement),
            10 => Some(Self::AnnouncementThread),
            11 => Some(Self::PublicThread),
            12 => Some(Self::PrivateThread),
            13 => Some(Self::GuildStageVoice),
            15 => Some(Self::GuildForum),
            _ => None,
        }
    }

    /// Guild text channels the cleaner can manage (plain text and announcement).
    pub fn is_guild_text(self) -> bool {
        matches!(self, Self::GuildText | Self::GuildAnnouncement)
    }
}
