pub mod discord;
pub mod traits;

pub use traits::{
    ChannelId, ChannelSummary, ChatPlatform, Embed, EmbedAuthor, GuildId, HistoryMessage, MessageId,
    Permissions, RoleId, UserId,
};
