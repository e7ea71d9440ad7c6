use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use crate::cleaner::{MAX_RETENTION_HOURS, MIN_RETENTION_HOURS, Scheduler, TestSelector};
use crate::config::Config;
use crate::error::ConfigError;
use crate::transport::{ChannelId, Embed, EmbedAuthor, GuildId, Permissions};

use super::cooldown::CooldownTracker;
use super::types::{Command, CommandContext, CommandResult, usage};

const NO_PERMISSION: &str = "You do not have the required permissions to use this command.";
const MISSING_MANAGE_MESSAGES: &str =
    "I don't have **Manage Messages** in that channel, so I won't be able to clean it.";
const HELP_COLOR: u32 = 0x00FF_00;

/// Runs parsed commands against the store, the scheduler and the registry.
pub struct CommandHandler {
    scheduler: Arc<Scheduler>,
    prefix: String,
    moderator_roles: Vec<String>,
    cooldown: Duration,
    help_cooldown: Duration,
    cooldowns: Mutex<CooldownTracker>,
}

impl CommandHandler {
    pub fn new(scheduler: Arc<Scheduler>, config: &Config) -> Self {
        Self {
            scheduler,
            prefix: config.command_prefix.clone(),
            moderator_roles: config.moderator_roles.clone(),
            cooldown: Duration::from_secs(config.commands.cooldown_secs),
            help_cooldown: Duration::from_secs(config.commands.help_cooldown_secs),
            cooldowns: Mutex::new(CooldownTracker::new()),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Handle one command. `None` means the command was dropped (cooldown);
    /// otherwise the result is the single terminal reply.
    pub async fn handle(&self, ctx: &CommandContext, command: Command) -> Option<CommandResult> {
        let name = command.name();
        let window = if command == Command::Help {
            self.help_cooldown
        } else {
            self.cooldown
        };
        let acquired = self
            .cooldowns
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .try_acquire(ctx.author, name, window);
        if !acquired {
            tracing::debug!(user = %ctx.author, command = name, "command.cooldown");
            return None;
        }

        if !command.is_public() && !self.is_moderator(ctx).await {
            tracing::warn!(
                user = %ctx.author_name,
                command = name,
                "command.permission_denied"
            );
            return Some(CommandResult::text(NO_PERMISSION));
        }

        tracing::info!(user = %ctx.author_name, channel = %ctx.channel, command = name, "command.received");
        let result = match command {
            Command::EnableCleaner { channel } => {
                self.enable(channel.unwrap_or(ctx.channel), channel.is_some())
                    .await
            }
            Command::DisableCleaner { channel } => self.disable(channel.unwrap_or(ctx.channel)),
            Command::SetCleaningTime { hours } => self.set_cleaning_time(ctx.channel, hours),
            Command::TestCleaner { selector } => self.test_cleaner(ctx.channel, &selector).await,
            Command::CleanerSetting => self.cleaner_setting(ctx.channel),
            Command::ListChannels => self.list_channels(ctx).await,
            Command::CheckPermissions => self.check_permissions(ctx).await,
            Command::Help => CommandResult::Embed(self.help_embed(ctx.guild).await),
            Command::Malformed { name } => CommandResult::text(usage(&self.prefix, name)),
        };
        Some(result)
    }

    async fn is_moderator(&self, ctx: &CommandContext) -> bool {
        let Some(guild) = ctx.guild else {
            return false;
        };
        if ctx.role_ids.is_empty() {
            return false;
        }
        let platform = self.scheduler.cleaner().platform();
        match platform.guild_role_names(guild, &ctx.role_ids).await {
            Ok(names) => names
                .iter()
                .any(|name| self.moderator_roles.iter().any(|allowed| allowed == name)),
            Err(e) => {
                tracing::warn!(guild = %guild, error = %e, "command.role_lookup_failed");
                false
            }
        }
    }

    async fn enable(&self, channel: ChannelId, explicit: bool) -> CommandResult {
        let cleaner = self.scheduler.cleaner();
        if explicit {
            match cleaner.platform().resolve_text_channel(channel).await {
                Ok(true) => {}
                Ok(false) => {
                    return CommandResult::text(format!(
                        "Channel ID {channel} is not a text channel I can access."
                    ));
                }
                Err(e) => {
                    tracing::warn!(channel = %channel, error = %e, "command.enable.unverified");
                }
            }
        }

        match cleaner.platform().bot_channel_permissions(channel).await {
            Ok(perms) if !perms.contains(Permissions::MANAGE_MESSAGES) => {
                tracing::warn!(channel = %channel, permissions = %perms, "command.enable.missing_manage_messages");
                return CommandResult::text(MISSING_MANAGE_MESSAGES);
            }
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(channel = %channel, error = %e, "command.enable.permissions_unknown");
            }
        }

        cleaner.registry().clear(channel);
        let newly_enabled = cleaner.store().enable(channel);
        self.scheduler.arm(channel);

        if newly_enabled {
            tracing::info!(channel = %channel, "cleaner.enabled");
            CommandResult::text(format!("Cleaner enabled for channel ID: {channel}"))
        } else {
            let hours = cleaner.store().get(channel).unwrap_or_default();
            CommandResult::text(format!(
                "Cleaner is already enabled for channel ID: {channel} ({hours} hours)."
            ))
        }
    }

    fn disable(&self, channel: ChannelId) -> CommandResult {
        self.scheduler.disarm(channel);
        if self.scheduler.cleaner().store().remove(channel) {
            tracing::info!(channel = %channel, "cleaner.disabled");
            CommandResult::text(format!("Cleaner disabled for channel ID: {channel}"))
        } else {
            CommandResult::text(format!("Cleaner is not enabled for channel ID: {channel}"))
        }
    }

    fn set_cleaning_time(&self, channel: ChannelId, hours: i64) -> CommandResult {
        match self.scheduler.cleaner().store().set(channel, hours) {
            Ok(()) => {
                tracing::info!(channel = %channel, hours, "cleaner.retention_changed");
                CommandResult::text(format!(
                    "Cleaning time set to {hours} hours for channel ID: {channel}"
                ))
            }
            Err(ConfigError::RetentionOutOfRange { .. }) => CommandResult::text(format!(
                "Invalid time. Please set it to a value between {MIN_RETENTION_HOURS} and {MAX_RETENTION_HOURS} hours."
            )),
            Err(ConfigError::NotEnabled(_)) => {
                CommandResult::text(format!("Cleaner is not enabled for channel ID: {channel}"))
            }
            Err(e) => CommandResult::text(format!("Could not change cleaning time: {e}")),
        }
    }

    async fn test_cleaner(&self, channel: ChannelId, selector: &TestSelector) -> CommandResult {
        let cleaner = self.scheduler.cleaner();
        if !cleaner.store().contains(channel) {
            return CommandResult::text("Cleaner is not enabled.");
        }

        if let Err(e) = cleaner
            .platform()
            .send_message(channel, &selector.describe())
            .await
        {
            tracing::warn!(channel = %channel, error = %e, "command.test.announce_failed");
        }

        match cleaner.test_run(channel, selector).await {
            Ok(report) if report.cancelled => CommandResult::text(format!(
                "Test stopped. Deleted {} messages before the cleaner was disabled.",
                report.deleted
            )),
            Ok(report) => {
                CommandResult::text(format!("Test complete. Deleted {} messages.", report.deleted))
            }
            Err(e) => {
                tracing::error!(channel = %channel, error = %e, "command.test.failed");
                CommandResult::text(format!("Test run failed: {e}"))
            }
        }
    }

    fn cleaner_setting(&self, channel: ChannelId) -> CommandResult {
        match self.scheduler.cleaner().store().get(channel) {
            Some(hours) => CommandResult::text(format!(
                "Cleaner is enabled for this channel. Cleaning time is set to {hours} hours."
            )),
            None => CommandResult::text("Cleaner is not enabled for this channel."),
        }
    }

    async fn list_channels(&self, ctx: &CommandContext) -> CommandResult {
        let Some(guild) = ctx.guild else {
            return CommandResult::text("This command only works in a server.");
        };
        let cleaner = self.scheduler.cleaner();
        let channels = match cleaner.platform().guild_text_channels(guild).await {
            Ok(channels) => channels,
            Err(e) => {
                tracing::warn!(guild = %guild, error = %e, "command.list_channels_failed");
                return CommandResult::text(format!("Could not list channels: {e}"));
            }
        };

        let mut lines = vec!["Channels in this guild:".to_string()];
        for channel in channels {
            let marker = cleaner
                .store()
                .get(channel.id)
                .map(|hours| format!(" [cleaner: {hours}h]"))
                .unwrap_or_default();
            lines.push(format!("Channel: {} (ID: {}){marker}", channel.name, channel.id));
        }
        CommandResult::text(lines.join("\n"))
    }

    async fn check_permissions(&self, ctx: &CommandContext) -> CommandResult {
        let Some(guild) = ctx.guild else {
            return CommandResult::text("This command only works in a server.");
        };
        match self
            .scheduler
            .cleaner()
            .platform()
            .member_guild_permissions(guild, ctx.author)
            .await
        {
            Ok(perms) => CommandResult::text(format!("Your permissions: {perms}")),
            Err(e) => {
                tracing::warn!(guild = %guild, user = %ctx.author, error = %e, "command.check_permissions_failed");
                CommandResult::text(format!("Could not read your permissions: {e}"))
            }
        }
    }

    async fn help_embed(&self, guild: Option<GuildId>) -> Embed {
        let icon = match guild {
            Some(guild) => self
                .scheduler
                .cleaner()
                .platform()
                .guild_icon_url(guild)
                .await
                .unwrap_or_else(|e| {
                    tracing::debug!(guild = %guild, error = %e, "command.help.icon_lookup_failed");
                    None
                }),
            None => None,
        };
        let p = &self.prefix;
        let description = format!(
            "**Cleaner Bot Commands**\n\n\
             - `{p}enablecleaner [CHANNEL_ID]` - Enable the cleaner. If CHANNEL_ID is omitted, it enables in the current channel. Default retention: 24h.\n\
             - `{p}disablecleaner [CHANNEL_ID]` - Disable the cleaner and stop any run in progress.\n\
             - `{p}setcleaningtime HOURS` - Set the retention for the current channel. HOURS must be between {MIN_RETENTION_HOURS} and {MAX_RETENTION_HOURS}.\n\
             - `{p}testcleaner TIME` - Test run. TIME can be 'all', a number of hours (e.g., `12`), or `last<Nd><Nh><Nm>` like `last35m`, `last1h25m`, `last2d`.\n\
             - `{p}cleanersetting` - Check if the cleaner is enabled for the current channel and its retention.\n\
             - `{p}checkpermissions` - Show your guild permissions.\n\
             - `{p}listchannels` - List all text channels with their IDs.\n\
             - `{p}cleanerhelp` - List all cleaner commands.\n\n\
             Feel free to ask for help if you need more information."
        );
        Embed {
            title: "Cleaner Bot Help".to_string(),
            description,
            color: Some(HELP_COLOR),
            footer: Some("by: hitem".to_string()),
            author: Some(EmbedAuthor {
                name: "Cleaner Bot".to_string(),
                icon_url: icon.clone(),
            }),
            thumbnail_url: icon,
        }
    }
}
