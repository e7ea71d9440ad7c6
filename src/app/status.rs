use crate::cleaner::RetentionStore;
use crate::config::Config;

/// Summary printed by `check-config`.
pub fn render_status(config: &Config) -> String {
    let token = if config.discord.bot_token.trim().is_empty() {
        "(missing)"
    } else {
        "(set)"
    };
    let startup_delay = if config.cleaner.startup_delay {
        "on"
    } else {
        "off"
    };

    [
        "◆ cleanbot".to_string(),
        String::new(),
        format!("Version        {}", env!("CARGO_PKG_VERSION")),
        format!("Config         {}", config.config_path.display()),
        format!("State file     {}", config.state_file.display()),
        format!("Bot token      {token}"),
        format!("Intents        {}", config.discord.effective_intents()),
        format!("Prefix         {}", config.command_prefix),
        format!("Moderators     {}", config.moderator_roles.join(", ")),
        String::new(),
        format!(
            "Interval       {} min (startup delay {startup_delay})",
            config.cleaner.interval_minutes
        ),
        format!(
            "Retention      {}h default",
            config.cleaner.default_retention_hours
        ),
        format!(
            "Scan           page={}, retries={}, backoff={}ms+{}ms",
            config.cleaner.page_size,
            config.cleaner.max_scan_retries,
            config.cleaner.scan_retry_base_ms,
            config.cleaner.scan_retry_jitter_ms
        ),
        format!("Delete pacing  {}ms", config.cleaner.delete_pacing_ms),
        format!(
            "Cooldowns      {}s (help {}s)",
            config.commands.cooldown_secs, config.commands.help_cooldown_secs
        ),
    ]
    .join("\n")
}

/// The persisted channel → retention mapping, one line per channel.
pub fn render_channels(store: &RetentionStore) -> String {
    let channels = store.channels();
    if channels.is_empty() {
        return format!("No channels enabled ({}).", store.path().display());
    }

    let mut lines = vec![format!("Enabled channels ({}):", store.path().display())];
    lines.extend(
        channels
            .into_iter()
            .map(|(channel, hours)| format!("  - {channel}: {hours}h")),
    );
    lines.join("\n")
}
