use crate::error::ConfigError;
use crate::transport::discord::types::{DEFAULT_INTENTS, MAX_HISTORY_PAGE};
use anyhow::{Context, Result};
use directories::UserDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

// ── Top-level config ──────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Path to config.toml - computed at load time, not serialized
    #[serde(skip)]
    pub config_path: PathBuf,

    /// Retention state file. Relative paths resolve against the config directory.
    #[serde(default = "default_state_file")]
    pub state_file: PathBuf,

    /// Prefix for chat commands (`!enablecleaner`).
    #[serde(default = "default_command_prefix")]
    pub command_prefix: String,

    /// Role names allowed to run moderator commands.
    #[serde(default = "default_moderator_roles")]
    pub moderator_roles: Vec<String>,

    #[serde(default)]
    pub discord: DiscordConfig,

    #[serde(default)]
    pub cleaner: CleanerConfig,

    #[serde(default)]
    pub commands: CommandsConfig,

    #[serde(default)]
    pub reliability: ReliabilityConfig,
}

fn default_state_file() -> PathBuf {
    PathBuf::from("cleaner_state.json")
}

fn default_command_prefix() -> String {
    "!".into()
}

fn default_moderator_roles() -> Vec<String> {
    vec!["Admins".into(), "Super Friends".into()]
}

// ── Discord ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DiscordConfig {
    /// Bot token. `DISCORD_BOT_TOKEN` overrides this value.
    #[serde(default)]
    pub bot_token: String,
    /// Gateway intents bitmask override.
    #[serde(default)]
    pub intents: Option<u64>,
}

impl DiscordConfig {
    pub fn effective_intents(&self) -> u64 {
        self.intents.unwrap_or(DEFAULT_INTENTS)
    }
}

// ── Cleaner ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CleanerConfig {
    /// Minutes between two sweeps of the same channel.
    #[serde(default = "default_interval_minutes")]
    pub interval_minutes: u64,
    /// Wait one interval before the first sweep of every job.
    #[serde(default)]
    pub startup_delay: bool,
    /// Retention written by `enablecleaner`.
    #[serde(default = "default_retention_hours")]
    pub default_retention_hours: u32,
    /// History page size (Discord caps this at 100).
    #[serde(default = "default_page_size")]
    pub page_size: usize,
    /// Pause between two single-message deletes.
    #[serde(default = "default_delete_pacing_ms")]
    pub delete_pacing_ms: u64,
    /// Base delay before retrying a history page after a server error.
    #[serde(default = "default_scan_retry_base_ms")]
    pub scan_retry_base_ms: u64,
    /// Upper bound of the random jitter added to the base delay.
    #[serde(default = "default_scan_retry_jitter_ms")]
    pub scan_retry_jitter_ms: u64,
    /// Consecutive server errors tolerated on one page before the run fails.
    #[serde(default = "default_max_scan_retries")]
    pub max_scan_retries: u32,
}

fn default_interval_minutes() -> u64 {
    15
}

fn default_retention_hours() -> u32 {
    24
}

fn default_page_size() -> usize {
    MAX_HISTORY_PAGE
}

fn default_delete_pacing_ms() -> u64 {
    1000
}

fn default_scan_retry_base_ms() -> u64 {
    2000
}

fn default_scan_retry_jitter_ms() -> u64 {
    3000
}

fn default_max_scan_retries() -> u32 {
    8
}

impl Default for CleanerConfig {
    fn default() -> Self {
        Self {
            interval_minutes: default_interval_minutes(),
            startup_delay: false,
            default_retention_hours: default_retention_hours(),
            page_size: default_page_size(),
            delete_pacing_ms: default_delete_pacing_ms(),
            scan_retry_base_ms: default_scan_retry_base_ms(),
            scan_retry_jitter_ms: default_scan_retry_jitter_ms(),
            max_scan_retries: default_max_scan_retries(),
        }
    }
}

impl CleanerConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_minutes.saturating_mul(60))
    }
}

// ── Commands ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandsConfig {
    /// Per-user cooldown for every command except help.
    #[serde(default = "default_cooldown_secs")]
    pub cooldown_secs: u64,
    /// Per-user cooldown for the help command.
    #[serde(default = "default_help_cooldown_secs")]
    pub help_cooldown_secs: u64,
}

fn default_cooldown_secs() -> u64 {
    10
}

fn default_help_cooldown_secs() -> u64 {
    30
}

impl Default for CommandsConfig {
    fn default() -> Self {
        Self {
            cooldown_secs: default_cooldown_secs(),
            help_cooldown_secs: default_help_cooldown_secs(),
        }
    }
}

// ── Reliability ───────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReliabilityConfig {
    /// Initial backoff for gateway restarts.
    #[serde(default = "default_channel_backoff_secs")]
    pub channel_initial_backoff_secs: u64,
    /// Max backoff for gateway restarts.
    #[serde(default = "default_channel_backoff_max_secs")]
    pub channel_max_backoff_secs: u64,
    /// Consecutive gateway failures before the supervisor gives up (0 = never).
    #[serde(default = "default_max_restarts")]
    pub max_restarts: u32,
}

fn default_channel_backoff_secs() -> u64 {
    2
}

fn default_channel_backoff_max_secs() -> u64 {
    60
}

fn default_max_restarts() -> u32 {
    10
}

impl Default for ReliabilityConfig {
    fn default() -> Self {
        Self {
            channel_initial_backoff_secs: default_channel_backoff_secs(),
            channel_max_backoff_secs: default_channel_backoff_max_secs(),
            max_restarts: default_max_restarts(),
        }
    }
}

// ── Loading / saving ──────────────────────────────────────────────

impl Default for Config {
    fn default() -> Self {
        Self {
            config_path: PathBuf::from("config.toml"),
            state_file: default_state_file(),
            command_prefix: default_command_prefix(),
            moderator_roles: default_moderator_roles(),
            discord: DiscordConfig::default(),
            cleaner: CleanerConfig::default(),
            commands: CommandsConfig::default(),
            reliability: ReliabilityConfig::default(),
        }
    }
}

impl Config {
    /// Load `~/.cleanbot/config.toml`, writing a default one on first run.
    pub fn load_or_init() -> Result<Self> {
        let home = UserDirs::new()
            .map(|u| u.home_dir().to_path_buf())
            .context("Could not find home directory")?;
        let cleanbot_dir = home.join(".cleanbot");
        if !cleanbot_dir.exists() {
            fs::create_dir_all(&cleanbot_dir).context("Failed to create .cleanbot directory")?;
        }
        Self::load_or_init_at(&cleanbot_dir.join("config.toml"))
    }

    /// Load the config at `config_path`, writing defaults there when it is missing.
    pub fn load_or_init_at(config_path: &Path) -> Result<Self> {
        let mut config = if config_path.exists() {
            let contents = fs::read_to_string(config_path).with_context(|| {
                format!("Failed to read config file: {}", config_path.display())
            })?;
            toml::from_str::<Config>(&contents).map_err(|e| {
                ConfigError::Load(format!("{}: {e}", config_path.display()))
            })?
        } else {
            let config = Self {
                config_path: config_path.to_path_buf(),
                ..Self::default()
            };
            config.save()?;
            config
        };

        config.config_path = config_path.to_path_buf();
        config.resolve_state_file();
        Ok(config)
    }

    fn config_dir(&self) -> PathBuf {
        self.config_path
            .parent()
            .map_or_else(|| PathBuf::from("."), Path::to_path_buf)
    }

    fn resolve_state_file(&mut self) {
        if self.state_file.is_relative() {
            self.state_file = self.config_dir().join(&self.state_file);
        }
    }

    pub fn apply_env_overrides(&mut self) {
        if let Ok(token) = std::env::var("DISCORD_BOT_TOKEN")
            && !token.trim().is_empty()
        {
            self.discord.bot_token = token.trim().to_string();
        }

        if let Ok(path) = std::env::var("CLEANBOT_STATE_FILE")
            && !path.trim().is_empty()
        {
            self.state_file = PathBuf::from(path.trim());
            self.resolve_state_file();
        }
    }

    /// Reject settings the cleaner cannot run with.
    ///
    /// `require_token` is false for offline subcommands that never talk to Discord.
    pub fn validate(&self, require_token: bool) -> std::result::Result<(), ConfigError> {
        if require_token && self.discord.bot_token.trim().is_empty() {
            return Err(ConfigError::Validation(
                "discord.bot_token is empty (set it in config.toml or DISCORD_BOT_TOKEN)".into(),
            ));
        }
        if self.cleaner.interval_minutes == 0 {
            return Err(ConfigError::Validation(
                "cleaner.interval_minutes must be at least 1".into(),
            ));
        }
        if !(1..=MAX_HISTORY_PAGE).contains(&self.cleaner.page_size) {
            return Err(ConfigError::Validation(format!(
                "cleaner.page_size must be between 1 and {MAX_HISTORY_PAGE}"
            )));
        }
        if self.command_prefix.trim().is_empty() {
            return Err(ConfigError::Validation(
                "command_prefix must not be empty".into(),
            ));
        }
        Ok(())
    }

    pub fn save(&self) -> std::result::Result<(), ConfigError> {
        let toml_str =
            toml::to_string_pretty(self).map_err(|e| ConfigError::Serialize(e.to_string()))?;
        fs::write(&self.config_path, toml_str)?;
        Ok(())
    }
}
