use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// `cleanbot` - per-channel message retention for Discord.
#[derive(Parser, Debug)]
#[command(name = "cleanbot")]
#[command(version)]
#[command(about = "Deletes old messages from the Discord channels you enable.", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Path to config file (defaults to ~/.cleanbot/config.toml, created if missing)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Log at DEBUG instead of INFO
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    /// Connect to Discord and enforce retention (default)
    Run {
        /// Wait one cleaning interval before the first sweep of each channel
        #[arg(long)]
        startup_delay: bool,
    },

    /// Print the persisted channel → retention mapping
    Channels,

    /// Validate the configuration and print a summary
    CheckConfig,
}

impl Cli {
    /// The subcommand to run; `run` when none is given.
    pub fn command_or_default(&self) -> Commands {
        self.command.clone().unwrap_or(Commands::Run {
            startup_delay: false,
        })
    }
}
