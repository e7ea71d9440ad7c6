use crate::cli::Commands;
use std::sync::Arc;
use tracing::info;

use crate::app::status::{render_channels, render_status};
use crate::cleaner::RetentionStore;
use crate::config::Config;
use crate::error::Result;

pub async fn dispatch(command: Commands, config: Arc<Config>) -> Result<()> {
    match command {
        Commands::Run { startup_delay } => {
            let startup_delay = startup_delay || config.cleaner.startup_delay;
            info!(
                interval_minutes = config.cleaner.interval_minutes,
                startup_delay, "Starting cleanbot"
            );
            crate::daemon::run(config, startup_delay).await
        }

        Commands::Channels => {
            config.validate(false)?;
            let store = RetentionStore::load(
                config.state_file.clone(),
                config.cleaner.default_retention_hours,
            );
            println!("{}", render_channels(&store));
            Ok(())
        }

        Commands::CheckConfig => {
            println!("{}", render_status(&config));
            config.validate(true)?;
            println!();
            println!("Configuration OK");
            Ok(())
        }
    }
}
