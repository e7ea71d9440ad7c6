use crate::app::CleanerBot;
use crate::config::Config;
use crate::transport::discord::{
    DiscordGateway, DiscordGatewayState, DiscordHttpClient, GatewayEvent,
};
use crate::error::Result;
use anyhow::Context;
use std::sync::Arc;
use tokio::sync::mpsc;

mod supervisor;

pub use supervisor::spawn_component_supervisor;

const EVENT_BUFFER: usize = 256;

/// Connect to Discord and enforce retention until Ctrl-C.
pub async fn run(config: Arc<Config>, startup_delay: bool) -> Result<()> {
    config.validate(true)?;

    let http = Arc::new(DiscordHttpClient::new(config.discord.bot_token.clone()));
    let bot = CleanerBot::from_config(&config, http.clone(), startup_delay);

    let (tx, mut rx) = mpsc::channel::<GatewayEvent>(EVENT_BUFFER);
    let gateway_state = Arc::new(DiscordGatewayState::default());
    let token = config.discord.bot_token.clone();
    let intents = config.discord.effective_intents();

    let gateway = spawn_component_supervisor("gateway", &config.reliability, move || {
        let gateway = DiscordGateway::new(token.clone(), intents, Arc::clone(&gateway_state));
        let http = Arc::clone(&http);
        let tx = tx.clone();
        async move {
            loop {
                gateway.connect_and_listen(&http, &tx).await?;
                if tx.is_closed() {
                    return Ok(());
                }
                tracing::info!("Discord gateway session ended, reconnecting");
            }
        }
    });

    println!("◆ cleanbot started");
    println!("   State file: {}", config.state_file.display());
    println!("   Ctrl+C to stop");

    loop {
        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                signal.context("listen for Ctrl-C")?;
                tracing::info!("Shutdown requested");
                break;
            }
            event = rx.recv() => {
                let Some(event) = event else {
                    tracing::error!("Gateway component stopped; shutting down");
                    break;
                };
                bot.handle_event(event).await;
            }
        }
    }

    bot.shutdown();
    gateway.abort();
    let _ = gateway.await;
    Ok(())
}
