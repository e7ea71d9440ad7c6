pub mod dispatch;
pub mod status;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::task::JoinHandle;

use crate::cleaner::{
    CancellationRegistry, Cleaner, EngineSettings, RetentionStore, Scheduler, SchedulerSettings,
};
use crate::commands::{CommandContext, CommandHandler, CommandResult, parse_command};
use crate::config::Config;
use crate::transport::discord::GatewayEvent;
use crate::transport::{ChannelId, ChatPlatform};

/// Wires the retention store, the scheduler and the command surface to
/// gateway events.
pub struct CleanerBot {
    scheduler: Arc<Scheduler>,
    handler: Arc<CommandHandler>,
    ready: AtomicBool,
}

impl CleanerBot {
    pub fn new(scheduler: Arc<Scheduler>, handler: Arc<CommandHandler>) -> Self {
        Self {
            scheduler,
            handler,
            ready: AtomicBool::new(false),
        }
    }

    /// Build every component from `config`. `startup_delay` forces the
    /// one-interval grace period on first arming.
    pub fn from_config(
        config: &Config,
        platform: Arc<dyn ChatPlatform>,
        startup_delay: bool,
    ) -> Self {
        let store = Arc::new(RetentionStore::load(
            config.state_file.clone(),
            config.cleaner.default_retention_hours,
        ));
        let cleaner = Cleaner::new(
            store,
            Arc::new(CancellationRegistry::new()),
            platform,
            EngineSettings::from(&config.cleaner),
        );

        let mut settings = SchedulerSettings::from_config(&config.cleaner);
        if startup_delay {
            settings.startup_delay = Some(settings.interval);
        }
        let scheduler = Arc::new(Scheduler::new(Arc::new(cleaner), settings));
        let handler = Arc::new(CommandHandler::new(Arc::clone(&scheduler), config));
        Self::new(scheduler, handler)
    }

    pub fn scheduler(&self) -> &Arc<Scheduler> {
        &self.scheduler
    }

    /// Dispatch one gateway event. Commands run on their own task so the
    /// gateway loop keeps reading; the handle is returned for callers that
    /// want to wait on it.
    pub async fn handle_event(&self, event: GatewayEvent) -> Option<JoinHandle<()>> {
        match event {
            GatewayEvent::Ready { user_name, .. } => {
                tracing::info!(user = %user_name, "Discord gateway ready");
                self.on_ready().await;
                None
            }
            GatewayEvent::MessageCreate {
                channel_id,
                guild_id,
                author_id,
                author_name,
                author_is_bot,
                role_ids,
                content,
            } => {
                if author_is_bot {
                    return None;
                }
                let command = parse_command(self.handler.prefix(), &content)?;
                let ctx = CommandContext {
                    channel: channel_id,
                    guild: guild_id,
                    author: author_id,
                    author_name,
                    role_ids,
                };
                let handler = Arc::clone(&self.handler);
                let platform = Arc::clone(self.scheduler.cleaner().platform());
                Some(tokio::spawn(async move {
                    if let Some(result) = handler.handle(&ctx, command).await {
                        send_reply(platform.as_ref(), ctx.channel, &result).await;
                    }
                }))
            }
        }
    }

    /// First READY only: prune channels that no longer exist, then arm
    /// every persisted channel. Later READYs (reconnects) are no-ops.
    pub async fn on_ready(&self) -> usize {
        if self.ready.swap(true, Ordering::SeqCst) {
            return 0;
        }

        let cleaner = self.scheduler.cleaner();
        let stale = cleaner
            .store()
            .prune_stale_channels(cleaner.platform().as_ref())
            .await;
        if !stale.is_empty() {
            tracing::info!(removed = stale.len(), "Pruned stale channels from state");
        }

        let channels = cleaner.store().channels().into_iter().map(|(id, _)| id);
        let armed = self.scheduler.arm_all(channels);
        tracing::info!(armed, "Cleaner jobs armed");
        armed
    }

    pub fn shutdown(&self) {
        self.scheduler.shutdown();
    }
}

async fn send_reply(platform: &dyn ChatPlatform, channel: ChannelId, result: &CommandResult) {
    let sent = match result {
        CommandResult::Text(text) => platform.send_message(channel, text).await,
        CommandResult::Embed(embed) => platform.send_embed(channel, embed).await,
    };
    if let Err(e) = sent {
        tracing::warn!(channel = %channel, error = %e, "Failed to send command reply");
    }
}
