use anyhow::Result;
use std::future::Future;
use tokio::task::JoinHandle;
use tokio::time::Duration;

use crate::config::ReliabilityConfig;

/// Keep a long-running component alive, restarting it with exponential
/// backoff. The circuit opens after `max_restarts` consecutive failures
/// (`0` means never).
pub fn spawn_component_supervisor<F, Fut>(
    name: &'static str,
    reliability: &ReliabilityConfig,
    mut run_component: F,
) -> JoinHandle<()>
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    let initial_backoff_secs = reliability.channel_initial_backoff_secs.max(1);
    let max_backoff = reliability
        .channel_max_backoff_secs
        .max(initial_backoff_secs);
    let max_restarts = reliability.max_restarts;

    tokio::spawn(async move {
        let mut backoff = initial_backoff_secs;
        let mut consecutive_failures: u32 = 0;

        loop {
            tracing::info!("Component '{name}' starting");
            match run_component().await {
                Ok(()) => {
                    tracing::warn!("Component '{name}' exited, restarting");
                    backoff = initial_backoff_secs;
                    consecutive_failures = 0;
                }
                Err(e) => {
                    tracing::error!("Component '{name}' failed: {e:#}");
                    consecutive_failures = consecutive_failures.saturating_add(1);
                }
            }

            if max_restarts > 0 && consecutive_failures > max_restarts {
                tracing::error!(
                    "Component '{name}' exceeded max restarts ({max_restarts}), circuit open"
                );
                break;
            }
            tokio::time::sleep(Duration::from_secs(backoff)).await;
            backoff = backoff.saturating_mul(2).min(max_backoff);
        }
    })
}
