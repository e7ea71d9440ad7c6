use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::transport::ChannelId;

/// Interrupt signal handed to one deletion run.
///
/// Polled by the engine before every page fetch and every delete; pacing and
/// backoff sleeps wake up early when it fires.
#[derive(Debug, Clone)]
pub struct CancelHandle {
    channel: ChannelId,
    token: CancellationToken,
}

impl CancelHandle {
    /// A handle that is not linked to any registry.
    pub fn detached(channel: ChannelId) -> Self {
        Self {
            channel,
            token: CancellationToken::new(),
        }
    }

    pub fn channel(&self) -> ChannelId {
        self.channel
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Sleep for `duration` unless cancelled first. Returns `false` on cancellation.
    pub async fn sleep(&self, duration: Duration) -> bool {
        if duration.is_zero() {
            return !self.is_cancelled();
        }
        tokio::select! {
            () = self.token.cancelled() => false,
            () = tokio::time::sleep(duration) => !self.is_cancelled(),
        }
    }
}

/// Per-channel cancellation flags. Live process state; never persisted.
#[derive(Default)]
pub struct CancellationRegistry {
    flags: Mutex<HashMap<ChannelId, CancellationToken>>,
}

impl CancellationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raise the flag for `channel`. Idempotent; reaches every run holding a handle.
    pub fn cancel(&self, channel: ChannelId) {
        let mut flags = self.lock();
        flags.entry(channel).or_default().cancel();
        tracing::info!(channel = %channel, "cleaner.cancel_requested");
    }

    /// Lower the flag so new runs may start.
    ///
    /// An uncancelled token stays registered so in-flight runs still observe a
    /// later `cancel`.
    pub fn clear(&self, channel: ChannelId) {
        let mut flags = self.lock();
        if flags.get(&channel).is_some_and(CancellationToken::is_cancelled) {
            flags.remove(&channel);
        }
    }

    pub fn is_cancelled(&self, channel: ChannelId) -> bool {
        self.lock()
            .get(&channel)
            .is_some_and(CancellationToken::is_cancelled)
    }

    /// Handle for a run on `channel`, linked to the current flag.
    pub fn handle(&self, channel: ChannelId) -> CancelHandle {
        let token = self.lock().entry(channel).or_default().clone();
        CancelHandle { channel, token }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<ChannelId, CancellationToken>> {
        self.flags.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
