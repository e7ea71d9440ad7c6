pub mod cancel;
pub mod engine;
pub mod scheduler;
pub mod selector;
pub mod store;
#[cfg(test)]
pub(crate) mod testing;

use std::sync::Arc;

use chrono::Utc;

use crate::error::EngineError;
use crate::transport::{ChannelId, ChatPlatform};

pub use cancel::{CancelHandle, CancellationRegistry};
pub use engine::{DeletionReport, EngineSettings, delete_messages};
pub use scheduler::{JobState, Scheduler, SchedulerSettings};
pub use selector::{Selection, TestSelector, parse_last_duration};
pub use store::{
    DEFAULT_RETENTION_HOURS, MAX_RETENTION_HOURS, MIN_RETENTION_HOURS, RetentionEntry,
    RetentionStore,
};

/// The store, the cancellation registry and the platform, bundled for the
/// two kinds of run: scheduled sweeps and on-demand test runs.
pub struct Cleaner {
    store: Arc<RetentionStore>,
    registry: Arc<CancellationRegistry>,
    platform: Arc<dyn ChatPlatform>,
    settings: EngineSettings,
}

impl Cleaner {
    pub fn new(
        store: Arc<RetentionStore>,
        registry: Arc<CancellationRegistry>,
        platform: Arc<dyn ChatPlatform>,
        settings: EngineSettings,
    ) -> Self {
        Self {
            store,
            registry,
            platform,
            settings,
        }
    }

    pub fn store(&self) -> &Arc<RetentionStore> {
        &self.store
    }

    pub fn registry(&self) -> &Arc<CancellationRegistry> {
        &self.registry
    }

    pub fn platform(&self) -> &Arc<dyn ChatPlatform> {
        &self.platform
    }

    /// One scheduled sweep. `Ok(None)` when the channel has no retention entry.
    pub async fn sweep(&self, channel: ChannelId) -> Result<Option<DeletionReport>, EngineError> {
        let Some(hours) = self.store.get(channel) else {
            tracing::warn!(channel = %channel, "cleaner.sweep.not_enabled");
            return Ok(None);
        };

        tracing::info!(channel = %channel, retention_hours = hours, "cleaner.sweep.started");
        let selection = Selection::retention(Utc::now(), hours);
        let cancel = self.registry.handle(channel);
        delete_messages(
            self.platform.as_ref(),
            channel,
            &selection,
            &cancel,
            &self.settings,
        )
        .await
        .map(Some)
    }

    /// On-demand run with an explicit selector, sharing the channel's cancel flag.
    pub async fn test_run(
        &self,
        channel: ChannelId,
        selector: &TestSelector,
    ) -> Result<DeletionReport, EngineError> {
        let selection = selector.selection(Utc::now());
        tracing::info!(channel = %channel, selector = ?selector, "cleaner.test_run.started");
        let cancel = self.registry.handle(channel);
        delete_messages(
            self.platform.as_ref(),
            channel,
            &selection,
            &cancel,
            &self.settings,
        )
        .await
    }
}
