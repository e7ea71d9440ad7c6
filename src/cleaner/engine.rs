//! Paginated history scan followed by paced, one-at-a-time deletion.

use std::time::Duration;

use crate::config::CleanerConfig;
use crate::error::EngineError;
use crate::transport::{ChannelId, ChatPlatform, MessageId};

use super::cancel::CancelHandle;
use super::selector::Selection;

/// Tunables for one deletion run.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub page_size: usize,
    pub delete_pacing: Duration,
    pub scan_retry_base: Duration,
    pub scan_retry_jitter: Duration,
    pub max_scan_retries: u32,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            page_size: 100,
            delete_pacing: Duration::from_secs(1),
            scan_retry_base: Duration::from_secs(2),
            scan_retry_jitter: Duration::from_secs(3),
            max_scan_retries: 8,
        }
    }
}

impl From<&CleanerConfig> for EngineSettings {
    fn from(config: &CleanerConfig) -> Self {
        Self {
            page_size: config.page_size,
            delete_pacing: Duration::from_millis(config.delete_pacing_ms),
            scan_retry_base: Duration::from_millis(config.scan_retry_base_ms),
            scan_retry_jitter: Duration::from_millis(config.scan_retry_jitter_ms),
            max_scan_retries: config.max_scan_retries,
        }
    }
}

impl EngineSettings {
    fn scan_backoff(&self) -> Duration {
        let jitter_ms = u64::try_from(self.scan_retry_jitter.as_millis()).unwrap_or(u64::MAX);
        let jitter = if jitter_ms == 0 {
            0
        } else {
            rand::random_range(0..=jitter_ms)
        };
        self.scan_retry_base + Duration::from_millis(jitter)
    }
}

/// Outcome of one run. `deleted` is exact.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeletionReport {
    /// Non-empty history pages read.
    pub pages: usize,
    pub scanned: usize,
    pub candidates: usize,
    pub deleted: usize,
    /// Candidates whose delete call failed.
    pub skipped: usize,
    pub cancelled: bool,
}

/// Delete every message in `channel` that `selection` matches.
///
/// Cancellation is observed before each page fetch, before each delete and
/// during every pacing or backoff sleep. A cancelled scan keeps what it has
/// collected and hands it to the delete phase, which then stops at its first
/// check, so a cancelled run never deletes after the flag is raised.
pub async fn delete_messages(
    platform: &dyn ChatPlatform,
    channel: ChannelId,
    selection: &Selection,
    cancel: &CancelHandle,
    settings: &EngineSettings,
) -> Result<DeletionReport, EngineError> {
    let mut report = DeletionReport::default();
    if selection.is_empty() {
        tracing::debug!(channel = %channel, "cleaner.run.empty_selection");
        return Ok(report);
    }

    let candidates = scan(platform, channel, selection, cancel, settings, &mut report).await?;
    report.candidates = candidates.len();
    tracing::info!(
        channel = %channel,
        pages = report.pages,
        scanned = report.scanned,
        candidates = report.candidates,
        "cleaner.scan.finished"
    );

    let total = candidates.len();
    for (index, message) in candidates.into_iter().enumerate() {
        if cancel.is_cancelled() {
            report.cancelled = true;
            break;
        }

        match platform.delete_message(channel, message).await {
            Ok(()) => report.deleted += 1,
            Err(e) => {
                report.skipped += 1;
                tracing::warn!(
                    channel = %channel,
                    message = %message,
                    error = %e,
                    "cleaner.delete.skipped"
                );
            }
        }

        let is_last = index + 1 == total;
        if !is_last && !cancel.sleep(settings.delete_pacing).await {
            report.cancelled = true;
            break;
        }
    }

    if report.cancelled {
        tracing::info!(
            channel = %channel,
            deleted = report.deleted,
            candidates = report.candidates,
            "cleaner.run.cancelled"
        );
    } else {
        tracing::info!(
            channel = %channel,
            deleted = report.deleted,
            skipped = report.skipped,
            "cleaner.run.finished"
        );
    }
    Ok(report)
}

async fn scan(
    platform: &dyn ChatPlatform,
    channel: ChannelId,
    selection: &Selection,
    cancel: &CancelHandle,
    settings: &EngineSettings,
    report: &mut DeletionReport,
) -> Result<Vec<MessageId>, EngineError> {
    let mut candidates = Vec::new();
    let mut cursor: Option<MessageId> = None;
    let mut failures = 0_u32;

    loop {
        if cancel.is_cancelled() {
            report.cancelled = true;
            break;
        }

        let page = match platform
            .fetch_history(channel, cursor, settings.page_size)
            .await
        {
            Ok(page) => {
                failures = 0;
                page
            }
            Err(e) if e.is_transient() => {
                failures += 1;
                if failures >= settings.max_scan_retries {
                    return Err(EngineError::ScanRetriesExhausted {
                        channel: channel.to_string(),
                        attempts: failures,
                    });
                }
                let backoff = settings.scan_backoff();
                tracing::warn!(
                    channel = %channel,
                    attempt = failures,
                    backoff_ms = u64::try_from(backoff.as_millis()).unwrap_or(u64::MAX),
                    error = %e,
                    "cleaner.scan.retry"
                );
                if !cancel.sleep(backoff).await {
                    report.cancelled = true;
                    break;
                }
                continue;
            }
            Err(source) => {
                return Err(EngineError::Scan {
                    channel: channel.to_string(),
                    source,
                });
            }
        };

        let Some(oldest) = page.last() else {
            break;
        };
        cursor = Some(oldest.id);
        report.pages += 1;
        report.scanned += page.len();
        candidates.extend(
            page.iter()
                .filter(|message| selection.matches(message.timestamp))
                .map(|message| message.id),
        );
    }

    Ok(candidates)
}
