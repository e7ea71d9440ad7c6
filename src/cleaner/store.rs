use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, StoreError};
use crate::transport::{ChannelId, ChatPlatform};

pub const MIN_RETENTION_HOURS: u32 = 1;
pub const MAX_RETENTION_HOURS: u32 = 72;
pub const DEFAULT_RETENTION_HOURS: u32 = 24;

/// Persisted per-channel retention. Presence means the cleaner is enabled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetentionEntry {
    pub time_to_keep: u32,
}

/// Channel → retention mapping backed by a JSON file.
///
/// The in-memory map is authoritative for the running process. Every
/// mutation rewrites the whole file; a failed write is logged and retried
/// implicitly by the next mutation.
pub struct RetentionStore {
    path: PathBuf,
    default_hours: u32,
    entries: Mutex<BTreeMap<ChannelId, RetentionEntry>>,
}

impl RetentionStore {
    /// Load the mapping at `path`. Missing or unreadable files yield an empty store.
    pub fn load(path: impl Into<PathBuf>, default_hours: u32) -> Self {
        let path = path.into();
        let entries = read_state_file(&path);
        tracing::info!(
            path = %path.display(),
            channels = entries.len(),
            "retention.store.loaded"
        );
        Self {
            path,
            default_hours,
            entries: Mutex::new(entries),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn get(&self, channel: ChannelId) -> Option<u32> {
        self.lock().get(&channel).map(|entry| entry.time_to_keep)
    }

    pub fn contains(&self, channel: ChannelId) -> bool {
        self.lock().contains_key(&channel)
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Sorted snapshot of every enabled channel and its retention.
    pub fn channels(&self) -> Vec<(ChannelId, u32)> {
        self.lock()
            .iter()
            .map(|(channel, entry)| (*channel, entry.time_to_keep))
            .collect()
    }

    /// Enable the cleaner with the default retention.
    ///
    /// Returns `false` (and leaves the current retention alone) when the
    /// channel is already enabled.
    pub fn enable(&self, channel: ChannelId) -> bool {
        let mut entries = self.lock();
        if entries.contains_key(&channel) {
            return false;
        }
        entries.insert(
            channel,
            RetentionEntry {
                time_to_keep: self.default_hours,
            },
        );
        self.flush_logged(&entries);
        true
    }

    /// Change the retention of an enabled channel. `hours` must be within 1–72.
    pub fn set(&self, channel: ChannelId, hours: i64) -> Result<(), ConfigError> {
        let hours = u32::try_from(hours)
            .ok()
            .filter(|h| (MIN_RETENTION_HOURS..=MAX_RETENTION_HOURS).contains(h))
            .ok_or(ConfigError::RetentionOutOfRange {
                hours,
                min: MIN_RETENTION_HOURS,
                max: MAX_RETENTION_HOURS,
            })?;

        let mut entries = self.lock();
        let Some(entry) = entries.get_mut(&channel) else {
            return Err(ConfigError::NotEnabled(channel.to_string()));
        };
        entry.time_to_keep = hours;
        self.flush_logged(&entries);
        Ok(())
    }

    /// Disable the cleaner. Returns whether an entry was removed.
    pub fn remove(&self, channel: ChannelId) -> bool {
        let mut entries = self.lock();
        let removed = entries.remove(&channel).is_some();
        if removed {
            self.flush_logged(&entries);
        }
        removed
    }

    /// Drop every listed channel with a single flush. Returns how many were removed.
    pub fn remove_many(&self, channels: &[ChannelId]) -> usize {
        let mut entries = self.lock();
        let before = entries.len();
        for channel in channels {
            entries.remove(channel);
        }
        let removed = before - entries.len();
        if removed > 0 {
            self.flush_logged(&entries);
        }
        removed
    }

    /// Remove entries whose channel no longer resolves to a live text channel.
    ///
    /// Lookup failures other than "gone" keep the entry.
    pub async fn prune_stale_channels(&self, platform: &dyn ChatPlatform) -> Vec<ChannelId> {
        let mut stale = Vec::new();
        for (channel, _) in self.channels() {
            match platform.resolve_text_channel(channel).await {
                Ok(true) => {}
                Ok(false) => {
                    tracing::warn!(channel = %channel, "Channel not found, removing from state");
                    stale.push(channel);
                }
                Err(e) => {
                    tracing::warn!(channel = %channel, error = %e, "Could not verify channel, keeping it");
                }
            }
        }
        self.remove_many(&stale);
        stale
    }

    /// Write the current mapping to disk.
    pub fn flush(&self) -> Result<(), StoreError> {
        let entries = self.lock();
        write_state_file(&self.path, &entries)
    }

    fn flush_logged(&self, entries: &BTreeMap<ChannelId, RetentionEntry>) {
        match write_state_file(&self.path, entries) {
            Ok(()) => tracing::debug!(path = %self.path.display(), "State saved successfully"),
            Err(e) => tracing::error!(error = %e, "Error saving state file"),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<ChannelId, RetentionEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn read_state_file(path: &Path) -> BTreeMap<ChannelId, RetentionEntry> {
    if !path.exists() {
        return BTreeMap::new();
    }

    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) => {
            tracing::error!(path = %path.display(), error = %e, "Error loading state file");
            return BTreeMap::new();
        }
    };

    let raw: BTreeMap<String, RetentionEntry> = match serde_json::from_str(&contents) {
        Ok(raw) => raw,
        Err(e) => {
            tracing::error!(path = %path.display(), error = %e, "Error loading state file");
            return BTreeMap::new();
        }
    };

    raw.into_iter()
        .filter_map(|(key, entry)| match key.parse::<ChannelId>() {
            Ok(channel) => Some((channel, entry)),
            Err(_) => {
                tracing::warn!(key = %key, "Ignoring state entry with invalid channel id");
                None
            }
        })
        .collect()
}

/// Serialize the full mapping to a sibling temp file, then rename over the target.
fn write_state_file(
    path: &Path,
    entries: &BTreeMap<ChannelId, RetentionEntry>,
) -> Result<(), StoreError> {
    let write_error = |message: String| StoreError::Write {
        path: path.display().to_string(),
        message,
    };

    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent).map_err(|e| write_error(e.to_string()))?;
    }

    let json =
        serde_json::to_string_pretty(entries).map_err(|e| StoreError::Serialize(e.to_string()))?;

    let mut tmp_name = path.file_name().unwrap_or_default().to_os_string();
    tmp_name.push(".tmp");
    let tmp_path = path.with_file_name(tmp_name);

    fs::write(&tmp_path, json).map_err(|e| write_error(e.to_string()))?;
    fs::rename(&tmp_path, path).map_err(|e| write_error(e.to_string()))?;
    Ok(())
}
