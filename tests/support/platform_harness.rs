#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tempfile::TempDir;

use cleanbot::cleaner::{
    CancelHandle, CancellationRegistry, Cleaner, EngineSettings, RetentionStore, Scheduler,
    SchedulerSettings,
};
use cleanbot::error::PlatformError;
use cleanbot::transport::{
    ChannelId, ChannelSummary, ChatPlatform, GuildId, HistoryMessage, MessageId, Permissions,
    RoleId, UserId,
};

/// In-memory channel history with knobs for the failure modes the engine handles.
#[derive(Default)]
pub struct MemoryPlatform {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    next_id: u64,
    history: BTreeMap<ChannelId, Vec<HistoryMessage>>,
    fetches: usize,
    transient_failures: usize,
    cancel_on_fetch: Option<(usize, CancelHandle)>,
    deleted: usize,
    roles: HashMap<RoleId, String>,
    bot_permissions: HashMap<ChannelId, Permissions>,
    member_permissions: HashMap<UserId, Permissions>,
    sent: Vec<(ChannelId, String)>,
}

impl MemoryPlatform {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append messages; ids grow with the timestamp like snowflakes.
    pub fn seed(&self, channel: ChannelId, stamps: impl IntoIterator<Item = DateTime<Utc>>) {
        let mut stamps: Vec<_> = stamps.into_iter().collect();
        stamps.sort();
        let mut inner = self.lock();
        for timestamp in stamps {
            inner.next_id += 1;
            let id = MessageId(inner.next_id);
            inner
                .history
                .entry(channel)
                .or_default()
                .insert(0, HistoryMessage { id, timestamp });
        }
    }

    pub fn remaining(&self, channel: ChannelId) -> usize {
        self.lock().history.get(&channel).map_or(0, Vec::len)
    }

    pub fn fetches(&self) -> usize {
        self.lock().fetches
    }

    pub fn deleted(&self) -> usize {
        self.lock().deleted
    }

    /// The next `count` history fetches fail with a 503.
    pub fn fail_next_fetches(&self, count: usize) {
        self.lock().transient_failures = count;
    }

    /// Raise `handle` while serving the `fetch`-th history page (1-based).
    pub fn cancel_on_fetch(&self, fetch: usize, handle: CancelHandle) {
        self.lock().cancel_on_fetch = Some((fetch, handle));
    }

    pub fn add_role(&self, id: RoleId, name: &str) {
        self.lock().roles.insert(id, name.to_string());
    }

    pub fn sent(&self) -> Vec<(ChannelId, String)> {
        self.lock().sent.clone()
    }

    /// Restrict the bot in `channel`; unlisted channels grant everything.
    pub fn set_bot_permissions(&self, channel: ChannelId, permissions: Permissions) {
        self.lock().bot_permissions.insert(channel, permissions);
    }

    pub fn set_member_permissions(&self, member: UserId, permissions: Permissions) {
        self.lock().member_permissions.insert(member, permissions);
    }
}

#[async_trait]
impl ChatPlatform for MemoryPlatform {
    async fn fetch_history(
        &self,
        channel: ChannelId,
        before: Option<MessageId>,
        limit: usize,
    ) -> Result<Vec<HistoryMessage>, PlatformError> {
        let mut inner = self.lock();
        inner.fetches += 1;
        if inner.transient_failures > 0 {
            inner.transient_failures -= 1;
            return Err(PlatformError::Server {
                status: 503,
                message: "service unavailable".into(),
            });
        }
        if let Some((fetch, handle)) = &inner.cancel_on_fetch
            && inner.fetches >= *fetch
        {
            handle.cancel();
        }

        let page = inner
            .history
            .get(&channel)
            .map(|list| {
                list.iter()
                    .filter(|m| before.is_none_or(|cursor| m.id < cursor))
                    .take(limit)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        Ok(page)
    }

    async fn delete_message(
        &self,
        channel: ChannelId,
        message: MessageId,
    ) -> Result<(), PlatformError> {
        let mut inner = self.lock();
        let list = inner.history.entry(channel).or_default();
        let before = list.len();
        list.retain(|m| m.id != message);
        if list.len() == before {
            return Err(PlatformError::NotFound("unknown message".into()));
        }
        inner.deleted += 1;
        Ok(())
    }

    async fn resolve_text_channel(&self, channel: ChannelId) -> Result<bool, PlatformError> {
        Ok(self.lock().history.contains_key(&channel))
    }

    async fn guild_text_channels(
        &self,
        _guild: GuildId,
    ) -> Result<Vec<ChannelSummary>, PlatformError> {
        Ok(self
            .lock()
            .history
            .keys()
            .map(|id| ChannelSummary {
                id: *id,
                name: format!("channel-{id}"),
            })
            .collect())
    }

    async fn guild_role_names(
        &self,
        _guild: GuildId,
        roles: &[RoleId],
    ) -> Result<Vec<String>, PlatformError> {
        let inner = self.lock();
        Ok(roles
            .iter()
            .filter_map(|id| inner.roles.get(id).cloned())
            .collect())
    }

    async fn bot_channel_permissions(
        &self,
        channel: ChannelId,
    ) -> Result<Permissions, PlatformError> {
        Ok(self
            .lock()
            .bot_permissions
            .get(&channel)
            .copied()
            .unwrap_or(Permissions::ALL))
    }

    async fn member_guild_permissions(
        &self,
        _guild: GuildId,
        member: UserId,
    ) -> Result<Permissions, PlatformError> {
        Ok(self
            .lock()
            .member_permissions
            .get(&member)
            .copied()
            .unwrap_or_default())
    }

    async fn send_message(&self, channel: ChannelId, content: &str) -> Result<(), PlatformError> {
        self.lock().sent.push((channel, content.to_string()));
        Ok(())
    }
}

/// Engine settings with no pacing and a 1 ms retry backoff.
pub fn fast_engine() -> EngineSettings {
    EngineSettings {
        page_size: 100,
        delete_pacing: Duration::ZERO,
        scan_retry_base: Duration::from_millis(1),
        scan_retry_jitter: Duration::ZERO,
        max_scan_retries: 4,
    }
}

pub struct Stack {
    pub dir: TempDir,
    pub platform: Arc<MemoryPlatform>,
    pub scheduler: Arc<Scheduler>,
}

impl Stack {
    pub fn cleaner(&self) -> &Arc<Cleaner> {
        self.scheduler.cleaner()
    }

    pub fn store(&self) -> &Arc<RetentionStore> {
        self.cleaner().store()
    }
}

/// Store + registry + cleaner + scheduler over a fresh temp state file.
pub fn stack(interval: Duration, startup_delay: Option<Duration>) -> Stack {
    stack_with_engine(interval, startup_delay, fast_engine())
}

pub fn stack_with_engine(
    interval: Duration,
    startup_delay: Option<Duration>,
    engine: EngineSettings,
) -> Stack {
    let dir = TempDir::new().expect("temp dir");
    let platform = MemoryPlatform::new();
    let store = Arc::new(RetentionStore::load(dir.path().join("state.json"), 24));
    let cleaner = Cleaner::new(
        store,
        Arc::new(CancellationRegistry::new()),
        platform.clone(),
        engine,
    );
    let scheduler = Arc::new(Scheduler::new(
        Arc::new(cleaner),
        SchedulerSettings {
            interval,
            startup_delay,
        },
    ));
    Stack {
        dir,
        platform,
        scheduler,
    }
}

/// Deletes one message every `pacing`, so a run stays in flight long enough to interrupt.
pub fn paced_engine(pacing: Duration) -> EngineSettings {
    EngineSettings {
        delete_pacing: pacing,
        ..fast_engine()
    }
}

pub async fn eventually(mut check: impl FnMut() -> bool) -> bool {
    for _ in 0..300 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}
