//! In-memory `ChatPlatform` used by unit tests.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::PlatformError;
use crate::transport::{
    ChannelId, ChannelSummary, ChatPlatform, Embed, GuildId, HistoryMessage, MessageId,
    Permissions, RoleId, UserId,
};

use super::cancel::CancelHandle;

#[derive(Default)]
struct State {
    next_id: u64,
    history: BTreeMap<ChannelId, Vec<HistoryMessage>>,
    cursors: Vec<Option<MessageId>>,
    history_failures: HashMap<usize, PlatformError>,
    forbidden: HashSet<MessageId>,
    deleted: Vec<(ChannelId, MessageId)>,
    cancel_after_deletes: Option<(usize, CancelHandle)>,
    live_channels: HashSet<ChannelId>,
    unverifiable: HashSet<ChannelId>,
    guild_channels: Vec<ChannelSummary>,
    roles: HashMap<RoleId, String>,
    bot_permissions: HashMap<ChannelId, Permissions>,
    member_permissions: HashMap<UserId, Permissions>,
    guild_icon: Option<String>,
    sent: Vec<(ChannelId, String)>,
    embeds: Vec<(ChannelId, Embed)>,
}

#[derive(Default)]
pub(crate) struct FakePlatform {
    state: Mutex<State>,
}

impl FakePlatform {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Add messages with the given timestamps. Ids grow with time, like snowflakes.
    /// Returns the ids in input order.
    pub fn seed(&self, channel: ChannelId, stamps: &[DateTime<Utc>]) -> Vec<MessageId> {
        let mut state = self.lock();
        let mut order: Vec<usize> = (0..stamps.len()).collect();
        order.sort_by_key(|&i| stamps[i]);

        let mut ids = vec![MessageId(0); stamps.len()];
        for i in order {
            state.next_id += 1;
            ids[i] = MessageId(1_000 + state.next_id);
        }

        let list = state.history.entry(channel).or_default();
        for (id, timestamp) in ids.iter().zip(stamps) {
            list.push(HistoryMessage {
                id: *id,
                timestamp: *timestamp,
            });
        }
        list.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then(b.id.cmp(&a.id)));
        state.live_channels.insert(channel);
        ids
    }

    pub fn remaining(&self, channel: ChannelId) -> usize {
        self.lock().history.get(&channel).map_or(0, Vec::len)
    }

    pub fn history_calls(&self) -> usize {
        self.lock().cursors.len()
    }

    pub fn cursors(&self) -> Vec<Option<MessageId>> {
        self.lock().cursors.clone()
    }

    pub fn oldest_of_first_page(&self, channel: ChannelId, page_size: usize) -> MessageId {
        self.lock().history[&channel][page_size - 1].id
    }

    /// Fail the `call`-th history fetch (1-based) with `error`.
    pub fn fail_history_on_call(&self, call: usize, error: PlatformError) {
        self.lock().history_failures.insert(call, error);
    }

    pub fn forbid_delete(&self, message: MessageId) {
        self.lock().forbidden.insert(message);
    }

    pub fn deleted(&self) -> Vec<(ChannelId, MessageId)> {
        self.lock().deleted.clone()
    }

    pub fn cancel_after_deletes(&self, count: usize, handle: CancelHandle) {
        self.lock().cancel_after_deletes = Some((count, handle));
    }

    pub fn add_live_channel(&self, channel: ChannelId) {
        self.lock().live_channels.insert(channel);
    }

    pub fn add_unverifiable_channel(&self, channel: ChannelId) {
        self.lock().unverifiable.insert(channel);
    }

    pub fn add_guild_channel(&self, id: ChannelId, name: &str) {
        self.lock().guild_channels.push(ChannelSummary {
            id,
            name: name.to_string(),
        });
    }

    pub fn add_role(&self, id: RoleId, name: &str) {
        self.lock().roles.insert(id, name.to_string());
    }

    /// Override the bot's permissions in `channel` (default: everything).
    pub fn set_bot_permissions(&self, channel: ChannelId, permissions: Permissions) {
        self.lock().bot_permissions.insert(channel, permissions);
    }

    pub fn set_member_permissions(&self, member: UserId, permissions: Permissions) {
        self.lock().member_permissions.insert(member, permissions);
    }

    pub fn set_guild_icon(&self, url: &str) {
        self.lock().guild_icon = Some(url.to_string());
    }

    pub fn sent(&self) -> Vec<(ChannelId, String)> {
        self.lock().sent.clone()
    }

    pub fn embeds(&self) -> Vec<(ChannelId, Embed)> {
        self.lock().embeds.clone()
    }
}

#[async_trait]
impl ChatPlatform for FakePlatform {
    async fn fetch_history(
        &self,
        channel: ChannelId,
        before: Option<MessageId>,
        limit: usize,
    ) -> Result<Vec<HistoryMessage>, PlatformError> {
        let mut state = self.lock();
        state.cursors.push(before);
        let call = state.cursors.len();
        if let Some(error) = state.history_failures.remove(&call) {
            return Err(error);
        }

        let Some(list) = state.history.get(&channel) else {
            return Ok(Vec::new());
        };
        let start = match before {
            None => 0,
            Some(cursor) => list
                .iter()
                .position(|m| m.id == cursor)
                .map_or_else(|| list.iter().take_while(|m| m.id >= cursor).count(), |i| i + 1),
        };
        Ok(list.iter().skip(start).take(limit).cloned().collect())
    }

    async fn delete_message(
        &self,
        channel: ChannelId,
        message: MessageId,
    ) -> Result<(), PlatformError> {
        let mut state = self.lock();
        if state.forbidden.contains(&message) {
            return Err(PlatformError::Forbidden("missing permissions".into()));
        }
        let Some(list) = state.history.get_mut(&channel) else {
            return Err(PlatformError::NotFound("unknown channel".into()));
        };
        let before = list.len();
        list.retain(|m| m.id != message);
        if list.len() == before {
            return Err(PlatformError::NotFound("unknown message".into()));
        }
        state.deleted.push((channel, message));

        let deleted = state.deleted.len();
        if let Some((count, handle)) = &state.cancel_after_deletes
            && deleted >= *count
        {
            handle.cancel();
        }
        Ok(())
    }

    async fn resolve_text_channel(&self, channel: ChannelId) -> Result<bool, PlatformError> {
        let state = self.lock();
        if state.unverifiable.contains(&channel) {
            return Err(PlatformError::Server {
                status: 500,
                message: "lookup failed".into(),
            });
        }
        Ok(state.live_channels.contains(&channel))
    }

    async fn guild_text_channels(
        &self,
        _guild: GuildId,
    ) -> Result<Vec<ChannelSummary>, PlatformError> {
        Ok(self.lock().guild_channels.clone())
    }

    async fn guild_role_names(
        &self,
        _guild: GuildId,
        roles: &[RoleId],
    ) -> Result<Vec<String>, PlatformError> {
        let state = self.lock();
        Ok(roles
            .iter()
            .filter_map(|id| state.roles.get(id).cloned())
            .collect())
    }

    async fn bot_channel_permissions(
        &self,
        channel: ChannelId,
    ) -> Result<Permissions, PlatformError> {
        let state = self.lock();
        if state.unverifiable.contains(&channel) {
            return Err(PlatformError::Server {
                status: 500,
                message: "lookup failed".into(),
            });
        }
        Ok(state
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

    async fn guild_icon_url(&self, _guild: GuildId) -> Result<Option<String>, PlatformError> {
        Ok(self.lock().guild_icon.clone())
    }

    async fn send_message(&self, channel: ChannelId, content: &str) -> Result<(), PlatformError> {
        self.lock().sent.push((channel, content.to_string()));
        Ok(())
    }

    async fn send_embed(&self, channel: ChannelId, embed: &Embed) -> Result<(), PlatformError> {
        self.lock().embeds.push((channel, embed.clone()));
        Ok(())
    }
}
