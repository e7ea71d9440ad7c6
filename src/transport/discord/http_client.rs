use std::{
    collections::HashMap,
    sync::Arc,
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Method, Response, header::HeaderMap};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use serde_json::json;
use tokio::{
    sync::{Mutex, OnceCell},
    time::sleep,
};

use super::permissions::{MemberRoles, Overwrite, OverwriteTarget, channel_permissions};
use super::types::{API_BASE, CDN_BASE, DiscordChannelType, MAX_HISTORY_PAGE, MAX_MESSAGE_LENGTH};
use crate::error::PlatformError;
use crate::transport::traits::{
    ChannelId, ChannelSummary, ChatPlatform, Embed, GuildId, HistoryMessage, MessageId,
    Permissions, RoleId, UserId,
};

const MAX_RATE_LIMIT_RETRIES: u8 = 3;

#[derive(Debug, Clone)]
struct RateLimitBucket {
    remaining: u32,
    reset_at: f64,
}

#[derive(Debug, Deserialize)]
struct RawMessage {
    id: MessageId,
    timestamp: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
struct RawChannel {
    id: ChannelId,
    #[serde(rename = "type")]
    kind: u64,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    position: Option<i64>,
    #[serde(default)]
    guild_id: Option<GuildId>,
    #[serde(default)]
    permission_overwrites: Vec<RawOverwrite>,
}

#[derive(Debug, Deserialize)]
struct RawOverwrite {
    #[serde(deserialize_with = "string_bits")]
    id: u64,
    #[serde(rename = "type")]
    kind: u8,
    #[serde(deserialize_with = "string_bits")]
    allow: u64,
    #[serde(deserialize_with = "string_bits")]
    deny: u64,
}

impl RawOverwrite {
    fn to_overwrite(&self) -> Option<Overwrite> {
        let target = match self.kind {
            0 => OverwriteTarget::Role(RoleId(self.id)),
            1 => OverwriteTarget::Member(UserId(self.id)),
            _ => return None,
        };
        Some(Overwrite {
            target,
            allow: self.allow,
            deny: self.deny,
        })
    }
}

#[derive(Debug, Deserialize)]
struct RawRole {
    id: RoleId,
    name: String,
    #[serde(default, deserialize_with = "string_bits")]
    permissions: u64,
}

#[derive(Debug, Deserialize)]
struct RawGuild {
    owner_id: UserId,
    #[serde(default)]
    icon: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawMember {
    #[serde(default)]
    roles: Vec<RoleId>,
}

#[derive(Debug, Deserialize)]
struct RawUser {
    id: UserId,
}

/// Discord sends permission bitsets and snowflakes as decimal strings.
fn string_bits<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
    let raw = String::deserialize(deserializer)?;
    raw.parse().map_err(serde::de::Error::custom)
}

/// Roles of one member plus the guild's role table.
struct MemberSnapshot {
    owner: UserId,
    member_roles: Vec<RoleId>,
    guild_roles: Vec<(RoleId, u64)>,
}

impl MemberSnapshot {
    fn roles(&self, guild: GuildId, member: UserId) -> MemberRoles<'_> {
        MemberRoles {
            guild,
            owner: self.owner,
            member,
            member_roles: &self.member_roles,
            guild_roles: &self.guild_roles,
        }
    }
}

pub struct DiscordHttpClient {
    client: reqwest::Client,
    bot_token: String,
    api_base: String,
    buckets: Arc<Mutex<HashMap<String, RateLimitBucket>>>,
    global_reset_at: Arc<Mutex<Option<f64>>>,
    bot_user: OnceCell<UserId>,
}

impl DiscordHttpClient {
    #[must_use]
    pub fn new(bot_token: impl Into<String>) -> Self {
        Self::with_api_base(bot_token, API_BASE)
    }

    /// Point the client at a different API root (used by tests).
    #[must_use]
    pub fn with_api_base(bot_token: impl Into<String>, api_base: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            bot_token: bot_token.into(),
            api_base: api_base.into().trim_end_matches('/').to_string(),
            buckets: Arc::new(Mutex::new(HashMap::new())),
            global_reset_at: Arc::new(Mutex::new(None)),
            bot_user: OnceCell::new(),
        }
    }

    pub async fn get_gateway_bot(&self) -> Result<serde_json::Value, PlatformError> {
        let url = format!("{}/gateway/bot", self.api_base);
        self.request_json(Method::GET, &url, None).await
    }

    /// The bot's own user id, fetched once.
    pub async fn bot_user_id(&self) -> Result<UserId, PlatformError> {
        self.bot_user
            .get_or_try_init(|| async {
                let url = format!("{}/users/@me", self.api_base);
                let user: RawUser = self.request_json(Method::GET, &url, None).await?;
                Ok::<_, PlatformError>(user.id)
            })
            .await
            .copied()
    }

    async fn guild(&self, guild: GuildId) -> Result<RawGuild, PlatformError> {
        let url = format!("{}/guilds/{guild}", self.api_base);
        self.request_json(Method::GET, &url, None).await
    }

    async fn member_snapshot(
        &self,
        guild: GuildId,
        member: UserId,
    ) -> Result<MemberSnapshot, PlatformError> {
        let owner = self.guild(guild).await?.owner_id;
        let member_url = format!("{}/guilds/{guild}/members/{member}", self.api_base);
        let raw_member: RawMember = self.request_json(Method::GET, &member_url, None).await?;
        let roles_url = format!("{}/guilds/{guild}/roles", self.api_base);
        let roles: Vec<RawRole> = self.request_json(Method::GET, &roles_url, None).await?;
        Ok(MemberSnapshot {
            owner,
            member_roles: raw_member.roles,
            guild_roles: roles
                .into_iter()
                .map(|role| (role.id, role.permissions))
                .collect(),
        })
    }

    async fn request_json<T: DeserializeOwned>(
        &self,
        method: Method,
        url: &str,
        body: Option<serde_json::Value>,
    ) -> Result<T, PlatformError> {
        let response = self.request(method.clone(), url, body).await?;
        response.json().await.map_err(|error| {
            PlatformError::Decode(format!("{} {url}: {error}", method.as_str()))
        })
    }

    async fn request(
        &self,
        method: Method,
        url: &str,
        body: Option<serde_json::Value>,
    ) -> Result<Response, PlatformError> {
        let route_key = Self::bucket_key_from_url(url);
        self.wait_for_limits(&route_key).await;

        for attempt in 0..=MAX_RATE_LIMIT_RETRIES {
            let mut request_builder = self
                .client
                .request(method.clone(), url)
                .header("Authorization", format!("Bot {}", self.bot_token));
            if let Some(payload) = body.clone() {
                request_builder = request_builder.json(&payload);
            }

            let response = request_builder.send().await.map_err(|error| {
                PlatformError::Transport(format!("{} {url}: {error}", method.as_str()))
            })?;

            self.update_bucket_from_headers(&route_key, response.headers())
                .await;

            if response.status().as_u16() == 429 {
                if attempt == MAX_RATE_LIMIT_RETRIES {
                    return Err(PlatformError::RateLimited(format!(
                        "{} {url} exceeded rate limit after {MAX_RATE_LIMIT_RETRIES} retries",
                        method.as_str()
                    )));
                }
                let is_global = Self::is_global_limit(response.headers());
                let retry_after = Self::parse_retry_after(response.headers())
                    .unwrap_or_else(|| Duration::from_secs(1));
                tracing::debug!(
                    route = %route_key,
                    retry_after_ms = u64::try_from(retry_after.as_millis()).unwrap_or(u64::MAX),
                    global = is_global,
                    "discord.rate_limited"
                );
                self.handle_429_wait(is_global, retry_after, &route_key)
                    .await;
                continue;
            }

            if !response.status().is_success() {
                let status = response.status().as_u16();
                let body_text = response
                    .text()
                    .await
                    .unwrap_or_else(|error| format!("<failed to read response body: {error}>"));
                return Err(PlatformError::from_status(
                    status,
                    format!("{} {url}: {body_text}", method.as_str()),
                ));
            }

            return Ok(response);
        }

        Err(PlatformError::RateLimited(format!(
            "{} {url} failed due to rate limiting",
            method.as_str()
        )))
    }

    fn parse_header_u32(headers: &HeaderMap, name: &str) -> Option<u32> {
        headers
            .get(name)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.parse::<u32>().ok())
    }

    fn parse_header_f64(headers: &HeaderMap, name: &str) -> Option<f64> {
        headers
            .get(name)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.parse::<f64>().ok())
    }

    fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
        let seconds = Self::parse_header_f64(headers, "Retry-After")?;
        if seconds <= 0.0 {
            return Some(Duration::from_secs(0));
        }
        Some(Duration::from_secs_f64(seconds))
    }

    fn is_global_limit(headers: &HeaderMap) -> bool {
        headers
            .get("X-RateLimit-Global")
            .and_then(|value| value.to_str().ok())
            .is_some_and(|value| value.eq_ignore_ascii_case("true"))
    }

    fn now_unix_timestamp() -> f64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs_f64()
    }

    fn bucket_key_from_url(url: &str) -> String {
        let path = reqwest::Url::parse(url)
            .map_or_else(|_| url.to_string(), |parsed| parsed.path().to_string());
        let path_without_api_prefix = path
            .strip_prefix("/api/v10")
            .map_or(path.as_str(), |stripped| stripped);

        let normalized = path_without_api_prefix
            .split('/')
            .filter(|segment| !segment.is_empty())
            .map(|segment| {
                if segment.chars().all(|character| character.is_ascii_digit()) {
                    "{id}".to_string()
                } else {
                    segment.to_string()
                }
            })
            .collect::<Vec<_>>()
            .join("/");

        format!("/{normalized}")
    }

    async fn wait_for_limits(&self, route_key: &str) {
        let now = Self::now_unix_timestamp();
        let global_wait = {
            let global_guard = self.global_reset_at.lock().await;
            global_guard.and_then(|reset_at| (reset_at > now).then_some(reset_at - now))
        };
        if let Some(wait_secs) = global_wait {
            sleep(Duration::from_secs_f64(wait_secs)).await;
        }

        let route_wait = {
            let buckets = self.buckets.lock().await;
            buckets.get(route_key).and_then(|bucket| {
                if bucket.remaining == 0 && bucket.reset_at > now {
                    Some(bucket.reset_at - now)
                } else {
                    None
                }
            })
        };
        if let Some(wait_secs) = route_wait {
            sleep(Duration::from_secs_f64(wait_secs)).await;
        }
    }

    async fn handle_429_wait(&self, is_global: bool, retry_after: Duration, route_key: &str) {
        let now = Self::now_unix_timestamp();
        let reset_at = now + retry_after.as_secs_f64();
        if is_global {
            let mut global = self.global_reset_at.lock().await;
            *global = Some(reset_at);
        } else {
            let mut buckets = self.buckets.lock().await;
            buckets.insert(
                route_key.to_string(),
                RateLimitBucket {
                    remaining: 0,
                    reset_at,
                },
            );
        }
        sleep(retry_after).await;
    }

    async fn update_bucket_from_headers(&self, route_key: &str, headers: &HeaderMap) {
        let remaining = Self::parse_header_u32(headers, "X-RateLimit-Remaining");
        let reset_at = Self::parse_header_f64(headers, "X-RateLimit-Reset");

        if let (Some(remaining), Some(reset_at)) = (remaining, reset_at) {
            let mut buckets = self.buckets.lock().await;
            buckets.insert(
                route_key.to_string(),
                RateLimitBucket {
                    remaining,
                    reset_at,
                },
            );
        }
    }
}

fn truncate_message(content: &str) -> &str {
    match content.char_indices().nth(MAX_MESSAGE_LENGTH) {
        Some((index, _)) => &content[..index],
        None => content,
    }
}

#[async_trait]
impl ChatPlatform for DiscordHttpClient {
    async fn fetch_history(
        &self,
        channel: ChannelId,
        before: Option<MessageId>,
        limit: usize,
    ) -> Result<Vec<HistoryMessage>, PlatformError> {
        let limit = limit.clamp(1, MAX_HISTORY_PAGE);
        let url = match before {
            Some(cursor) => format!(
                "{}/channels/{channel}/messages?limit={limit}&before={cursor}",
                self.api_base
            ),
            None => format!("{}/channels/{channel}/messages?limit={limit}", self.api_base),
        };
        let page: Vec<RawMessage> = self.request_json(Method::GET, &url, None).await?;
        Ok(page
            .into_iter()
            .map(|raw| HistoryMessage {
                id: raw.id,
                timestamp: raw.timestamp,
            })
            .collect())
    }

    async fn delete_message(
        &self,
        channel: ChannelId,
        message: MessageId,
    ) -> Result<(), PlatformError> {
        let url = format!("{}/channels/{channel}/messages/{message}", self.api_base);
        let _response = self.request(Method::DELETE, &url, None).await?;
        Ok(())
    }

    async fn resolve_text_channel(&self, channel: ChannelId) -> Result<bool, PlatformError> {
        let url = format!("{}/channels/{channel}", self.api_base);
        match self.request_json::<RawChannel>(Method::GET, &url, None).await {
            Ok(raw) => Ok(DiscordChannelType::from_u64(raw.kind)
                .is_some_and(DiscordChannelType::is_guild_text)),
            Err(PlatformError::NotFound(_) | PlatformError::Forbidden(_)) => Ok(false),
            Err(error) => Err(error),
        }
    }

    async fn guild_text_channels(
        &self,
        guild: GuildId,
    ) -> Result<Vec<ChannelSummary>, PlatformError> {
        let url = format!("{}/guilds/{guild}/channels", self.api_base);
        let mut channels: Vec<RawChannel> = self.request_json(Method::GET, &url, None).await?;
        channels.retain(|raw| {
            DiscordChannelType::from_u64(raw.kind).is_some_and(DiscordChannelType::is_guild_text)
        });
        channels.sort_by_key(|raw| (raw.position.unwrap_or(i64::MAX), raw.id));
        Ok(channels
            .into_iter()
            .map(|raw| ChannelSummary {
                id: raw.id,
                name: raw.name.unwrap_or_default(),
            })
            .collect())
    }

    async fn guild_role_names(
        &self,
        guild: GuildId,
        roles: &[RoleId],
    ) -> Result<Vec<String>, PlatformError> {
        if roles.is_empty() {
            return Ok(Vec::new());
        }
        let url = format!("{}/guilds/{guild}/roles", self.api_base);
        let all: Vec<RawRole> = self.request_json(Method::GET, &url, None).await?;
        Ok(all
            .into_iter()
            .filter(|role| roles.contains(&role.id))
            .map(|role| role.name)
            .collect())
    }

    async fn bot_channel_permissions(
        &self,
        channel: ChannelId,
    ) -> Result<Permissions, PlatformError> {
        let url = format!("{}/channels/{channel}", self.api_base);
        let raw: RawChannel = self.request_json(Method::GET, &url, None).await?;
        let Some(guild) = raw.guild_id else {
            return Err(PlatformError::NotFound(format!(
                "channel {channel} does not belong to a guild"
            )));
        };
        let bot = self.bot_user_id().await?;
        let snapshot = self.member_snapshot(guild, bot).await?;
        let overwrites: Vec<Overwrite> = raw
            .permission_overwrites
            .iter()
            .filter_map(RawOverwrite::to_overwrite)
            .collect();
        Ok(channel_permissions(&snapshot.roles(guild, bot), &overwrites))
    }

    async fn member_guild_permissions(
        &self,
        guild: GuildId,
        member: UserId,
    ) -> Result<Permissions, PlatformError> {
        let snapshot = self.member_snapshot(guild, member).await?;
        Ok(channel_permissions(&snapshot.roles(guild, member), &[]))
    }

    async fn guild_icon_url(&self, guild: GuildId) -> Result<Option<String>, PlatformError> {
        Ok(self
            .guild(guild)
            .await?
            .icon
            .map(|hash| format!("{CDN_BASE}/icons/{guild}/{hash}.png")))
    }

    async fn send_message(&self, channel: ChannelId, content: &str) -> Result<(), PlatformError> {
        let url = format!("{}/channels/{channel}/messages", self.api_base);
        let body = json!({ "content": truncate_message(content) });
        let _response = self.request(Method::POST, &url, Some(body)).await?;
        Ok(())
    }

    async fn send_embed(&self, channel: ChannelId, embed: &Embed) -> Result<(), PlatformError> {
        let url = format!("{}/channels/{channel}/messages", self.api_base);
        let mut payload = json!({
            "title": embed.title,
            "description": embed.description,
        });
        if let Some(color) = embed.color {
            payload["color"] = json!(color);
        }
        if let Some(footer) = &embed.footer {
            payload["footer"] = json!({ "text": footer });
        }
        if let Some(author) = &embed.author {
            payload["author"] = json!({ "name": author.name });
            if let Some(icon) = &author.icon_url {
                payload["author"]["icon_url"] = json!(icon);
            }
        }
        if let Some(thumbnail) = &embed.thumbnail_url {
            payload["thumbnail"] = json!({ "url": thumbnail });
        }
        let _response = self
            .request(Method::POST, &url, Some(json!({ "embeds": [payload] })))
            .await?;
        Ok(())
    }
}
