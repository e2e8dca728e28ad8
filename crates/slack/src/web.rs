//! Slack Web API client.
//!
//! Every call turns an HTTP 429 into [`ApiError::RateLimited`] and an
//! `ok: false` envelope into [`ApiError::Platform`]. Retrying is left to the
//! callers' retry policy.

use std::time::Duration;

use {
    aggrechans_common::{ApiError, ChannelRecord, Page, UserProfile},
    aggrechans_directory::DirectoryApi,
    aggrechans_relay::{MessagePoster, PostRequest, PostedMessage},
    async_trait::async_trait,
    reqwest::{
        RequestBuilder, StatusCode,
        header::{CONTENT_TYPE, RETRY_AFTER},
    },
    secrecy::{ExposeSecret, Secret},
    serde::{Deserialize, de::DeserializeOwned},
    serde_json::{Value, json},
    tracing::debug,
};

/// Page size requested from the listing methods.
const LIST_LIMIT: &str = "200";

/// Used when a 429 arrives without a usable `Retry-After` header.
const DEFAULT_RETRY_AFTER: Duration = Duration::from_secs(1);

#[derive(Clone)]
pub struct SlackWebClient {
    http: reqwest::Client,
    token: Secret<String>,
    api_base: String,
}

impl SlackWebClient {
    pub fn new(token: Secret<String>, api_base: impl Into<String>) -> Self {
        Self::with_http(reqwest::Client::new(), token, api_base)
    }

    pub fn with_http(
        http: reqwest::Client,
        token: Secret<String>,
        api_base: impl Into<String>,
    ) -> Self {
        let api_base = api_base.into().trim_end_matches('/').to_string();
        Self {
            http,
            token,
            api_base,
        }
    }

    fn url(&self, method: &str) -> String {
        format!("{}/{method}", self.api_base)
    }

    async fn get<T: DeserializeOwned>(
        &self,
        method: &'static str,
        query: &[(&str, &str)],
    ) -> Result<T, ApiError> {
        let request = self.http.get(self.url(method)).query(query);
        self.send(method, request, self.token.expose_secret()).await
    }

    async fn send<T: DeserializeOwned>(
        &self,
        method: &'static str,
        request: RequestBuilder,
        token: &str,
    ) -> Result<T, ApiError> {
        let response = request
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| ApiError::transport(method, e))?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get(RETRY_AFTER)
                .and_then(|value| value.to_str().ok())
                .and_then(|value| value.trim().parse::<u64>().ok())
                .map_or(DEFAULT_RETRY_AFTER, Duration::from_secs);
            debug!(method, retry_after_secs = retry_after.as_secs(), "rate limited");
            return Err(ApiError::rate_limited(method, retry_after));
        }
        if !status.is_success() {
            return Err(ApiError::Http {
                method: method.to_string(),
                status: status.as_u16(),
            });
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| ApiError::transport(method, e))?;
        if body["ok"].as_bool() != Some(true) {
            let error = body["error"].as_str().unwrap_or("unknown_error");
            return Err(ApiError::platform(method, error));
        }
        serde_json::from_value(body).map_err(|e| ApiError::transport(method, e))
    }

    /// Workspace subdomain, used to build message permalinks.
    pub async fn team_domain(&self) -> Result<String, ApiError> {
        let info: TeamInfo = self.get("team.info", &[]).await?;
        Ok(info.team.domain)
    }

    /// WebSocket URL for one Socket Mode session. Authenticates with the
    /// app-level token instead of the bot token.
    pub async fn open_connection(&self, app_token: &Secret<String>) -> Result<String, ApiError> {
        let request = self
            .http
            .post(self.url("apps.connections.open"))
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded");
        let opened: ConnectionOpened = self
            .send("apps.connections.open", request, app_token.expose_secret())
            .await?;
        Ok(opened.url)
    }
}

#[async_trait]
impl DirectoryApi for SlackWebClient {
    async fn list_channels(&self, cursor: Option<&str>) -> Result<Page<ChannelRecord>, ApiError> {
        let mut query = vec![("exclude_archived", "true"), ("limit", LIST_LIMIT)];
        if let Some(cursor) = cursor {
            query.push(("cursor", cursor));
        }
        let list: ChannelList = self.get("conversations.list", &query).await?;
        Ok(Page {
            items: list.channels.into_iter().map(WireChannel::into_record).collect(),
            next_cursor: list.response_metadata.and_then(ResponseMetadata::into_cursor),
        })
    }

    async fn channel_info(&self, id: &str) -> Result<ChannelRecord, ApiError> {
        let info: ChannelInfo = self.get("conversations.info", &[("channel", id)]).await?;
        Ok(info.channel.into_record())
    }

    async fn list_users(&self, cursor: Option<&str>) -> Result<Page<UserProfile>, ApiError> {
        let mut query = vec![("limit", LIST_LIMIT)];
        if let Some(cursor) = cursor {
            query.push(("cursor", cursor));
        }
        let list: UserList = self.get("users.list", &query).await?;
        Ok(Page {
            items: list.members.into_iter().map(WireUser::into_profile).collect(),
            next_cursor: list.response_metadata.and_then(ResponseMetadata::into_cursor),
        })
    }

    async fn user_info(&self, id: &str) -> Result<UserProfile, ApiError> {
        let info: UserInfo = self.get("users.info", &[("user", id)]).await?;
        Ok(info.user.into_profile())
    }

    async fn bot_info(&self, id: &str) -> Result<UserProfile, ApiError> {
        let info: BotInfo = self.get("bots.info", &[("bot", id)]).await?;
        let bot = info.bot;
        let id = if bot.id.is_empty() {
            id.to_string()
        } else {
            bot.id
        };
        Ok(UserProfile::bot(id, bot.name, bot.icons.image_72))
    }
}

#[async_trait]
impl MessagePoster for SlackWebClient {
    async fn post_message(&self, request: &PostRequest) -> Result<PostedMessage, ApiError> {
        let method = "chat.postMessage";
        let mut body = json!({
            "channel": request.channel,
            "text": request.text,
            "username": request.sender.name,
        });
        if !request.sender.avatar_url.is_empty() {
            body["icon_url"] = json!(request.sender.avatar_url);
        }
        if request.unfurl_disabled {
            body["unfurl_links"] = json!(false);
        }
        if request.blocks.len() > 1 {
            body["blocks"] = Value::Array(request.blocks.clone());
        }

        let http = self.http.post(self.url(method)).json(&body);
        let posted: Posted = self.send(method, http, self.token.expose_secret()).await?;
        Ok(PostedMessage {
            channel: posted.channel,
            ts: posted.ts,
        })
    }
}

// ── Wire types ──────────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct ResponseMetadata {
    #[serde(default)]
    next_cursor: String,
}

impl ResponseMetadata {
    fn into_cursor(self) -> Option<String> {
        Some(self.next_cursor).filter(|cursor| !cursor.is_empty())
    }
}

#[derive(Deserialize)]
pub(crate) struct WireChannel {
    id: String,
    #[serde(default)]
    name: String,
}

impl WireChannel {
    pub(crate) fn into_record(self) -> ChannelRecord {
        ChannelRecord::new(self.id, self.name)
    }
}

#[derive(Deserialize)]
struct ChannelList {
    #[serde(default)]
    channels: Vec<WireChannel>,
    response_metadata: Option<ResponseMetadata>,
}

#[derive(Deserialize)]
struct ChannelInfo {
    channel: WireChannel,
}

#[derive(Deserialize, Default)]
struct WireUserProfile {
    #[serde(default)]
    image_72: String,
}

#[derive(Deserialize)]
pub(crate) struct WireUser {
    id: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    profile: WireUserProfile,
    #[serde(default)]
    is_bot: bool,
    #[serde(default)]
    is_app_user: bool,
}

impl WireUser {
    pub(crate) fn into_profile(self) -> UserProfile {
        UserProfile::member(
            self.id,
            self.name,
            self.profile.image_72,
            self.is_bot,
            self.is_app_user,
        )
    }
}

#[derive(Deserialize)]
struct UserList {
    #[serde(default)]
    members: Vec<WireUser>,
    response_metadata: Option<ResponseMetadata>,
}

#[derive(Deserialize)]
struct UserInfo {
    user: WireUser,
}

#[derive(Deserialize, Default)]
struct BotIcons {
    #[serde(default)]
    image_72: String,
}

#[derive(Deserialize)]
struct WireBot {
    #[serde(default)]
    id: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    icons: BotIcons,
}

#[derive(Deserialize)]
struct BotInfo {
    bot: WireBot,
}

#[derive(Deserialize)]
struct Team {
    domain: String,
}

#[derive(Deserialize)]
struct TeamInfo {
    team: Team,
}

#[derive(Deserialize)]
struct ConnectionOpened {
    url: String,
}

#[derive(Deserialize)]
struct Posted {
    channel: String,
    ts: String,
}
