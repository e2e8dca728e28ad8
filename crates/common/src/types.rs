//! Identity records shared by the directories, the relay pipeline, and the
//! Slack adapter.

use serde::{Deserialize, Serialize};

/// Synthetic workspace user that is always treated as a bot.
pub const SLACKBOT_USER_ID: &str = "USLACKBOT";

/// Leading character of a human user id (`U...`).
pub const USER_ID_SIGIL: char = 'U';

/// Leading character of a bot id (`B...`).
pub const BOT_ID_SIGIL: char = 'B';

/// A channel id and its current (mutable) name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelRecord {
    pub id: String,
    pub name: String,
}

impl ChannelRecord {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

/// Cached profile of a user or bot.
///
/// The serialized field names match the records other instances write to the
/// durable tier, so the JSON layout must stay stable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    #[serde(default)]
    pub id: String,
    #[serde(rename = "name")]
    pub display_name: String,
    #[serde(rename = "avatar", default)]
    pub avatar_url: String,
    #[serde(rename = "bot", default)]
    pub is_bot: bool,
    #[serde(rename = "app", default)]
    pub is_app: bool,
}

impl UserProfile {
    /// Profile of a workspace member. Slackbot is always classified as a bot.
    pub fn member(
        id: impl Into<String>,
        display_name: impl Into<String>,
        avatar_url: impl Into<String>,
        is_bot: bool,
        is_app: bool,
    ) -> Self {
        let id = id.into();
        let is_bot = is_bot || id == SLACKBOT_USER_ID;
        Self {
            id,
            display_name: display_name.into(),
            avatar_url: avatar_url.into(),
            is_bot,
            is_app,
        }
    }

    /// Profile derived from bot metadata.
    pub fn bot(
        id: impl Into<String>,
        display_name: impl Into<String>,
        avatar_url: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
            avatar_url: avatar_url.into(),
            is_bot: true,
            is_app: true,
        }
    }

    /// True for bots and app users; their messages are never relayed.
    #[must_use]
    pub fn is_automated(&self) -> bool {
        self.is_bot || self.is_app
    }

    /// Name and avatar the relayed message is posted under.
    #[must_use]
    pub fn sender(&self) -> SenderIdentity {
        SenderIdentity {
            name: self.display_name.clone(),
            avatar_url: self.avatar_url.clone(),
        }
    }
}

/// Who a relayed message appears to come from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SenderIdentity {
    pub name: String,
    pub avatar_url: String,
}

/// One page of a cursor-paginated listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// `None` (or an empty cursor from the platform) ends the listing.
    pub next_cursor: Option<String>,
}

impl<T> Page<T> {
    pub fn last(items: Vec<T>) -> Self {
        Self {
            items,
            next_cursor: None,
        }
    }
}
