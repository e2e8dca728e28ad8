use aggrechans_common::{ChannelRecord, UserProfile};

/// Every event kind the pipeline reacts to. Transports decode into this.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundEvent {
    Message(MessageEvent),
    ChannelRename(ChannelRecord),
    ChannelCreated(ChannelRecord),
    ChannelUnarchive { channel: String },
    UserChange(UserProfile),
    /// Logged and ignored.
    Unsupported { kind: String },
}

impl InboundEvent {
    /// Event type name as the platform spells it.
    #[must_use]
    pub fn kind(&self) -> &str {
        match self {
            Self::Message(_) => "message",
            Self::ChannelRename(_) => "channel_rename",
            Self::ChannelCreated(_) => "channel_created",
            Self::ChannelUnarchive { .. } => "channel_unarchive",
            Self::UserChange(_) => "user_change",
            Self::Unsupported { kind } => kind,
        }
    }
}

/// A message posted (or edited) in a source channel.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessageEvent {
    pub channel: String,
    /// Author id; empty for system messages.
    pub user: String,
    pub text: String,
    pub ts: String,
    pub thread_ts: Option<String>,
    pub subtype: MessageSubtype,
    /// The edited message carried by a `message_changed` event.
    pub changed: Option<ChangedMessage>,
}

/// Inner message of a `message_changed` event.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangedMessage {
    pub text: String,
    pub ts: String,
    pub thread_ts: Option<String>,
    /// Who made the edit, when the platform reports it.
    pub editor: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum MessageSubtype {
    /// No subtype: an ordinary user message.
    #[default]
    Plain,
    BotMessage,
    MessageChanged,
    FileShare,
    ChannelTopic,
    ChannelPurpose,
    ThreadBroadcast,
    Other(String),
}

impl MessageSubtype {
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        match raw {
            "" => Self::Plain,
            "bot_message" => Self::BotMessage,
            "message_changed" => Self::MessageChanged,
            "file_share" => Self::FileShare,
            "channel_topic" => Self::ChannelTopic,
            "channel_purpose" => Self::ChannelPurpose,
            "thread_broadcast" => Self::ThreadBroadcast,
            other => Self::Other(other.to_string()),
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Plain => "",
            Self::BotMessage => "bot_message",
            Self::MessageChanged => "message_changed",
            Self::FileShare => "file_share",
            Self::ChannelTopic => "channel_topic",
            Self::ChannelPurpose => "channel_purpose",
            Self::ThreadBroadcast => "thread_broadcast",
            Self::Other(raw) => raw,
        }
    }
}
