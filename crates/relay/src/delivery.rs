use std::sync::Arc;

use {
    aggrechans_common::{ApiError, RetryError, RetryPolicy, SenderIdentity},
    async_trait::async_trait,
    tokio_util::sync::CancellationToken,
    tracing::debug,
};

use crate::error::{Error, Result};

/// One outbound message.
#[derive(Debug, Clone, PartialEq)]
pub struct PostRequest {
    pub channel: String,
    /// Name and avatar the message is shown under.
    pub sender: SenderIdentity,
    pub text: String,
    /// Block Kit payload; sent only when it holds more than one block.
    pub blocks: Vec<serde_json::Value>,
    pub unfurl_disabled: bool,
}

/// Where the platform stored a posted message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostedMessage {
    pub channel: String,
    pub ts: String,
}

/// The platform's post-message primitive.
#[async_trait]
pub trait MessagePoster: Send + Sync {
    async fn post_message(&self, request: &PostRequest) -> std::result::Result<PostedMessage, ApiError>;
}

/// Posts messages, waiting out rate-limit signals.
#[derive(Clone)]
pub struct Delivery {
    poster: Arc<dyn MessagePoster>,
    policy: RetryPolicy,
}

impl Delivery {
    pub fn new(poster: Arc<dyn MessagePoster>, policy: RetryPolicy) -> Self {
        Self { poster, policy }
    }

    /// Post `request`, repeating the identical call after each rate-limit
    /// signal. Any other failure is returned at once.
    pub async fn post(&self, cancel: &CancellationToken, request: &PostRequest) -> Result<PostedMessage> {
        let posted = self
            .policy
            .run(cancel, "chat.postMessage", ApiError::retry_after, || {
                self.poster.post_message(request)
            })
            .await
            .map_err(|err| match err {
                RetryError::Cancelled => Error::Cancelled,
                RetryError::Exhausted { retries, source } => Error::RateLimitExhausted {
                    channel: request.channel.clone(),
                    retries,
                    source,
                },
                RetryError::Failed(source) => Error::Delivery {
                    channel: request.channel.clone(),
                    source,
                },
            })?;

        debug!(channel = %posted.channel, ts = %posted.ts, "message posted");
        Ok(posted)
    }
}
