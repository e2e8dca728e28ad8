use aggrechans_common::ApiError;

/// Per-event failures. All of them drop the event; none stop the process.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Author or source channel could not be resolved.
    #[error(transparent)]
    Lookup(#[from] aggrechans_directory::Error),

    /// A mention in the message body could not be resolved.
    #[error("cannot resolve mention of {user_id}: {source}")]
    Resolve {
        user_id: String,
        #[source]
        source: aggrechans_directory::Error,
    },

    /// The post call failed with a non rate-limit error.
    #[error("posting to {channel} failed: {source}")]
    Delivery {
        channel: String,
        #[source]
        source: ApiError,
    },

    #[error("posting to {channel} still rate limited after {retries} retries: {source}")]
    RateLimitExhausted {
        channel: String,
        retries: usize,
        #[source]
        source: ApiError,
    },

    /// The owning task was cancelled, usually on shutdown.
    #[error("cancelled")]
    Cancelled,
}

pub type Result<T> = std::result::Result<T, Error>;
