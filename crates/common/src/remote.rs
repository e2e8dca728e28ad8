use std::{error::Error as StdError, time::Duration};

/// Failure of a call to the chat platform's REST surface.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// The platform asked us to back off before calling again.
    #[error("{method}: rate limited, retry after {retry_after:?}")]
    RateLimited {
        method: String,
        retry_after: Duration,
    },

    /// The platform answered with `ok: false`.
    #[error("{method}: {error}")]
    Platform { method: String, error: String },

    /// Non-success HTTP status other than a rate limit.
    #[error("{method}: unexpected http status {status}")]
    Http { method: String, status: u16 },

    /// Transport or decoding failure.
    #[error("{context}: {source}")]
    Transport {
        context: String,
        #[source]
        source: Box<dyn StdError + Send + Sync>,
    },
}

impl ApiError {
    #[must_use]
    pub fn rate_limited(method: impl Into<String>, retry_after: Duration) -> Self {
        Self::RateLimited {
            method: method.into(),
            retry_after,
        }
    }

    #[must_use]
    pub fn platform(method: impl Into<String>, error: impl Into<String>) -> Self {
        Self::Platform {
            method: method.into(),
            error: error.into(),
        }
    }

    #[must_use]
    pub fn transport(
        context: impl Into<String>,
        source: impl StdError + Send + Sync + 'static,
    ) -> Self {
        Self::Transport {
            context: context.into(),
            source: Box::new(source),
        }
    }

    /// Wait requested by a rate-limit signal, `None` for every other failure.
    #[must_use]
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { retry_after, .. } => Some(*retry_after),
            _ => None,
        }
    }
}
