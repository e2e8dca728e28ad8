use aggrechans_common::ApiError;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Api(#[from] ApiError),

    #[error("websocket: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Message(String),
}

/// Why a webhook request was rejected before its body was looked at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SignatureError {
    #[error("missing {0} header")]
    MissingHeader(&'static str),

    #[error("malformed request timestamp")]
    InvalidTimestamp,

    #[error("request timestamp outside the accepted window")]
    Stale,

    #[error("signature mismatch")]
    Mismatch,
}

impl SignatureError {
    /// Header and timestamp problems are answered with 400; only a wrong
    /// signature is answered with 401.
    #[must_use]
    pub fn is_malformed(&self) -> bool {
        !matches!(self, Self::Mismatch)
    }
}

pub type Result<T> = std::result::Result<T, Error>;
