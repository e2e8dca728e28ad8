#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("dispatch rule document is not valid JSON: {0}")]
    MalformedDocument(#[from] serde_json::Error),

    #[error("dispatch rule #{index}: {reason}")]
    InvalidRule { index: usize, reason: &'static str },

    #[error("dispatch rule table contains no rules")]
    NoRules,

    #[error("routing is not configured: set a dispatch rule table or an aggregate channel")]
    NotConfigured,
}

pub type Result<T> = std::result::Result<T, Error>;
