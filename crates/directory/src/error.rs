use std::error::Error as StdError;

use aggrechans_common::{ApiError, RetryError};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A single remote lookup failed; the caller drops the event.
    #[error("{method}({id}) failed: {source}")]
    Lookup {
        method: &'static str,
        id: String,
        #[source]
        source: ApiError,
    },

    /// A startup listing failed after the retry policy gave up.
    #[error("{method} failed: {source}")]
    Load {
        method: &'static str,
        #[source]
        source: RetryError<ApiError>,
    },

    /// A startup listing succeeded but returned nothing.
    #[error("{method} returned no entries")]
    EmptyListing { method: &'static str },

    #[error("{method} cancelled")]
    Cancelled { method: &'static str },

    /// Durable tier failure. Directories log these and carry on.
    #[error("durable store {operation} failed: {source}")]
    Store {
        operation: &'static str,
        #[source]
        source: Box<dyn StdError + Send + Sync>,
    },
}

impl Error {
    #[must_use]
    pub fn lookup(method: &'static str, id: impl Into<String>, source: ApiError) -> Self {
        Self::Lookup {
            method,
            id: id.into(),
            source,
        }
    }

    #[must_use]
    pub fn store(operation: &'static str, source: impl StdError + Send + Sync + 'static) -> Self {
        Self::Store {
            operation,
            source: Box::new(source),
        }
    }

    pub(crate) fn from_listing(method: &'static str, err: RetryError<ApiError>) -> Self {
        match err {
            RetryError::Cancelled => Self::Cancelled { method },
            source => Self::Load { method, source },
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
