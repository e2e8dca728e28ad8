//! Shared identity records, remote API errors, and the rate-limit retry
//! policy used across all aggrechans crates.

pub mod remote;
pub mod retry;
pub mod types;

pub use {
    remote::ApiError,
    retry::{RetryError, RetryPolicy},
    types::{ChannelRecord, Page, SenderIdentity, UserProfile},
};
