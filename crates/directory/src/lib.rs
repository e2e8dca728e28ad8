//! Identity directories: channel id → name and user/bot id → profile.
//!
//! Each directory keeps an in-memory map behind one lock, optionally backed by
//! a shared durable tier, and falls back to the remote directory API on a miss.
//! Network I/O never happens while the map lock is held.

pub mod api;
pub mod channels;
pub mod error;
pub mod store;
pub mod users;

pub use {
    api::DirectoryApi,
    channels::ChannelDirectory,
    error::{Error, Result},
    store::{DurableStore, DurableTier, MemoryStore},
    users::UserDirectory,
};

#[cfg(feature = "redis")]
pub use store::RedisStore;

#[cfg(test)]
pub(crate) mod testing;
