use {
    aggrechans_common::{ApiError, ChannelRecord, Page, UserProfile},
    async_trait::async_trait,
};

/// Remote directory lookups used to fill cache misses and seed the caches at
/// startup. Any call may answer with [`ApiError::RateLimited`].
#[async_trait]
pub trait DirectoryApi: Send + Sync {
    /// One page of non-archived channels.
    async fn list_channels(&self, cursor: Option<&str>) -> Result<Page<ChannelRecord>, ApiError>;

    async fn channel_info(&self, id: &str) -> Result<ChannelRecord, ApiError>;

    /// One page of workspace members.
    async fn list_users(&self, cursor: Option<&str>) -> Result<Page<UserProfile>, ApiError>;

    async fn user_info(&self, id: &str) -> Result<UserProfile, ApiError>;

    /// Bot metadata; the returned profile is always marked bot and app.
    async fn bot_info(&self, id: &str) -> Result<UserProfile, ApiError>;
}
