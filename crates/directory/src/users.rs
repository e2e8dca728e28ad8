use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard},
};

use {
    aggrechans_common::{ApiError, RetryPolicy, UserProfile, types::BOT_ID_SIGIL},
    tokio_util::sync::CancellationToken,
    tracing::{debug, info, warn},
};

use crate::{
    api::DirectoryApi,
    error::{Error, Result},
    store::DurableTier,
};

const KIND: &str = "user";

/// User or bot id → profile. Same tiering as
/// [`ChannelDirectory`](crate::ChannelDirectory); ids starting with `B` are
/// resolved through `bots.info`.
pub struct UserDirectory {
    profiles: Mutex<HashMap<String, UserProfile>>,
    api: Arc<dyn DirectoryApi>,
    durable: Option<DurableTier>,
}

impl UserDirectory {
    pub fn new(api: Arc<dyn DirectoryApi>, durable: Option<DurableTier>) -> Self {
        Self {
            profiles: Mutex::new(HashMap::new()),
            api,
            durable,
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, UserProfile>> {
        self.profiles.lock().unwrap_or_else(|e| e.into_inner())
    }

    async fn lookup(&self, id: &str) -> Option<UserProfile> {
        let cached = self.lock().get(id).cloned();
        if cached.is_some() {
            return cached;
        }

        let raw = self.durable.as_ref()?.load(KIND, id).await?;
        let mut profile: UserProfile = match serde_json::from_str(&raw) {
            Ok(profile) => profile,
            Err(e) => {
                warn!(user_id = %id, error = %e, "discarding undecodable durable profile");
                return None;
            },
        };
        if profile.id.is_empty() {
            profile.id = id.to_string();
        }
        self.lock().insert(id.to_string(), profile.clone());
        Some(profile)
    }

    async fn store(&self, profile: &UserProfile) {
        self.lock().insert(profile.id.clone(), profile.clone());

        let Some(durable) = &self.durable else {
            return;
        };
        match serde_json::to_string(profile) {
            Ok(json) => durable.save(KIND, &profile.id, &json).await,
            Err(e) => warn!(user_id = %profile.id, error = %e, "cannot encode profile"),
        }
    }

    /// Profile of a user or bot id.
    pub async fn resolve_profile(&self, id: &str) -> Result<UserProfile> {
        if let Some(profile) = self.lookup(id).await {
            return Ok(profile);
        }

        let mut profile = if id.starts_with(BOT_ID_SIGIL) {
            let mut profile = self
                .api
                .bot_info(id)
                .await
                .map_err(|e| Error::lookup("bots.info", id, e))?;
            profile.is_bot = true;
            profile.is_app = true;
            profile
        } else {
            self.api
                .user_info(id)
                .await
                .map_err(|e| Error::lookup("users.info", id, e))?
        };
        if profile.id.is_empty() {
            profile.id = id.to_string();
        }
        debug!(
            user_id = %id,
            name = %profile.display_name,
            automated = profile.is_automated(),
            "resolved user"
        );
        self.store(&profile).await;
        Ok(profile)
    }

    /// Display name of a user id, for mention rewriting.
    pub async fn resolve_display_name(&self, id: &str) -> Result<String> {
        self.resolve_profile(id)
            .await
            .map(|profile| profile.display_name)
    }

    /// Overwrite the cached profile after a user-change event.
    pub async fn apply_user_change(&self, profile: &UserProfile) {
        debug!(user_id = %profile.id, name = %profile.display_name, "user changed");
        self.store(profile).await;
    }

    /// Page through the member listing and seed the local map.
    pub async fn bulk_load(&self, cancel: &CancellationToken, policy: RetryPolicy) -> Result<usize> {
        const METHOD: &str = "users.list";

        let mut cursor: Option<String> = None;
        let mut loaded: Vec<UserProfile> = Vec::new();
        loop {
            let page = policy
                .run(cancel, METHOD, ApiError::retry_after, || {
                    self.api.list_users(cursor.as_deref())
                })
                .await
                .map_err(|e| Error::from_listing(METHOD, e))?;
            loaded.extend(page.items);
            match page.next_cursor.filter(|c| !c.is_empty()) {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }

        if loaded.is_empty() {
            return Err(Error::EmptyListing { method: METHOD });
        }

        let count = {
            let mut profiles = self.lock();
            for profile in loaded {
                profiles.insert(profile.id.clone(), profile);
            }
            profiles.len()
        };
        info!(count, "loaded users");
        Ok(count)
    }
}
