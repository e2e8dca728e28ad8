use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use {
    aggrechans_common::{ApiError, ChannelRecord, RetryPolicy},
    tokio_util::sync::CancellationToken,
    tracing::{debug, info},
};

use crate::{
    api::DirectoryApi,
    error::{Error, Result},
    store::DurableTier,
};

const KIND: &str = "channel";

/// Channel id → current channel name.
///
/// Lookups go local map → durable tier → `conversations.info`. Concurrent
/// misses on the same id may each hit the remote API; they write the same
/// value, so the map converges.
pub struct ChannelDirectory {
    names: Mutex<HashMap<String, String>>,
    api: Arc<dyn DirectoryApi>,
    durable: Option<DurableTier>,
}

impl ChannelDirectory {
    pub fn new(api: Arc<dyn DirectoryApi>, durable: Option<DurableTier>) -> Self {
        Self {
            names: Mutex::new(HashMap::new()),
            api,
            durable,
        }
    }

    /// Number of channels held in memory.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, String>> {
        self.names.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn cached(&self, id: &str) -> Option<String> {
        self.lock().get(id).cloned()
    }

    fn remember(&self, id: &str, name: &str) {
        self.lock().insert(id.to_string(), name.to_string());
    }

    /// Local map, then the durable tier. A durable hit is copied into the map.
    async fn lookup(&self, id: &str) -> Option<String> {
        if let Some(name) = self.cached(id) {
            return Some(name);
        }
        let name = self.durable.as_ref()?.load(KIND, id).await?;
        self.remember(id, &name);
        Some(name)
    }

    /// Write to the map, then to the durable tier.
    async fn store(&self, id: &str, name: &str) {
        self.remember(id, name);
        if let Some(durable) = &self.durable {
            durable.save(KIND, id, name).await;
        }
    }

    /// Current name of `id`.
    pub async fn resolve_name(&self, id: &str) -> Result<String> {
        if let Some(name) = self.lookup(id).await {
            return Ok(name);
        }

        let record = self
            .api
            .channel_info(id)
            .await
            .map_err(|e| Error::lookup("conversations.info", id, e))?;
        debug!(channel_id = %id, channel_name = %record.name, "resolved channel");
        self.store(id, &record.name).await;
        Ok(record.name)
    }

    /// Overwrite the cached name after a rename event.
    pub async fn apply_rename(&self, record: &ChannelRecord) {
        match self.lookup(&record.id).await {
            Some(old) => info!(
                channel_id = %record.id,
                old = %old,
                new = %record.name,
                "channel renamed"
            ),
            None => info!(
                channel_id = %record.id,
                old = "unknown",
                new = %record.name,
                "channel renamed"
            ),
        }
        self.store(&record.id, &record.name).await;
    }

    /// Insert (or overwrite) a newly created channel.
    pub async fn apply_create(&self, record: &ChannelRecord) {
        debug!(channel_id = %record.id, channel_name = %record.name, "channel created");
        self.store(&record.id, &record.name).await;
    }

    /// Page through the full channel listing and seed the local map.
    ///
    /// Rate-limit signals are absorbed by `policy`; an empty listing is a
    /// fatal misconfiguration.
    pub async fn bulk_load(&self, cancel: &CancellationToken, policy: RetryPolicy) -> Result<usize> {
        const METHOD: &str = "conversations.list";

        let mut cursor: Option<String> = None;
        let mut loaded: Vec<ChannelRecord> = Vec::new();
        loop {
            let page = policy
                .run(cancel, METHOD, ApiError::retry_after, || {
                    self.api.list_channels(cursor.as_deref())
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
            let mut names = self.lock();
            for record in loaded {
                names.insert(record.id, record.name);
            }
            names.len()
        };
        info!(count, "loaded channels");
        Ok(count)
    }
}
