use std::{
    collections::HashMap,
    sync::{
        Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use {
    aggrechans_common::{ApiError, ChannelRecord, Page, UserProfile},
    async_trait::async_trait,
};

use crate::{DirectoryApi, DurableStore, Error};

/// Scripted remote directory. Channel and user listings are served in pages
/// of `page_size`; the first `rate_limited_pages` listing calls answer with a
/// short rate-limit signal.
#[derive(Default)]
pub(crate) struct FakeApi {
    pub channels: Mutex<HashMap<String, String>>,
    pub users: HashMap<String, UserProfile>,
    pub bots: HashMap<String, UserProfile>,
    pub page_size: usize,
    pub rate_limited_pages: AtomicUsize,
    pub lookup_delay: Duration,
    pub info_calls: AtomicUsize,
    pub list_calls: AtomicUsize,
}

impl FakeApi {
    pub fn with_channels(pairs: &[(&str, &str)]) -> Self {
        Self {
            channels: Mutex::new(
                pairs
                    .iter()
                    .map(|(id, name)| ((*id).to_string(), (*name).to_string()))
                    .collect(),
            ),
            page_size: 2,
            ..Self::default()
        }
    }

    pub fn with_users(users: Vec<UserProfile>) -> Self {
        Self {
            users: users.into_iter().map(|u| (u.id.clone(), u)).collect(),
            page_size: 2,
            ..Self::default()
        }
    }

    pub fn rename(&self, id: &str, name: &str) {
        let mut channels = self.channels.lock().unwrap_or_else(|e| e.into_inner());
        channels.insert(id.to_string(), name.to_string());
    }

    fn throttled(&self, method: &str) -> Option<ApiError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        let remaining = self.rate_limited_pages.load(Ordering::SeqCst);
        if remaining == 0 {
            return None;
        }
        self.rate_limited_pages.store(remaining - 1, Ordering::SeqCst);
        Some(ApiError::rate_limited(method, Duration::from_millis(5)))
    }

    fn page<T: Clone>(&self, mut items: Vec<(String, T)>, cursor: Option<&str>) -> Page<T> {
        items.sort_by(|a, b| a.0.cmp(&b.0));
        let start: usize = cursor.and_then(|c| c.parse().ok()).unwrap_or(0);
        let end = (start + self.page_size.max(1)).min(items.len());
        let page = items[start.min(end)..end].iter().map(|(_, v)| v.clone()).collect();
        Page {
            items: page,
            next_cursor: (end < items.len()).then(|| end.to_string()),
        }
    }
}

#[async_trait]
impl DirectoryApi for FakeApi {
    async fn list_channels(&self, cursor: Option<&str>) -> Result<Page<ChannelRecord>, ApiError> {
        if let Some(err) = self.throttled("conversations.list") {
            return Err(err);
        }
        let items = self
            .channels
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .map(|(id, name)| (id.clone(), ChannelRecord::new(id.clone(), name.clone())))
            .collect();
        Ok(self.page(items, cursor))
    }

    async fn channel_info(&self, id: &str) -> Result<ChannelRecord, ApiError> {
        self.info_calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.lookup_delay).await;
        let name = self
            .channels
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(id)
            .cloned();
        name.map(|name| ChannelRecord::new(id, name))
            .ok_or_else(|| ApiError::platform("conversations.info", "channel_not_found"))
    }

    async fn list_users(&self, cursor: Option<&str>) -> Result<Page<UserProfile>, ApiError> {
        if let Some(err) = self.throttled("users.list") {
            return Err(err);
        }
        let items = self
            .users
            .iter()
            .map(|(id, u)| (id.clone(), u.clone()))
            .collect();
        Ok(self.page(items, cursor))
    }

    async fn user_info(&self, id: &str) -> Result<UserProfile, ApiError> {
        self.info_calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.lookup_delay).await;
        self.users
            .get(id)
            .cloned()
            .ok_or_else(|| ApiError::platform("users.info", "user_not_found"))
    }

    async fn bot_info(&self, id: &str) -> Result<UserProfile, ApiError> {
        self.info_calls.fetch_add(1, Ordering::SeqCst);
        self.bots
            .get(id)
            .cloned()
            .ok_or_else(|| ApiError::platform("bots.info", "bot_not_found"))
    }
}

/// Durable store whose backend is always down.
pub(crate) struct BrokenStore;

#[async_trait]
impl DurableStore for BrokenStore {
    fn backend_name(&self) -> &'static str {
        "broken"
    }

    async fn get(&self, _key: &str) -> Result<Option<String>, Error> {
        Err(Error::store("get", std::io::Error::other("down")))
    }

    async fn set(&self, _key: &str, _value: &str) -> Result<(), Error> {
        Err(Error::store("set", std::io::Error::other("down")))
    }
}
