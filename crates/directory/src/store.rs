//! Second-level identity tier shared between process instances.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use {async_trait::async_trait, tracing::warn};

use crate::error::Result;

/// Minimal key-value surface the directories need.
#[async_trait]
pub trait DurableStore: Send + Sync {
    /// Human-readable backend name for logs.
    fn backend_name(&self) -> &'static str;

    /// `Ok(None)` is a miss.
    async fn get(&self, key: &str) -> Result<Option<String>>;

    async fn set(&self, key: &str, value: &str) -> Result<()>;
}

/// A [`DurableStore`] plus the key namespace one deployment writes under.
///
/// Keys look like `{prefix}:channel:{id}` and `{prefix}:user:{id}`.
#[derive(Clone)]
pub struct DurableTier {
    store: Arc<dyn DurableStore>,
    prefix: String,
}

impl DurableTier {
    pub fn new(store: Arc<dyn DurableStore>, prefix: impl Into<String>) -> Self {
        Self {
            store,
            prefix: prefix.into(),
        }
    }

    #[must_use]
    pub fn backend_name(&self) -> &'static str {
        self.store.backend_name()
    }

    fn key(&self, kind: &str, id: &str) -> String {
        format!("{}:{kind}:{id}", self.prefix)
    }

    /// Read a value. Store failures degrade to a miss.
    pub(crate) async fn load(&self, kind: &str, id: &str) -> Option<String> {
        match self.store.get(&self.key(kind, id)).await {
            Ok(value) => value,
            Err(e) => {
                warn!(
                    backend = self.backend_name(),
                    kind,
                    id,
                    error = %e,
                    "durable store read failed, falling back to remote lookup"
                );
                None
            },
        }
    }

    /// Write a value. Store failures are logged and swallowed.
    pub(crate) async fn save(&self, kind: &str, id: &str, value: &str) {
        if let Err(e) = self.store.set(&self.key(kind, id), value).await {
            warn!(
                backend = self.backend_name(),
                kind,
                id,
                error = %e,
                "durable store write failed"
            );
        }
    }
}

/// In-process store. Several directories can share one instance to behave
/// like instances sharing a Redis.
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl DurableStore for MemoryStore {
    fn backend_name(&self) -> &'static str {
        "memory"
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        Ok(entries.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

#[cfg(feature = "redis")]
pub use self::redis_store::RedisStore;

#[cfg(feature = "redis")]
mod redis_store {
    use {
        async_trait::async_trait,
        redis::{FromRedisValue, aio::MultiplexedConnection},
        tokio::sync::Mutex,
        tracing::{debug, warn},
    };

    use {
        super::DurableStore,
        crate::error::{Error, Result},
    };

    /// Redis-backed store. One multiplexed connection is shared by every
    /// caller and reopened after a failed command.
    pub struct RedisStore {
        client: redis::Client,
        connection: Mutex<Option<MultiplexedConnection>>,
    }

    impl RedisStore {
        /// Parse the URL. The connection is opened lazily on first use.
        pub fn open(url: &str) -> Result<Self> {
            let client = redis::Client::open(url).map_err(|e| Error::store("open", e))?;
            Ok(Self {
                client,
                connection: Mutex::new(None),
            })
        }

        async fn connection(&self) -> Result<MultiplexedConnection> {
            let mut guard = self.connection.lock().await;
            if let Some(conn) = guard.as_ref() {
                return Ok(conn.clone());
            }
            let conn = self
                .client
                .get_multiplexed_async_connection()
                .await
                .map_err(|e| Error::store("connect", e))?;
            debug!(backend = "redis", "durable store connected");
            *guard = Some(conn.clone());
            Ok(conn)
        }

        async fn query<T: FromRedisValue>(
            &self,
            operation: &'static str,
            cmd: &redis::Cmd,
        ) -> Result<T> {
            let mut conn = self.connection().await?;
            match cmd.query_async(&mut conn).await {
                Ok(value) => Ok(value),
                Err(err) => {
                    warn!(
                        backend = "redis",
                        operation,
                        error = %err,
                        "durable store command failed, reconnecting"
                    );
                    *self.connection.lock().await = None;
                    let mut conn = self.connection().await?;
                    cmd.query_async(&mut conn)
                        .await
                        .map_err(|e| Error::store(operation, e))
                },
            }
        }
    }

    #[async_trait]
    impl DurableStore for RedisStore {
        fn backend_name(&self) -> &'static str {
            "redis"
        }

        async fn get(&self, key: &str) -> Result<Option<String>> {
            let mut cmd = redis::cmd("GET");
            cmd.arg(key);
            self.query("GET", &cmd).await
        }

        async fn set(&self, key: &str, value: &str) -> Result<()> {
            let mut cmd = redis::cmd("SET");
            cmd.arg(key).arg(value);
            self.query("SET", &cmd).await
        }
    }
}
