//! Redis store backend.

use super::config::StoreConfig;
use super::error::{StoreError, StoreResult};
use super::{KeyValueStore, WindowBuckets};
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::RedisResult;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Semaphore, SemaphorePermit};

/// Redis implementation of [`KeyValueStore`].
///
/// A single multiplexed [`ConnectionManager`] carries all traffic and
/// reconnects on failure. A semaphore bounds the number of operations in
/// flight; each operation checks out a permit and returns it as soon as the
/// reply arrives.
#[derive(Clone)]
pub struct RedisStore {
    manager: ConnectionManager,
    permits: Arc<Semaphore>,
    command_timeout: Duration,
    address: String,
}

impl std::fmt::Debug for RedisStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisStore")
            .field("address", &self.address)
            .field("available_permits", &self.permits.available_permits())
            .field("command_timeout", &self.command_timeout)
            .finish()
    }
}

impl RedisStore {
    /// Connect to redis.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is invalid or the connection cannot be
    /// established within the connect timeout.
    pub async fn connect(config: &StoreConfig) -> StoreResult<Self> {
        let client = redis::Client::open(config.address.as_str())?;
        let manager = tokio::time::timeout(config.connect_timeout(), ConnectionManager::new(client))
            .await
            .map_err(|_| StoreError::Timeout(format!("connect to {}", config.address)))??;

        Ok(Self {
            manager,
            permits: Arc::new(Semaphore::new(config.max_connections.max(1))),
            command_timeout: config.command_timeout(),
            address: config.address.clone(),
        })
    }

    async fn checkout(&self) -> StoreResult<(SemaphorePermit<'_>, ConnectionManager)> {
        let permit = self
            .permits
            .acquire()
            .await
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        Ok((permit, self.manager.clone()))
    }

    async fn bounded<T, F>(&self, what: &str, fut: F) -> StoreResult<T>
    where
        F: Future<Output = RedisResult<T>>,
    {
        tokio::time::timeout(self.command_timeout, fut)
            .await
            .map_err(|_| StoreError::Timeout(what.to_string()))?
            .map_err(StoreError::from)
    }
}

#[async_trait]
impl KeyValueStore for RedisStore {
    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        let (_permit, mut conn) = self.checkout().await?;
        let cmd = redis::cmd("GET").arg(key).clone();
        self.bounded("GET", async move {
            let value: Option<String> = cmd.query_async(&mut conn).await?;
            Ok(value)
        })
        .await
    }

    async fn get_many(&self, keys: &[String]) -> StoreResult<Vec<Option<String>>> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        let (_permit, mut conn) = self.checkout().await?;
        let cmd = redis::cmd("MGET").arg(keys).clone();
        self.bounded("MGET", async move {
            let values: Vec<Option<String>> = cmd.query_async(&mut conn).await?;
            Ok(values)
        })
        .await
    }

    async fn set(&self, key: &str, value: &str) -> StoreResult<()> {
        let (_permit, mut conn) = self.checkout().await?;
        let cmd = redis::cmd("SET").arg(key).arg(value).clone();
        self.bounded("SET", async move {
            let _: () = cmd.query_async(&mut conn).await?;
            Ok(())
        })
        .await
    }

    async fn set_many(&self, entries: &[(String, String)]) -> StoreResult<()> {
        if entries.is_empty() {
            return Ok(());
        }
        let mut pipe = redis::pipe();
        for (key, value) in entries {
            pipe.cmd("SET").arg(key).arg(value).ignore();
        }
        let (_permit, mut conn) = self.checkout().await?;
        self.bounded("pipelined SET", async move {
            let _: () = pipe.query_async(&mut conn).await?;
            Ok(())
        })
        .await
    }

    async fn set_expiring(&self, key: &str, value: &str, ttl_secs: u64) -> StoreResult<()> {
        let (_permit, mut conn) = self.checkout().await?;
        let cmd = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("EX")
            .arg(ttl_secs)
            .clone();
        self.bounded("SET EX", async move {
            let _: () = cmd.query_async(&mut conn).await?;
            Ok(())
        })
        .await
    }

    async fn set_if_absent(&self, key: &str, value: &str, ttl_secs: u64) -> StoreResult<bool> {
        let (_permit, mut conn) = self.checkout().await?;
        let cmd = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("NX")
            .arg("EX")
            .arg(ttl_secs)
            .clone();
        self.bounded("SET NX EX", async move {
            let reply: Option<String> = cmd.query_async(&mut conn).await?;
            Ok(reply.is_some())
        })
        .await
    }

    async fn apply_atomically(
        &self,
        sets: &[(String, String)],
        deletes: &[String],
    ) -> StoreResult<()> {
        let mut pipe = redis::pipe();
        pipe.atomic();
        for (key, value) in sets {
            pipe.cmd("SET").arg(key).arg(value).ignore();
        }
        for key in deletes {
            pipe.cmd("DEL").arg(key).ignore();
        }
        let (_permit, mut conn) = self.checkout().await?;
        self.bounded("MULTI SET/DEL", async move {
            let _: () = pipe.query_async(&mut conn).await?;
            Ok(())
        })
        .await
    }

    async fn hash_increment(&self, key: &str, field: i64, ttl_secs: u64) -> StoreResult<()> {
        let mut pipe = redis::pipe();
        pipe.atomic()
            .cmd("HINCRBY")
            .arg(key)
            .arg(field)
            .arg(1)
            .ignore()
            .cmd("EXPIRE")
            .arg(key)
            .arg(ttl_secs)
            .ignore();
        let (_permit, mut conn) = self.checkout().await?;
        self.bounded("HINCRBY", async move {
            let _: () = pipe.query_async(&mut conn).await?;
            Ok(())
        })
        .await
    }

    async fn read_window(
        &self,
        quota_key: &str,
        current_key: &str,
        previous_key: &str,
    ) -> StoreResult<WindowBuckets> {
        let mut pipe = redis::pipe();
        pipe.atomic()
            .cmd("GET")
            .arg(quota_key)
            .cmd("HGETALL")
            .arg(current_key)
            .cmd("HGETALL")
            .arg(previous_key);
        let (_permit, mut conn) = self.checkout().await?;
        self.bounded("MULTI GET/HGETALL", async move {
            let (quota, current, previous): (
                Option<String>,
                HashMap<String, String>,
                HashMap<String, String>,
            ) = pipe.query_async(&mut conn).await?;
            Ok(WindowBuckets {
                quota,
                current: current.into_iter().collect(),
                previous: previous.into_iter().collect(),
            })
        })
        .await
    }

    async fn ping(&self) -> StoreResult<()> {
        let (_permit, mut conn) = self.checkout().await?;
        self.bounded("PING", async move {
            let _: String = redis::cmd("PING").query_async(&mut conn).await?;
            Ok(())
        })
        .await
    }
}
