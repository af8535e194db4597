//! Redis driver for the remote tier.

use std::fmt;

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, Client as RedisClient, ErrorKind, RedisResult};
use tokio::sync::Mutex;
use tracing::{debug, info};

use super::RemoteStore;
use crate::error::Result;

// == Redis Store ==
/// Talks to Redis over one lazily opened multiplexed connection.
///
/// A transport error, or a call abandoned on timeout, drops the cached
/// connection; the next call reconnects.
pub struct RedisStore {
    client: RedisClient,
    conn: Mutex<Option<MultiplexedConnection>>,
    url: String,
}

impl RedisStore {
    /// Creates the client. No connection is made until the first command.
    pub fn open(url: &str) -> Result<Self> {
        let client = RedisClient::open(url)?;
        Ok(Self {
            client,
            conn: Mutex::new(None),
            url: url.to_string(),
        })
    }

    async fn connection(&self) -> Result<MultiplexedConnection> {
        let mut guard = self.conn.lock().await;
        if let Some(conn) = guard.as_ref() {
            return Ok(conn.clone());
        }

        let conn = self.client.get_multiplexed_async_connection().await?;
        info!(url = %self.url, "Connected to Redis");
        *guard = Some(conn.clone());
        Ok(conn)
    }

    /// Forgets the connection after a transport-level failure.
    async fn settle<T>(&self, result: RedisResult<T>) -> Result<T> {
        if let Err(err) = &result {
            if !matches!(err.kind(), ErrorKind::TypeError | ErrorKind::ResponseError) {
                debug!(url = %self.url, error = %err, "Dropping Redis connection");
                *self.conn.lock().await = None;
            }
        }
        Ok(result?)
    }
}

#[async_trait]
impl RemoteStore for RedisStore {
    fn name(&self) -> &'static str {
        "redis"
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.connection().await?;
        let result: RedisResult<Option<String>> = conn.get(key).await;
        self.settle(result).await
    }

    async fn set(&self, key: &str, value: &str, ttl_seconds: u64) -> Result<()> {
        let mut conn = self.connection().await?;
        let result: RedisResult<()> = conn.set_ex(key, value, ttl_seconds).await;
        self.settle(result).await
    }

    async fn mget(&self, keys: &[String]) -> Result<Vec<Option<String>>> {
        let mut conn = self.connection().await?;
        let mut cmd = redis::cmd("MGET");
        for key in keys {
            cmd.arg(key);
        }
        let result: RedisResult<Vec<Option<String>>> = cmd.query_async(&mut conn).await;
        self.settle(result).await
    }

    async fn mset(&self, entries: &[(String, String, u64)]) -> Result<()> {
        let mut conn = self.connection().await?;
        let mut pipe = redis::pipe();
        for (key, value, ttl) in entries {
            pipe.cmd("SET")
                .arg(key)
                .arg(value)
                .arg("EX")
                .arg(*ttl)
                .ignore();
        }
        let result: RedisResult<()> = pipe.query_async(&mut conn).await;
        self.settle(result).await
    }

    async fn delete(&self, key: &str) -> Result<usize> {
        let mut conn = self.connection().await?;
        let result: RedisResult<usize> = conn.del(key).await;
        self.settle(result).await
    }

    async fn scan_delete(&self, glob: &str) -> Result<usize> {
        let mut conn = self.connection().await?;
        let result: RedisResult<Vec<String>> =
            redis::cmd("KEYS").arg(glob).query_async(&mut conn).await;
        let keys = self.settle(result).await?;
        if keys.is_empty() {
            return Ok(0);
        }

        let result: RedisResult<usize> = conn.del(&keys).await;
        self.settle(result).await
    }

    async fn flush(&self) -> Result<()> {
        let mut conn = self.connection().await?;
        let result: RedisResult<()> = redis::cmd("FLUSHDB").query_async(&mut conn).await;
        self.settle(result).await
    }

    async fn ping(&self) -> Result<()> {
        let mut conn = self.connection().await?;
        let result: RedisResult<String> = redis::cmd("PING").query_async(&mut conn).await;
        self.settle(result).await.map(|_| ())
    }

    async fn reset(&self) {
        if self.conn.lock().await.take().is_some() {
            debug!(url = %self.url, "Dropping stalled Redis connection");
        }
    }
}

impl fmt::Debug for RedisStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisStore").field("url", &self.url).finish()
    }
}
