use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use redis::AsyncCommands;
use redis::aio::MultiplexedConnection;

use crate::application::ports::cache::Cache;

/// Redis backed [`Cache`] over one multiplexed connection.
#[derive(Clone)]
pub struct RedisCache {
    conn: MultiplexedConnection,
    timeout: Duration,
}

impl std::fmt::Debug for RedisCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisCache")
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl RedisCache {
    pub async fn connect(host: &str, port: u16, timeout: Duration) -> anyhow::Result<Self> {
        let url = if host.contains(':') {
            format!("redis://[{host}]:{port}/")
        } else {
            format!("redis://{host}:{port}/")
        };
        let client = redis::Client::open(url).context("redis_client_open")?;
        let conn = tokio::time::timeout(timeout, client.get_multiplexed_async_connection())
            .await
            .context("redis_connect_timeout")?
            .context("redis_get_multiplexed_async_connection")?;
        tracing::debug!(host = %host, port, "redis_cache_connected");
        Ok(Self { conn, timeout })
    }

    async fn bounded<T, F>(&self, op: &'static str, fut: F) -> anyhow::Result<T>
    where
        F: std::future::Future<Output = redis::RedisResult<T>>,
    {
        tokio::time::timeout(self.timeout, fut)
            .await
            .with_context(|| format!("redis_{op}_timeout"))?
            .with_context(|| format!("redis_{op}"))
    }
}

#[async_trait]
impl Cache for RedisCache {
    async fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
        let mut conn = self.conn.clone();
        self.bounded("get", conn.get::<_, Option<String>>(key)).await
    }

    async fn set(&self, key: &str, value: &str, ttl_secs: u64) -> anyhow::Result<()> {
        let mut conn = self.conn.clone();
        if ttl_secs > 0 {
            self.bounded("set_ex", conn.set_ex::<_, _, ()>(key, value, ttl_secs))
                .await
        } else {
            self.bounded("set", conn.set::<_, _, ()>(key, value)).await
        }
    }

    async fn delete(&self, key: &str) -> anyhow::Result<bool> {
        let mut conn = self.conn.clone();
        let removed: i64 = self.bounded("del", conn.del(key)).await?;
        Ok(removed > 0)
    }

    async fn has(&self, key: &str) -> anyhow::Result<bool> {
        let mut conn = self.conn.clone();
        self.bounded("exists", conn.exists::<_, bool>(key)).await
    }

    async fn ping(&self) -> anyhow::Result<()> {
        let mut conn = self.conn.clone();
        let pong: String = self
            .bounded("ping", redis::cmd("PING").query_async(&mut conn))
            .await?;
        anyhow::ensure!(pong == "PONG", "unexpected PING reply: {pong}");
        Ok(())
    }
}
