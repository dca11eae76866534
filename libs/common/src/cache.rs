//! Redis cache module
//!
//! Thin wrapper over a multiplexed Redis connection. The auth service uses it
//! for short-lived markers that must be shared between instances, such as the
//! per-email resend cooldown.

use anyhow::Result;
use redis::{AsyncCommands, Client};
use tracing::info;

/// Configuration for Redis connection
#[derive(Debug, Clone)]
pub struct RedisConfig {
    /// Redis connection URL (e.g., "redis://localhost:6379")
    pub url: String,
}

impl RedisConfig {
    /// Read `REDIS_URL`; `None` when Redis is not configured.
    pub fn from_env() -> Option<Self> {
        std::env::var("REDIS_URL")
            .ok()
            .filter(|url| !url.trim().is_empty())
            .map(|url| RedisConfig { url })
    }
}

/// Redis connection handle
#[derive(Clone)]
pub struct RedisPool {
    client: Client,
}

impl RedisPool {
    /// Open a client for the configured URL. No connection is made until first use.
    pub fn new(config: &RedisConfig) -> Result<Self> {
        let client = Client::open(config.url.clone())?;
        info!("Redis client initialized with URL: {}", config.url);
        Ok(RedisPool { client })
    }

    async fn get_connection(&self) -> Result<redis::aio::MultiplexedConnection> {
        let conn = self.client.get_multiplexed_async_connection().await?;
        Ok(conn)
    }

    /// Set `key` only if it does not exist yet, expiring after `ttl_seconds`.
    ///
    /// Returns `true` when this call created the key.
    pub async fn set_if_absent(&self, key: &str, value: &str, ttl_seconds: u64) -> Result<bool> {
        let mut conn = self.get_connection().await?;
        let reply: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("NX")
            .arg("EX")
            .arg(ttl_seconds)
            .query_async(&mut conn)
            .await?;
        Ok(reply.is_some())
    }

    /// Get a value from Redis by key
    pub async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.get_connection().await?;
        let value: Option<String> = conn.get(key).await?;
        Ok(value)
    }

    /// Delete a key from Redis
    pub async fn delete(&self, key: &str) -> Result<()> {
        let mut conn = self.get_connection().await?;
        let _: u64 = conn.del(key).await?;
        Ok(())
    }

    /// Check if Redis is reachable
    pub async fn health_check(&self) -> Result<bool> {
        let mut conn = self.get_connection().await?;
        let pong: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(pong == "PONG")
    }
}
