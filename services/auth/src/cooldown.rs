//! Server-side resend cooldown
//!
//! A cooldown is a marker per email that lives for a fixed period. Starting
//! one fails while a previous marker is still alive. Markers live in Redis
//! when configured, so all instances share them, or in process otherwise.

use std::{
    collections::HashMap,
    sync::Arc,
    time::{Duration, Instant},
};

use anyhow::Result;
use async_trait::async_trait;
use common::cache::RedisPool;
use tokio::sync::Mutex;

use crate::rate_limiter::deadline;

/// Backing storage for cooldown markers.
#[async_trait]
pub trait CooldownStore: Send + Sync {
    /// Create the marker for `key` unless a live one exists. Returns `true` when created.
    async fn try_begin(&self, key: &str, period: Duration) -> Result<bool>;

    /// Drop the marker for `key`.
    async fn release(&self, key: &str) -> Result<()>;
}

#[derive(Clone, Default)]
pub struct MemoryCooldownStore {
    until: Arc<Mutex<HashMap<String, Instant>>>,
}

#[async_trait]
impl CooldownStore for MemoryCooldownStore {
    async fn try_begin(&self, key: &str, period: Duration) -> Result<bool> {
        let mut until = self.until.lock().await;
        let now = Instant::now();
        until.retain(|_, expires| *expires > now);

        if until.contains_key(key) {
            return Ok(false);
        }
        until.insert(key.to_string(), deadline(now, period));
        Ok(true)
    }

    async fn release(&self, key: &str) -> Result<()> {
        self.until.lock().await.remove(key);
        Ok(())
    }
}

const REDIS_KEY_PREFIX: &str = "resend-cooldown:";

#[async_trait]
impl CooldownStore for RedisPool {
    async fn try_begin(&self, key: &str, period: Duration) -> Result<bool> {
        let seconds = period.as_secs().max(1);
        self.set_if_absent(&format!("{REDIS_KEY_PREFIX}{key}"), "1", seconds)
            .await
    }

    async fn release(&self, key: &str) -> Result<()> {
        self.delete(&format!("{REDIS_KEY_PREFIX}{key}")).await
    }
}

/// Per-email resend cooldown; a zero period disables it.
#[derive(Clone)]
pub struct ResendCooldown {
    store: Arc<dyn CooldownStore>,
    period: Duration,
}

impl ResendCooldown {
    pub fn new(store: Arc<dyn CooldownStore>, period: Duration) -> Self {
        Self { store, period }
    }

    pub fn disabled() -> Self {
        Self::new(Arc::new(MemoryCooldownStore::default()), Duration::ZERO)
    }

    pub fn is_enabled(&self) -> bool {
        !self.period.is_zero()
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Start the cooldown for `email`. `false` means one is already running.
    pub async fn begin(&self, email: &str) -> Result<bool> {
        if !self.is_enabled() {
            return Ok(true);
        }
        self.store.try_begin(email, self.period).await
    }

    /// Cancel a cooldown that was started for a resend that did not happen.
    pub async fn release(&self, email: &str) -> Result<()> {
        if !self.is_enabled() {
            return Ok(());
        }
        self.store.release(email).await
    }
}
