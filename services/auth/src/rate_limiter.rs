//! Rate limiter for throttling OTP verification attempts

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::info;

/// Rate limiter configuration
#[derive(Debug, Clone)]
pub struct RateLimiterConfig {
    /// Maximum number of attempts allowed per window; 0 disables the limiter
    pub max_attempts: u32,
    /// Time window in seconds
    pub window_seconds: u64,
    /// Ban duration in seconds
    pub ban_duration_seconds: u64,
}

impl RateLimiterConfig {
    pub fn disabled() -> Self {
        Self {
            max_attempts: 0,
            ..Self::default()
        }
    }
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            window_seconds: 300,       // 5 minutes
            ban_duration_seconds: 900, // 15 minutes
        }
    }
}

#[derive(Debug)]
struct RateLimiterEntry {
    attempts: u32,
    window_start: Instant,
    ban_expires: Option<Instant>,
}

impl RateLimiterEntry {
    /// Whether the entry still carries a ban or attempts inside its window.
    fn is_live(&self, now: Instant, window: Duration) -> bool {
        self.ban_expires.is_some_and(|ban| now < ban)
            || now.duration_since(self.window_start) < window
    }
}

/// `now + period`, saturating far in the future instead of overflowing.
pub(crate) fn deadline(now: Instant, period: Duration) -> Instant {
    const FALLBACK: Duration = Duration::from_secs(100 * 365 * 24 * 60 * 60);
    now.checked_add(period)
        .or_else(|| now.checked_add(FALLBACK))
        .unwrap_or(now)
}

/// Fixed-window attempt counter keyed by an arbitrary string (here: email)
#[derive(Debug, Clone)]
pub struct RateLimiter {
    config: RateLimiterConfig,
    entries: Arc<Mutex<HashMap<String, RateLimiterEntry>>>,
}

impl RateLimiter {
    /// Create a new rate limiter
    pub fn new(config: RateLimiterConfig) -> Self {
        Self {
            config,
            entries: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.config.max_attempts > 0
    }

    /// Record an attempt for `key` and report whether it may proceed.
    pub async fn is_allowed(&self, key: &str) -> bool {
        if !self.is_enabled() {
            return true;
        }

        let mut entries = self.entries.lock().await;
        let now = Instant::now();
        let window = Duration::from_secs(self.config.window_seconds);
        entries.retain(|_, entry| entry.is_live(now, window));

        let entry = entries.entry(key.to_string()).or_insert(RateLimiterEntry {
            attempts: 0,
            window_start: now,
            ban_expires: None,
        });

        if let Some(ban_expires) = entry.ban_expires {
            if now < ban_expires {
                return false;
            }
            entry.attempts = 0;
            entry.ban_expires = None;
            entry.window_start = now;
        }

        if now.duration_since(entry.window_start) >= window {
            entry.attempts = 0;
            entry.window_start = now;
        }

        if entry.attempts >= self.config.max_attempts {
            entry.ban_expires = Some(deadline(
                now,
                Duration::from_secs(self.config.ban_duration_seconds),
            ));
            info!(
                "Throttled key {} for {} seconds",
                key, self.config.ban_duration_seconds
            );
            return false;
        }

        entry.attempts += 1;
        true
    }

    /// Forget the history of `key`, e.g. after a successful verification.
    pub async fn reset(&self, key: &str) {
        if self.is_enabled() {
            self.entries.lock().await.remove(key);
        }
    }

    /// Get the rate limiter configuration
    pub fn config(&self) -> &RateLimiterConfig {
        &self.config
    }
}
