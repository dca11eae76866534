//! Test doubles shared by the unit tests.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Duration;
use common::{
    error::MailError,
    mail::{MailMessage, Mailer},
};
use regex::Regex;
use tokio::sync::Mutex;

use crate::{
    cooldown::ResendCooldown,
    otp::{OTP_TTL_MINUTES, OtpService},
    rate_limiter::{RateLimiter, RateLimiterConfig},
    repositories::MemoryUserStore,
    state::AppState,
};

/// Keeps every message instead of delivering it.
#[derive(Clone, Default)]
pub struct RecordingMailer {
    sent: Arc<Mutex<Vec<MailMessage>>>,
}

impl RecordingMailer {
    pub async fn subjects(&self) -> Vec<String> {
        self.sent
            .lock()
            .await
            .iter()
            .map(|m| m.subject.clone())
            .collect()
    }

    pub async fn count(&self) -> usize {
        self.sent.lock().await.len()
    }

    /// The code in the most recent message to `to`.
    pub async fn last_code_for(&self, to: &str) -> Option<String> {
        let code = Regex::new(r"\b(\d{6})\b").unwrap();
        self.sent
            .lock()
            .await
            .iter()
            .rev()
            .find(|m| m.to == to)
            .and_then(|m| code.captures(&m.text))
            .map(|c| c[1].to_string())
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, message: MailMessage) -> Result<(), MailError> {
        self.sent.lock().await.push(message);
        Ok(())
    }
}

/// A relay that is always down.
pub struct FailingMailer;

#[async_trait]
impl Mailer for FailingMailer {
    async fn send(&self, _message: MailMessage) -> Result<(), MailError> {
        Err(MailError::Delivery("relay unavailable".to_string()))
    }
}

pub struct Harness {
    pub state: AppState,
    pub store: MemoryUserStore,
    pub mailer: RecordingMailer,
}

/// App state over in-memory collaborators with throttling disabled.
pub fn harness() -> Harness {
    harness_with(RateLimiterConfig::disabled(), ResendCooldown::disabled())
}

pub fn harness_with(verify_limit: RateLimiterConfig, cooldown: ResendCooldown) -> Harness {
    let store = MemoryUserStore::new();
    let mailer = RecordingMailer::default();
    let users = Arc::new(store.clone());
    let otp = OtpService::new(
        users.clone(),
        Arc::new(mailer.clone()),
        Duration::minutes(OTP_TTL_MINUTES),
    );
    let state = AppState::new(users, otp, RateLimiter::new(verify_limit), cooldown);
    Harness {
        state,
        store,
        mailer,
    }
}
