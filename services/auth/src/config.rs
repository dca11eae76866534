//! Service configuration
//!
//! Values come from the process environment (after `.env` has been loaded by
//! `main`), layered over the defaults below with the `config` crate. Keys are
//! the lowercased variable names, e.g. `OTP_TTL_SECONDS` → `otp_ttl_seconds`.

use std::time::Duration;

use anyhow::{Context, Result, bail};
use common::mail::{SmtpConfig, SmtpSecurity};
use config::{Config, Environment};
use serde::Deserialize;

use crate::rate_limiter::RateLimiterConfig;

/// Longest accepted code lifetime.
pub const MAX_OTP_TTL_SECONDS: u64 = 24 * 60 * 60;
/// Longest accepted cooldown, throttling window or ban.
pub const MAX_PERIOD_SECONDS: u64 = 30 * 24 * 60 * 60;

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,

    /// Unset means codes are written to the log instead of being mailed.
    pub smtp_host: Option<String>,
    pub smtp_port: u16,
    pub smtp_username: Option<String>,
    pub smtp_password: Option<String>,
    pub smtp_security: String,
    pub mail_from: String,

    pub otp_ttl_seconds: u64,
    /// 0 disables the server-side resend cooldown.
    pub resend_cooldown_seconds: u64,
    /// 0 disables verification attempt throttling.
    pub verify_max_attempts: u32,
    pub verify_window_seconds: u64,
    pub verify_ban_seconds: u64,

    pub redis_url: Option<String>,
}

impl AppConfig {
    pub fn load() -> Result<Self> {
        let config: AppConfig = Config::builder()
            .set_default("host", "0.0.0.0")?
            .set_default("port", 5000_i64)?
            .set_default("smtp_port", 587_i64)?
            .set_default("smtp_security", "starttls")?
            .set_default("mail_from", "My App <no-reply@localhost>")?
            .set_default("otp_ttl_seconds", 600_i64)?
            .set_default("resend_cooldown_seconds", 0_i64)?
            .set_default("verify_max_attempts", 0_i64)?
            .set_default("verify_window_seconds", 300_i64)?
            .set_default("verify_ban_seconds", 900_i64)?
            .add_source(Environment::default().try_parsing(true))
            .build()
            .context("read configuration")?
            .try_deserialize()
            .context("parse configuration")?;

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.otp_ttl_seconds == 0 || self.otp_ttl_seconds > MAX_OTP_TTL_SECONDS {
            bail!("OTP_TTL_SECONDS must be between 1 and {MAX_OTP_TTL_SECONDS}");
        }
        for (name, value) in [
            ("RESEND_COOLDOWN_SECONDS", self.resend_cooldown_seconds),
            ("VERIFY_WINDOW_SECONDS", self.verify_window_seconds),
            ("VERIFY_BAN_SECONDS", self.verify_ban_seconds),
        ] {
            if value > MAX_PERIOD_SECONDS {
                bail!("{name} must be at most {MAX_PERIOD_SECONDS}");
            }
        }
        if self.verify_max_attempts > 0 && self.verify_window_seconds == 0 {
            bail!("VERIFY_WINDOW_SECONDS must be greater than zero when throttling is enabled");
        }
        self.smtp_security
            .parse::<SmtpSecurity>()
            .map_err(anyhow::Error::msg)?;
        Ok(())
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn otp_ttl(&self) -> Result<chrono::Duration> {
        i64::try_from(self.otp_ttl_seconds)
            .ok()
            .and_then(chrono::Duration::try_seconds)
            .context("OTP_TTL_SECONDS out of range")
    }

    pub fn resend_cooldown(&self) -> Duration {
        Duration::from_secs(self.resend_cooldown_seconds)
    }

    pub fn verify_rate_limit(&self) -> RateLimiterConfig {
        RateLimiterConfig {
            max_attempts: self.verify_max_attempts,
            window_seconds: self.verify_window_seconds,
            ban_duration_seconds: self.verify_ban_seconds,
        }
    }

    pub fn redis_url(&self) -> Option<&str> {
        non_blank(&self.redis_url)
    }

    /// SMTP settings, or `None` when no relay host is configured.
    pub fn smtp(&self) -> Result<Option<SmtpConfig>> {
        let Some(host) = non_blank(&self.smtp_host) else {
            return Ok(None);
        };

        Ok(Some(SmtpConfig {
            host: host.to_string(),
            port: self.smtp_port,
            username: non_blank(&self.smtp_username).map(str::to_string),
            password: self.smtp_password.clone().filter(|p| !p.is_empty()),
            security: self
                .smtp_security
                .parse()
                .map_err(anyhow::Error::msg)?,
            from: self.mail_from.clone(),
        }))
    }
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}
