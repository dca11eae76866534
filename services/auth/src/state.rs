//! Application state shared across handlers

use std::sync::Arc;

use crate::{
    cooldown::ResendCooldown, otp::OtpService, rate_limiter::RateLimiter,
    repositories::UserStore,
};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub users: Arc<dyn UserStore>,
    pub otp: OtpService,
    pub verify_limiter: RateLimiter,
    pub resend_cooldown: ResendCooldown,
}

impl AppState {
    pub fn new(
        users: Arc<dyn UserStore>,
        otp: OtpService,
        verify_limiter: RateLimiter,
        resend_cooldown: ResendCooldown,
    ) -> Self {
        Self {
            users,
            otp,
            verify_limiter,
            resend_cooldown,
        }
    }
}
