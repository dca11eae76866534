//! User model and related functionality

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// User entity
///
/// `otp_code` and `otp_expires_at` are set and cleared together; a verified
/// user never carries an outstanding code.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub is_verified: bool,
    #[serde(skip_serializing)]
    pub otp_code: Option<String>,
    #[serde(skip_serializing)]
    pub otp_expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// The outstanding challenge, if any.
    pub fn pending_otp(&self) -> Option<OtpChallenge> {
        match (&self.otp_code, self.otp_expires_at) {
            (Some(code), Some(expires_at)) => Some(OtpChallenge {
                code: code.clone(),
                expires_at,
            }),
            _ => None,
        }
    }
}

/// A code paired with the instant it stops being accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OtpChallenge {
    pub code: String,
    pub expires_at: DateTime<Utc>,
}

impl OtpChallenge {
    pub fn is_live_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at > now
    }
}

/// New user creation payload; the record is born with a challenge attached.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub otp: OtpChallenge,
}
