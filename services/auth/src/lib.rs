//! Account registration with email one-time-password verification
//!
//! A user registers with name, email and password, receives a six digit code
//! by email and submits it to mark the account verified. Codes expire after
//! ten minutes, are accepted once, and can be replaced through the resend
//! endpoint while the account is unverified.

pub mod config;
pub mod cooldown;
pub mod models;
pub mod otp;
pub mod password;
pub mod rate_limiter;
pub mod repositories;
pub mod routes;
pub mod state;
pub mod validation;

#[cfg(test)]
mod test_support;

pub use state::AppState;

/// Schema migrations for the `users` table.
pub static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");
