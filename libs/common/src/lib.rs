//! Common library for the OTP signup service
//!
//! This crate provides the infrastructure pieces the auth service is wired
//! from at startup: PostgreSQL pooling and migrations, the Redis client,
//! outbound mail delivery and the error types they share.
//!
//! ```rust,no_run
//! use common::database::{DatabaseConfig, init_pool, health_check};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = DatabaseConfig::from_env()?;
//!     let pool = init_pool(&config).await?;
//!     let is_healthy = health_check(&pool).await;
//!     println!("Database health check: {}", is_healthy);
//!     pool.close().await;
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod database;
pub mod error;
pub mod mail;
