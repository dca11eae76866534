//! Database module for handling PostgreSQL connections and operations
//!
//! This module provides connection pooling, configuration, migrations and
//! health checks for the PostgreSQL database.

use crate::error::{DatabaseError, DatabaseResult};
use sqlx::{PgPool, migrate::Migrator, postgres::PgPoolOptions};
use std::{env, str::FromStr, time::Duration};
use tracing::{error, info};

/// Database configuration struct
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// Database connection URL
    pub database_url: String,
    /// Maximum number of connections in the pool
    pub max_connections: u32,
    /// Minimum number of connections in the pool
    pub min_connections: u32,
    /// Connection acquire timeout in seconds
    pub connection_timeout: u64,
}

impl DatabaseConfig {
    /// Create a new DatabaseConfig from environment variables
    ///
    /// # Environment Variables
    /// - `DATABASE_URL`: PostgreSQL connection URL (required)
    /// - `DATABASE_MAX_CONNECTIONS`: Maximum number of connections (default: 10)
    /// - `DATABASE_MIN_CONNECTIONS`: Minimum number of connections (default: 1)
    /// - `DATABASE_CONNECTION_TIMEOUT`: Acquire timeout in seconds (default: 30)
    pub fn from_env() -> DatabaseResult<Self> {
        let database_url = env::var("DATABASE_URL").map_err(|_| {
            DatabaseError::Configuration("DATABASE_URL environment variable not set".to_string())
        })?;

        Ok(Self {
            database_url,
            max_connections: parse_var("DATABASE_MAX_CONNECTIONS", 10)?,
            min_connections: parse_var("DATABASE_MIN_CONNECTIONS", 1)?,
            connection_timeout: parse_var("DATABASE_CONNECTION_TIMEOUT", 30)?,
        })
    }
}

fn parse_var<T: FromStr>(name: &str, default: T) -> DatabaseResult<T> {
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| DatabaseError::Configuration(format!("{name} is not a valid number: {raw}"))),
        Err(_) => Ok(default),
    }
}

/// Initialize a PostgreSQL connection pool
///
/// # Arguments
/// * `config` - Database configuration
///
/// # Returns
/// * `DatabaseResult<PgPool>` - PostgreSQL connection pool or error
pub async fn init_pool(config: &DatabaseConfig) -> DatabaseResult<PgPool> {
    info!("Initializing database connection pool");

    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(Duration::from_secs(config.connection_timeout))
        .connect(&config.database_url)
        .await
        .map_err(DatabaseError::Connection)?;

    info!("Database connection pool initialized successfully");
    Ok(pool)
}

/// Apply pending migrations embedded by the calling crate.
pub async fn run_migrations(pool: &PgPool, migrator: &Migrator) -> DatabaseResult<()> {
    migrator
        .run(pool)
        .await
        .map_err(|e| DatabaseError::Migration(e.to_string()))?;
    info!("Database migrations applied");
    Ok(())
}

/// Check database connectivity
///
/// Failures are logged and reported as `false`.
pub async fn health_check(pool: &PgPool) -> bool {
    match sqlx::query("SELECT 1").fetch_one(pool).await {
        Ok(_) => {
            info!("Database health check successful");
            true
        }
        Err(e) => {
            error!("Database health check failed: {}", e);
            false
        }
    }
}
