//! User repository for database operations

use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::error::{DatabaseError, DatabaseResult};
use sqlx::PgPool;
use tokio::sync::Mutex;
use tracing::debug;
use uuid::Uuid;

use crate::models::{NewUser, OtpChallenge, User};

/// Persistence operations the signup flow needs, keyed by email.
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Insert a new user. A taken email yields `DatabaseError::UniqueViolation`.
    async fn create(&self, new_user: &NewUser) -> DatabaseResult<User>;

    /// Find a user by email
    async fn find_by_email(&self, email: &str) -> DatabaseResult<Option<User>>;

    /// Replace the outstanding challenge of an unverified user.
    ///
    /// Returns `false` when no unverified user exists for `email`.
    async fn set_otp(&self, email: &str, otp: &OtpChallenge) -> DatabaseResult<bool>;

    /// Mark the user verified if `code` is the outstanding, unexpired code.
    ///
    /// Match and update happen as one step, so a code is accepted at most once.
    async fn consume_otp(
        &self,
        email: &str,
        code: &str,
        now: DateTime<Utc>,
    ) -> DatabaseResult<Option<User>>;
}

/// PostgreSQL-backed user repository
#[derive(Clone)]
pub struct UserRepository {
    pool: PgPool,
}

impl UserRepository {
    /// Create a new user repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserStore for UserRepository {
    async fn create(&self, new_user: &NewUser) -> DatabaseResult<User> {
        debug!(email = %new_user.email, "inserting user");

        sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (name, email, password_hash, otp_code, otp_expires_at)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, name, email, password_hash, is_verified, otp_code, otp_expires_at,
                      created_at, updated_at
            "#,
        )
        .bind(&new_user.name)
        .bind(&new_user.email)
        .bind(&new_user.password_hash)
        .bind(&new_user.otp.code)
        .bind(new_user.otp.expires_at)
        .fetch_one(&self.pool)
        .await
        .map_err(DatabaseError::from_query)
    }

    async fn find_by_email(&self, email: &str) -> DatabaseResult<Option<User>> {
        sqlx::query_as::<_, User>(
            r#"
            SELECT id, name, email, password_hash, is_verified, otp_code, otp_expires_at,
                   created_at, updated_at
            FROM users
            WHERE email = $1
            "#,
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::Query)
    }

    async fn set_otp(&self, email: &str, otp: &OtpChallenge) -> DatabaseResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE users
            SET otp_code = $2, otp_expires_at = $3, updated_at = NOW()
            WHERE email = $1 AND is_verified = FALSE
            "#,
        )
        .bind(email)
        .bind(&otp.code)
        .bind(otp.expires_at)
        .execute(&self.pool)
        .await
        .map_err(DatabaseError::Query)?;

        Ok(result.rows_affected() == 1)
    }

    async fn consume_otp(
        &self,
        email: &str,
        code: &str,
        now: DateTime<Utc>,
    ) -> DatabaseResult<Option<User>> {
        sqlx::query_as::<_, User>(
            r#"
            UPDATE users
            SET is_verified = TRUE, otp_code = NULL, otp_expires_at = NULL, updated_at = NOW()
            WHERE email = $1 AND otp_code = $2 AND otp_expires_at > $3
            RETURNING id, name, email, password_hash, is_verified, otp_code, otp_expires_at,
                      created_at, updated_at
            "#,
        )
        .bind(email)
        .bind(code)
        .bind(now)
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::Query)
    }
}

/// In-process user store with the same semantics as [`UserRepository`].
#[derive(Clone, Default)]
pub struct MemoryUserStore {
    users: Arc<Mutex<HashMap<String, User>>>,
}

impl MemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn create(&self, new_user: &NewUser) -> DatabaseResult<User> {
        let mut users = self.users.lock().await;
        if users.contains_key(&new_user.email) {
            return Err(DatabaseError::UniqueViolation("users_email_key".to_string()));
        }

        let now = Utc::now();
        let user = User {
            id: Uuid::new_v4(),
            name: new_user.name.clone(),
            email: new_user.email.clone(),
            password_hash: new_user.password_hash.clone(),
            is_verified: false,
            otp_code: Some(new_user.otp.code.clone()),
            otp_expires_at: Some(new_user.otp.expires_at),
            created_at: now,
            updated_at: now,
        };
        users.insert(user.email.clone(), user.clone());
        Ok(user)
    }

    async fn find_by_email(&self, email: &str) -> DatabaseResult<Option<User>> {
        Ok(self.users.lock().await.get(email).cloned())
    }

    async fn set_otp(&self, email: &str, otp: &OtpChallenge) -> DatabaseResult<bool> {
        let mut users = self.users.lock().await;
        match users.get_mut(email) {
            Some(user) if !user.is_verified => {
                user.otp_code = Some(otp.code.clone());
                user.otp_expires_at = Some(otp.expires_at);
                user.updated_at = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn consume_otp(
        &self,
        email: &str,
        code: &str,
        now: DateTime<Utc>,
    ) -> DatabaseResult<Option<User>> {
        let mut users = self.users.lock().await;
        let Some(user) = users.get_mut(email) else {
            return Ok(None);
        };

        let matches = user
            .pending_otp()
            .is_some_and(|otp| otp.code == code && otp.is_live_at(now));
        if !matches {
            return Ok(None);
        }

        user.is_verified = true;
        user.otp_code = None;
        user.otp_expires_at = None;
        user.updated_at = Utc::now();
        Ok(Some(user.clone()))
    }
}
