//! Custom error types for the common library
//!
//! Database and mail failures are kept apart so callers can single out the
//! few cases they react to (a unique violation on insert) and treat the rest
//! as opaque infrastructure errors.

use sqlx::Error as SqlxError;
use thiserror::Error;

/// Custom error type for database operations
#[derive(Error, Debug)]
pub enum DatabaseError {
    /// Error occurred during database connection
    #[error("Database connection error: {0}")]
    Connection(#[source] SqlxError),

    /// Error occurred during database query execution
    #[error("Database query error: {0}")]
    Query(#[source] SqlxError),

    /// A unique constraint rejected the write
    #[error("Unique constraint violated: {0}")]
    UniqueViolation(String),

    /// Error occurred during database migration
    #[error("Database migration error: {0}")]
    Migration(String),

    /// Configuration error
    #[error("Database configuration error: {0}")]
    Configuration(String),
}

impl DatabaseError {
    /// Classify a query failure, separating unique violations from the rest.
    pub fn from_query(err: SqlxError) -> Self {
        if let Some(db_err) = err.as_database_error() {
            if db_err.is_unique_violation() {
                let constraint = db_err.constraint().unwrap_or("unknown").to_string();
                return DatabaseError::UniqueViolation(constraint);
            }
        }
        DatabaseError::Query(err)
    }

    pub fn is_unique_violation(&self) -> bool {
        matches!(self, DatabaseError::UniqueViolation(_))
    }
}

/// Type alias for Result with DatabaseError
pub type DatabaseResult<T> = Result<T, DatabaseError>;

/// Custom error type for outbound mail
#[derive(Error, Debug)]
pub enum MailError {
    /// Sender or recipient could not be parsed as a mailbox
    #[error("Invalid mail address: {0}")]
    Address(#[from] lettre::address::AddressError),

    /// The message could not be assembled
    #[error("Failed to build message: {0}")]
    Build(#[from] lettre::error::Error),

    /// The relay refused the message or could not be reached
    #[error("Mail transport error: {0}")]
    Transport(#[from] lettre::transport::smtp::Error),

    /// Any other delivery failure
    #[error("Mail delivery failed: {0}")]
    Delivery(String),
}
