/// Storage backends for users, the refresh-token ledger and verification tokens.
///
/// `postgres` is the production backend; `memory` keeps everything in
/// process for the HTTP and unit test suites.

pub mod memory;
pub mod postgres;

pub use memory::{MemoryRefreshTokenLedger, MemoryUserRepository, MemoryVerificationTokenStore};
pub use postgres::{PgRefreshTokenLedger, PgUserRepository, PgVerificationTokenStore};

/// Errors raised by a storage backend
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("duplicate entry: {0}")]
    Duplicate(String),

    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("store query failed: {0}")]
    Query(String),

    #[error("corrupt row: {0}")]
    Corrupt(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::Database(db_err) if db_err.code().as_deref() == Some("23505") => {
                StoreError::Duplicate(db_err.message().to_string())
            }
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
                StoreError::Unavailable(err.to_string())
            }
            _ => StoreError::Query(err.to_string()),
        }
    }
}
