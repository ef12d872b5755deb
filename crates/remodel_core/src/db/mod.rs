//! SQLite connection handle used by the SQL repository.
//!
//! # Responsibility
//! - Open and configure SQLite connections.
//! - Run one statement at a time off the async executor.
//!
//! # Invariants
//! - Returned handles have `foreign_keys=ON` and a busy timeout.
//! - Schema DDL belongs to the application; no migrations run here.

use thiserror::Error;

mod open;

pub use open::Database;

pub type DbResult<T> = Result<T, DbError>;

#[derive(Debug, Error)]
pub enum DbError {
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),
    #[error("database task did not complete: {0}")]
    Task(#[from] tokio::task::JoinError),
}
