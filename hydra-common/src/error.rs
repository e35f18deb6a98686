//! Errors shared by the Hydra crates
//!
//! Store backends and configuration loading report through [`Error`]; the
//! engine wraps it in its own error type.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    /// SQLite store failure
    #[cfg(feature = "sqlx")]
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Filesystem failure (database directory, config file)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Document body could not be encoded or decoded
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Config file unreadable, unparsable or out of range
    #[error("Configuration error: {0}")]
    Config(String),

    /// Setup failure outside the caller's control (HTTP client, tracing)
    #[error("Internal error: {0}")]
    Internal(String),
}
