//! Error types for cistern

use std::time::Duration;

use thiserror::Error;

/// Core error type for pool and connection operations
#[derive(Error, Debug)]
pub enum CisternError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Query error: {0}")]
    Query(String),

    #[error("Transaction error: {0}")]
    Transaction(String),

    #[error("No connection available within {0:?}")]
    AcquireTimeout(Duration),

    #[error("Pool is shut down")]
    PoolClosed,

    #[error("Connection is closed")]
    ConnectionClosed,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for cistern operations
pub type Result<T> = std::result::Result<T, CisternError>;
