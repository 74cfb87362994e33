//! Error types for tables, stores and transports.

use thiserror::Error;

/// Main error type for table operations.
#[derive(Debug, Error)]
pub enum TableError {
    /// The key is absent from the store. An expected outcome, not a fault.
    #[error("not found")]
    NotFound,

    #[error("table already open")]
    AlreadyOpen,

    #[error("update function required")]
    UpdateFnRequired,

    #[error("table not open")]
    NotOpen,

    #[error("transport error: {0}")]
    Transport(String),

    #[error("durable subscription {durable_name:?} on channel {channel:?} is already active")]
    DurableInUse {
        channel: String,
        durable_name: String,
    },

    #[error("transport closed")]
    TransportClosed,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("store backend error: {0}")]
    Backend(String),
}

impl TableError {
    /// True for the store-level "key absent" condition.
    pub fn is_not_found(&self) -> bool {
        matches!(self, TableError::NotFound)
    }
}

/// Result type for table operations.
pub type Result<T> = std::result::Result<T, TableError>;
