//! Interaction services: the request-path side of the pipeline.

pub mod interaction;
pub mod threads;

pub use interaction::InteractionService;
pub use threads::build_threads;

use crate::bus::BusError;
use crate::storage::StorageError;

/// Result type for interaction operations.
pub type Result<T> = std::result::Result<T, InteractionError>;

/// Errors returned synchronously to the caller of an interaction.
#[derive(Debug, thiserror::Error)]
pub enum InteractionError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// The store write committed but the notification was not queued.
    #[error("Publish error: {0}")]
    Publish(#[from] BusError),
}
