//! Error types for the event feed.

use crate::types::SubscriptionId;
use thiserror::Error;

/// Main error type for feed operations.
#[derive(Debug, Error)]
pub enum FeedError {
    #[error("invalid subscription config: {0}")]
    InvalidConfig(String),

    #[error("no operation scope: set one on the config or on the client")]
    NoOperation,

    #[error("subscription not found: {0}")]
    SubscriptionNotFound(SubscriptionId),

    #[error("subscription already closed: {0}")]
    AlreadyClosed(SubscriptionId),

    #[error("client is closed")]
    Closed,

    #[error("malformed message: {0}")]
    Malformed(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("internal error: {0}")]
    Internal(String),
}

/// Result type for feed operations.
pub type Result<T> = std::result::Result<T, FeedError>;
