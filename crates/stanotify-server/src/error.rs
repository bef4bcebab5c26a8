//! Server error types.

use thiserror::Error;

/// Server errors.
#[derive(Debug, Error)]
pub enum Error {
    /// Subscription topic rejected.
    #[error("topic error: {0}")]
    Topic(#[from] stanotify_proto::TopicError),

    /// Protocol error.
    #[error("protocol error: {0}")]
    Protocol(#[from] stanotify_proto::Error),

    /// Entity serialization error.
    #[error("serialization error: {0}")]
    Serialize(#[from] SerializeError),

    /// Transport error.
    #[error("transport error: {0}")]
    Transport(String),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failure to render an entity for delivery.
#[derive(Debug, Error)]
pub enum SerializeError {
    /// The encoder failed.
    #[error("failed to encode entity {id}: {reason}")]
    Encode { id: String, reason: String },
}
