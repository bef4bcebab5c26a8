//! Protocol error types.

use thiserror::Error;

/// Protocol-level errors.
#[derive(Debug, Error)]
pub enum Error {
    /// Serialization failed.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Deserialization failed.
    #[error("deserialization error: {0}")]
    Deserialization(String),

    /// Invalid message format.
    #[error("invalid message: {0}")]
    InvalidMessage(String),
}

/// Failure reported by a [`ResourcePathValidator`](crate::ResourcePathValidator).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PathError {
    /// The path names a resource that does not exist.
    #[error("resource not found: {path}")]
    NotFound { path: String },

    /// The path names existing resources that cannot be navigated this way.
    #[error("invalid navigation in {path}: {reason}")]
    InvalidNavigation { path: String, reason: String },
}

/// Reasons a subscription topic is rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TopicError {
    /// The topic does not start with a supported protocol version.
    #[error("topic {topic:?} does not start with a supported version prefix")]
    MissingVersion { topic: String },

    /// The topic path could not be split into segments.
    #[error("malformed topic {topic:?}: {reason}")]
    Malformed { topic: String, reason: String },

    /// The topic path addresses a resource that does not exist.
    #[error("topic {topic:?} rejected: {source}")]
    NotFound {
        topic: String,
        #[source]
        source: PathError,
    },

    /// The topic path is not a navigable resource path.
    #[error("topic {topic:?} rejected: {source}")]
    InvalidNavigation {
        topic: String,
        #[source]
        source: PathError,
    },

    /// No grammar rule accepted the topic.
    #[error("could not classify topic {topic:?}")]
    Unclassifiable { topic: String },
}

impl TopicError {
    /// Wrap a validator failure for the given topic.
    pub fn from_path(topic: impl Into<String>, source: PathError) -> Self {
        let topic = topic.into();
        match source {
            PathError::NotFound { .. } => TopicError::NotFound { topic, source },
            PathError::InvalidNavigation { .. } => TopicError::InvalidNavigation { topic, source },
        }
    }

    /// The raw topic that was rejected.
    pub fn topic(&self) -> &str {
        match self {
            TopicError::MissingVersion { topic }
            | TopicError::Malformed { topic, .. }
            | TopicError::NotFound { topic, .. }
            | TopicError::InvalidNavigation { topic, .. }
            | TopicError::Unclassifiable { topic } => topic,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_path_keeps_kind() {
        let err = TopicError::from_path(
            "v1.1/Foos",
            PathError::NotFound {
                path: "Foos".to_string(),
            },
        );
        assert!(matches!(err, TopicError::NotFound { .. }));
        assert_eq!(err.topic(), "v1.1/Foos");

        let err = TopicError::from_path(
            "v1.1/Things(1)/Sensor",
            PathError::InvalidNavigation {
                path: "Things(1)/Sensor".to_string(),
                reason: "Things has no navigation Sensor".to_string(),
            },
        );
        assert!(matches!(err, TopicError::InvalidNavigation { .. }));
    }

    #[test]
    fn test_unclassifiable_message() {
        let err = TopicError::Unclassifiable {
            topic: "v1.1/Things(1)/Datastreams(2)/x(3)".to_string(),
        };
        assert!(err.to_string().starts_with("could not classify topic"));
    }
}
