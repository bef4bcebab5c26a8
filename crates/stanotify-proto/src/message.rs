//! Control and ingest messages exchanged with the notification server.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Error, TopicError};
use crate::event::{ChangedFields, Entity, MutationEvent};
use crate::model::EntityType;

/// A control-plane request, forwarded from the broker's client callbacks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum ControlRequest {
    /// A client subscribed to a topic.
    Subscribe { client_id: String, topic: String },
    /// A client unsubscribed from a topic.
    Unsubscribe { client_id: String, topic: String },
    /// A client went away; drop it from every subscription.
    Disconnect { client_id: String },
    /// Liveness check.
    Ping,
}

/// Reply to a [`ControlRequest`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlResponse {
    /// `0` on success, otherwise one of [`error_codes`].
    pub code: u32,
    /// Human-readable detail for failures.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ControlResponse {
    /// Successful response.
    pub fn ok() -> Self {
        Self {
            code: error_codes::OK,
            message: None,
        }
    }

    /// Error response.
    pub fn error(code: u32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: Some(message.into()),
        }
    }

    /// Response for a rejected subscription topic.
    pub fn rejected(err: &TopicError) -> Self {
        let code = match err {
            TopicError::NotFound { .. } => error_codes::NOT_FOUND,
            TopicError::InvalidNavigation { .. } => error_codes::INVALID_NAVIGATION,
            _ => error_codes::TOPIC_REJECTED,
        };
        Self::error(code, err.to_string())
    }

    /// Whether the request succeeded.
    pub fn is_ok(&self) -> bool {
        self.code == error_codes::OK
    }
}

/// How an ingested entity changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Created,
    Updated,
    Unknown,
}

/// A committed mutation, as pushed by the persistence layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MutationMessage {
    /// Entity-set or navigation name of the entity type.
    pub entity_type: String,
    pub id: String,
    #[serde(default)]
    pub properties: Map<String, Value>,
    pub change: ChangeKind,
    /// Changed fields; only read for `updated`.
    #[serde(default)]
    pub changed_fields: Vec<String>,
    /// Related entity ids reachable from this entity, by type name.
    #[serde(default)]
    pub membership: BTreeMap<String, Vec<String>>,
}

impl TryFrom<MutationMessage> for MutationEvent {
    type Error = Error;

    fn try_from(msg: MutationMessage) -> Result<Self, Self::Error> {
        let entity_type: EntityType = msg.entity_type.parse()?;
        let changed = match msg.change {
            ChangeKind::Created => ChangedFields::Created,
            ChangeKind::Updated => ChangedFields::updated(msg.changed_fields),
            ChangeKind::Unknown => ChangedFields::Unknown,
        };

        let entity = Entity {
            id: msg.id,
            properties: msg.properties,
        };
        let mut event = MutationEvent::new(entity_type, entity, changed);
        for (type_name, ids) in msg.membership {
            let related: EntityType = type_name.parse()?;
            event.membership.entry(related).or_default().extend(ids);
        }
        Ok(event)
    }
}

/// Error codes carried in [`ControlResponse::code`].
pub mod error_codes {
    /// Success.
    pub const OK: u32 = 0;
    /// Unknown/internal error.
    pub const INTERNAL: u32 = 1;
    /// Invalid request format.
    pub const INVALID_REQUEST: u32 = 2;
    /// Topic path names a missing resource.
    pub const NOT_FOUND: u32 = 3;
    /// Topic path is not navigable.
    pub const INVALID_NAVIGATION: u32 = 4;
    /// Topic could not be classified.
    pub const TOPIC_REJECTED: u32 = 5;
}
