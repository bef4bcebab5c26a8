//! Entity mutation events produced at commit time.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::model::EntityType;

/// Handle to a committed entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    /// Stable identifier, rendered as text (`52`, `abc`).
    pub id: String,
    /// Entity properties as persisted.
    #[serde(default)]
    pub properties: Map<String, Value>,
}

impl Entity {
    /// Create an entity with no properties.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            properties: Map::new(),
        }
    }

    /// Add a property.
    pub fn with_property(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.properties.insert(name.into(), value.into());
        self
    }
}

/// Which fields differ from the previously persisted state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangedFields {
    /// The entity was just created.
    Created,
    /// The entity was updated; these fields changed.
    Updated(BTreeSet<String>),
    /// The store did not track differences for this write.
    Unknown,
}

impl ChangedFields {
    /// Build an `Updated` set from field names.
    pub fn updated<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        ChangedFields::Updated(fields.into_iter().map(Into::into).collect())
    }

    /// Whether a watcher of `field` should be notified.
    pub fn touches(&self, field: &str) -> bool {
        match self {
            ChangedFields::Created | ChangedFields::Unknown => true,
            ChangedFields::Updated(fields) => fields.contains(field),
        }
    }
}

/// A single create or update, as seen by the notification subsystem.
#[derive(Debug, Clone)]
pub struct MutationEvent {
    /// Type of the mutated entity.
    pub entity_type: EntityType,
    /// The mutated entity.
    pub entity: Arc<Entity>,
    /// Changed-field description.
    pub changed: ChangedFields,
    /// Identifiers of related entities reachable from this one, by type.
    pub membership: HashMap<EntityType, HashSet<String>>,
}

impl MutationEvent {
    /// Create an event.
    pub fn new(entity_type: EntityType, entity: Entity, changed: ChangedFields) -> Self {
        Self {
            entity_type,
            entity: Arc::new(entity),
            changed,
            membership: HashMap::new(),
        }
    }

    /// Create an event for a freshly inserted entity.
    pub fn created(entity_type: EntityType, entity: Entity) -> Self {
        Self::new(entity_type, entity, ChangedFields::Created)
    }

    /// Record that the entity is reachable from `related_type(id)`.
    pub fn with_member(mut self, related_type: EntityType, id: impl Into<String>) -> Self {
        self.membership
            .entry(related_type)
            .or_default()
            .insert(id.into());
        self
    }

    /// Whether the entity is reachable from `related_type(id)`.
    pub fn is_member_of(&self, related_type: EntityType, id: &str) -> bool {
        self.membership
            .get(&related_type)
            .is_some_and(|ids| ids.contains(id))
    }
}
