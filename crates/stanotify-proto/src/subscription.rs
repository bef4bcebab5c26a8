//! Subscription variants and their match predicate.

use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::fmt;
use std::hash::{Hash, Hasher};

use crate::event::MutationEvent;
use crate::model::EntityType;

/// The related entity a subscription is scoped to, e.g. `Datastreams(52)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Source {
    /// Type of the related entity.
    pub entity_type: EntityType,
    /// Unescaped identifier of the related entity.
    pub id: String,
}

impl Source {
    /// Create a source reference.
    pub fn new(entity_type: EntityType, id: impl Into<String>) -> Self {
        Self {
            entity_type,
            id: id.into(),
        }
    }

    fn contains(&self, event: &MutationEvent) -> bool {
        event.is_member_of(self.entity_type, &self.id)
    }
}

/// A set of entities of one type, optionally reached through a source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionTarget {
    pub source: Option<Source>,
    pub wanted: EntityType,
}

impl CollectionTarget {
    fn matches(&self, event: &MutationEvent, real: EntityType) -> bool {
        if real != self.wanted {
            return false;
        }
        match &self.source {
            None => true,
            Some(source) => source.contains(event),
        }
    }
}

/// A single entity, addressed directly by id or through a to-one link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityTarget {
    pub source: Option<Source>,
    pub wanted: EntityType,
    /// `None` for the referenced-entity form (`Datastreams(52)/Thing`).
    pub id: Option<String>,
}

impl EntityTarget {
    fn matches(&self, event: &MutationEvent, real: EntityType) -> bool {
        if real != self.wanted {
            return false;
        }
        match (&self.id, &self.source) {
            (Some(id), _) => event.entity.id == *id,
            (None, Some(source)) => source.contains(event),
            (None, None) => true,
        }
    }
}

impl From<CollectionTarget> for EntityTarget {
    fn from(target: CollectionTarget) -> Self {
        Self {
            source: target.source,
            wanted: target.wanted,
            id: None,
        }
    }
}

/// Fields to serialize when delivering a notification.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Projection {
    fields: BTreeSet<String>,
}

impl Projection {
    /// Create a projection over the given fields.
    pub fn new<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            fields: fields.into_iter().map(Into::into).collect(),
        }
    }

    /// The selected field names.
    pub fn fields(&self) -> &BTreeSet<String> {
        &self.fields
    }

    /// Whether `field` is selected.
    pub fn contains(&self, field: &str) -> bool {
        self.fields.contains(field)
    }
}

/// The four kinds of subscription a topic can classify into.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubscriptionKind {
    /// All changes to a collection (`Things`, `Datastreams(52)/Observations`).
    Collection(CollectionTarget),
    /// Changes to one entity (`Things(1)`, `Datastreams(52)/Thing`).
    Entity(EntityTarget),
    /// Changes to one property of an entity (`Things(1)/name`).
    Property { target: EntityTarget, property: String },
    /// Collection changes delivered with a field projection.
    Select {
        target: CollectionTarget,
        projection: Projection,
    },
}

/// A classified subscription topic.
///
/// Equality, ordering and hashing use the canonical topic only, so two
/// subscriptions parsed from the same topic always coalesce.
#[derive(Debug, Clone)]
pub struct Subscription {
    topic: String,
    kind: SubscriptionKind,
}

impl Subscription {
    /// Create a subscription for a canonical topic.
    pub fn new(topic: impl Into<String>, kind: SubscriptionKind) -> Self {
        Self {
            topic: topic.into(),
            kind,
        }
    }

    /// Canonical topic, used for identity and for publishing.
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// The classified variant.
    pub fn kind(&self) -> &SubscriptionKind {
        &self.kind
    }

    /// Type of the entities this subscription delivers.
    pub fn entity_type(&self) -> EntityType {
        match &self.kind {
            SubscriptionKind::Collection(target) => target.wanted,
            SubscriptionKind::Entity(target) => target.wanted,
            SubscriptionKind::Property { target, .. } => target.wanted,
            SubscriptionKind::Select { target, .. } => target.wanted,
        }
    }

    /// Related source entity, if the topic is scoped to one.
    pub fn source(&self) -> Option<&Source> {
        match &self.kind {
            SubscriptionKind::Collection(target) => target.source.as_ref(),
            SubscriptionKind::Entity(target) => target.source.as_ref(),
            SubscriptionKind::Property { target, .. } => target.source.as_ref(),
            SubscriptionKind::Select { target, .. } => target.source.as_ref(),
        }
    }

    /// Projection to serialize with; `None` means the full entity.
    pub fn projection(&self) -> Option<&Projection> {
        match &self.kind {
            SubscriptionKind::Select { projection, .. } => Some(projection),
            _ => None,
        }
    }

    /// Whether `event`, for an entity of type `real`, should be delivered.
    pub fn matches(&self, event: &MutationEvent, real: EntityType) -> bool {
        match &self.kind {
            SubscriptionKind::Collection(target) => target.matches(event, real),
            SubscriptionKind::Entity(target) => target.matches(event, real),
            SubscriptionKind::Property { target, property } => {
                target.matches(event, real) && event.changed.touches(property)
            }
            SubscriptionKind::Select { target, .. } => target.matches(event, real),
        }
    }
}

impl PartialEq for Subscription {
    fn eq(&self, other: &Self) -> bool {
        self.topic == other.topic
    }
}

impl Eq for Subscription {}

impl Hash for Subscription {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.topic.hash(state);
    }
}

impl PartialOrd for Subscription {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Subscription {
    fn cmp(&self, other: &Self) -> Ordering {
        self.topic.cmp(&other.topic)
    }
}

impl fmt::Display for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.topic)
    }
}
