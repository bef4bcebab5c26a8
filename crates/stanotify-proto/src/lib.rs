//! SensorThings change-notification protocol types.
//!
//! This crate defines everything about notifications that does not need a
//! running server: the entity model, subscription topics and their
//! classification, mutation events, and the control/ingest wire messages.
//!
//! # Modules
//!
//! - [`model`] - Entity types, navigation links and properties
//! - [`path`] - Resource path segmentation
//! - [`validator`] - Resource path validation
//! - [`topic`] - Topic classification into subscriptions
//! - [`subscription`] - Subscription variants and matching
//! - [`event`] - Mutation events
//! - [`message`] - Control and ingest messages
//! - [`framing`] - Length-prefixed JSON framing
//! - [`error`] - Protocol error types

pub mod error;
pub mod event;
pub mod framing;
pub mod message;
pub mod model;
pub mod path;
pub mod subscription;
pub mod topic;
pub mod validator;

pub use error::{Error, PathError, TopicError};
pub use event::{ChangedFields, Entity, MutationEvent};
pub use message::{error_codes, ChangeKind, ControlRequest, ControlResponse, MutationMessage};
pub use model::{Cardinality, EntityType};
pub use subscription::{
    CollectionTarget, EntityTarget, Projection, Source, Subscription, SubscriptionKind,
};
pub use topic::{ParserConfig, TopicParser, DEFAULT_VERSIONS};
pub use validator::{ModelPathValidator, ResourcePathValidator};
