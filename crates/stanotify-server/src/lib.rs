//! SensorThings change notification server library.
//!
//! This crate provides the subscription registry, the event dispatcher, the
//! commit-side change capture queue and the socket transport that together
//! deliver entity change notifications to subscribed clients.

pub mod broker;
pub mod capture;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod registry;
pub mod serializer;
pub mod service;
pub mod transport;

pub use broker::{Broker, NngBroker, QoS};
pub use capture::{start_processor, CaptureProcessor, ChangeCapture, EmitOutcome};
pub use config::{Args, NotifyConfig, ServerConfig};
pub use dispatcher::{DispatchMetrics, DispatchReport, EventDispatcher};
pub use error::{Error, SerializeError};
pub use registry::{ClientId, SubscriberSet, SubscriptionRegistry};
pub use serializer::{EntitySerializer, JsonSerializer};
pub use service::NotificationService;
pub use transport::{create_transport, Transport};
