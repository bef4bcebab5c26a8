//! Control-plane entry points driven by broker client callbacks.

use std::sync::Arc;

use stanotify_proto::{ControlRequest, ControlResponse, Subscription, TopicError, TopicParser};

use crate::registry::SubscriptionRegistry;

/// Handles subscribe, unsubscribe and disconnect notifications from the broker.
pub struct NotificationService {
    parser: TopicParser,
    registry: Arc<SubscriptionRegistry>,
}

impl NotificationService {
    /// Create a service registering into `registry`.
    pub fn new(parser: TopicParser, registry: Arc<SubscriptionRegistry>) -> Self {
        Self { parser, registry }
    }

    /// The registry subscriptions are recorded in.
    pub fn registry(&self) -> &Arc<SubscriptionRegistry> {
        &self.registry
    }

    /// A client subscribed to `topic`.
    ///
    /// A rejected topic leaves every other subscription untouched.
    pub fn on_subscribe(&self, topic: &str, client_id: &str) -> Result<Subscription, TopicError> {
        let subscription = match self.parser.parse(topic) {
            Ok(subscription) => subscription,
            Err(e) => {
                tracing::warn!(topic, client_id, error = %e, "subscription rejected");
                return Err(e);
            }
        };

        self.registry.add(subscription.clone(), client_id);
        Ok(subscription)
    }

    /// A client unsubscribed from `topic`.
    ///
    /// Unknown topics and clients are ignored. Returns `true` if the
    /// subscription lost its last client.
    pub fn on_unsubscribe(&self, topic: &str, client_id: &str) -> bool {
        match self.parser.parse(topic) {
            Ok(subscription) => self.registry.remove(&subscription, client_id),
            Err(e) => {
                tracing::debug!(topic, client_id, error = %e, "ignoring unsubscribe for invalid topic");
                false
            }
        }
    }

    /// A client disconnected; drop it from every subscription.
    pub fn on_client_disconnect(&self, client_id: &str) -> usize {
        let removed = self.registry.remove_client(client_id);
        tracing::debug!(client_id, removed, "client disconnected");
        removed
    }

    /// Number of live subscriptions.
    pub fn subscription_count(&self) -> usize {
        self.registry.len()
    }

    /// Handle a decoded control request.
    pub fn handle(&self, request: &ControlRequest) -> ControlResponse {
        match request {
            ControlRequest::Subscribe { client_id, topic } => {
                match self.on_subscribe(topic, client_id) {
                    Ok(_) => ControlResponse::ok(),
                    Err(e) => ControlResponse::rejected(&e),
                }
            }
            ControlRequest::Unsubscribe { client_id, topic } => {
                self.on_unsubscribe(topic, client_id);
                ControlResponse::ok()
            }
            ControlRequest::Disconnect { client_id } => {
                self.on_client_disconnect(client_id);
                ControlResponse::ok()
            }
            ControlRequest::Ping => ControlResponse::ok(),
        }
    }
}
