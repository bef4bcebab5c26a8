//! Matching mutation events against subscriptions and publishing them.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bytes::Bytes;

use stanotify_proto::{MutationEvent, Projection};

use crate::broker::{Broker, QoS};
use crate::registry::SubscriptionRegistry;
use crate::serializer::EntitySerializer;

/// Outcome of one dispatch pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    /// Subscriptions that matched the event.
    pub matched: usize,
    /// Payloads handed to the broker successfully.
    pub published: usize,
    /// Serializer invocations made during the pass.
    pub serialize_calls: usize,
    /// Matching subscriptions skipped because serialization or publish failed.
    pub failed: usize,
}

/// Cumulative dispatch counters.
#[derive(Debug, Default)]
pub struct DispatchMetrics {
    events: AtomicU64,
    published: AtomicU64,
    failed: AtomicU64,
}

impl DispatchMetrics {
    fn record(&self, report: &DispatchReport) {
        self.events.fetch_add(1, Ordering::Relaxed);
        self.published
            .fetch_add(report.published as u64, Ordering::Relaxed);
        self.failed.fetch_add(report.failed as u64, Ordering::Relaxed);
    }

    /// Events dispatched.
    pub fn events(&self) -> u64 {
        self.events.load(Ordering::Relaxed)
    }

    /// Notifications published.
    pub fn published(&self) -> u64 {
        self.published.load(Ordering::Relaxed)
    }

    /// Deliveries skipped on failure.
    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }
}

/// Publishes each mutation event once per matching subscription.
pub struct EventDispatcher {
    registry: Arc<SubscriptionRegistry>,
    serializer: Arc<dyn EntitySerializer>,
    broker: Arc<dyn Broker>,
    qos: QoS,
    metrics: DispatchMetrics,
}

impl EventDispatcher {
    /// Create a dispatcher over `registry`.
    pub fn new(
        registry: Arc<SubscriptionRegistry>,
        serializer: Arc<dyn EntitySerializer>,
        broker: Arc<dyn Broker>,
        qos: QoS,
    ) -> Self {
        Self {
            registry,
            serializer,
            broker,
            qos,
            metrics: DispatchMetrics::default(),
        }
    }

    /// The registry this dispatcher reads.
    pub fn registry(&self) -> &Arc<SubscriptionRegistry> {
        &self.registry
    }

    /// Cumulative counters.
    pub fn metrics(&self) -> &DispatchMetrics {
        &self.metrics
    }

    /// Deliver `event` to every matching subscription.
    ///
    /// Works on a registry snapshot, so subscribe and unsubscribe are never
    /// blocked by serialization or publishing. Each distinct projection is
    /// serialized at most once per call; failures skip only the affected
    /// deliveries.
    pub fn handle_event(&self, event: &MutationEvent) -> DispatchReport {
        let snapshot = self.registry.snapshot();
        let mut cache: HashMap<Option<&Projection>, Option<Bytes>> = HashMap::new();
        let mut report = DispatchReport::default();

        for entry in &snapshot {
            let subscription = &entry.subscription;
            if !subscription.matches(event, event.entity_type) {
                continue;
            }
            report.matched += 1;

            let projection = subscription.projection();
            let payload = cache.entry(projection).or_insert_with(|| {
                report.serialize_calls += 1;
                match self.serializer.serialize(&event.entity, projection) {
                    Ok(bytes) => Some(bytes),
                    Err(e) => {
                        tracing::warn!(
                            error = %e,
                            entity_type = %event.entity_type,
                            id = %event.entity.id,
                            "failed to serialize notification"
                        );
                        None
                    }
                }
            });

            let Some(payload) = payload.clone() else {
                report.failed += 1;
                continue;
            };

            match self.broker.publish(subscription.topic(), payload, self.qos) {
                Ok(()) => report.published += 1,
                Err(e) => {
                    report.failed += 1;
                    tracing::warn!(
                        error = %e,
                        topic = subscription.topic(),
                        "failed to publish notification"
                    );
                }
            }
        }

        self.metrics.record(&report);
        tracing::trace!(
            entity_type = %event.entity_type,
            id = %event.entity.id,
            subscriptions = snapshot.len(),
            matched = report.matched,
            published = report.published,
            serialize_calls = report.serialize_calls,
            failed = report.failed,
            "dispatch pass complete"
        );
        report
    }
}
