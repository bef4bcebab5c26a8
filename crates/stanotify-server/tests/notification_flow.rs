//! End-to-end tests: subscribe through the service, emit mutations through
//! change capture, observe what the broker publishes.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use parking_lot::Mutex;
use serde_json::{json, Value};
use tokio::sync::mpsc;

use stanotify_proto::{
    ChangedFields, Entity, EntityType, ModelPathValidator, MutationEvent, ParserConfig, TopicParser,
};
use stanotify_server::{
    start_processor, Broker, EmitOutcome, Error, EventDispatcher, JsonSerializer,
    NotificationService, QoS, SubscriptionRegistry,
};

#[derive(Default)]
struct RecordingBroker {
    published: Mutex<Vec<(String, Bytes)>>,
}

impl Broker for RecordingBroker {
    fn publish(&self, topic: &str, payload: Bytes, _qos: QoS) -> Result<(), Error> {
        self.published.lock().push((topic.to_string(), payload));
        Ok(())
    }
}

struct TestContext {
    service: NotificationService,
    dispatcher: Arc<EventDispatcher>,
    broker: Arc<RecordingBroker>,
}

impl TestContext {
    fn new() -> Self {
        let registry = Arc::new(SubscriptionRegistry::new());
        let broker = Arc::new(RecordingBroker::default());
        let dispatcher = Arc::new(EventDispatcher::new(
            registry.clone(),
            Arc::new(JsonSerializer::new()),
            broker.clone(),
            QoS::AtLeastOnce,
        ));
        let parser = TopicParser::new(ParserConfig::new(), Arc::new(ModelPathValidator::new()));
        Self {
            service: NotificationService::new(parser, registry),
            dispatcher,
            broker,
        }
    }

    fn published(&self) -> Vec<(String, Value)> {
        self.broker
            .published
            .lock()
            .iter()
            .map(|(topic, payload)| (topic.clone(), serde_json::from_slice(payload).unwrap()))
            .collect()
    }
}

fn observation(id: &str, datastream: &str) -> MutationEvent {
    MutationEvent::created(
        EntityType::Observations,
        Entity::new(id)
            .with_property("result", 42)
            .with_property("phenomenonTime", "2024-05-01T12:00:00Z")
            .with_property("resultTime", Value::Null),
    )
    .with_member(EntityType::Datastreams, datastream)
}

#[test]
fn test_sensor_data_flow() {
    let ctx = TestContext::new();
    ctx.service
        .on_subscribe("v1.1/Datastreams(52)/Observations", "dashboard")
        .unwrap();
    ctx.service
        .on_subscribe("v1.1/Observations?$select=result,phenomenonTime", "logger")
        .unwrap();
    ctx.service.on_subscribe("v1.1/Things(1)/name", "ui").unwrap();

    ctx.dispatcher.handle_event(&observation("100", "52"));
    ctx.dispatcher.handle_event(&observation("101", "9"));

    let published = ctx.published();
    assert_eq!(published.len(), 3);

    let by_topic: HashMap<&str, Vec<&Value>> =
        published.iter().fold(HashMap::new(), |mut acc, (topic, payload)| {
            acc.entry(topic.as_str()).or_default().push(payload);
            acc
        });

    assert_eq!(by_topic["v1.1/Datastreams(52)/Observations"].len(), 1);
    assert_eq!(
        by_topic["v1.1/Datastreams(52)/Observations"][0]["@iot.id"],
        json!(100)
    );
    assert_eq!(
        by_topic["v1.1/Observations?$select=result,phenomenonTime"],
        vec![
            &json!({ "result": 42, "phenomenonTime": "2024-05-01T12:00:00Z" }),
            &json!({ "result": 42, "phenomenonTime": "2024-05-01T12:00:00Z" }),
        ]
    );
    assert!(!by_topic.contains_key("v1.1/Things(1)/name"));
}

#[test]
fn test_property_topic_end_to_end() {
    let ctx = TestContext::new();
    ctx.service.on_subscribe("v1.1/Things(1)/name", "ui").unwrap();

    let thing = |changed| {
        MutationEvent::new(
            EntityType::Things,
            Entity::new("1").with_property("name", "Weather station"),
            changed,
        )
    };

    ctx.dispatcher
        .handle_event(&thing(ChangedFields::updated(["description"])));
    assert!(ctx.published().is_empty());

    ctx.dispatcher.handle_event(&thing(ChangedFields::updated(["name"])));
    ctx.dispatcher.handle_event(&thing(ChangedFields::Created));
    assert_eq!(ctx.published().len(), 2);
}

#[test]
fn test_last_unsubscribe_stops_delivery() {
    let ctx = TestContext::new();
    ctx.service.on_subscribe("v1.1/Observations", "a").unwrap();
    ctx.service.on_subscribe("v1.1/Observations", "b").unwrap();
    assert_eq!(ctx.service.subscription_count(), 1);

    ctx.service.on_unsubscribe("v1.1/Observations", "a");
    assert!(ctx.service.registry().is_watched(EntityType::Observations));
    ctx.dispatcher.handle_event(&observation("1", "52"));
    assert_eq!(ctx.published().len(), 1);

    ctx.service.on_unsubscribe("v1.1/Observations", "b");
    ctx.service.on_unsubscribe("v1.1/Observations", "b");
    assert!(ctx
        .service
        .registry()
        .watched_entity_types()
        .is_empty());
}

#[test]
fn test_concurrent_subscribers_and_dispatch() {
    let ctx = Arc::new(TestContext::new());
    ctx.service.on_subscribe("v1.1/Observations", "anchor").unwrap();

    let mut handles = Vec::new();
    for i in 0..4 {
        let ctx = ctx.clone();
        handles.push(std::thread::spawn(move || {
            let client = format!("client-{i}");
            for _ in 0..100 {
                ctx.service
                    .on_subscribe("v1.1/Datastreams(52)/Observations", &client)
                    .unwrap();
                ctx.service
                    .on_unsubscribe("v1.1/Datastreams(52)/Observations", &client);
            }
        }));
    }

    let mut reports = Vec::new();
    for n in 0..200 {
        reports.push(ctx.dispatcher.handle_event(&observation(&n.to_string(), "52")));
    }
    for handle in handles {
        handle.join().unwrap();
    }

    for report in &reports {
        assert!(report.matched >= 1 && report.matched <= 2);
        assert_eq!(report.published, report.matched);
        assert_eq!(report.serialize_calls, 1);
    }

    // Each event reached each topic at most once.
    let published = ctx.published();
    let mut seen = HashMap::new();
    for (topic, payload) in &published {
        let key = (topic.clone(), payload["@iot.id"].to_string());
        *seen.entry(key).or_insert(0) += 1;
    }
    assert!(seen.values().all(|&count| count == 1));
    assert_eq!(ctx.service.subscription_count(), 1);
}

#[tokio::test]
async fn test_commit_hook_to_broker() {
    let ctx = TestContext::new();
    ctx.service
        .on_subscribe("v1.1/Datastreams(52)/Observations", "dashboard")
        .unwrap();

    let capture = start_processor(ctx.dispatcher.clone(), 8);
    assert_eq!(
        capture.emit(MutationEvent::created(EntityType::Sensors, Entity::new("1"))),
        EmitOutcome::Unwatched
    );
    assert_eq!(capture.emit(observation("5", "52")), EmitOutcome::Queued);

    let (tx, mut rx) = mpsc::channel::<()>(1);
    let broker = ctx.broker.clone();
    tokio::spawn(async move {
        while broker.published.lock().is_empty() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        let _ = tx.send(()).await;
    });

    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .unwrap();
    assert_eq!(ctx.published()[0].0, "v1.1/Datastreams(52)/Observations");
}
