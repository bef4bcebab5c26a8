//! Registry of live subscriptions and their clients.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use stanotify_proto::{EntityType, Subscription};

/// Identifier of a broker client.
pub type ClientId = String;

/// A subscription together with the clients holding it.
#[derive(Debug, Clone)]
pub struct SubscriberSet {
    /// The subscription.
    pub subscription: Arc<Subscription>,
    /// Clients subscribed to its topic; never empty while registered.
    pub clients: BTreeSet<ClientId>,
}

#[derive(Debug, Default)]
struct RegistryState {
    /// Entries keyed by canonical topic.
    entries: BTreeMap<String, SubscriberSet>,
    /// Live subscriptions per wanted entity type.
    watched: HashMap<EntityType, usize>,
}

/// Concurrency-safe map from subscription to subscribed clients.
///
/// All mutations and snapshots are serialized by one lock. The set of watched
/// entity types is mirrored into an atomic bitmask so commit hooks can reject
/// unwatched events without taking the lock.
#[derive(Debug, Default)]
pub struct SubscriptionRegistry {
    state: Mutex<RegistryState>,
    watched_mask: AtomicU16,
}

impl SubscriptionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `client_id` to `subscription`, registering it if new.
    ///
    /// Returns `true` if the subscription was newly registered.
    pub fn add(&self, subscription: Subscription, client_id: impl Into<ClientId>) -> bool {
        let client_id = client_id.into();
        let mut state = self.state.lock();

        if let Some(entry) = state.entries.get_mut(subscription.topic()) {
            entry.clients.insert(client_id.clone());
            tracing::debug!(
                topic = subscription.topic(),
                client_id = %client_id,
                clients = entry.clients.len(),
                "subscription coalesced"
            );
            return false;
        }

        let entity_type = subscription.entity_type();
        let topic = subscription.topic().to_string();
        state.entries.insert(
            topic.clone(),
            SubscriberSet {
                subscription: Arc::new(subscription),
                clients: BTreeSet::from([client_id.clone()]),
            },
        );

        let count = state.watched.entry(entity_type).or_insert(0);
        *count += 1;
        if *count == 1 {
            self.watched_mask.fetch_or(entity_type.bit(), Ordering::Release);
            tracing::debug!(entity_type = %entity_type, "entity type now watched");
        }

        tracing::debug!(topic = %topic, client_id = %client_id, "subscription created");
        true
    }

    /// Remove `client_id` from `subscription`.
    ///
    /// Unknown subscriptions or clients are ignored. Returns `true` if the
    /// subscription lost its last client and was dropped.
    pub fn remove(&self, subscription: &Subscription, client_id: &str) -> bool {
        let mut state = self.state.lock();
        Self::remove_locked(&mut state, &self.watched_mask, subscription.topic(), client_id)
    }

    /// Remove `client_id` from every subscription it holds.
    ///
    /// Returns the number of subscriptions dropped as a result.
    pub fn remove_client(&self, client_id: &str) -> usize {
        let mut state = self.state.lock();
        let topics: Vec<String> = state
            .entries
            .iter()
            .filter(|(_, entry)| entry.clients.contains(client_id))
            .map(|(topic, _)| topic.clone())
            .collect();

        topics
            .iter()
            .filter(|topic| Self::remove_locked(&mut state, &self.watched_mask, topic, client_id))
            .count()
    }

    fn remove_locked(
        state: &mut RegistryState,
        watched_mask: &AtomicU16,
        topic: &str,
        client_id: &str,
    ) -> bool {
        let Some(entry) = state.entries.get_mut(topic) else {
            return false;
        };
        if !entry.clients.remove(client_id) {
            return false;
        }
        if !entry.clients.is_empty() {
            tracing::debug!(topic, client_id, clients = entry.clients.len(), "client unsubscribed");
            return false;
        }

        let entity_type = entry.subscription.entity_type();
        state.entries.remove(topic);

        if let Some(count) = state.watched.get_mut(&entity_type) {
            *count -= 1;
            if *count == 0 {
                state.watched.remove(&entity_type);
                watched_mask.fetch_and(!entity_type.bit(), Ordering::Release);
                tracing::debug!(entity_type = %entity_type, "entity type no longer watched");
            }
        }

        tracing::debug!(topic, client_id, "subscription removed");
        true
    }

    /// Whether any live subscription wants entities of `entity_type`.
    pub fn is_watched(&self, entity_type: EntityType) -> bool {
        self.watched_mask.load(Ordering::Acquire) & entity_type.bit() != 0
    }

    /// Entity types with at least one live subscription.
    pub fn watched_entity_types(&self) -> HashSet<EntityType> {
        let mask = self.watched_mask.load(Ordering::Acquire);
        EntityType::ALL
            .into_iter()
            .filter(|t| mask & t.bit() != 0)
            .collect()
    }

    /// Point-in-time copy of all entries, ordered by topic.
    pub fn snapshot(&self) -> Vec<SubscriberSet> {
        self.state.lock().entries.values().cloned().collect()
    }

    /// Clients currently subscribed to `topic`.
    pub fn clients(&self, topic: &str) -> Option<BTreeSet<ClientId>> {
        self.state
            .lock()
            .entries
            .get(topic)
            .map(|entry| entry.clients.clone())
    }

    /// Number of live subscriptions.
    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    /// Whether there are no live subscriptions.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stanotify_proto::{CollectionTarget, EntityTarget, SubscriptionKind};

    fn things() -> Subscription {
        Subscription::new(
            "v1.1/Things",
            SubscriptionKind::Collection(CollectionTarget {
                source: None,
                wanted: EntityType::Things,
            }),
        )
    }

    fn thing(id: &str) -> Subscription {
        Subscription::new(
            format!("v1.1/Things({id})"),
            SubscriptionKind::Entity(EntityTarget {
                source: None,
                wanted: EntityType::Things,
                id: Some(id.to_string()),
            }),
        )
    }

    fn clients(list: &[&str]) -> BTreeSet<ClientId> {
        list.iter().map(|c| c.to_string()).collect()
    }

    #[test]
    fn test_coalescing_and_reference_counting() {
        let registry = SubscriptionRegistry::new();

        assert!(registry.add(things(), "c1"));
        assert!(!registry.add(things(), "c2"));
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.clients("v1.1/Things"), Some(clients(&["c1", "c2"])));

        assert!(!registry.remove(&things(), "c1"));
        assert_eq!(registry.clients("v1.1/Things"), Some(clients(&["c2"])));
        assert!(registry.is_watched(EntityType::Things));

        assert!(registry.remove(&things(), "c2"));
        assert!(registry.is_empty());
        assert!(!registry.is_watched(EntityType::Things));
        assert!(registry.watched_entity_types().is_empty());
    }

    #[test]
    fn test_watched_type_outlives_one_subscription() {
        let registry = SubscriptionRegistry::new();
        registry.add(things(), "c1");
        registry.add(thing("1"), "c1");

        registry.remove(&things(), "c1");
        assert!(registry.is_watched(EntityType::Things));

        registry.remove(&thing("1"), "c1");
        assert!(!registry.is_watched(EntityType::Things));
    }

    #[test]
    fn test_remove_is_idempotent() {
        let registry = SubscriptionRegistry::new();
        assert!(!registry.remove(&things(), "nobody"));

        registry.add(things(), "c1");
        assert!(!registry.remove(&things(), "c2"));
        assert!(registry.remove(&things(), "c1"));
        assert!(!registry.remove(&things(), "c1"));
        assert!(registry.watched_entity_types().is_empty());
    }

    #[test]
    fn test_remove_client() {
        let registry = SubscriptionRegistry::new();
        registry.add(things(), "c1");
        registry.add(thing("1"), "c1");
        registry.add(thing("1"), "c2");

        assert_eq!(registry.remove_client("c1"), 1);
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.clients("v1.1/Things(1)"), Some(clients(&["c2"])));
    }

    #[test]
    fn test_snapshot_is_ordered_and_detached() {
        let registry = SubscriptionRegistry::new();
        registry.add(thing("2"), "c1");
        registry.add(things(), "c1");
        registry.add(thing("1"), "c1");

        let snapshot = registry.snapshot();
        let topics: Vec<&str> = snapshot.iter().map(|e| e.subscription.topic()).collect();
        assert_eq!(topics, vec!["v1.1/Things", "v1.1/Things(1)", "v1.1/Things(2)"]);

        registry.remove_client("c1");
        assert!(registry.is_empty());
        assert_eq!(snapshot.len(), 3);
    }

    #[test]
    fn test_concurrent_add_remove() {
        let registry = Arc::new(SubscriptionRegistry::new());
        let mut handles = Vec::new();
        for i in 0..8 {
            let registry = registry.clone();
            handles.push(std::thread::spawn(move || {
                let client = format!("c{i}");
                for _ in 0..200 {
                    registry.add(things(), client.clone());
                    registry.add(thing("1"), client.clone());
                    let _ = registry.snapshot();
                    registry.remove(&thing("1"), &client);
                    registry.remove(&things(), &client);
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }

        assert!(registry.is_empty());
        assert!(registry.watched_entity_types().is_empty());
    }
}
