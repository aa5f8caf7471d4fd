//! EventStore: append-only hash-chained log, snapshot materialisation, bundle export/import.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::artifact::Artifact;
use crate::context::ContextManager;
use crate::governor::Budgets;
use crate::ids::{generate_id, to_hex};
use crate::snapshot::Snapshot;
use crate::task::{DagState, TaskQueue};

use super::EventSubscriber;
use super::types::{CHAIN_SENTINEL, Event, EventType, SnapshotTrigger};

/// The partial bundle an `EventStore` itself can produce. `Kernel::export_bundle` wraps this
/// with `config` and `final_snapshot` to build the full persisted record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventBundle {
    pub run_id: String,
    pub events: Vec<Event>,
    pub snapshots: Vec<Snapshot>,
    pub exported_at: DateTime<Utc>,
}

pub struct EventStore {
    run_id: String,
    events: Vec<Event>,
    snapshots: Vec<Snapshot>,
    subscribers: Vec<(usize, Box<dyn EventSubscriber>)>,
    next_token: usize,
}

fn compute_hash(run_id: &str, sequence_number: u64, event_type: EventType, payload: &serde_json::Value, hash_prev: &str) -> String {
    #[derive(Serialize)]
    struct HashInput<'a> {
        run_id: &'a str,
        sequence_number: u64,
        event_type: EventType,
        payload: &'a serde_json::Value,
        hash_prev: &'a str,
    }
    let input = HashInput { run_id, sequence_number, event_type, payload, hash_prev };
    let bytes = serde_json::to_vec(&input).expect("event payload is always serializable JSON");
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    to_hex(&hasher.finalize())
}

impl EventStore {
    pub fn new(run_id: &str) -> Self {
        Self {
            run_id: run_id.to_string(),
            events: Vec::new(),
            snapshots: Vec::new(),
            subscribers: Vec::new(),
            next_token: 0,
        }
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn snapshots(&self) -> &[Snapshot] {
        &self.snapshots
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    fn build_event(&self, event_type: EventType, payload: serde_json::Value) -> Event {
        let sequence_number = self.events.len() as u64;
        let hash_prev = self.events.last().map(|e| e.hash_self.clone()).unwrap_or_else(|| CHAIN_SENTINEL.to_string());
        let hash_self = compute_hash(&self.run_id, sequence_number, event_type, &payload, &hash_prev);
        Event {
            id: generate_id("event", &format!("{event_type:?}")),
            run_id: self.run_id.clone(),
            timestamp: Utc::now(),
            event_type,
            payload,
            hash_prev,
            hash_self,
            sequence_number,
        }
    }

    /// Notify subscribers in registration order, synchronously. A panicking subscriber is
    /// swallowed; its token is returned so the caller can record an `ERROR_RAISED` in its place.
    fn notify(&mut self, event: &Event) -> Vec<usize> {
        let mut subscribers = std::mem::take(&mut self.subscribers);
        let mut failed = Vec::new();
        for (token, subscriber) in subscribers.iter_mut() {
            let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| subscriber.on_event(event)));
            if outcome.is_err() {
                failed.push(*token);
            }
        }
        self.subscribers = subscribers;
        failed
    }

    pub fn append(&mut self, event_type: EventType, payload: serde_json::Value) -> &Event {
        let event = self.build_event(event_type, payload);
        self.events.push(event);
        let notified = self.events.last().unwrap().clone();
        let failed = self.notify(&notified);
        for token in failed {
            let error_event = self.build_event(
                EventType::ErrorRaised,
                serde_json::json!({"kind": super::types::ErrorKind::SubscriberError, "subscriber_token": token}),
            );
            self.events.push(error_event);
        }
        self.events.last().unwrap()
    }

    pub fn query(&self, types: Option<&[EventType]>, after: Option<u64>, before: Option<u64>, limit: Option<usize>) -> Vec<&Event> {
        let mut matched: Vec<&Event> = self
            .events
            .iter()
            .filter(|e| types.map(|ts| ts.contains(&e.event_type)).unwrap_or(true))
            .filter(|e| after.map(|a| e.sequence_number > a).unwrap_or(true))
            .filter(|e| before.map(|b| e.sequence_number < b).unwrap_or(true))
            .collect();
        if let Some(limit) = limit {
            matched.reverse();
            matched.truncate(limit);
        }
        matched
    }

    /// Deep-clones `queue`/`context`/`budgets`/`artifacts`, stamps the sequence number the
    /// snapshot represents (strictly before the `SNAPSHOT_CREATED` event appended after it).
    pub fn create_snapshot(
        &mut self,
        queue: &TaskQueue,
        dag: DagState,
        context: &ContextManager,
        budgets: &Budgets,
        artifacts: &[Artifact],
        trigger: SnapshotTrigger,
    ) -> &Snapshot {
        let sequence_number = self.events.len() as u64;
        let snapshot = Snapshot::capture(&self.run_id, sequence_number, queue.clone(), dag, context.clone(), *budgets, artifacts.to_vec(), trigger);
        self.snapshots.push(snapshot);
        let snapshot_id = self.snapshots.last().unwrap().id.clone();
        self.append(EventType::SnapshotCreated, serde_json::json!({"snapshot_id": snapshot_id, "trigger": trigger}));
        self.snapshots.last().unwrap()
    }

    pub fn verify_chain_integrity(&self) -> (bool, Vec<String>) {
        let mut errors = Vec::new();
        let mut expected_prev = CHAIN_SENTINEL.to_string();
        for (idx, event) in self.events.iter().enumerate() {
            if event.sequence_number != idx as u64 {
                errors.push(format!("event at index {idx} has sequence_number {} (expected {idx})", event.sequence_number));
            }
            if event.hash_prev != expected_prev {
                errors.push(format!("event {idx} hash_prev mismatch: expected {expected_prev}, got {}", event.hash_prev));
            }
            expected_prev = event.hash_self.clone();
        }
        (errors.is_empty(), errors)
    }

    pub fn export_bundle(&self) -> EventBundle {
        EventBundle {
            run_id: self.run_id.clone(),
            events: self.events.clone(),
            snapshots: self.snapshots.clone(),
            exported_at: Utc::now(),
        }
    }

    /// Rebuilds a store from a bundle; the next `append` links from the bundle's last event.
    pub fn from_bundle(bundle: EventBundle) -> Self {
        Self {
            run_id: bundle.run_id,
            events: bundle.events,
            snapshots: bundle.snapshots,
            subscribers: Vec::new(),
            next_token: 0,
        }
    }

    pub fn subscribe(&mut self, subscriber: Box<dyn EventSubscriber>) -> usize {
        let token = self.next_token;
        self.next_token += 1;
        self.subscribers.push((token, subscriber));
        token
    }

    pub fn unsubscribe(&mut self, token: usize) {
        self.subscribers.retain(|(t, _)| *t != token);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Recorder {
        seen: std::rc::Rc<std::cell::RefCell<Vec<EventType>>>,
    }

    impl EventSubscriber for Recorder {
        fn on_event(&mut self, event: &Event) {
            self.seen.borrow_mut().push(event.event_type);
        }
    }

    struct Panicker;

    impl EventSubscriber for Panicker {
        fn on_event(&mut self, _event: &Event) {
            panic!("boom");
        }
    }

    #[test]
    fn append_assigns_sequence_and_chains_hashes() {
        let mut store = EventStore::new("run-1");
        store.append(EventType::RunStarted, serde_json::json!({}));
        store.append(EventType::PlanCreated, serde_json::json!({}));
        assert_eq!(store.events()[0].sequence_number, 0);
        assert_eq!(store.events()[0].hash_prev, CHAIN_SENTINEL);
        assert_eq!(store.events()[1].hash_prev, store.events()[0].hash_self);
    }

    #[test]
    fn verify_chain_integrity_is_clean_on_fresh_store() {
        let mut store = EventStore::new("run-1");
        store.append(EventType::RunStarted, serde_json::json!({}));
        store.append(EventType::RunCompleted, serde_json::json!({}));
        let (valid, errors) = store.verify_chain_integrity();
        assert!(valid, "{errors:?}");
    }

    #[test]
    fn verify_chain_integrity_detects_broken_link() {
        let mut store = EventStore::new("run-1");
        store.append(EventType::RunStarted, serde_json::json!({}));
        store.events[0].hash_self = "tampered".to_string();
        store.append(EventType::RunCompleted, serde_json::json!({}));
        let (valid, errors) = store.verify_chain_integrity();
        assert!(!valid);
        assert!(!errors.is_empty());
    }

    #[test]
    fn query_filters_by_type_and_respects_limit_latest_first() {
        let mut store = EventStore::new("run-1");
        store.append(EventType::RunStarted, serde_json::json!({}));
        store.append(EventType::BudgetTick, serde_json::json!({"n": 1}));
        store.append(EventType::BudgetTick, serde_json::json!({"n": 2}));
        let ticks = store.query(Some(&[EventType::BudgetTick]), None, None, Some(1));
        assert_eq!(ticks.len(), 1);
        assert_eq!(ticks[0].payload["n"], 2);
    }

    #[test]
    fn export_then_from_bundle_round_trips_events() {
        let mut store = EventStore::new("run-1");
        store.append(EventType::RunStarted, serde_json::json!({}));
        store.append(EventType::RunCompleted, serde_json::json!({}));
        let bundle = store.export_bundle();
        let restored = EventStore::from_bundle(bundle);
        assert_eq!(restored.events().len(), 2);
        assert_eq!(restored.events()[1].hash_self, store.events()[1].hash_self);
    }

    #[test]
    fn subscribers_are_notified_in_registration_order() {
        let mut store = EventStore::new("run-1");
        let seen = std::rc::Rc::new(std::cell::RefCell::new(Vec::new()));
        store.subscribe(Box::new(Recorder { seen: seen.clone() }));
        store.append(EventType::RunStarted, serde_json::json!({}));
        assert_eq!(*seen.borrow(), vec![EventType::RunStarted]);
    }

    #[test]
    fn unsubscribe_stops_future_notifications() {
        let mut store = EventStore::new("run-1");
        let seen = std::rc::Rc::new(std::cell::RefCell::new(Vec::new()));
        let token = store.subscribe(Box::new(Recorder { seen: seen.clone() }));
        store.unsubscribe(token);
        store.append(EventType::RunStarted, serde_json::json!({}));
        assert!(seen.borrow().is_empty());
    }

    #[test]
    fn panicking_subscriber_is_swallowed_and_raises_error_event() {
        let mut store = EventStore::new("run-1");
        store.subscribe(Box::new(Panicker));
        store.append(EventType::RunStarted, serde_json::json!({}));
        assert_eq!(store.events().len(), 2);
        assert_eq!(store.events()[1].event_type, EventType::ErrorRaised);
    }
}
