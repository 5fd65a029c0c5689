use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::Utc;

use super::query::{ConcurrencyGuard, SearchQuery};
use super::r#trait::{EventStore, EventStoreError, StoredEvent, UncommittedEvent};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct StreamKey {
    instance_id: String,
    aggregate_type: String,
    aggregate_id: String,
}

impl StreamKey {
    fn of(event: &UncommittedEvent) -> Self {
        Self {
            instance_id: event.aggregate.instance_id.clone(),
            aggregate_type: event.aggregate.aggregate_type.clone(),
            aggregate_id: event.aggregate.id.clone(),
        }
    }
}

#[derive(Debug, Clone)]
struct StreamHead {
    sequence: u64,
    resource_owner: String,
}

#[derive(Debug, Default)]
struct Log {
    events: Vec<StoredEvent>,
    heads: HashMap<StreamKey, StreamHead>,
}

impl Log {
    fn highest_position(&self, query: &SearchQuery) -> u64 {
        self.events
            .iter()
            .rev()
            .find(|e| query.matches(e))
            .map(|e| e.position)
            .unwrap_or(0)
    }

    fn next_position(&self) -> u64 {
        self.events.last().map(|e| e.position).unwrap_or(0) + 1
    }
}

/// In-memory append-only event store.
///
/// Intended for tests/dev. A single lock serializes pushes, which makes every
/// push atomic across aggregates. Not optimized for performance.
#[derive(Debug, Default)]
pub struct InMemoryEventStore {
    log: RwLock<Log>,
}

impl InMemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of persisted events.
    pub fn len(&self) -> usize {
        self.log.read().map(|log| log.events.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of every persisted event in position order.
    pub fn events(&self) -> Vec<StoredEvent> {
        self.log
            .read()
            .map(|log| log.events.clone())
            .unwrap_or_default()
    }
}

fn validate(event: &UncommittedEvent, idx: usize) -> Result<(), EventStoreError> {
    let a = &event.aggregate;
    if a.instance_id.is_empty() || a.aggregate_type.is_empty() || a.id.is_empty() {
        return Err(EventStoreError::InvalidAppend(format!(
            "event at index {idx} has an incomplete aggregate identity"
        )));
    }
    if a.resource_owner.is_empty() {
        return Err(EventStoreError::InvalidAppend(format!(
            "event at index {idx} has no resource owner"
        )));
    }
    if event.event_type.is_empty() {
        return Err(EventStoreError::InvalidAppend(format!(
            "event at index {idx} has no event type"
        )));
    }
    Ok(())
}

#[async_trait]
impl EventStore for InMemoryEventStore {
    async fn filter(&self, query: &SearchQuery) -> Result<Vec<StoredEvent>, EventStoreError> {
        let log = self
            .log
            .read()
            .map_err(|_| EventStoreError::Unavailable("lock poisoned".to_string()))?;

        Ok(log.events.iter().filter(|e| query.matches(e)).cloned().collect())
    }

    async fn push(
        &self,
        events: Vec<UncommittedEvent>,
        guards: Vec<ConcurrencyGuard>,
    ) -> Result<Vec<StoredEvent>, EventStoreError> {
        if events.is_empty() {
            return Ok(vec![]);
        }
        for (idx, e) in events.iter().enumerate() {
            validate(e, idx)?;
        }

        let mut log = self
            .log
            .write()
            .map_err(|_| EventStoreError::Unavailable("lock poisoned".to_string()))?;

        for guard in &guards {
            let actual = log.highest_position(&guard.query);
            if !guard.expected.matches(actual) {
                return Err(EventStoreError::Concurrency(format!(
                    "expected {:?}, found position {actual}",
                    guard.expected
                )));
            }
        }

        // Stage heads first so a failing event leaves the log untouched.
        let mut staged: HashMap<StreamKey, StreamHead> = HashMap::new();
        let mut position = log.next_position();
        let created_at = Utc::now();
        let mut committed = Vec::with_capacity(events.len());

        for e in events {
            let key = StreamKey::of(&e);
            let head = match staged.get(&key).or_else(|| log.heads.get(&key)) {
                Some(head) => head.clone(),
                None => StreamHead {
                    sequence: 0,
                    resource_owner: e.aggregate.resource_owner.clone(),
                },
            };

            if head.resource_owner != e.aggregate.resource_owner {
                return Err(EventStoreError::OwnerMismatch(format!(
                    "stream {} is owned by '{}', attempted push with '{}'",
                    e.aggregate, head.resource_owner, e.aggregate.resource_owner
                )));
            }

            let sequence = head.sequence + 1;
            staged.insert(
                key,
                StreamHead {
                    sequence,
                    resource_owner: head.resource_owner,
                },
            );

            committed.push(StoredEvent {
                event_id: e.event_id,
                aggregate: e.aggregate,
                event_type: e.event_type,
                payload: e.payload,
                creator: e.creator,
                sequence,
                position,
                created_at,
            });
            position += 1;
        }

        log.heads.extend(staged);
        log.events.extend(committed.iter().cloned());

        tracing::debug!(
            count = committed.len(),
            last_position = position - 1,
            "events pushed"
        );

        Ok(committed)
    }
}

#[cfg(test)]
mod tests {
    use keyward_core::{AggregateRef, ExpectedVersion};
    use serde_json::json;
    use uuid::Uuid;

    use super::*;
    use crate::event_store::AggregateFilter;

    fn uncommitted(id: &str, owner: &str, event_type: &str) -> UncommittedEvent {
        UncommittedEvent {
            event_id: Uuid::now_v7(),
            aggregate: AggregateRef::new("group", id, owner, "inst"),
            event_type: event_type.to_string(),
            payload: json!({}),
            creator: "tester".to_string(),
        }
    }

    fn group_query(id: &str) -> SearchQuery {
        SearchQuery::new("inst").filter(AggregateFilter::new("group").aggregate_id(id))
    }

    #[tokio::test]
    async fn push_assigns_sequence_and_position() {
        let store = InMemoryEventStore::new();
        let first = store
            .push(
                vec![uncommitted("g1", "o1", "group.added"), uncommitted("g2", "o1", "group.added")],
                vec![],
            )
            .await
            .unwrap();
        assert_eq!(first[0].sequence, 1);
        assert_eq!(first[1].sequence, 1);
        assert_eq!(first[0].position, 1);
        assert_eq!(first[1].position, 2);

        let second = store
            .push(vec![uncommitted("g1", "o1", "group.changed")], vec![])
            .await
            .unwrap();
        assert_eq!(second[0].sequence, 2);
        assert_eq!(second[0].position, 3);
    }

    #[tokio::test]
    async fn filter_returns_matching_events_in_position_order() {
        let store = InMemoryEventStore::new();
        store.push(vec![uncommitted("g1", "o1", "group.added")], vec![]).await.unwrap();
        store.push(vec![uncommitted("g2", "o1", "group.added")], vec![]).await.unwrap();
        store.push(vec![uncommitted("g1", "o1", "group.changed")], vec![]).await.unwrap();

        let events = store.filter(&group_query("g1")).await.unwrap();
        let types: Vec<_> = events.iter().map(|e| e.event_type.as_str()).collect();
        assert_eq!(types, ["group.added", "group.changed"]);
    }

    #[tokio::test]
    async fn stale_guard_rejects_whole_push() {
        let store = InMemoryEventStore::new();
        store.push(vec![uncommitted("g1", "o1", "group.added")], vec![]).await.unwrap();

        // Both writers observed position 1.
        let guard = || ConcurrencyGuard::new(group_query("g1"), ExpectedVersion::Exact(1));
        store
            .push(vec![uncommitted("g1", "o1", "group.changed")], vec![guard()])
            .await
            .unwrap();

        let err = store
            .push(
                vec![uncommitted("g1", "o1", "group.changed"), uncommitted("g9", "o1", "group.added")],
                vec![guard()],
            )
            .await
            .unwrap_err();
        assert!(matches!(err, EventStoreError::Concurrency(_)));
        assert_eq!(store.len(), 2);
    }

    #[tokio::test]
    async fn guard_on_empty_stream_expects_zero() {
        let store = InMemoryEventStore::new();
        let guard = ConcurrencyGuard::new(group_query("g1"), ExpectedVersion::Exact(0));
        store
            .push(vec![uncommitted("g1", "o1", "group.added")], vec![guard.clone()])
            .await
            .unwrap();
        assert!(store
            .push(vec![uncommitted("g1", "o1", "group.added")], vec![guard])
            .await
            .is_err());
    }

    #[tokio::test]
    async fn resource_owner_is_stable_per_stream() {
        let store = InMemoryEventStore::new();
        store.push(vec![uncommitted("g1", "o1", "group.added")], vec![]).await.unwrap();

        let err = store
            .push(vec![uncommitted("g1", "o2", "group.changed")], vec![])
            .await
            .unwrap_err();
        assert!(matches!(err, EventStoreError::OwnerMismatch(_)));

        let err = store
            .push(
                vec![uncommitted("g5", "o1", "group.added"), uncommitted("g5", "o2", "group.changed")],
                vec![],
            )
            .await
            .unwrap_err();
        assert!(matches!(err, EventStoreError::OwnerMismatch(_)));
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn empty_push_is_a_noop() {
        let store = InMemoryEventStore::new();
        assert!(store.push(vec![], vec![]).await.unwrap().is_empty());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn incomplete_identity_is_rejected() {
        let store = InMemoryEventStore::new();
        let err = store
            .push(vec![uncommitted("", "o1", "group.added")], vec![])
            .await
            .unwrap_err();
        assert!(matches!(err, EventStoreError::InvalidAppend(_)));
    }
}
