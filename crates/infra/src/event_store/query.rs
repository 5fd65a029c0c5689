//! Event filters and concurrency guards.
//!
//! A [`SearchQuery`] is executed verbatim by the store, so write models build
//! the narrowest query that still covers every event type they fold.

use serde::{Deserialize, Serialize};

use keyward_core::ExpectedVersion;

use crate::event_store::StoredEvent;

/// Selects events of one aggregate type, optionally narrowed to ids and event types.
///
/// Empty `aggregate_ids` / `event_types` mean "any".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregateFilter {
    pub aggregate_type: String,
    pub aggregate_ids: Vec<String>,
    pub event_types: Vec<String>,
}

impl AggregateFilter {
    pub fn new(aggregate_type: impl Into<String>) -> Self {
        Self {
            aggregate_type: aggregate_type.into(),
            aggregate_ids: Vec::new(),
            event_types: Vec::new(),
        }
    }

    pub fn aggregate_id(mut self, id: impl Into<String>) -> Self {
        self.aggregate_ids.push(id.into());
        self
    }

    pub fn aggregate_ids<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.aggregate_ids.extend(ids.into_iter().map(Into::into));
        self
    }

    pub fn event_types(mut self, types: &[&str]) -> Self {
        self.event_types.extend(types.iter().map(|t| t.to_string()));
        self
    }

    pub fn matches(&self, event: &StoredEvent) -> bool {
        event.aggregate.aggregate_type == self.aggregate_type
            && (self.aggregate_ids.is_empty() || self.aggregate_ids.iter().any(|id| *id == event.aggregate.id))
            && (self.event_types.is_empty() || self.event_types.iter().any(|t| *t == event.event_type))
    }
}

/// Event filter executed by [`EventStore::filter`](crate::event_store::EventStore::filter).
///
/// An event matches if it belongs to the instance, has the resource owner (when
/// set), lies after `position_after` (when set) and matches at least one of the
/// aggregate filters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchQuery {
    pub instance_id: String,
    pub resource_owner: Option<String>,
    pub position_after: Option<u64>,
    pub filters: Vec<AggregateFilter>,
}

impl SearchQuery {
    pub fn new(instance_id: impl Into<String>) -> Self {
        Self {
            instance_id: instance_id.into(),
            resource_owner: None,
            position_after: None,
            filters: Vec::new(),
        }
    }

    pub fn resource_owner(mut self, owner: impl Into<String>) -> Self {
        self.resource_owner = Some(owner.into());
        self
    }

    pub fn position_after(mut self, position: u64) -> Self {
        self.position_after = Some(position);
        self
    }

    pub fn filter(mut self, filter: AggregateFilter) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn matches(&self, event: &StoredEvent) -> bool {
        event.aggregate.instance_id == self.instance_id
            && self
                .resource_owner
                .as_ref()
                .is_none_or(|owner| *owner == event.aggregate.resource_owner)
            && self.position_after.is_none_or(|p| event.position > p)
            && self.filters.iter().any(|f| f.matches(event))
    }
}

/// Optimistic concurrency precondition attached to a push.
///
/// The store computes the highest position among persisted events matching
/// `query` (0 if none) and rejects the whole push unless `expected` matches it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConcurrencyGuard {
    pub query: SearchQuery,
    pub expected: ExpectedVersion,
}

impl ConcurrencyGuard {
    pub fn new(query: SearchQuery, expected: ExpectedVersion) -> Self {
        Self { query, expected }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use uuid::Uuid;

    use keyward_core::AggregateRef;

    use super::*;

    fn event(aggregate_type: &str, id: &str, owner: &str, event_type: &str, position: u64) -> StoredEvent {
        StoredEvent {
            event_id: Uuid::now_v7(),
            aggregate: AggregateRef::new(aggregate_type, id, owner, "inst"),
            event_type: event_type.to_string(),
            payload: serde_json::json!({}),
            creator: "u".to_string(),
            sequence: 1,
            position,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn filters_are_ored() {
        let q = SearchQuery::new("inst")
            .filter(AggregateFilter::new("group").aggregate_id("g1"))
            .filter(AggregateFilter::new("user").event_types(&["user.removed"]));

        assert!(q.matches(&event("group", "g1", "o", "group.added", 1)));
        assert!(!q.matches(&event("group", "g2", "o", "group.added", 1)));
        assert!(q.matches(&event("user", "u9", "o", "user.removed", 1)));
        assert!(!q.matches(&event("user", "u9", "o", "user.locked", 1)));
    }

    #[test]
    fn owner_instance_and_position_narrow_the_result() {
        let q = SearchQuery::new("inst")
            .resource_owner("o1")
            .position_after(5)
            .filter(AggregateFilter::new("group"));

        assert!(q.matches(&event("group", "g1", "o1", "group.added", 6)));
        assert!(!q.matches(&event("group", "g1", "o1", "group.added", 5)));
        assert!(!q.matches(&event("group", "g1", "o2", "group.added", 6)));

        let mut other_instance = event("group", "g1", "o1", "group.added", 6);
        other_instance.aggregate.instance_id = "other".into();
        assert!(!q.matches(&other_instance));
    }

    #[test]
    fn query_without_filters_matches_nothing() {
        let q = SearchQuery::new("inst");
        assert!(!q.matches(&event("group", "g1", "o", "group.added", 1)));
    }
}
