use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use thiserror::Error;
use uuid::Uuid;

use keyward_core::AggregateRef;
use keyward_events::{CodecError, EventFamily};

use super::query::{ConcurrencyGuard, SearchQuery};

/// An event ready to be pushed (not yet assigned a sequence or position).
///
/// ## Event Lifecycle
///
/// 1. **Typed event**: decided by a command handler (`GroupEvent::Added`, ...)
/// 2. **UncommittedEvent**: encoded payload plus the stream it targets
/// 3. **StoredEvent**: persisted with assigned `sequence`, `position`, `created_at`
///
/// Use [`UncommittedEvent::from_typed`] to build one from a typed event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UncommittedEvent {
    pub event_id: Uuid,
    pub aggregate: AggregateRef,
    pub event_type: String,
    pub payload: JsonValue,
    /// User that caused the event.
    pub creator: String,
}

impl UncommittedEvent {
    /// Encode a typed event for the given stream.
    ///
    /// Fails if the event family does not belong to the stream's aggregate type.
    pub fn from_typed<E: EventFamily>(
        aggregate: &AggregateRef,
        creator: &str,
        event: &E,
    ) -> Result<Self, EventStoreError> {
        if aggregate.aggregate_type != E::AGGREGATE_TYPE {
            return Err(EventStoreError::InvalidAppend(format!(
                "'{}' event cannot be appended to '{}' stream",
                event.event_type(),
                aggregate.aggregate_type
            )));
        }

        let payload = keyward_events::encode(event)
            .map_err(|e| EventStoreError::InvalidAppend(e.to_string()))?;

        Ok(Self {
            event_id: Uuid::now_v7(),
            aggregate: aggregate.clone(),
            event_type: event.event_type().to_string(),
            payload,
            creator: creator.to_string(),
        })
    }
}

/// A persisted event.
///
/// ## Ordering
///
/// - `sequence` is per stream: 1, 2, 3, ... without gaps.
/// - `position` is global across the store and strictly increasing in push order;
///   optimistic concurrency guards compare positions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredEvent {
    pub event_id: Uuid,
    pub aggregate: AggregateRef,
    pub event_type: String,
    pub payload: JsonValue,
    pub creator: String,

    pub sequence: u64,
    pub position: u64,
    pub created_at: DateTime<Utc>,
}

impl StoredEvent {
    /// Decode into a typed family.
    ///
    /// `Ok(None)` when the event belongs to another aggregate type or is a type
    /// the family does not know.
    pub fn decode<E: EventFamily>(&self) -> Result<Option<E>, CodecError> {
        if self.aggregate.aggregate_type != E::AGGREGATE_TYPE {
            return Ok(None);
        }
        keyward_events::decode(&self.event_type, &self.payload)
    }
}

/// Event store operation error.
///
/// These are **infrastructure errors** (storage, concurrency, isolation) as
/// opposed to domain errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EventStoreError {
    /// A concurrency guard did not hold; nothing was persisted.
    #[error("optimistic concurrency check failed: {0}")]
    Concurrency(String),

    /// An event tried to change the resource owner of an existing stream.
    #[error("resource owner mismatch: {0}")]
    OwnerMismatch(String),

    #[error("invalid append: {0}")]
    InvalidAppend(String),

    /// Backend unreachable or failed; the operation may be retried.
    #[error("event store unavailable: {0}")]
    Unavailable(String),
}

/// Append-only event store consumed by the command side.
///
/// ## Push Semantics
///
/// `push()`:
/// - evaluates every guard first and rejects the whole batch with
///   [`EventStoreError::Concurrency`] if one fails
/// - keeps the resource owner of each stream stable
/// - assigns `sequence` (stream head + 1, ...), `position` and `created_at`
/// - persists all events of the call atomically, even across aggregates
/// - returns the stored events in push order; an empty push is a no-op
///
/// ## Filter Semantics
///
/// `filter()` returns every event matching the query, ordered by position.
#[async_trait]
pub trait EventStore: Send + Sync {
    async fn filter(&self, query: &SearchQuery) -> Result<Vec<StoredEvent>, EventStoreError>;

    async fn push(
        &self,
        events: Vec<UncommittedEvent>,
        guards: Vec<ConcurrencyGuard>,
    ) -> Result<Vec<StoredEvent>, EventStoreError>;
}

#[async_trait]
impl<S> EventStore for Arc<S>
where
    S: EventStore + ?Sized,
{
    async fn filter(&self, query: &SearchQuery) -> Result<Vec<StoredEvent>, EventStoreError> {
        (**self).filter(query).await
    }

    async fn push(
        &self,
        events: Vec<UncommittedEvent>,
        guards: Vec<ConcurrencyGuard>,
    ) -> Result<Vec<StoredEvent>, EventStoreError> {
        (**self).push(events, guards).await
    }
}
