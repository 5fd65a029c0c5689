//! Write models: in-memory projections that command handlers decide on.
//!
//! ## Lifecycle
//!
//! ```text
//! new()  ->  query()  ->  store.filter  ->  append_events  ->  reduce
//!                                                               |
//!           handler validates, builds events  <-----------------+
//!                                                               |
//!           store.push(guard())  ->  append_events  ->  reduce  +  (no re-fetch)
//! ```
//!
//! A write model is built per command invocation, owned exclusively by it and
//! dropped at the end of the request. It is never cached or shared.
//!
//! ## Contract
//!
//! - [`WriteModel::query`] selects exactly the history the model folds.
//! - [`WriteModel::append_events`] buffers the events the model accepts, in
//!   order, and records the highest position the query observed.
//! - [`WriteModel::reduce`] drains the buffer through [`WriteModel::apply`] and
//!   advances the base. Reducing an empty buffer changes nothing, and reducing
//!   `[e1, e2, e3]` at once equals reducing `[e1]` then `[e2, e3]`.

use chrono::{DateTime, Utc};

use keyward_core::{AggregateRef, ExpectedVersion, ObjectDetails};
use keyward_events::CodecError;
use keyward_infra::event_store::{ConcurrencyGuard, SearchQuery, StoredEvent};

/// Fields every write model carries.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WriteModelBase {
    pub aggregate_id: String,
    pub resource_owner: String,
    pub instance_id: String,
    /// Sequence of the last folded event.
    pub processed_sequence: u64,
    /// Global position of the last folded event.
    pub processed_position: u64,
    /// Highest position matched by the query, folded or not; the concurrency
    /// guard expects exactly this.
    pub observed_position: u64,
    pub change_date: Option<DateTime<Utc>>,
    events: Vec<StoredEvent>,
}

impl WriteModelBase {
    pub fn new(
        aggregate_id: impl Into<String>,
        resource_owner: impl Into<String>,
        instance_id: impl Into<String>,
    ) -> Self {
        Self {
            aggregate_id: aggregate_id.into(),
            resource_owner: resource_owner.into(),
            instance_id: instance_id.into(),
            ..Default::default()
        }
    }

    /// Stream identity for new events of this model.
    pub fn aggregate(&self, aggregate_type: &str) -> AggregateRef {
        AggregateRef::new(
            aggregate_type,
            self.aggregate_id.clone(),
            self.resource_owner.clone(),
            self.instance_id.clone(),
        )
    }

    /// Whether the folded history belongs to `owner`; an empty `owner` matches any.
    pub fn is_owned_by(&self, owner: &str) -> bool {
        owner.is_empty() || self.resource_owner == owner
    }

    /// Events appended but not yet reduced.
    pub fn pending(&self) -> usize {
        self.events.len()
    }

    fn advance(&mut self, event: &StoredEvent) {
        if self.aggregate_id.is_empty() {
            self.aggregate_id = event.aggregate.id.clone();
        }
        self.resource_owner = event.aggregate.resource_owner.clone();
        if self.instance_id.is_empty() {
            self.instance_id = event.aggregate.instance_id.clone();
        }
        self.processed_sequence = event.sequence;
        self.processed_position = event.position;
        self.change_date = Some(event.created_at);
    }
}

/// An event-folding projection bound to the history selected by [`Self::query`].
pub trait WriteModel: Send {
    fn base(&self) -> &WriteModelBase;

    fn base_mut(&mut self) -> &mut WriteModelBase;

    /// Minimal filter covering every event type [`Self::apply`] handles.
    fn query(&self) -> SearchQuery;

    /// Secondary filter for streams that carry several logical sub-entities
    /// (e.g. one org stream, many domains). Default: accept everything.
    fn accepts(&self, _event: &StoredEvent) -> bool {
        true
    }

    /// Fold one event. Unknown event types must be ignored, not rejected.
    fn apply(&mut self, event: &StoredEvent) -> Result<(), CodecError>;

    fn append_events(&mut self, events: &[StoredEvent]) {
        let query = self.query();
        for event in events.iter().filter(|e| query.matches(e)) {
            let base = self.base_mut();
            base.observed_position = base.observed_position.max(event.position);
            if self.accepts(event) {
                self.base_mut().events.push(event.clone());
            }
        }
    }

    fn reduce(&mut self) -> Result<(), CodecError> {
        let events = std::mem::take(&mut self.base_mut().events);
        for event in &events {
            self.apply(event)?;
            self.base_mut().advance(event);
        }
        Ok(())
    }

    fn append_and_reduce(&mut self, events: &[StoredEvent]) -> Result<(), CodecError> {
        self.append_events(events);
        self.reduce()
    }

    /// Push precondition: nothing matching the query changed since loading.
    fn guard(&self) -> ConcurrencyGuard {
        ConcurrencyGuard::new(
            self.query(),
            ExpectedVersion::Exact(self.base().observed_position),
        )
    }

    fn details(&self) -> ObjectDetails {
        let base = self.base();
        ObjectDetails::new(
            base.aggregate_id.clone(),
            base.processed_sequence,
            base.change_date,
            base.resource_owner.clone(),
        )
    }
}
