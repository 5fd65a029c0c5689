//! Append-only event store boundary.
//!
//! Defines the contract the command side consumes (`filter` / `push`) without
//! making any storage assumptions, plus an in-memory implementation that
//! enforces the same guarantees a durable backend must.

pub mod in_memory;
pub mod query;
pub mod r#trait;

pub use in_memory::InMemoryEventStore;
pub use query::{AggregateFilter, ConcurrencyGuard, SearchQuery};
pub use r#trait::{EventStore, EventStoreError, StoredEvent, UncommittedEvent};
