//! Infrastructure layer: event store boundary and runtime configuration.

pub mod config;
pub mod event_store;
