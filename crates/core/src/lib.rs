//! `keyward-core`: foundation types shared by every layer of the command side.
//!
//! This crate contains **pure** primitives (no storage, no transport): aggregate
//! identity, the error taxonomy, the per-request context and the receipt every
//! mutating operation returns.

pub mod aggregate;
pub mod context;
pub mod details;
pub mod error;
pub mod id;

pub use aggregate::{AggregateRef, ExpectedVersion};
pub use context::{Context, SYSTEM_USER};
pub use details::ObjectDetails;
pub use error::{DomainError, DomainResult, ErrorKind};
pub use id::{IdGenerator, SequentialIdGenerator, UuidV7Generator};
