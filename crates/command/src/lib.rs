//! `keyward-command`: the write side of the identity platform.
//!
//! Every mutating operation is a method on [`Commands`]. A handler folds the
//! relevant history into one or more [`WriteModel`]s, decides which events to
//! emit, and pushes them guarded by the queries it read with. A concurrent
//! writer that touched the same streams makes the push fail with
//! [`CommandError`] of kind `Conflict`; nothing is retried here.

pub mod action;
pub mod collaborators;
pub mod commands;
pub mod engine;
pub mod error;
pub mod existence;
pub mod group;
pub mod org;
pub mod project;
pub mod session;
pub mod setup;
pub mod user;
pub mod write_model;

#[cfg(test)]
mod test_support;

pub use commands::Commands;
pub use error::{CommandError, CommandResult};
pub use setup::{SetupSequencer, SetupStep};
pub use write_model::{WriteModel, WriteModelBase};
