//! `keyward-auth`: authorization boundary consumed by command handlers.
//!
//! This crate is intentionally decoupled from transport and storage: handlers
//! only see the [`PermissionCheck`] contract.

pub mod authorize;
pub mod check;
pub mod permissions;
pub mod principal;
pub mod roles;

pub use authorize::{authorize, AuthzError};
pub use check::{MembershipPermissionCheck, PermissionCheck};
pub use permissions::Permission;
pub use principal::Membership;
pub use roles::Role;
