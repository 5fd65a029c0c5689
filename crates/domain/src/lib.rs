//! `keyward-domain`: event families and value objects of the identity domain.
//!
//! Pure data: no IO, no clocks, no randomness. Command handlers in
//! `keyward-command` decide *which* of these events to emit; this crate only
//! defines what they look like and the small validation rules that belong to the
//! values themselves.

pub mod crypto;
pub mod execution;
pub mod group;
pub mod org;
pub mod policy;
pub mod project;
pub mod session;
pub mod setup;
pub mod target;
pub mod user;

pub use crypto::{CodeKind, CryptoValue};
pub use execution::{ApiCondition, EventCondition, ExecutionCondition, ExecutionEvent, FunctionCondition};
pub use group::GroupEvent;
pub use org::{OrgDomainState, OrgEvent, OrgState};
pub use policy::PasswordComplexityPolicy;
pub use project::{ProjectEvent, ProjectRoleState, ProjectState};
pub use session::{SessionEvent, SessionState};
pub use setup::SetupEvent;
pub use target::{TargetEvent, TargetState};
pub use user::{FactorState, UserEvent, UserState};

/// Shared existence state for sub-entities that are either present or gone
/// (group members, metadata entries, ...).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
pub enum PresenceState {
    #[default]
    Unspecified,
    Active,
    Removed,
}

impl PresenceState {
    pub fn exists(self) -> bool {
        self == PresenceState::Active
    }
}
