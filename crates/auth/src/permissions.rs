use std::borrow::Cow;

use serde::{Deserialize, Serialize};

/// Permission identifier.
///
/// Permissions are modeled as opaque strings (e.g. `"group.write"`).
/// The wildcard permission `"*"` grants everything; it is reserved for instance
/// owners and the system user.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Permission(Cow<'static, str>);

impl Permission {
    pub const WILDCARD: &'static str = "*";

    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_wildcard(&self) -> bool {
        self.as_str() == Self::WILDCARD
    }
}

impl core::fmt::Display for Permission {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Permission names checked by the command handlers.
pub mod names {
    pub const ORG_CREATE: &str = "org.create";
    pub const ORG_WRITE: &str = "org.write";
    pub const ORG_DELETE: &str = "org.delete";
    pub const POLICY_WRITE: &str = "policy.write";
    pub const POLICY_DELETE: &str = "policy.delete";
    pub const USER_WRITE: &str = "user.write";
    pub const USER_DELETE: &str = "user.delete";
    pub const USER_CREDENTIAL_WRITE: &str = "user.credential.write";
    pub const GROUP_WRITE: &str = "group.write";
    pub const GROUP_DELETE: &str = "group.delete";
    pub const GROUP_MEMBER_WRITE: &str = "group.member.write";
    pub const PROJECT_WRITE: &str = "project.write";
    pub const PROJECT_DELETE: &str = "project.delete";
    pub const PROJECT_ROLE_WRITE: &str = "project.role.write";
    pub const PROJECT_ROLE_DELETE: &str = "project.role.delete";
    pub const SESSION_WRITE: &str = "session.write";
    pub const SESSION_DELETE: &str = "session.delete";
    pub const TARGET_WRITE: &str = "action.target.write";
    pub const TARGET_DELETE: &str = "action.target.delete";
    pub const EXECUTION_WRITE: &str = "action.execution.write";
    pub const EXECUTION_DELETE: &str = "action.execution.delete";
}
