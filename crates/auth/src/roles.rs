use std::borrow::Cow;

use serde::{Deserialize, Serialize};

use crate::permissions::names;
use crate::Permission;

/// Role identifier used for RBAC.
///
/// Roles are opaque strings at this layer; the mapping to permissions lives in
/// the permission checker.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Role(Cow<'static, str>);

impl Role {
    pub const IAM_OWNER: &'static str = "IAM_OWNER";
    pub const ORG_OWNER: &'static str = "ORG_OWNER";
    pub const ORG_USER_MANAGER: &'static str = "ORG_USER_MANAGER";
    pub const PROJECT_OWNER: &'static str = "PROJECT_OWNER";

    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for Role {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Built-in role to permission mapping.
pub fn default_role_permissions() -> Vec<(Role, Vec<Permission>)> {
    let perms = |list: &[&'static str]| list.iter().map(|p| Permission::new(*p)).collect::<Vec<_>>();
    vec![
        (Role::new(Role::IAM_OWNER), perms(&[Permission::WILDCARD])),
        (
            Role::new(Role::ORG_OWNER),
            perms(&[
                names::ORG_WRITE,
                names::ORG_DELETE,
                names::POLICY_WRITE,
                names::POLICY_DELETE,
                names::USER_WRITE,
                names::USER_DELETE,
                names::USER_CREDENTIAL_WRITE,
                names::GROUP_WRITE,
                names::GROUP_DELETE,
                names::GROUP_MEMBER_WRITE,
                names::PROJECT_WRITE,
                names::PROJECT_DELETE,
                names::PROJECT_ROLE_WRITE,
                names::PROJECT_ROLE_DELETE,
                names::SESSION_WRITE,
                names::SESSION_DELETE,
            ]),
        ),
        (
            Role::new(Role::ORG_USER_MANAGER),
            perms(&[
                names::USER_WRITE,
                names::USER_DELETE,
                names::USER_CREDENTIAL_WRITE,
                names::GROUP_MEMBER_WRITE,
            ]),
        ),
        (
            Role::new(Role::PROJECT_OWNER),
            perms(&[
                names::PROJECT_WRITE,
                names::PROJECT_DELETE,
                names::PROJECT_ROLE_WRITE,
                names::PROJECT_ROLE_DELETE,
            ]),
        ),
    ]
}
