use serde::{Deserialize, Serialize};

use crate::Role;

/// Roles a user holds within one scope.
///
/// The scope is the id of whatever grants the roles: the instance (instance-wide
/// administration), an organization (resource owner), or a single aggregate such
/// as a project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Membership {
    pub user_id: String,
    pub scope: String,
    pub roles: Vec<Role>,
}

impl Membership {
    pub fn new(user_id: impl Into<String>, scope: impl Into<String>, roles: Vec<Role>) -> Self {
        Self {
            user_id: user_id.into(),
            scope: scope.into(),
            roles,
        }
    }
}
