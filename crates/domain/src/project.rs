//! Project events (projects and the roles they define).

use serde::{Deserialize, Serialize};

use keyward_events::EventFamily;

pub const AGGREGATE_TYPE: &str = "project";

pub const PROJECT_ADDED: &str = "project.added";
pub const PROJECT_CHANGED: &str = "project.changed";
pub const PROJECT_DEACTIVATED: &str = "project.deactivated";
pub const PROJECT_REACTIVATED: &str = "project.reactivated";
pub const PROJECT_REMOVED: &str = "project.removed";
pub const ROLE_ADDED: &str = "project.role.added";
pub const ROLE_CHANGED: &str = "project.role.changed";
pub const ROLE_REMOVED: &str = "project.role.removed";

pub const ROLE_EVENT_TYPES: &[&str] = &[ROLE_ADDED, ROLE_CHANGED, ROLE_REMOVED];

#[derive(Debug, Copy, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ProjectState {
    #[default]
    Unspecified,
    Active,
    Inactive,
    Removed,
}

impl ProjectState {
    pub fn exists(self) -> bool {
        matches!(self, ProjectState::Active | ProjectState::Inactive)
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ProjectRoleState {
    #[default]
    Unspecified,
    Active,
    Removed,
}

impl ProjectRoleState {
    pub fn exists(self) -> bool {
        self == ProjectRoleState::Active
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectAdded {
    pub name: String,
    #[serde(default)]
    pub role_assertion: bool,
    #[serde(default)]
    pub role_check: bool,
}

/// Only the fields that changed are present.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProjectChanged {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role_assertion: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role_check: Option<bool>,
}

impl ProjectChanged {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectDeactivated {}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectReactivated {}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectRemoved {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoleAdded {
    pub key: String,
    pub display_name: String,
    #[serde(default)]
    pub group: String,
}

/// `key` identifies the role; the other fields are present only when changed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoleChanged {
    pub key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoleRemoved {
    pub key: String,
}

/// All project events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum ProjectEvent {
    #[serde(rename = "project.added")]
    Added(ProjectAdded),
    #[serde(rename = "project.changed")]
    Changed(ProjectChanged),
    #[serde(rename = "project.deactivated")]
    Deactivated(ProjectDeactivated),
    #[serde(rename = "project.reactivated")]
    Reactivated(ProjectReactivated),
    #[serde(rename = "project.removed")]
    Removed(ProjectRemoved),
    #[serde(rename = "project.role.added")]
    RoleAdded(RoleAdded),
    #[serde(rename = "project.role.changed")]
    RoleChanged(RoleChanged),
    #[serde(rename = "project.role.removed")]
    RoleRemoved(RoleRemoved),
}

impl ProjectEvent {
    /// Role key referenced by a role event.
    pub fn role_key(&self) -> Option<&str> {
        match self {
            ProjectEvent::RoleAdded(e) => Some(&e.key),
            ProjectEvent::RoleChanged(e) => Some(&e.key),
            ProjectEvent::RoleRemoved(e) => Some(&e.key),
            _ => None,
        }
    }
}

impl EventFamily for ProjectEvent {
    const AGGREGATE_TYPE: &'static str = AGGREGATE_TYPE;
    const EVENT_TYPES: &'static [&'static str] = &[
        PROJECT_ADDED,
        PROJECT_CHANGED,
        PROJECT_DEACTIVATED,
        PROJECT_REACTIVATED,
        PROJECT_REMOVED,
        ROLE_ADDED,
        ROLE_CHANGED,
        ROLE_REMOVED,
    ];

    fn event_type(&self) -> &'static str {
        match self {
            ProjectEvent::Added(_) => PROJECT_ADDED,
            ProjectEvent::Changed(_) => PROJECT_CHANGED,
            ProjectEvent::Deactivated(_) => PROJECT_DEACTIVATED,
            ProjectEvent::Reactivated(_) => PROJECT_REACTIVATED,
            ProjectEvent::Removed(_) => PROJECT_REMOVED,
            ProjectEvent::RoleAdded(_) => ROLE_ADDED,
            ProjectEvent::RoleChanged(_) => ROLE_CHANGED,
            ProjectEvent::RoleRemoved(_) => ROLE_REMOVED,
        }
    }
}
