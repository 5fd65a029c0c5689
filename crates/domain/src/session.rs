//! Session events.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use keyward_events::EventFamily;

pub const AGGREGATE_TYPE: &str = "session";

pub const SESSION_ADDED: &str = "session.added";
pub const USER_CHECKED: &str = "session.user.checked";
pub const PASSWORD_CHECKED: &str = "session.password.checked";
pub const METADATA_SET: &str = "session.metadata.set";
pub const SESSION_TERMINATED: &str = "session.terminated";

#[derive(Debug, Copy, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SessionState {
    #[default]
    Unspecified,
    Active,
    Terminated,
}

impl SessionState {
    pub fn exists(self) -> bool {
        self == SessionState::Active
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionAdded {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserChecked {
    pub user_id: String,
    pub user_resource_owner: String,
    pub checked_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PasswordChecked {
    pub checked_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetadataSet {
    pub metadata: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionTerminated {}

/// All session events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum SessionEvent {
    #[serde(rename = "session.added")]
    Added(SessionAdded),
    #[serde(rename = "session.user.checked")]
    UserChecked(UserChecked),
    #[serde(rename = "session.password.checked")]
    PasswordChecked(PasswordChecked),
    #[serde(rename = "session.metadata.set")]
    MetadataSet(MetadataSet),
    #[serde(rename = "session.terminated")]
    Terminated(SessionTerminated),
}

impl EventFamily for SessionEvent {
    const AGGREGATE_TYPE: &'static str = AGGREGATE_TYPE;
    const EVENT_TYPES: &'static [&'static str] = &[
        SESSION_ADDED,
        USER_CHECKED,
        PASSWORD_CHECKED,
        METADATA_SET,
        SESSION_TERMINATED,
    ];

    fn event_type(&self) -> &'static str {
        match self {
            SessionEvent::Added(_) => SESSION_ADDED,
            SessionEvent::UserChecked(_) => USER_CHECKED,
            SessionEvent::PasswordChecked(_) => PASSWORD_CHECKED,
            SessionEvent::MetadataSet(_) => METADATA_SET,
            SessionEvent::Terminated(_) => SESSION_TERMINATED,
        }
    }
}
