//! Action targets: endpoints executions call out to.

use serde::{Deserialize, Serialize};

use keyward_events::EventFamily;

pub const AGGREGATE_TYPE: &str = "target";

pub const TARGET_ADDED: &str = "target.added";
pub const TARGET_CHANGED: &str = "target.changed";
pub const TARGET_REMOVED: &str = "target.removed";

#[derive(Debug, Copy, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TargetState {
    #[default]
    Unspecified,
    Active,
    Removed,
}

impl TargetState {
    pub fn exists(self) -> bool {
        self == TargetState::Active
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetAdded {
    pub name: String,
    pub endpoint: String,
    pub timeout_ms: u64,
    #[serde(default)]
    pub interrupt_on_error: bool,
}

/// Only the fields that changed are present.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TargetChanged {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interrupt_on_error: Option<bool>,
}

impl TargetChanged {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetRemoved {
    pub name: String,
}

/// All target events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum TargetEvent {
    #[serde(rename = "target.added")]
    Added(TargetAdded),
    #[serde(rename = "target.changed")]
    Changed(TargetChanged),
    #[serde(rename = "target.removed")]
    Removed(TargetRemoved),
}

impl EventFamily for TargetEvent {
    const AGGREGATE_TYPE: &'static str = AGGREGATE_TYPE;
    const EVENT_TYPES: &'static [&'static str] = &[TARGET_ADDED, TARGET_CHANGED, TARGET_REMOVED];

    fn event_type(&self) -> &'static str {
        match self {
            TargetEvent::Added(_) => TARGET_ADDED,
            TargetEvent::Changed(_) => TARGET_CHANGED,
            TargetEvent::Removed(_) => TARGET_REMOVED,
        }
    }
}
