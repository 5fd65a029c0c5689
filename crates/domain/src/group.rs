//! Group events (user groups owned by an organization).

use serde::{Deserialize, Serialize};

use keyward_events::EventFamily;

pub const AGGREGATE_TYPE: &str = "group";

pub const GROUP_ADDED: &str = "group.added";
pub const GROUP_CHANGED: &str = "group.changed";
pub const GROUP_REMOVED: &str = "group.removed";
pub const MEMBER_ADDED: &str = "group.member.added";
pub const MEMBER_REMOVED: &str = "group.member.removed";
pub const MEMBER_CASCADE_REMOVED: &str = "group.member.cascade.removed";

/// Event types that change the member set of a group.
pub const MEMBER_EVENT_TYPES: &[&str] = &[MEMBER_ADDED, MEMBER_REMOVED, MEMBER_CASCADE_REMOVED];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupAdded {
    pub name: String,
    #[serde(default)]
    pub description: String,
}

/// Only the fields that changed are present.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GroupChanged {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl GroupChanged {
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.description.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupRemoved {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemberAdded {
    pub user_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemberRemoved {
    pub user_id: String,
}

/// Membership ended because the user itself was removed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemberCascadeRemoved {
    pub user_id: String,
}

/// All group events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum GroupEvent {
    #[serde(rename = "group.added")]
    Added(GroupAdded),
    #[serde(rename = "group.changed")]
    Changed(GroupChanged),
    #[serde(rename = "group.removed")]
    Removed(GroupRemoved),
    #[serde(rename = "group.member.added")]
    MemberAdded(MemberAdded),
    #[serde(rename = "group.member.removed")]
    MemberRemoved(MemberRemoved),
    #[serde(rename = "group.member.cascade.removed")]
    MemberCascadeRemoved(MemberCascadeRemoved),
}

impl GroupEvent {
    /// User referenced by a membership event.
    pub fn member_user_id(&self) -> Option<&str> {
        match self {
            GroupEvent::MemberAdded(e) => Some(&e.user_id),
            GroupEvent::MemberRemoved(e) => Some(&e.user_id),
            GroupEvent::MemberCascadeRemoved(e) => Some(&e.user_id),
            GroupEvent::Added(_) | GroupEvent::Changed(_) | GroupEvent::Removed(_) => None,
        }
    }
}

impl EventFamily for GroupEvent {
    const AGGREGATE_TYPE: &'static str = AGGREGATE_TYPE;
    const EVENT_TYPES: &'static [&'static str] = &[
        GROUP_ADDED,
        GROUP_CHANGED,
        GROUP_REMOVED,
        MEMBER_ADDED,
        MEMBER_REMOVED,
        MEMBER_CASCADE_REMOVED,
    ];

    fn event_type(&self) -> &'static str {
        match self {
            GroupEvent::Added(_) => GROUP_ADDED,
            GroupEvent::Changed(_) => GROUP_CHANGED,
            GroupEvent::Removed(_) => GROUP_REMOVED,
            GroupEvent::MemberAdded(_) => MEMBER_ADDED,
            GroupEvent::MemberRemoved(_) => MEMBER_REMOVED,
            GroupEvent::MemberCascadeRemoved(_) => MEMBER_CASCADE_REMOVED,
        }
    }
}

#[cfg(test)]
mod tests {
    use keyward_events::encode;

    use super::*;

    #[test]
    fn changed_omits_untouched_fields() {
        let e = GroupEvent::Changed(GroupChanged {
            name: None,
            description: Some("new".into()),
        });
        assert_eq!(encode(&e).unwrap(), serde_json::json!({ "description": "new" }));
    }

    #[test]
    fn member_user_id_only_for_member_events() {
        let added = GroupEvent::MemberAdded(MemberAdded { user_id: "u1".into() });
        let removed = GroupEvent::Removed(GroupRemoved { name: "eng".into() });
        assert_eq!(added.member_user_id(), Some("u1"));
        assert_eq!(removed.member_user_id(), None);
    }
}
