//! Executions: which targets run for a given API call, event or function.
//!
//! The execution aggregate id is derived from its condition, so there is at most
//! one execution per condition and setting it again replaces its targets.

use serde::{Deserialize, Serialize};

use keyward_core::{DomainError, DomainResult};
use keyward_events::EventFamily;

pub const AGGREGATE_TYPE: &str = "execution";

pub const EXECUTION_SET: &str = "execution.set";
pub const EXECUTION_REMOVED: &str = "execution.removed";

// ─────────────────────────────────────────────────────────────────────────────
// Conditions
// ─────────────────────────────────────────────────────────────────────────────

/// True iff exactly one flag is set.
fn exactly_one(flags: &[bool]) -> bool {
    flags.iter().filter(|set| **set).count() == 1
}

fn is_set(value: &Option<String>) -> bool {
    value.as_deref().is_some_and(|v| !v.trim().is_empty())
}

/// Condition on an API call: one method, one service, or every call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiCondition {
    pub method: Option<String>,
    pub service: Option<String>,
    pub all: bool,
}

impl ApiCondition {
    pub fn is_valid(&self) -> bool {
        exactly_one(&[is_set(&self.method), is_set(&self.service), self.all])
    }

    fn id(&self, prefix: &str) -> String {
        match (&self.method, &self.service) {
            (Some(method), _) if is_set(&self.method) => format!("{prefix}/{method}"),
            (_, Some(service)) if is_set(&self.service) => format!("{prefix}/{service}"),
            _ => prefix.to_string(),
        }
    }
}

/// Condition on an emitted event: one event type, one event group, or every event.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventCondition {
    pub event: Option<String>,
    pub group: Option<String>,
    pub all: bool,
}

impl EventCondition {
    pub fn is_valid(&self) -> bool {
        exactly_one(&[is_set(&self.event), is_set(&self.group), self.all])
    }

    fn id(&self) -> String {
        match (&self.event, &self.group) {
            (Some(event), _) if is_set(&self.event) => format!("event/{event}"),
            (_, Some(group)) if is_set(&self.group) => format!("event/{group}.*"),
            _ => "event".to_string(),
        }
    }
}

/// Condition on a named function hook.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionCondition {
    pub name: String,
}

impl FunctionCondition {
    pub fn is_valid(&self) -> bool {
        !self.name.trim().is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionCondition {
    Request(ApiCondition),
    Response(ApiCondition),
    Event(EventCondition),
    Function(FunctionCondition),
}

impl ExecutionCondition {
    pub fn validate(&self) -> DomainResult<()> {
        let valid = match self {
            ExecutionCondition::Request(c) | ExecutionCondition::Response(c) => c.is_valid(),
            ExecutionCondition::Event(c) => c.is_valid(),
            ExecutionCondition::Function(c) => c.is_valid(),
        };
        if valid {
            Ok(())
        } else {
            Err(DomainError::invalid_argument(
                "EXEC-0001",
                "errors.execution.condition_invalid",
            ))
        }
    }

    /// Execution aggregate id for this condition, e.g. `request/<method>`,
    /// `event/<group>.*` or `function/<name>`.
    pub fn execution_id(&self) -> DomainResult<String> {
        self.validate()?;
        Ok(match self {
            ExecutionCondition::Request(c) => c.id("request"),
            ExecutionCondition::Response(c) => c.id("response"),
            ExecutionCondition::Event(c) => c.id(),
            ExecutionCondition::Function(c) => format!("function/{}", c.name),
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Events
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionSet {
    pub targets: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionRemoved {}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum ExecutionEvent {
    #[serde(rename = "execution.set")]
    Set(ExecutionSet),
    #[serde(rename = "execution.removed")]
    Removed(ExecutionRemoved),
}

impl EventFamily for ExecutionEvent {
    const AGGREGATE_TYPE: &'static str = AGGREGATE_TYPE;
    const EVENT_TYPES: &'static [&'static str] = &[EXECUTION_SET, EXECUTION_REMOVED];

    fn event_type(&self) -> &'static str {
        match self {
            ExecutionEvent::Set(_) => EXECUTION_SET,
            ExecutionEvent::Removed(_) => EXECUTION_REMOVED,
        }
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn api(method: &str, service: &str, all: bool) -> ApiCondition {
        ApiCondition {
            method: (!method.is_empty()).then(|| method.to_string()),
            service: (!service.is_empty()).then(|| service.to_string()),
            all,
        }
    }

    #[test]
    fn request_ids() {
        let method = ExecutionCondition::Request(api("/user.v2.UserService/AddHuman", "", false));
        let service = ExecutionCondition::Request(api("", "user.v2.UserService", false));
        let all = ExecutionCondition::Request(api("", "", true));
        assert_eq!(
            method.execution_id().unwrap(),
            "request//user.v2.UserService/AddHuman"
        );
        assert_eq!(service.execution_id().unwrap(), "request/user.v2.UserService");
        assert_eq!(all.execution_id().unwrap(), "request");
        assert_eq!(
            ExecutionCondition::Response(api("", "", true)).execution_id().unwrap(),
            "response"
        );
    }

    #[test]
    fn event_ids() {
        let event = ExecutionCondition::Event(EventCondition {
            event: Some("user.human.added".into()),
            ..Default::default()
        });
        let group = ExecutionCondition::Event(EventCondition {
            group: Some("user".into()),
            ..Default::default()
        });
        let all = ExecutionCondition::Event(EventCondition {
            all: true,
            ..Default::default()
        });
        assert_eq!(event.execution_id().unwrap(), "event/user.human.added");
        assert_eq!(group.execution_id().unwrap(), "event/user.*");
        assert_eq!(all.execution_id().unwrap(), "event");
    }

    #[test]
    fn function_id_requires_a_name() {
        let ok = ExecutionCondition::Function(FunctionCondition {
            name: "preuserinfo".into(),
        });
        assert_eq!(ok.execution_id().unwrap(), "function/preuserinfo");
        let blank = ExecutionCondition::Function(FunctionCondition { name: "  ".into() });
        assert!(blank.execution_id().is_err());
    }

    #[test]
    fn blank_strings_count_as_unset() {
        let c = ApiCondition {
            method: Some(" ".into()),
            service: None,
            all: true,
        };
        assert!(c.is_valid());
    }

    proptest! {
        #![proptest_config(ProptestConfig { cases: 256, .. ProptestConfig::default() })]

        #[test]
        fn api_condition_valid_iff_exactly_one(method in any::<bool>(), service in any::<bool>(), all in any::<bool>()) {
            let c = api(if method { "m" } else { "" }, if service { "s" } else { "" }, all);
            let set = [method, service, all].iter().filter(|b| **b).count();
            prop_assert_eq!(c.is_valid(), set == 1);
            prop_assert_eq!(ExecutionCondition::Request(c).validate().is_ok(), set == 1);
        }

        #[test]
        fn event_condition_valid_iff_exactly_one(event in any::<bool>(), group in any::<bool>(), all in any::<bool>()) {
            let c = EventCondition {
                event: event.then(|| "user.human.added".to_string()),
                group: group.then(|| "user".to_string()),
                all,
            };
            let set = [event, group, all].iter().filter(|b| **b).count();
            prop_assert_eq!(c.is_valid(), set == 1);
        }
    }
}
