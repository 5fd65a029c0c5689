//! Setup step bookkeeping events, appended to one aggregate per instance.

use serde::{Deserialize, Serialize};

use keyward_events::EventFamily;

pub const AGGREGATE_TYPE: &str = "setup";

pub const STEP_STARTED: &str = "setup.step.started";
pub const STEP_DONE: &str = "setup.step.done";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepStarted {
    pub step: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepDone {
    pub step: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum SetupEvent {
    #[serde(rename = "setup.step.started")]
    Started(StepStarted),
    #[serde(rename = "setup.step.done")]
    Done(StepDone),
}

impl EventFamily for SetupEvent {
    const AGGREGATE_TYPE: &'static str = AGGREGATE_TYPE;
    const EVENT_TYPES: &'static [&'static str] = &[STEP_STARTED, STEP_DONE];

    fn event_type(&self) -> &'static str {
        match self {
            SetupEvent::Started(_) => STEP_STARTED,
            SetupEvent::Done(_) => STEP_DONE,
        }
    }
}
