use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Receipt returned by every mutating operation.
///
/// `sequence` and `change_date` describe the last event folded into the write
/// model that produced the receipt; both are empty for an aggregate that has no
/// events (e.g. an idempotent delete of something that never existed).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectDetails {
    pub id: String,
    pub sequence: u64,
    pub change_date: Option<DateTime<Utc>>,
    pub resource_owner: String,
}

impl ObjectDetails {
    pub fn new(
        id: impl Into<String>,
        sequence: u64,
        change_date: Option<DateTime<Utc>>,
        resource_owner: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            sequence,
            change_date,
            resource_owner: resource_owner.into(),
        }
    }
}
