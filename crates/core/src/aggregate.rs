//! Aggregate identity and optimistic concurrency expectations.

use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};

/// Identity of one event stream.
///
/// `(aggregate_type, id)` names exactly one stream inside an instance. The
/// `resource_owner` scopes the stream for authorization and tenant isolation and
/// stays the same for every event of the stream.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AggregateRef {
    pub aggregate_type: String,
    pub id: String,
    pub resource_owner: String,
    pub instance_id: String,
}

impl AggregateRef {
    pub fn new(
        aggregate_type: impl Into<String>,
        id: impl Into<String>,
        resource_owner: impl Into<String>,
        instance_id: impl Into<String>,
    ) -> Self {
        Self {
            aggregate_type: aggregate_type.into(),
            id: id.into(),
            resource_owner: resource_owner.into(),
            instance_id: instance_id.into(),
        }
    }

    /// Whether `other` names the same stream (owner is not part of the key).
    pub fn same_stream(&self, other: &AggregateRef) -> bool {
        self.instance_id == other.instance_id
            && self.aggregate_type == other.aggregate_type
            && self.id == other.id
    }
}

impl core::fmt::Display for AggregateRef {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}/{}", self.aggregate_type, self.id)
    }
}

/// Optimistic concurrency expectation.
///
/// For write models the checked value is the highest global position among the
/// events selected by the model's query (0 when nothing matches yet).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExpectedVersion {
    /// Skip the check.
    Any,
    /// Require the observed value to be exactly this.
    Exact(u64),
}

impl ExpectedVersion {
    pub fn matches(self, actual: u64) -> bool {
        match self {
            ExpectedVersion::Any => true,
            ExpectedVersion::Exact(v) => v == actual,
        }
    }

    pub fn check(self, actual: u64) -> DomainResult<()> {
        if self.matches(actual) {
            Ok(())
        } else {
            tracing::debug!(expected = ?self, actual, "optimistic concurrency check failed");
            Err(DomainError::conflict(
                "CORE-0001",
                "errors.concurrency.version_mismatch",
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;

    #[test]
    fn exact_version_matches_only_itself() {
        assert!(ExpectedVersion::Exact(3).matches(3));
        assert!(!ExpectedVersion::Exact(3).matches(4));
        assert!(ExpectedVersion::Any.matches(42));
    }

    #[test]
    fn check_reports_conflict() {
        let err = ExpectedVersion::Exact(1).check(2).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
    }

    #[test]
    fn same_stream_ignores_owner() {
        let a = AggregateRef::new("group", "g1", "org1", "inst");
        let b = AggregateRef::new("group", "g1", "org2", "inst");
        let c = AggregateRef::new("group", "g1", "org1", "other");
        assert!(a.same_stream(&b));
        assert!(!a.same_stream(&c));
        assert_eq!(a.to_string(), "group/g1");
    }
}
