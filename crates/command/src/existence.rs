//! Secondary write models for cross-aggregate existence checks.
//!
//! Aggregates reference each other by id only. A handler that depends on
//! another aggregate ("the org must exist", "every target must exist") folds
//! that aggregate's lifecycle events with one of these models and passes the
//! model's guard along with its push.

use std::collections::HashMap;

use keyward_domain::user::{self, lifecycle_transition};
use keyward_domain::{org, target, OrgEvent, OrgState, TargetEvent, UserEvent, UserState};
use keyward_events::CodecError;
use keyward_infra::event_store::{AggregateFilter, SearchQuery, StoredEvent};

use crate::write_model::{WriteModel, WriteModelBase};

// ─────────────────────────────────────────────────────────────────────────────
// Organization
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct OrgExistence {
    base: WriteModelBase,
    pub state: OrgState,
}

impl OrgExistence {
    pub fn new(org_id: &str, instance_id: &str) -> Self {
        Self {
            base: WriteModelBase::new(org_id, "", instance_id),
            state: OrgState::Unspecified,
        }
    }

    pub fn is_active(&self) -> bool {
        self.state == OrgState::Active
    }
}

impl WriteModel for OrgExistence {
    fn base(&self) -> &WriteModelBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut WriteModelBase {
        &mut self.base
    }

    fn query(&self) -> SearchQuery {
        SearchQuery::new(&self.base.instance_id).filter(
            AggregateFilter::new(org::AGGREGATE_TYPE)
                .aggregate_id(&self.base.aggregate_id)
                .event_types(&[org::ORG_ADDED, org::ORG_DEACTIVATED, org::ORG_REACTIVATED, org::ORG_REMOVED]),
        )
    }

    fn apply(&mut self, event: &StoredEvent) -> Result<(), CodecError> {
        match event.decode::<OrgEvent>()? {
            Some(OrgEvent::Added(_)) | Some(OrgEvent::Reactivated(_)) => self.state = OrgState::Active,
            Some(OrgEvent::Deactivated(_)) => self.state = OrgState::Inactive,
            Some(OrgEvent::Removed(_)) => self.state = OrgState::Removed,
            _ => {}
        }
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// User
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct UserExistence {
    base: WriteModelBase,
    pub state: UserState,
}

impl UserExistence {
    pub fn new(user_id: &str, instance_id: &str) -> Self {
        Self {
            base: WriteModelBase::new(user_id, "", instance_id),
            state: UserState::Unspecified,
        }
    }

    pub fn exists(&self) -> bool {
        self.state.exists()
    }
}

impl WriteModel for UserExistence {
    fn base(&self) -> &WriteModelBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut WriteModelBase {
        &mut self.base
    }

    fn query(&self) -> SearchQuery {
        SearchQuery::new(&self.base.instance_id).filter(
            AggregateFilter::new(user::AGGREGATE_TYPE)
                .aggregate_id(&self.base.aggregate_id)
                .event_types(user::LIFECYCLE_EVENT_TYPES),
        )
    }

    fn apply(&mut self, event: &StoredEvent) -> Result<(), CodecError> {
        if let Some(state) = event.decode::<UserEvent>()?.as_ref().and_then(lifecycle_transition) {
            self.state = state;
        }
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Many aggregates of one type
// ─────────────────────────────────────────────────────────────────────────────

type Transition = fn(&StoredEvent) -> Result<Option<bool>, CodecError>;

/// Existence of a list of aggregates of one type, folded in a single query.
#[derive(Clone)]
pub struct ExistenceList {
    base: WriteModelBase,
    aggregate_type: &'static str,
    event_types: &'static [&'static str],
    transition: Transition,
    ids: Vec<String>,
    existing: HashMap<String, bool>,
}

impl ExistenceList {
    fn new(
        instance_id: &str,
        ids: &[String],
        aggregate_type: &'static str,
        event_types: &'static [&'static str],
        transition: Transition,
    ) -> Self {
        let mut ids = ids.to_vec();
        ids.sort();
        ids.dedup();
        Self {
            base: WriteModelBase::new("", "", instance_id),
            aggregate_type,
            event_types,
            transition,
            ids,
            existing: HashMap::new(),
        }
    }

    pub fn users(instance_id: &str, ids: &[String]) -> Self {
        Self::new(instance_id, ids, user::AGGREGATE_TYPE, user::LIFECYCLE_EVENT_TYPES, |event| {
            Ok(event
                .decode::<UserEvent>()?
                .as_ref()
                .and_then(lifecycle_transition)
                .map(UserState::exists))
        })
    }

    pub fn targets(instance_id: &str, ids: &[String]) -> Self {
        const TYPES: &[&str] = &[target::TARGET_ADDED, target::TARGET_REMOVED];
        Self::new(instance_id, ids, target::AGGREGATE_TYPE, TYPES, |event| {
            Ok(match event.decode::<TargetEvent>()? {
                Some(TargetEvent::Added(_)) => Some(true),
                Some(TargetEvent::Removed(_)) => Some(false),
                _ => None,
            })
        })
    }

    pub fn exists(&self, id: &str) -> bool {
        self.existing.get(id).copied().unwrap_or(false)
    }

    /// Requested ids that do not exist, in sorted order.
    pub fn missing(&self) -> Vec<&str> {
        self.ids
            .iter()
            .filter(|id| !self.exists(id))
            .map(String::as_str)
            .collect()
    }
}

impl WriteModel for ExistenceList {
    fn base(&self) -> &WriteModelBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut WriteModelBase {
        &mut self.base
    }

    fn query(&self) -> SearchQuery {
        let query = SearchQuery::new(&self.base.instance_id);
        // No filter matches nothing; an empty id list must not select every stream.
        if self.ids.is_empty() {
            return query;
        }
        query.filter(
            AggregateFilter::new(self.aggregate_type)
                .aggregate_ids(self.ids.iter().cloned())
                .event_types(self.event_types),
        )
    }

    fn apply(&mut self, event: &StoredEvent) -> Result<(), CodecError> {
        if let Some(exists) = (self.transition)(event)? {
            self.existing.insert(event.aggregate.id.clone(), exists);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{fixture, seed_org, seed_target, seed_user};

    #[tokio::test]
    async fn org_existence_follows_lifecycle() {
        let fx = fixture();
        let ctx = fx.ctx();
        seed_org(&fx, "o1").await;

        let mut org = OrgExistence::new("o1", ctx.instance_id());
        fx.commands.load(&ctx, &mut org).await.unwrap();
        assert!(org.is_active());

        fx.commands.deactivate_org(&ctx, "o1").await.unwrap();
        let mut org = OrgExistence::new("o1", ctx.instance_id());
        fx.commands.load(&ctx, &mut org).await.unwrap();
        assert_eq!(org.state, OrgState::Inactive);
        assert!(org.state.exists());

        let mut unknown = OrgExistence::new("nope", ctx.instance_id());
        fx.commands.load(&ctx, &mut unknown).await.unwrap();
        assert!(!unknown.state.exists());
    }

    #[tokio::test]
    async fn user_list_reports_missing_ids() {
        let fx = fixture();
        let ctx = fx.ctx();
        seed_org(&fx, "o1").await;
        seed_user(&fx, "o1", "u1").await;
        seed_user(&fx, "o1", "u2").await;
        fx.commands.remove_user(&ctx, "o1", "u2").await.unwrap();

        let ids = vec!["u3".to_string(), "u1".to_string(), "u2".to_string(), "u1".to_string()];
        let mut users = ExistenceList::users(ctx.instance_id(), &ids);
        fx.commands.load(&ctx, &mut users).await.unwrap();

        assert!(users.exists("u1"));
        assert_eq!(users.missing(), ["u2", "u3"]);
    }

    #[tokio::test]
    async fn target_list_and_empty_list() {
        let fx = fixture();
        let ctx = fx.ctx();
        let t1 = seed_target(&fx, "hook").await;

        let mut targets = ExistenceList::targets(ctx.instance_id(), &[t1.clone()]);
        fx.commands.load(&ctx, &mut targets).await.unwrap();
        assert!(targets.exists(&t1));

        let empty = ExistenceList::users(ctx.instance_id(), &[]);
        assert!(empty.query().filters.is_empty());
        assert!(empty.missing().is_empty());
    }
}
