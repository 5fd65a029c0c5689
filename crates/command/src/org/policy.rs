use keyward_auth::permissions::names;
use keyward_core::{Context, DomainError, ObjectDetails};
use keyward_domain::org::{
    self, PasswordComplexityPolicyAdded, PasswordComplexityPolicyChanged, PasswordComplexityPolicyRemoved,
};
use keyward_domain::policy::PasswordComplexityPolicy;
use keyward_domain::PresenceState;
use keyward_domain::OrgEvent;
use keyward_events::CodecError;
use keyward_infra::event_store::{AggregateFilter, SearchQuery, StoredEvent};

use crate::commands::Commands;
use crate::engine::event;
use crate::error::CommandResult;
use crate::existence::OrgExistence;
use crate::write_model::{WriteModel, WriteModelBase};

/// Password complexity policy of one organization.
#[derive(Debug, Clone)]
pub struct PasswordComplexityPolicyWriteModel {
    base: WriteModelBase,
    pub policy: PasswordComplexityPolicy,
    pub state: PresenceState,
}

impl PasswordComplexityPolicyWriteModel {
    pub fn new(org_id: &str, instance_id: &str) -> Self {
        Self {
            base: WriteModelBase::new(org_id, org_id, instance_id),
            policy: PasswordComplexityPolicy::default(),
            state: PresenceState::Unspecified,
        }
    }
}

impl WriteModel for PasswordComplexityPolicyWriteModel {
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
                .event_types(&[
                    org::PASSWORD_COMPLEXITY_ADDED,
                    org::PASSWORD_COMPLEXITY_CHANGED,
                    org::PASSWORD_COMPLEXITY_REMOVED,
                ]),
        )
    }

    fn apply(&mut self, event: &StoredEvent) -> Result<(), CodecError> {
        match event.decode::<OrgEvent>()? {
            Some(OrgEvent::PasswordComplexityPolicyAdded(e)) => {
                self.policy = e.policy;
                self.state = PresenceState::Active;
            }
            Some(OrgEvent::PasswordComplexityPolicyChanged(e)) => e.apply_to(&mut self.policy),
            Some(OrgEvent::PasswordComplexityPolicyRemoved(_)) => {
                self.policy = PasswordComplexityPolicy::default();
                self.state = PresenceState::Removed;
            }
            _ => {}
        }
        Ok(())
    }
}

fn policy_not_found() -> DomainError {
    DomainError::not_found("POLICY-0011", "errors.policy.password_complexity.not_found")
}

impl Commands {
    /// Policy enforced for users of `org_id`: the org's own policy, else the
    /// instance default from configuration.
    pub async fn effective_password_policy(
        &self,
        ctx: &Context,
        org_id: &str,
    ) -> CommandResult<PasswordComplexityPolicy> {
        let mut wm = PasswordComplexityPolicyWriteModel::new(org_id, ctx.instance_id());
        self.load(ctx, &mut wm).await?;
        Ok(if wm.state.exists() {
            wm.policy
        } else {
            self.config.default_password_policy.clone()
        })
    }

    pub async fn add_password_complexity_policy(
        &self,
        ctx: &Context,
        org_id: &str,
        policy: PasswordComplexityPolicy,
    ) -> CommandResult<ObjectDetails> {
        policy.validate()?;
        self.check_permission(ctx, names::POLICY_WRITE, org_id, org_id).await?;

        let mut org = OrgExistence::new(org_id, ctx.instance_id());
        self.load(ctx, &mut org).await?;
        if !org.state.exists() {
            return Err(DomainError::precondition_failed("ORG-0019", "errors.org.not_found").into());
        }

        let mut wm = PasswordComplexityPolicyWriteModel::new(org_id, ctx.instance_id());
        self.load(ctx, &mut wm).await?;
        if wm.state.exists() {
            return Err(DomainError::already_exists("POLICY-0010", "errors.policy.password_complexity.already_exists").into());
        }
        let added = event(
            ctx,
            &wm.base().aggregate(org::AGGREGATE_TYPE),
            &OrgEvent::PasswordComplexityPolicyAdded(PasswordComplexityPolicyAdded { policy }),
        )?;
        self.commit_with(ctx, &mut wm, vec![added], vec![org.guard()]).await?;
        Ok(wm.details())
    }

    pub async fn change_password_complexity_policy(
        &self,
        ctx: &Context,
        org_id: &str,
        policy: PasswordComplexityPolicy,
    ) -> CommandResult<ObjectDetails> {
        policy.validate()?;
        self.check_permission(ctx, names::POLICY_WRITE, org_id, org_id).await?;

        let mut wm = PasswordComplexityPolicyWriteModel::new(org_id, ctx.instance_id());
        self.execute(ctx, &mut wm, |wm| {
            if !wm.state.exists() {
                return Err(policy_not_found().into());
            }
            let Some(changed) = PasswordComplexityPolicyChanged::diff(&wm.policy, &policy) else {
                return Err(DomainError::precondition_failed("POLICY-0012", "errors.policy.password_complexity.not_changed").into());
            };
            Ok(vec![event(
                ctx,
                &wm.base().aggregate(org::AGGREGATE_TYPE),
                &OrgEvent::PasswordComplexityPolicyChanged(changed),
            )?])
        })
        .await
    }

    pub async fn remove_password_complexity_policy(&self, ctx: &Context, org_id: &str) -> CommandResult<ObjectDetails> {
        self.check_permission(ctx, names::POLICY_DELETE, org_id, org_id).await?;

        let mut wm = PasswordComplexityPolicyWriteModel::new(org_id, ctx.instance_id());
        self.execute(ctx, &mut wm, |wm| {
            if !wm.state.exists() {
                return Err(policy_not_found().into());
            }
            Ok(vec![event(
                ctx,
                &wm.base().aggregate(org::AGGREGATE_TYPE),
                &OrgEvent::PasswordComplexityPolicyRemoved(PasswordComplexityPolicyRemoved {}),
            )?])
        })
        .await
    }
}
