use keyward_auth::permissions::names;
use keyward_core::{Context, DomainError, ObjectDetails};
use keyward_domain::execution::{self, ExecutionRemoved, ExecutionSet};
use keyward_domain::{ExecutionCondition, ExecutionEvent, PresenceState};
use keyward_events::CodecError;
use keyward_infra::event_store::{AggregateFilter, SearchQuery, StoredEvent};

use crate::commands::Commands;
use crate::engine::event;
use crate::error::CommandResult;
use crate::existence::ExistenceList;
use crate::write_model::{WriteModel, WriteModelBase};

/// Targets bound to one condition, keyed by the condition's derived id.
#[derive(Debug, Clone)]
pub struct ExecutionWriteModel {
    base: WriteModelBase,
    pub targets: Vec<String>,
    pub state: PresenceState,
}

impl ExecutionWriteModel {
    pub fn new(execution_id: &str, instance_id: &str) -> Self {
        Self {
            base: WriteModelBase::new(execution_id, instance_id, instance_id),
            targets: Vec::new(),
            state: PresenceState::Unspecified,
        }
    }
}

impl WriteModel for ExecutionWriteModel {
    fn base(&self) -> &WriteModelBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut WriteModelBase {
        &mut self.base
    }

    fn query(&self) -> SearchQuery {
        SearchQuery::new(&self.base.instance_id).filter(
            AggregateFilter::new(execution::AGGREGATE_TYPE)
                .aggregate_id(&self.base.aggregate_id)
                .event_types(&[execution::EXECUTION_SET, execution::EXECUTION_REMOVED]),
        )
    }

    fn apply(&mut self, event: &StoredEvent) -> Result<(), CodecError> {
        match event.decode::<ExecutionEvent>()? {
            Some(ExecutionEvent::Set(e)) => {
                self.targets = e.targets;
                self.state = PresenceState::Active;
            }
            Some(ExecutionEvent::Removed(_)) => {
                self.targets.clear();
                self.state = PresenceState::Removed;
            }
            None => {}
        }
        Ok(())
    }
}

impl Commands {
    /// Bind `targets`, in call order, to `condition`. Every target must exist.
    pub async fn set_execution(
        &self,
        ctx: &Context,
        condition: &ExecutionCondition,
        targets: Vec<String>,
    ) -> CommandResult<ObjectDetails> {
        let execution_id = condition.execution_id()?;
        if targets.is_empty() || targets.iter().any(|t| t.trim().is_empty()) {
            return Err(DomainError::invalid_argument("EXEC-0002", "errors.execution.targets_invalid").into());
        }
        self.check_permission(ctx, names::EXECUTION_WRITE, ctx.instance_id(), &execution_id)
            .await?;

        let mut existing = ExistenceList::targets(ctx.instance_id(), &targets);
        self.load(ctx, &mut existing).await?;
        let missing = existing.missing();
        if !missing.is_empty() {
            tracing::debug!(execution_id = %execution_id, ?missing, "execution targets missing");
            return Err(DomainError::precondition_failed("EXEC-0003", "errors.execution.target_not_found").into());
        }

        let mut wm = ExecutionWriteModel::new(&execution_id, ctx.instance_id());
        self.load(ctx, &mut wm).await?;
        if wm.state.exists() && wm.targets == targets {
            return Ok(wm.details());
        }
        let set = event(
            ctx,
            &wm.base().aggregate(execution::AGGREGATE_TYPE),
            &ExecutionEvent::Set(ExecutionSet { targets }),
        )?;
        self.commit_with(ctx, &mut wm, vec![set], vec![existing.guard()]).await?;
        Ok(wm.details())
    }

    pub async fn delete_execution(&self, ctx: &Context, condition: &ExecutionCondition) -> CommandResult<ObjectDetails> {
        let execution_id = condition.execution_id()?;
        self.check_permission(ctx, names::EXECUTION_DELETE, ctx.instance_id(), &execution_id)
            .await?;

        let mut wm = ExecutionWriteModel::new(&execution_id, ctx.instance_id());
        self.execute(ctx, &mut wm, |wm| {
            if !wm.state.exists() {
                return Err(DomainError::not_found("EXEC-0004", "errors.execution.not_found").into());
            }
            Ok(vec![event(
                ctx,
                &wm.base().aggregate(execution::AGGREGATE_TYPE),
                &ExecutionEvent::Removed(ExecutionRemoved {}),
            )?])
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use keyward_core::ErrorKind;
    use keyward_domain::{ApiCondition, FunctionCondition};

    use super::*;
    use crate::test_support::{fixture, seed_target};

    fn request(method: &str) -> ExecutionCondition {
        ExecutionCondition::Request(ApiCondition {
            method: Some(method.to_string()),
            service: None,
            all: false,
        })
    }

    #[tokio::test]
    async fn set_requires_existing_targets() {
        let fx = fixture();
        let ctx = fx.ctx();
        let t1 = seed_target(&fx, "audit").await;

        let before = fx.store.len();
        let err = fx
            .commands
            .set_execution(&ctx, &request("/user.v2/AddHuman"), vec![t1.clone(), "ghost".into()])
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PreconditionFailed);
        assert_eq!(fx.store.len(), before);

        let details = fx
            .commands
            .set_execution(&ctx, &request("/user.v2/AddHuman"), vec![t1.clone()])
            .await
            .unwrap();
        assert_eq!(details.id, "request//user.v2/AddHuman");

        let before = fx.store.len();
        fx.commands
            .set_execution(&ctx, &request("/user.v2/AddHuman"), vec![t1])
            .await
            .unwrap();
        assert_eq!(fx.store.len(), before);
    }

    #[tokio::test]
    async fn invalid_condition_and_targets_are_rejected() {
        let fx = fixture();
        let ctx = fx.ctx();
        let invalid = ExecutionCondition::Function(FunctionCondition { name: " ".into() });
        let err = fx
            .commands
            .set_execution(&ctx, &invalid, vec!["t".into()])
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);

        let err = fx
            .commands
            .set_execution(&ctx, &request("/x"), Vec::new())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }

    #[tokio::test]
    async fn delete_requires_a_set_execution() {
        let fx = fixture();
        let ctx = fx.ctx();
        let t1 = seed_target(&fx, "audit").await;
        let condition = ExecutionCondition::Function(FunctionCondition { name: "preuserinfo".into() });

        let err = fx.commands.delete_execution(&ctx, &condition).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);

        fx.commands
            .set_execution(&ctx, &condition, vec![t1])
            .await
            .unwrap();
        fx.commands.delete_execution(&ctx, &condition).await.unwrap();
        let err = fx.commands.delete_execution(&ctx, &condition).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }
}
