use std::time::Duration;

use keyward_auth::permissions::names;
use keyward_core::{Context, DomainError, ObjectDetails};
use keyward_domain::target::{self, TargetAdded, TargetChanged, TargetRemoved};
use keyward_domain::{TargetEvent, TargetState};
use keyward_events::CodecError;
use keyward_infra::event_store::{AggregateFilter, SearchQuery, StoredEvent};

use crate::commands::Commands;
use crate::engine::event;
use crate::error::CommandResult;
use crate::write_model::{WriteModel, WriteModelBase};

/// An endpoint called when an execution fires.
#[derive(Debug, Clone)]
pub struct AddTarget {
    pub id: Option<String>,
    pub name: String,
    pub endpoint: String,
    pub timeout: Duration,
    /// Abort the triggering request when the call fails.
    pub interrupt_on_error: bool,
}

/// `None` leaves a field unchanged.
#[derive(Debug, Clone, Default)]
pub struct ChangeTarget {
    pub name: Option<String>,
    pub endpoint: Option<String>,
    pub timeout: Option<Duration>,
    pub interrupt_on_error: Option<bool>,
}

#[derive(Debug, Clone)]
pub struct TargetWriteModel {
    base: WriteModelBase,
    pub name: String,
    pub endpoint: String,
    pub timeout_ms: u64,
    pub interrupt_on_error: bool,
    pub state: TargetState,
}

impl TargetWriteModel {
    pub fn new(target_id: &str, instance_id: &str) -> Self {
        Self {
            base: WriteModelBase::new(target_id, instance_id, instance_id),
            name: String::new(),
            endpoint: String::new(),
            timeout_ms: 0,
            interrupt_on_error: false,
            state: TargetState::Unspecified,
        }
    }
}

impl WriteModel for TargetWriteModel {
    fn base(&self) -> &WriteModelBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut WriteModelBase {
        &mut self.base
    }

    fn query(&self) -> SearchQuery {
        SearchQuery::new(&self.base.instance_id).filter(
            AggregateFilter::new(target::AGGREGATE_TYPE)
                .aggregate_id(&self.base.aggregate_id)
                .event_types(&[target::TARGET_ADDED, target::TARGET_CHANGED, target::TARGET_REMOVED]),
        )
    }

    fn apply(&mut self, event: &StoredEvent) -> Result<(), CodecError> {
        match event.decode::<TargetEvent>()? {
            Some(TargetEvent::Added(e)) => {
                self.name = e.name;
                self.endpoint = e.endpoint;
                self.timeout_ms = e.timeout_ms;
                self.interrupt_on_error = e.interrupt_on_error;
                self.state = TargetState::Active;
            }
            Some(TargetEvent::Changed(e)) => {
                if let Some(v) = e.name {
                    self.name = v;
                }
                if let Some(v) = e.endpoint {
                    self.endpoint = v;
                }
                if let Some(v) = e.timeout_ms {
                    self.timeout_ms = v;
                }
                if let Some(v) = e.interrupt_on_error {
                    self.interrupt_on_error = v;
                }
            }
            Some(TargetEvent::Removed(_)) => self.state = TargetState::Removed,
            None => {}
        }
        Ok(())
    }
}

fn non_blank(value: &str, code: &'static str, key: &'static str) -> CommandResult<String> {
    let value = value.trim();
    if value.is_empty() {
        return Err(DomainError::invalid_argument(code, key).into());
    }
    Ok(value.to_string())
}

fn timeout_ms(timeout: Duration) -> CommandResult<u64> {
    let ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
    if ms == 0 {
        return Err(DomainError::invalid_argument("TARGET-0003", "errors.target.timeout_invalid").into());
    }
    Ok(ms)
}

fn target_not_found() -> DomainError {
    DomainError::not_found("TARGET-0004", "errors.target.not_found")
}

impl Commands {
    pub async fn add_target(&self, ctx: &Context, input: AddTarget) -> CommandResult<ObjectDetails> {
        let name = non_blank(&input.name, "TARGET-0001", "errors.target.name_missing")?;
        let endpoint = non_blank(&input.endpoint, "TARGET-0002", "errors.target.endpoint_missing")?;
        let timeout_ms = timeout_ms(input.timeout)?;
        let target_id = self.id_or_next(input.id.as_deref())?;
        self.check_permission(ctx, names::TARGET_WRITE, ctx.instance_id(), &target_id)
            .await?;

        let mut wm = TargetWriteModel::new(&target_id, ctx.instance_id());
        self.execute(ctx, &mut wm, |wm| {
            if wm.state != TargetState::Unspecified {
                return Err(DomainError::already_exists("TARGET-0005", "errors.target.already_exists").into());
            }
            Ok(vec![event(
                ctx,
                &wm.base().aggregate(target::AGGREGATE_TYPE),
                &TargetEvent::Added(TargetAdded {
                    name,
                    endpoint,
                    timeout_ms,
                    interrupt_on_error: input.interrupt_on_error,
                }),
            )?])
        })
        .await
    }

    pub async fn change_target(
        &self,
        ctx: &Context,
        target_id: &str,
        input: ChangeTarget,
    ) -> CommandResult<ObjectDetails> {
        let name = input
            .name
            .as_deref()
            .map(|n| non_blank(n, "TARGET-0001", "errors.target.name_missing"))
            .transpose()?;
        let endpoint = input
            .endpoint
            .as_deref()
            .map(|e| non_blank(e, "TARGET-0002", "errors.target.endpoint_missing"))
            .transpose()?;
        let timeout_ms = input.timeout.map(timeout_ms).transpose()?;
        self.check_permission(ctx, names::TARGET_WRITE, ctx.instance_id(), target_id)
            .await?;

        let mut wm = TargetWriteModel::new(target_id, ctx.instance_id());
        self.execute(ctx, &mut wm, |wm| {
            if !wm.state.exists() {
                return Err(target_not_found().into());
            }
            let changed = TargetChanged {
                name: name.filter(|v| *v != wm.name),
                endpoint: endpoint.filter(|v| *v != wm.endpoint),
                timeout_ms: timeout_ms.filter(|v| *v != wm.timeout_ms),
                interrupt_on_error: input.interrupt_on_error.filter(|v| *v != wm.interrupt_on_error),
            };
            if changed.is_empty() {
                return Err(DomainError::precondition_failed("TARGET-0006", "errors.target.not_changed").into());
            }
            Ok(vec![event(
                ctx,
                &wm.base().aggregate(target::AGGREGATE_TYPE),
                &TargetEvent::Changed(changed),
            )?])
        })
        .await
    }

    pub async fn remove_target(&self, ctx: &Context, target_id: &str) -> CommandResult<ObjectDetails> {
        self.check_permission(ctx, names::TARGET_DELETE, ctx.instance_id(), target_id)
            .await?;

        let mut wm = TargetWriteModel::new(target_id, ctx.instance_id());
        self.execute(ctx, &mut wm, |wm| {
            if !wm.state.exists() {
                return Err(target_not_found().into());
            }
            Ok(vec![event(
                ctx,
                &wm.base().aggregate(target::AGGREGATE_TYPE),
                &TargetEvent::Removed(TargetRemoved { name: wm.name.clone() }),
            )?])
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use keyward_core::ErrorKind;

    use super::*;
    use crate::test_support::{add_target, fixture};

    #[tokio::test]
    async fn add_validates_input() {
        let fx = fixture();
        let ctx = fx.ctx();

        let err = fx
            .commands
            .add_target(&ctx, AddTarget { endpoint: " ".into(), ..add_target("hook") })
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);

        let err = fx
            .commands
            .add_target(&ctx, AddTarget { timeout: Duration::ZERO, ..add_target("hook") })
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);

        let details = fx.commands.add_target(&ctx, add_target("hook")).await.unwrap();
        assert_eq!(details.resource_owner, ctx.instance_id());
    }

    #[tokio::test]
    async fn change_and_remove() {
        let fx = fixture();
        let ctx = fx.ctx();
        let id = fx.commands.add_target(&ctx, add_target("hook")).await.unwrap().id;

        let err = fx
            .commands
            .change_target(
                &ctx,
                &id,
                ChangeTarget {
                    name: Some("hook".into()),
                    ..ChangeTarget::default()
                },
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PreconditionFailed);

        fx.commands
            .change_target(
                &ctx,
                &id,
                ChangeTarget {
                    timeout: Some(Duration::from_secs(30)),
                    ..ChangeTarget::default()
                },
            )
            .await
            .unwrap();
        let mut wm = TargetWriteModel::new(&id, ctx.instance_id());
        fx.commands.load(&ctx, &mut wm).await.unwrap();
        assert_eq!(wm.timeout_ms, 30_000);

        fx.commands.remove_target(&ctx, &id).await.unwrap();
        let err = fx.commands.remove_target(&ctx, &id).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        let err = fx
            .commands
            .change_target(&ctx, &id, ChangeTarget::default())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }
}
