//! Per-instance bootstrap bookkeeping.
//!
//! Setup steps are numbered from 1. The `setup` aggregate (id = instance id)
//! records `started`/`done` markers; a step may start only when no other step
//! is in progress, and an interrupted step blocks the sequence until an
//! operator resolves it.

mod steps;

use async_trait::async_trait;

use keyward_core::{Context, DomainError, ObjectDetails, SYSTEM_USER};
use keyward_domain::setup::{self, StepDone, StepStarted};
use keyward_domain::SetupEvent;
use keyward_events::CodecError;
use keyward_infra::event_store::{AggregateFilter, SearchQuery, StoredEvent};

use crate::commands::Commands;
use crate::engine::event;
use crate::error::CommandResult;
use crate::write_model::{WriteModel, WriteModelBase};

pub use steps::{CreateDefaultOrg, CreateFirstAdmin, FirstInstance, SetDefaultPasswordPolicy};

#[derive(Debug, Clone)]
pub struct SetupWriteModel {
    base: WriteModelBase,
    /// Highest started step; 0 when nothing ran yet.
    pub started: u32,
    /// Highest completed step.
    pub done: u32,
}

impl SetupWriteModel {
    pub fn new(instance_id: &str) -> Self {
        Self {
            base: WriteModelBase::new(instance_id, instance_id, instance_id),
            started: 0,
            done: 0,
        }
    }

    /// A step was started and never marked done.
    pub fn in_progress(&self) -> bool {
        self.started != self.done
    }

    fn can_start(&self, step: u32) -> bool {
        !self.in_progress() && step > self.started
    }

    fn can_finish(&self, step: u32) -> bool {
        self.started == step && self.done < step
    }
}

impl WriteModel for SetupWriteModel {
    fn base(&self) -> &WriteModelBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut WriteModelBase {
        &mut self.base
    }

    fn query(&self) -> SearchQuery {
        SearchQuery::new(&self.base.instance_id).filter(
            AggregateFilter::new(setup::AGGREGATE_TYPE)
                .aggregate_id(&self.base.aggregate_id)
                .event_types(&[setup::STEP_STARTED, setup::STEP_DONE]),
        )
    }

    fn apply(&mut self, event: &StoredEvent) -> Result<(), CodecError> {
        match event.decode::<SetupEvent>()? {
            Some(SetupEvent::Started(e)) => self.started = e.step,
            Some(SetupEvent::Done(e)) => self.done = e.step,
            None => {}
        }
        Ok(())
    }
}

fn require_system(ctx: &Context) -> CommandResult<()> {
    if ctx.user_id() != SYSTEM_USER {
        return Err(DomainError::permission_denied("SETUP-0003", "errors.setup.system_only").into());
    }
    Ok(())
}

impl Commands {
    pub async fn setup_state(&self, ctx: &Context) -> CommandResult<SetupWriteModel> {
        let mut wm = SetupWriteModel::new(ctx.instance_id());
        self.load(ctx, &mut wm).await?;
        Ok(wm)
    }

    /// Record the start of `step`.
    pub async fn start_setup_step(&self, ctx: &Context, step: u32) -> CommandResult<ObjectDetails> {
        require_system(ctx)?;
        let mut wm = SetupWriteModel::new(ctx.instance_id());
        self.execute(ctx, &mut wm, |wm| {
            if !wm.can_start(step) {
                return Err(DomainError::precondition_failed("SETUP-0001", "errors.setup.step_out_of_order").into());
            }
            Ok(vec![event(
                ctx,
                &wm.base().aggregate(setup::AGGREGATE_TYPE),
                &SetupEvent::Started(StepStarted { step }),
            )?])
        })
        .await
    }

    /// Record completion of the step that is currently in progress.
    pub async fn done_setup_step(&self, ctx: &Context, step: u32) -> CommandResult<ObjectDetails> {
        require_system(ctx)?;
        let mut wm = SetupWriteModel::new(ctx.instance_id());
        self.execute(ctx, &mut wm, |wm| {
            if !wm.can_finish(step) {
                return Err(DomainError::precondition_failed("SETUP-0002", "errors.setup.step_not_started").into());
            }
            Ok(vec![event(
                ctx,
                &wm.base().aggregate(setup::AGGREGATE_TYPE),
                &SetupEvent::Done(StepDone { step }),
            )?])
        })
        .await
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Sequencer
// ─────────────────────────────────────────────────────────────────────────────

/// One idempotent bootstrap step.
#[async_trait]
pub trait SetupStep: Send + Sync {
    fn step(&self) -> u32;

    fn name(&self) -> &'static str;

    async fn execute(&self, commands: &Commands, ctx: &Context) -> CommandResult<()>;
}

/// Runs pending steps in order, each wrapped in start/done markers.
pub struct SetupSequencer {
    steps: Vec<Box<dyn SetupStep>>,
}

impl SetupSequencer {
    pub fn new(mut steps: Vec<Box<dyn SetupStep>>) -> Self {
        steps.sort_by_key(|s| s.step());
        Self { steps }
    }

    /// Execute every step above the done watermark. Returns the steps run.
    pub async fn run(&self, commands: &Commands, ctx: &Context) -> CommandResult<Vec<u32>> {
        let state = commands.setup_state(ctx).await?;
        if state.in_progress() {
            tracing::error!(
                instance_id = ctx.instance_id(),
                step = state.started,
                "setup step interrupted, manual intervention required"
            );
        }

        let mut executed = Vec::new();
        for step in self.steps.iter().filter(|s| s.step() > state.done) {
            let number = step.step();
            commands.start_setup_step(ctx, number).await?;
            tracing::info!(instance_id = ctx.instance_id(), step = number, name = step.name(), "setup step started");

            step.execute(commands, ctx).await?;

            commands.done_setup_step(ctx, number).await?;
            tracing::info!(instance_id = ctx.instance_id(), step = number, name = step.name(), "setup step done");
            executed.push(number);
        }
        Ok(executed)
    }
}

impl core::fmt::Debug for SetupSequencer {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_list()
            .entries(self.steps.iter().map(|s| (s.step(), s.name())))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    use keyward_core::ErrorKind;

    use super::*;
    use crate::error::CommandError;
    use crate::test_support::fixture;

    #[tokio::test]
    async fn steps_are_strictly_ordered() {
        let fx = fixture();
        let ctx = Context::system(fx.ctx().instance_id());

        fx.commands.start_setup_step(&ctx, 1).await.unwrap();
        fx.commands.done_setup_step(&ctx, 1).await.unwrap();

        fx.commands.start_setup_step(&ctx, 2).await.unwrap();
        let state = fx.commands.setup_state(&ctx).await.unwrap();
        assert_eq!((state.started, state.done), (2, 1));

        let err = fx.commands.start_setup_step(&ctx, 2).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PreconditionFailed);
        let err = fx.commands.start_setup_step(&ctx, 3).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PreconditionFailed);
        let err = fx.commands.done_setup_step(&ctx, 3).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PreconditionFailed);

        fx.commands.done_setup_step(&ctx, 2).await.unwrap();
        let err = fx.commands.done_setup_step(&ctx, 2).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PreconditionFailed);
        let err = fx.commands.start_setup_step(&ctx, 1).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PreconditionFailed);
    }

    #[tokio::test]
    async fn only_the_system_runs_setup() {
        let fx = fixture();
        let err = fx.commands.start_setup_step(&fx.ctx(), 1).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PermissionDenied);
    }

    struct Counting {
        step: u32,
        runs: Arc<AtomicU32>,
        fail: bool,
    }

    #[async_trait]
    impl SetupStep for Counting {
        fn step(&self) -> u32 {
            self.step
        }

        fn name(&self) -> &'static str {
            "counting"
        }

        async fn execute(&self, _: &Commands, _: &Context) -> CommandResult<()> {
            self.runs.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(CommandError::collaborator(anyhow::anyhow!("boom")));
            }
            Ok(())
        }
    }

    fn counting(step: u32, runs: &Arc<AtomicU32>, fail: bool) -> Box<dyn SetupStep> {
        Box::new(Counting {
            step,
            runs: runs.clone(),
            fail,
        })
    }

    #[tokio::test]
    async fn sequencer_skips_done_steps() {
        let fx = fixture();
        let ctx = Context::system(fx.ctx().instance_id());
        let runs = Arc::new(AtomicU32::new(0));

        let sequencer = SetupSequencer::new(vec![counting(2, &runs, false), counting(1, &runs, false)]);
        assert_eq!(sequencer.run(&fx.commands, &ctx).await.unwrap(), [1, 2]);
        assert_eq!(sequencer.run(&fx.commands, &ctx).await.unwrap(), Vec::<u32>::new());
        assert_eq!(runs.load(Ordering::SeqCst), 2);

        let extended = SetupSequencer::new(vec![
            counting(1, &runs, false),
            counting(2, &runs, false),
            counting(3, &runs, false),
        ]);
        assert_eq!(extended.run(&fx.commands, &ctx).await.unwrap(), [3]);
    }

    #[tokio::test]
    async fn interrupted_step_blocks_rerun() {
        let fx = fixture();
        let ctx = Context::system(fx.ctx().instance_id());
        let runs = Arc::new(AtomicU32::new(0));

        let failing = SetupSequencer::new(vec![counting(1, &runs, true)]);
        assert!(failing.run(&fx.commands, &ctx).await.is_err());

        let retry = SetupSequencer::new(vec![counting(1, &runs, false)]);
        let err = retry.run(&fx.commands, &ctx).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PreconditionFailed);
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }
}
