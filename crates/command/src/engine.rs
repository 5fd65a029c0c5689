//! The generic command skeleton shared by every handler.
//!
//! Handlers compose three steps:
//!
//! 1. [`Commands::load`] folds the current history into a fresh write model
//! 2. the handler checks invariants and builds typed events (pure)
//! 3. [`Commands::commit`] pushes them guarded by the write model's query and
//!    folds the stored result back into the model
//!
//! [`Commands::execute`] runs all three for handlers whose decision needs no
//! further I/O. Every store call is bounded by the context deadline.

use std::future::Future;

use keyward_core::{AggregateRef, Context, ObjectDetails};
use keyward_events::EventFamily;
use keyward_infra::event_store::{ConcurrencyGuard, EventStoreError, StoredEvent, UncommittedEvent};

use crate::commands::Commands;
use crate::error::{CommandError, CommandResult};
use crate::write_model::WriteModel;

/// Encode a typed event for `aggregate`, attributed to the acting user.
pub(crate) fn event<E: EventFamily>(
    ctx: &Context,
    aggregate: &AggregateRef,
    event: &E,
) -> CommandResult<UncommittedEvent> {
    Ok(UncommittedEvent::from_typed(aggregate, ctx.user_id(), event)?)
}

/// Run a store call under the context deadline.
async fn bounded<T, F>(ctx: &Context, call: F) -> CommandResult<T>
where
    F: Future<Output = Result<T, EventStoreError>>,
{
    if ctx.is_expired() {
        return Err(CommandError::DeadlineExceeded);
    }
    match ctx.deadline() {
        None => Ok(call.await?),
        Some(deadline) => {
            match tokio::time::timeout_at(tokio::time::Instant::from_std(deadline), call).await {
                Ok(result) => Ok(result?),
                Err(_) => Err(CommandError::DeadlineExceeded),
            }
        }
    }
}

impl Commands {
    /// Fold the write model's current history.
    pub async fn load<W: WriteModel>(&self, ctx: &Context, wm: &mut W) -> CommandResult<()> {
        let query = wm.query();
        let events = bounded(ctx, self.store.filter(&query)).await?;
        wm.append_and_reduce(&events)?;

        tracing::debug!(
            aggregate_id = %wm.base().aggregate_id,
            events = events.len(),
            observed_position = wm.base().observed_position,
            "write model loaded"
        );
        Ok(())
    }

    /// Push `events` guarded by the write model, then fold them back into it.
    ///
    /// No events means no I/O.
    pub async fn commit<W: WriteModel>(
        &self,
        ctx: &Context,
        wm: &mut W,
        events: Vec<UncommittedEvent>,
    ) -> CommandResult<Vec<StoredEvent>> {
        self.commit_with(ctx, wm, events, Vec::new()).await
    }

    /// Like [`Commands::commit`], with additional guards for secondary models
    /// the decision depended on (e.g. "the user still exists").
    pub async fn commit_with<W: WriteModel>(
        &self,
        ctx: &Context,
        wm: &mut W,
        events: Vec<UncommittedEvent>,
        guards: Vec<ConcurrencyGuard>,
    ) -> CommandResult<Vec<StoredEvent>> {
        if events.is_empty() {
            return Ok(Vec::new());
        }
        let mut all_guards = Vec::with_capacity(guards.len() + 1);
        all_guards.push(wm.guard());
        all_guards.extend(guards);

        let stored = self.push(ctx, events, all_guards).await?;
        wm.append_and_reduce(&stored)?;
        Ok(stored)
    }

    /// Atomic push of `events`; fails as a whole if any guard does not hold.
    pub(crate) async fn push(
        &self,
        ctx: &Context,
        events: Vec<UncommittedEvent>,
        guards: Vec<ConcurrencyGuard>,
    ) -> CommandResult<Vec<StoredEvent>> {
        let count = events.len();
        let stored = bounded(ctx, self.store.push(events, guards)).await?;
        tracing::debug!(
            events = count,
            last_position = stored.last().map(|e| e.position).unwrap_or_default(),
            "events committed"
        );
        Ok(stored)
    }

    /// Load, decide, commit.
    ///
    /// `decide` sees the folded model and returns the events to push; an empty
    /// list is the "already in this state" path and pushes nothing.
    pub async fn execute<W, F>(&self, ctx: &Context, wm: &mut W, decide: F) -> CommandResult<ObjectDetails>
    where
        W: WriteModel,
        F: FnOnce(&W) -> CommandResult<Vec<UncommittedEvent>> + Send,
    {
        self.load(ctx, wm).await?;
        let events = decide(wm)?;
        self.commit(ctx, wm, events).await?;
        Ok(wm.details())
    }

    /// Delegate to the permission collaborator.
    pub async fn check_permission(
        &self,
        ctx: &Context,
        permission: &str,
        resource_owner: &str,
        aggregate_id: &str,
    ) -> CommandResult<()> {
        self.permissions
            .check(ctx, permission, resource_owner, aggregate_id)
            .await?;
        Ok(())
    }
}
