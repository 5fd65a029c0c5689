//! Key/value metadata on users.
//!
//! One entry per key; a single key is folded by [`UserMetadataWriteModel`],
//! the full map by [`UserMetadataListWriteModel`] for bulk operations.

use std::collections::{BTreeMap, BTreeSet};

use keyward_auth::permissions::names;
use keyward_core::{Context, DomainError, ObjectDetails};
use keyward_domain::user::{self, MetadataRemoved, MetadataRemovedAll, MetadataSet};
use keyward_domain::{PresenceState, UserEvent};
use keyward_events::CodecError;
use keyward_infra::event_store::{AggregateFilter, ConcurrencyGuard, SearchQuery, StoredEvent};

use crate::commands::Commands;
use crate::engine::event;
use crate::error::CommandResult;
use crate::existence::UserExistence;
use crate::write_model::{WriteModel, WriteModelBase};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Metadata {
    pub key: String,
    pub value: String,
}

impl Metadata {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }

    fn validate(&self) -> CommandResult<()> {
        if self.key.trim().is_empty() {
            return Err(DomainError::invalid_argument("META-0001", "errors.metadata.key_missing").into());
        }
        if self.value.is_empty() {
            return Err(DomainError::invalid_argument("META-0002", "errors.metadata.value_missing").into());
        }
        Ok(())
    }
}

/// Outcome of a bulk operation: keys that were skipped as invalid or absent.
#[derive(Debug, Clone)]
pub struct BulkMetadataResult {
    pub details: ObjectDetails,
    pub failed_keys: Vec<String>,
}

fn metadata_query(instance_id: &str, user_id: &str) -> SearchQuery {
    SearchQuery::new(instance_id).filter(
        AggregateFilter::new(user::AGGREGATE_TYPE)
            .aggregate_id(user_id)
            .event_types(user::METADATA_EVENT_TYPES),
    )
}

// ─────────────────────────────────────────────────────────────────────────────
// Write models
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct UserMetadataWriteModel {
    base: WriteModelBase,
    pub key: String,
    pub value: Option<String>,
    pub state: PresenceState,
}

impl UserMetadataWriteModel {
    pub fn new(user_id: &str, key: &str, resource_owner: &str, instance_id: &str) -> Self {
        Self {
            base: WriteModelBase::new(user_id, resource_owner, instance_id),
            key: key.to_string(),
            value: None,
            state: PresenceState::Unspecified,
        }
    }
}

impl WriteModel for UserMetadataWriteModel {
    fn base(&self) -> &WriteModelBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut WriteModelBase {
        &mut self.base
    }

    fn query(&self) -> SearchQuery {
        metadata_query(&self.base.instance_id, &self.base.aggregate_id)
    }

    fn accepts(&self, event: &StoredEvent) -> bool {
        match event.decode::<UserEvent>() {
            Ok(Some(UserEvent::MetadataSet(e))) => e.key == self.key,
            Ok(Some(UserEvent::MetadataRemoved(e))) => e.key == self.key,
            Ok(Some(UserEvent::MetadataRemovedAll(_))) => true,
            Ok(_) => false,
            // Let reduce surface the decoding failure.
            Err(_) => true,
        }
    }

    fn apply(&mut self, event: &StoredEvent) -> Result<(), CodecError> {
        match event.decode::<UserEvent>()? {
            Some(UserEvent::MetadataSet(e)) => {
                self.value = Some(e.value);
                self.state = PresenceState::Active;
            }
            Some(UserEvent::MetadataRemoved(_)) | Some(UserEvent::MetadataRemovedAll(_)) => {
                self.value = None;
                self.state = PresenceState::Removed;
            }
            _ => {}
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct UserMetadataListWriteModel {
    base: WriteModelBase,
    pub metadata: BTreeMap<String, String>,
}

impl UserMetadataListWriteModel {
    pub fn new(user_id: &str, resource_owner: &str, instance_id: &str) -> Self {
        Self {
            base: WriteModelBase::new(user_id, resource_owner, instance_id),
            metadata: BTreeMap::new(),
        }
    }
}

impl WriteModel for UserMetadataListWriteModel {
    fn base(&self) -> &WriteModelBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut WriteModelBase {
        &mut self.base
    }

    fn query(&self) -> SearchQuery {
        metadata_query(&self.base.instance_id, &self.base.aggregate_id)
    }

    fn apply(&mut self, event: &StoredEvent) -> Result<(), CodecError> {
        match event.decode::<UserEvent>()? {
            Some(UserEvent::MetadataSet(e)) => {
                self.metadata.insert(e.key, e.value);
            }
            Some(UserEvent::MetadataRemoved(e)) => {
                self.metadata.remove(&e.key);
            }
            Some(UserEvent::MetadataRemovedAll(_)) => self.metadata.clear(),
            _ => {}
        }
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Commands
// ─────────────────────────────────────────────────────────────────────────────

fn metadata_not_found() -> DomainError {
    DomainError::not_found("META-0005", "errors.metadata.not_found")
}

fn empty_bulk() -> DomainError {
    DomainError::precondition_failed("META-0004", "errors.metadata.empty")
}

impl Commands {
    /// The user must exist for `owner`; its guard joins the metadata push.
    async fn metadata_user_guard(&self, ctx: &Context, owner: &str, user_id: &str) -> CommandResult<ConcurrencyGuard> {
        let mut user = UserExistence::new(user_id, ctx.instance_id());
        self.load(ctx, &mut user).await?;
        if !user.exists() || !user.base().is_owned_by(owner) {
            return Err(DomainError::precondition_failed("META-0003", "errors.metadata.user_not_found").into());
        }
        Ok(user.guard())
    }

    /// Set one entry. Setting the current value again pushes nothing.
    pub async fn set_user_metadata(
        &self,
        ctx: &Context,
        owner: &str,
        user_id: &str,
        metadata: Metadata,
    ) -> CommandResult<ObjectDetails> {
        metadata.validate()?;
        self.check_permission(ctx, names::USER_WRITE, owner, user_id).await?;
        let user_guard = self.metadata_user_guard(ctx, owner, user_id).await?;

        let mut wm = UserMetadataWriteModel::new(user_id, &metadata.key, owner, ctx.instance_id());
        self.load(ctx, &mut wm).await?;
        if wm.state.exists() && wm.value.as_deref() == Some(metadata.value.as_str()) {
            return Ok(wm.details());
        }
        let set = event(
            ctx,
            &wm.base().aggregate(user::AGGREGATE_TYPE),
            &UserEvent::MetadataSet(MetadataSet {
                key: metadata.key,
                value: metadata.value,
            }),
        )?;
        self.commit_with(ctx, &mut wm, vec![set], vec![user_guard]).await?;
        Ok(wm.details())
    }

    /// Set many entries in one push. Invalid entries are reported in
    /// `failed_keys`; unchanged ones are skipped.
    pub async fn bulk_set_user_metadata(
        &self,
        ctx: &Context,
        owner: &str,
        user_id: &str,
        metadata: Vec<Metadata>,
    ) -> CommandResult<BulkMetadataResult> {
        if metadata.is_empty() {
            return Err(empty_bulk().into());
        }
        self.check_permission(ctx, names::USER_WRITE, owner, user_id).await?;
        let user_guard = self.metadata_user_guard(ctx, owner, user_id).await?;

        let mut wm = UserMetadataListWriteModel::new(user_id, owner, ctx.instance_id());
        self.load(ctx, &mut wm).await?;

        let aggregate = wm.base().aggregate(user::AGGREGATE_TYPE);
        let mut desired = wm.metadata.clone();
        let mut failed_keys = Vec::new();
        let mut events = Vec::new();
        for entry in metadata {
            if entry.validate().is_err() {
                failed_keys.push(entry.key);
                continue;
            }
            if desired.get(&entry.key) == Some(&entry.value) {
                continue;
            }
            desired.insert(entry.key.clone(), entry.value.clone());
            events.push(event(
                ctx,
                &aggregate,
                &UserEvent::MetadataSet(MetadataSet {
                    key: entry.key,
                    value: entry.value,
                }),
            )?);
        }

        self.commit_with(ctx, &mut wm, events, vec![user_guard]).await?;
        Ok(BulkMetadataResult {
            details: wm.details(),
            failed_keys,
        })
    }

    pub async fn remove_user_metadata(
        &self,
        ctx: &Context,
        owner: &str,
        user_id: &str,
        key: &str,
    ) -> CommandResult<ObjectDetails> {
        if key.trim().is_empty() {
            return Err(DomainError::invalid_argument("META-0001", "errors.metadata.key_missing").into());
        }
        self.check_permission(ctx, names::USER_DELETE, owner, user_id).await?;
        let user_guard = self.metadata_user_guard(ctx, owner, user_id).await?;

        let mut wm = UserMetadataWriteModel::new(user_id, key, owner, ctx.instance_id());
        self.load(ctx, &mut wm).await?;
        if !wm.state.exists() {
            return Err(metadata_not_found().into());
        }
        let removed = event(
            ctx,
            &wm.base().aggregate(user::AGGREGATE_TYPE),
            &UserEvent::MetadataRemoved(MetadataRemoved { key: key.to_string() }),
        )?;
        self.commit_with(ctx, &mut wm, vec![removed], vec![user_guard]).await?;
        Ok(wm.details())
    }

    /// Remove many keys in one push; absent keys land in `failed_keys`.
    pub async fn bulk_remove_user_metadata(
        &self,
        ctx: &Context,
        owner: &str,
        user_id: &str,
        keys: Vec<String>,
    ) -> CommandResult<BulkMetadataResult> {
        if keys.is_empty() {
            return Err(empty_bulk().into());
        }
        self.check_permission(ctx, names::USER_DELETE, owner, user_id).await?;
        let user_guard = self.metadata_user_guard(ctx, owner, user_id).await?;

        let mut wm = UserMetadataListWriteModel::new(user_id, owner, ctx.instance_id());
        self.load(ctx, &mut wm).await?;

        let aggregate = wm.base().aggregate(user::AGGREGATE_TYPE);
        let mut removed = BTreeSet::new();
        let mut failed_keys = Vec::new();
        let mut events = Vec::new();
        for key in keys {
            if !wm.metadata.contains_key(&key) || !removed.insert(key.clone()) {
                failed_keys.push(key);
                continue;
            }
            events.push(event(
                ctx,
                &aggregate,
                &UserEvent::MetadataRemoved(MetadataRemoved { key }),
            )?);
        }

        self.commit_with(ctx, &mut wm, events, vec![user_guard]).await?;
        Ok(BulkMetadataResult {
            details: wm.details(),
            failed_keys,
        })
    }

    pub async fn remove_all_user_metadata(
        &self,
        ctx: &Context,
        owner: &str,
        user_id: &str,
    ) -> CommandResult<ObjectDetails> {
        self.check_permission(ctx, names::USER_DELETE, owner, user_id).await?;
        let user_guard = self.metadata_user_guard(ctx, owner, user_id).await?;

        let mut wm = UserMetadataListWriteModel::new(user_id, owner, ctx.instance_id());
        self.load(ctx, &mut wm).await?;
        if wm.metadata.is_empty() {
            return Err(metadata_not_found().into());
        }
        let removed = event(
            ctx,
            &wm.base().aggregate(user::AGGREGATE_TYPE),
            &UserEvent::MetadataRemovedAll(MetadataRemovedAll {}),
        )?;
        self.commit_with(ctx, &mut wm, vec![removed], vec![user_guard]).await?;
        Ok(wm.details())
    }
}
