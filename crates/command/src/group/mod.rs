//! User groups owned by an organization.

mod members;

use keyward_auth::permissions::names;
use keyward_core::{Context, DomainError, ObjectDetails};
use keyward_domain::group::{self, GroupAdded, GroupChanged, GroupRemoved};
use keyward_domain::{GroupEvent, PresenceState};
use keyward_events::CodecError;
use keyward_infra::event_store::{AggregateFilter, SearchQuery, StoredEvent};

use crate::commands::Commands;
use crate::engine::event;
use crate::error::CommandResult;
use crate::existence::OrgExistence;
use crate::write_model::{WriteModel, WriteModelBase};

pub use members::{AddUsersToGroup, AddUsersToGroupResult, GroupMembersWriteModel, GroupMembershipsOfUser, RemoveUsersFromGroup};

#[derive(Debug, Clone, Default)]
pub struct CreateGroup {
    pub id: Option<String>,
    pub organization_id: String,
    pub name: String,
    pub description: String,
}

/// `None` leaves a field unchanged.
#[derive(Debug, Clone, Default)]
pub struct UpdateGroup {
    pub id: String,
    pub organization_id: String,
    pub name: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Clone)]
pub struct GroupWriteModel {
    base: WriteModelBase,
    pub name: String,
    pub description: String,
    pub state: PresenceState,
}

impl GroupWriteModel {
    pub fn new(group_id: &str, resource_owner: &str, instance_id: &str) -> Self {
        Self {
            base: WriteModelBase::new(group_id, resource_owner, instance_id),
            name: String::new(),
            description: String::new(),
            state: PresenceState::Unspecified,
        }
    }

    fn exists_for(&self, owner: &str) -> bool {
        self.state.exists() && self.base.is_owned_by(owner)
    }
}

impl WriteModel for GroupWriteModel {
    fn base(&self) -> &WriteModelBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut WriteModelBase {
        &mut self.base
    }

    fn query(&self) -> SearchQuery {
        SearchQuery::new(&self.base.instance_id).filter(
            AggregateFilter::new(group::AGGREGATE_TYPE)
                .aggregate_id(&self.base.aggregate_id)
                .event_types(&[group::GROUP_ADDED, group::GROUP_CHANGED, group::GROUP_REMOVED]),
        )
    }

    fn apply(&mut self, event: &StoredEvent) -> Result<(), CodecError> {
        match event.decode::<GroupEvent>()? {
            Some(GroupEvent::Added(e)) => {
                self.name = e.name;
                self.description = e.description;
                self.state = PresenceState::Active;
            }
            Some(GroupEvent::Changed(e)) => {
                if let Some(name) = e.name {
                    self.name = name;
                }
                if let Some(description) = e.description {
                    self.description = description;
                }
            }
            Some(GroupEvent::Removed(_)) => self.state = PresenceState::Removed,
            _ => {}
        }
        Ok(())
    }
}

pub(crate) fn group_not_found() -> DomainError {
    DomainError::not_found("GROUP-0003", "errors.group.not_found")
}

fn required(value: &str, code: &'static str, key: &'static str) -> CommandResult<String> {
    let value = value.trim();
    if value.is_empty() {
        return Err(DomainError::invalid_argument(code, key).into());
    }
    Ok(value.to_string())
}

impl Commands {
    pub async fn create_group(&self, ctx: &Context, input: CreateGroup) -> CommandResult<ObjectDetails> {
        let owner = required(&input.organization_id, "GROUP-0001", "errors.group.org_missing")?;
        let name = required(&input.name, "GROUP-0002", "errors.group.name_missing")?;
        let group_id = self.id_or_next(input.id.as_deref())?;
        self.check_permission(ctx, names::GROUP_WRITE, &owner, &group_id).await?;

        let mut org = OrgExistence::new(&owner, ctx.instance_id());
        self.load(ctx, &mut org).await?;
        if !org.state.exists() {
            return Err(DomainError::precondition_failed("GROUP-0004", "errors.group.org_not_found").into());
        }

        let mut wm = GroupWriteModel::new(&group_id, &owner, ctx.instance_id());
        self.load(ctx, &mut wm).await?;
        if wm.state != PresenceState::Unspecified {
            return Err(DomainError::already_exists("GROUP-0005", "errors.group.already_exists").into());
        }
        let added = event(
            ctx,
            &wm.base().aggregate(group::AGGREGATE_TYPE),
            &GroupEvent::Added(GroupAdded {
                name,
                description: input.description.trim().to_string(),
            }),
        )?;
        self.commit_with(ctx, &mut wm, vec![added], vec![org.guard()]).await?;
        Ok(wm.details())
    }

    /// Apply the provided fields. Nothing different from the current state
    /// succeeds without a push.
    pub async fn update_group(&self, ctx: &Context, input: UpdateGroup) -> CommandResult<ObjectDetails> {
        let group_id = required(&input.id, "GROUP-0006", "errors.group.id_missing")?;
        let name = input
            .name
            .as_deref()
            .map(|n| required(n, "GROUP-0002", "errors.group.name_missing"))
            .transpose()?;
        let description = input.description.as_deref().map(|d| d.trim().to_string());
        let owner = input.organization_id.trim();
        self.check_permission(ctx, names::GROUP_WRITE, owner, &group_id).await?;

        let mut wm = GroupWriteModel::new(&group_id, owner, ctx.instance_id());
        self.execute(ctx, &mut wm, |wm| {
            if !wm.exists_for(owner) {
                return Err(group_not_found().into());
            }
            let changed = GroupChanged {
                name: name.filter(|n| *n != wm.name),
                description: description.filter(|d| *d != wm.description),
            };
            if changed.is_empty() {
                return Ok(Vec::new());
            }
            Ok(vec![event(
                ctx,
                &wm.base().aggregate(group::AGGREGATE_TYPE),
                &GroupEvent::Changed(changed),
            )?])
        })
        .await
    }

    /// Delete a group. An unknown group is already deleted: success with
    /// only the id set.
    pub async fn delete_group(&self, ctx: &Context, owner: &str, group_id: &str) -> CommandResult<ObjectDetails> {
        let group_id = required(group_id, "GROUP-0006", "errors.group.id_missing")?;
        self.check_permission(ctx, names::GROUP_DELETE, owner, &group_id).await?;

        let mut wm = GroupWriteModel::new(&group_id, owner, ctx.instance_id());
        self.load(ctx, &mut wm).await?;
        if !wm.exists_for(owner) {
            return Ok(ObjectDetails::new(group_id, 0, None, String::new()));
        }
        let removed = event(
            ctx,
            &wm.base().aggregate(group::AGGREGATE_TYPE),
            &GroupEvent::Removed(GroupRemoved { name: wm.name.clone() }),
        )?;
        self.commit(ctx, &mut wm, vec![removed]).await?;
        Ok(wm.details())
    }
}

#[cfg(test)]
mod tests {
    use keyward_core::ErrorKind;

    use super::*;
    use crate::test_support::{fixture, seed_org};

    fn create(id: &str) -> CreateGroup {
        CreateGroup {
            id: Some(id.to_string()),
            organization_id: "o1".to_string(),
            name: "Admins".to_string(),
            description: "people with keys".to_string(),
        }
    }

    #[tokio::test]
    async fn create_requires_existing_org_and_unique_id() {
        let fx = fixture();
        let ctx = fx.ctx();

        let err = fx.commands.create_group(&ctx, create("g1")).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PreconditionFailed);

        seed_org(&fx, "o1").await;
        let details = fx.commands.create_group(&ctx, create("g1")).await.unwrap();
        assert_eq!(details.id, "g1");
        assert_eq!(details.resource_owner, "o1");
        assert_eq!(details.sequence, 1);

        let err = fx.commands.create_group(&ctx, create("g1")).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AlreadyExists);

        let err = fx
            .commands
            .create_group(&ctx, CreateGroup { name: "  ".into(), ..create("g2") })
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }

    #[tokio::test]
    async fn update_without_difference_pushes_nothing() {
        let fx = fixture();
        let ctx = fx.ctx();
        seed_org(&fx, "o1").await;
        fx.commands.create_group(&ctx, create("g1")).await.unwrap();

        let before = fx.store.len();
        let details = fx
            .commands
            .update_group(
                &ctx,
                UpdateGroup {
                    id: "g1".into(),
                    organization_id: "o1".into(),
                    name: Some("Admins".into()),
                    description: None,
                },
            )
            .await
            .unwrap();
        assert_eq!(fx.store.len(), before);
        assert_eq!(details.sequence, 1);

        let details = fx
            .commands
            .update_group(
                &ctx,
                UpdateGroup {
                    id: "g1".into(),
                    organization_id: "o1".into(),
                    name: Some("Operators".into()),
                    description: None,
                },
            )
            .await
            .unwrap();
        assert_eq!(details.sequence, 2);

        let err = fx
            .commands
            .update_group(
                &ctx,
                UpdateGroup {
                    id: "g1".into(),
                    organization_id: "o2".into(),
                    name: Some("Other".into()),
                    description: None,
                },
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let fx = fixture();
        let ctx = fx.ctx();
        seed_org(&fx, "o1").await;
        fx.commands.create_group(&ctx, create("g1")).await.unwrap();

        let details = fx.commands.delete_group(&ctx, "o1", "g1").await.unwrap();
        assert_eq!(details.sequence, 2);

        let before = fx.store.len();
        let details = fx.commands.delete_group(&ctx, "o1", "g1").await.unwrap();
        assert_eq!(details.id, "g1");
        assert_eq!(details.sequence, 0);
        assert_eq!(fx.store.len(), before);
    }
}
