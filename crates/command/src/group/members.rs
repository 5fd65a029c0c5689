use std::collections::{BTreeMap, BTreeSet};

use keyward_auth::permissions::names;
use keyward_core::{AggregateRef, Context, DomainError, ObjectDetails};
use keyward_domain::group::{self, MemberAdded, MemberCascadeRemoved, MemberRemoved};
use keyward_domain::{GroupEvent, PresenceState};
use keyward_events::CodecError;
use keyward_infra::event_store::{AggregateFilter, SearchQuery, StoredEvent};

use super::group_not_found;
use crate::commands::Commands;
use crate::engine::event;
use crate::error::CommandResult;
use crate::existence::ExistenceList;
use crate::write_model::{WriteModel, WriteModelBase};

#[derive(Debug, Clone, Default)]
pub struct AddUsersToGroup {
    pub group_id: String,
    pub organization_id: String,
    pub user_ids: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct AddUsersToGroupResult {
    pub details: ObjectDetails,
    /// Requested users that do not exist; every other user is a member now.
    pub failed_user_ids: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct RemoveUsersFromGroup {
    pub group_id: String,
    pub organization_id: String,
    pub user_ids: Vec<String>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Write models
// ─────────────────────────────────────────────────────────────────────────────

/// Lifecycle and member set of one group.
#[derive(Debug, Clone)]
pub struct GroupMembersWriteModel {
    base: WriteModelBase,
    pub state: PresenceState,
    pub members: BTreeSet<String>,
}

impl GroupMembersWriteModel {
    pub fn new(group_id: &str, resource_owner: &str, instance_id: &str) -> Self {
        Self {
            base: WriteModelBase::new(group_id, resource_owner, instance_id),
            state: PresenceState::Unspecified,
            members: BTreeSet::new(),
        }
    }
}

impl WriteModel for GroupMembersWriteModel {
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
                .event_types(&[
                    group::GROUP_ADDED,
                    group::GROUP_REMOVED,
                    group::MEMBER_ADDED,
                    group::MEMBER_REMOVED,
                    group::MEMBER_CASCADE_REMOVED,
                ]),
        )
    }

    fn apply(&mut self, event: &StoredEvent) -> Result<(), CodecError> {
        match event.decode::<GroupEvent>()? {
            Some(GroupEvent::Added(_)) => self.state = PresenceState::Active,
            Some(GroupEvent::Removed(_)) => {
                self.state = PresenceState::Removed;
                self.members.clear();
            }
            Some(GroupEvent::MemberAdded(e)) => {
                self.members.insert(e.user_id);
            }
            Some(GroupEvent::MemberRemoved(MemberRemoved { user_id }))
            | Some(GroupEvent::MemberCascadeRemoved(MemberCascadeRemoved { user_id })) => {
                self.members.remove(&user_id);
            }
            _ => {}
        }
        Ok(())
    }
}

/// Groups (across all organizations of the instance) one user is a member of.
#[derive(Debug, Clone)]
pub struct GroupMembershipsOfUser {
    base: WriteModelBase,
    user_id: String,
    groups: BTreeMap<String, (AggregateRef, bool)>,
}

impl GroupMembershipsOfUser {
    pub fn new(user_id: &str, instance_id: &str) -> Self {
        Self {
            base: WriteModelBase::new("", "", instance_id),
            user_id: user_id.to_string(),
            groups: BTreeMap::new(),
        }
    }

    /// Streams of the groups the user currently belongs to.
    pub fn groups(&self) -> impl Iterator<Item = &AggregateRef> {
        self.groups
            .values()
            .filter(|(_, member)| *member)
            .map(|(group, _)| group)
    }
}

impl WriteModel for GroupMembershipsOfUser {
    fn base(&self) -> &WriteModelBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut WriteModelBase {
        &mut self.base
    }

    fn query(&self) -> SearchQuery {
        SearchQuery::new(&self.base.instance_id).filter(
            AggregateFilter::new(group::AGGREGATE_TYPE)
                .event_types(&[group::GROUP_REMOVED])
                .event_types(group::MEMBER_EVENT_TYPES),
        )
    }

    fn accepts(&self, event: &StoredEvent) -> bool {
        match event.decode::<GroupEvent>() {
            Ok(Some(GroupEvent::Removed(_))) => true,
            Ok(Some(e)) => e.member_user_id() == Some(self.user_id.as_str()),
            Ok(_) => false,
            // Let reduce surface the decoding failure.
            Err(_) => true,
        }
    }

    fn apply(&mut self, event: &StoredEvent) -> Result<(), CodecError> {
        let member = match event.decode::<GroupEvent>()? {
            Some(GroupEvent::MemberAdded(_)) => true,
            Some(GroupEvent::MemberRemoved(_)) | Some(GroupEvent::MemberCascadeRemoved(_)) => false,
            // Removal of a group the user never joined is irrelevant.
            Some(GroupEvent::Removed(_)) => {
                if let Some((_, member)) = self.groups.get_mut(&event.aggregate.id) {
                    *member = false;
                }
                return Ok(());
            }
            _ => return Ok(()),
        };
        self.groups
            .insert(event.aggregate.id.clone(), (event.aggregate.clone(), member));
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Commands
// ─────────────────────────────────────────────────────────────────────────────

fn group_id_required(group_id: &str) -> CommandResult<String> {
    let group_id = group_id.trim();
    if group_id.is_empty() {
        return Err(DomainError::invalid_argument("GROUP-0006", "errors.group.id_missing").into());
    }
    Ok(group_id.to_string())
}

fn user_ids_required(user_ids: &[String]) -> CommandResult<()> {
    if user_ids.is_empty() {
        return Err(DomainError::invalid_argument("GROUP-0007", "errors.group.user_ids_missing").into());
    }
    Ok(())
}

impl Commands {
    /// Add existing users to a group in one push. Users that do not exist
    /// are reported; users already in the group are skipped.
    pub async fn add_users_to_group(
        &self,
        ctx: &Context,
        input: AddUsersToGroup,
    ) -> CommandResult<AddUsersToGroupResult> {
        let group_id = group_id_required(&input.group_id)?;
        user_ids_required(&input.user_ids)?;
        let owner = input.organization_id.trim();
        self.check_permission(ctx, names::GROUP_MEMBER_WRITE, owner, &group_id)
            .await?;

        let mut wm = GroupMembersWriteModel::new(&group_id, owner, ctx.instance_id());
        self.load(ctx, &mut wm).await?;
        if !wm.state.exists() || !wm.base().is_owned_by(owner) {
            return Err(group_not_found().into());
        }

        let mut users = ExistenceList::users(ctx.instance_id(), &input.user_ids);
        self.load(ctx, &mut users).await?;

        let aggregate = wm.base().aggregate(group::AGGREGATE_TYPE);
        let mut seen = BTreeSet::new();
        let mut failed_user_ids = Vec::new();
        let mut events = Vec::new();
        for user_id in input.user_ids {
            if !seen.insert(user_id.clone()) {
                continue;
            }
            if !users.exists(&user_id) {
                failed_user_ids.push(user_id);
                continue;
            }
            if wm.members.contains(&user_id) {
                continue;
            }
            events.push(event(ctx, &aggregate, &GroupEvent::MemberAdded(MemberAdded { user_id }))?);
        }

        self.commit_with(ctx, &mut wm, events, vec![users.guard()]).await?;
        if !failed_user_ids.is_empty() {
            tracing::debug!(group_id = %group_id, failed = failed_user_ids.len(), "some users not added to group");
        }
        Ok(AddUsersToGroupResult {
            details: wm.details(),
            failed_user_ids,
        })
    }

    /// Remove members in one push; users that are not members are skipped.
    pub async fn remove_users_from_group(
        &self,
        ctx: &Context,
        input: RemoveUsersFromGroup,
    ) -> CommandResult<ObjectDetails> {
        let group_id = group_id_required(&input.group_id)?;
        user_ids_required(&input.user_ids)?;
        let owner = input.organization_id.trim();
        self.check_permission(ctx, names::GROUP_MEMBER_WRITE, owner, &group_id)
            .await?;

        let mut wm = GroupMembersWriteModel::new(&group_id, owner, ctx.instance_id());
        self.execute(ctx, &mut wm, |wm| {
            if !wm.state.exists() || !wm.base().is_owned_by(owner) {
                return Err(group_not_found().into());
            }
            let aggregate = wm.base().aggregate(group::AGGREGATE_TYPE);
            let to_remove: BTreeSet<String> = input
                .user_ids
                .into_iter()
                .filter(|id| wm.members.contains(id))
                .collect();
            to_remove
                .into_iter()
                .map(|user_id| event(ctx, &aggregate, &GroupEvent::MemberRemoved(MemberRemoved { user_id })))
                .collect()
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use keyward_core::ErrorKind;

    use super::*;
    use crate::group::CreateGroup;
    use crate::test_support::{fixture, seed_org, seed_user, Fixture};

    async fn seed_group(fx: &Fixture, org: &str, id: &str) {
        fx.commands
            .create_group(
                &fx.ctx(),
                CreateGroup {
                    id: Some(id.to_string()),
                    organization_id: org.to_string(),
                    name: format!("group {id}"),
                    description: String::new(),
                },
            )
            .await
            .unwrap();
    }

    fn ids(ids: &[&str]) -> Vec<String> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    fn add(user_ids: &[&str]) -> AddUsersToGroup {
        AddUsersToGroup {
            group_id: "g1".into(),
            organization_id: "o1".into(),
            user_ids: ids(user_ids),
        }
    }

    #[tokio::test]
    async fn partial_add_pushes_existing_users_once() {
        let fx = fixture();
        let ctx = fx.ctx();
        seed_org(&fx, "o1").await;
        seed_user(&fx, "o1", "u1").await;
        seed_user(&fx, "o1", "u3").await;
        seed_group(&fx, "o1", "g1").await;

        let before = fx.store.len();
        let result = fx
            .commands
            .add_users_to_group(&ctx, add(&["u1", "u2", "u3"]))
            .await
            .unwrap();
        assert_eq!(result.failed_user_ids, ["u2"]);
        assert_eq!(fx.store.len(), before + 2);
        assert_eq!(result.details.sequence, 3);

        let mut wm = GroupMembersWriteModel::new("g1", "o1", ctx.instance_id());
        fx.commands.load(&ctx, &mut wm).await.unwrap();
        assert_eq!(wm.members, ["u1".to_string(), "u3".to_string()].into());

        let before = fx.store.len();
        let result = fx
            .commands
            .add_users_to_group(&ctx, add(&["u1", "u1"]))
            .await
            .unwrap();
        assert!(result.failed_user_ids.is_empty());
        assert_eq!(fx.store.len(), before);
    }

    #[tokio::test]
    async fn add_validates_input_and_group() {
        let fx = fixture();
        let ctx = fx.ctx();
        seed_org(&fx, "o1").await;

        let err = fx.commands.add_users_to_group(&ctx, add(&[])).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);

        let err = fx
            .commands
            .add_users_to_group(&ctx, add(&["u1"]))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn remove_skips_non_members() {
        let fx = fixture();
        let ctx = fx.ctx();
        seed_org(&fx, "o1").await;
        seed_user(&fx, "o1", "u1").await;
        seed_group(&fx, "o1", "g1").await;
        fx.commands.add_users_to_group(&ctx, add(&["u1"])).await.unwrap();

        let before = fx.store.len();
        fx.commands
            .remove_users_from_group(
                &ctx,
                RemoveUsersFromGroup {
                    group_id: "g1".into(),
                    organization_id: "o1".into(),
                    user_ids: ids(&["u1", "u9"]),
                },
            )
            .await
            .unwrap();
        assert_eq!(fx.store.len(), before + 1);
    }

    #[tokio::test]
    async fn memberships_follow_the_user_across_groups() {
        let fx = fixture();
        let ctx = fx.ctx();
        seed_org(&fx, "o1").await;
        seed_user(&fx, "o1", "u1").await;
        seed_user(&fx, "o1", "u2").await;
        seed_group(&fx, "o1", "g1").await;
        seed_group(&fx, "o1", "g2").await;
        fx.commands.add_users_to_group(&ctx, add(&["u1", "u2"])).await.unwrap();
        fx.commands
            .add_users_to_group(
                &ctx,
                AddUsersToGroup {
                    group_id: "g2".into(),
                    ..add(&["u1"])
                },
            )
            .await
            .unwrap();

        let mut memberships = GroupMembershipsOfUser::new("u1", ctx.instance_id());
        fx.commands.load(&ctx, &mut memberships).await.unwrap();
        let groups: Vec<_> = memberships.groups().map(|g| g.id.as_str()).collect();
        assert_eq!(groups, ["g1", "g2"]);

        fx.commands.remove_user(&ctx, "o1", "u1").await.unwrap();

        let mut memberships = GroupMembershipsOfUser::new("u1", ctx.instance_id());
        fx.commands.load(&ctx, &mut memberships).await.unwrap();
        assert_eq!(memberships.groups().count(), 0);

        let mut g1 = GroupMembersWriteModel::new("g1", "o1", ctx.instance_id());
        fx.commands.load(&ctx, &mut g1).await.unwrap();
        assert_eq!(g1.members, ["u2".to_string()].into());
    }
}
