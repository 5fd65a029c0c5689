use std::collections::{BTreeMap, BTreeSet};

use keyward_auth::permissions::names;
use keyward_core::{Context, DomainError, ObjectDetails};
use keyward_domain::project::{self, RoleAdded, RoleChanged, RoleRemoved};
use keyward_domain::{ProjectEvent, ProjectRoleState, ProjectState};
use keyward_events::CodecError;
use keyward_infra::event_store::{AggregateFilter, SearchQuery, StoredEvent};

use super::{lifecycle_transition, LIFECYCLE_EVENT_TYPES};
use crate::commands::Commands;
use crate::engine::event;
use crate::error::CommandResult;
use crate::write_model::{WriteModel, WriteModelBase};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProjectRole {
    pub key: String,
    pub display_name: String,
    pub group: String,
}

impl ProjectRole {
    pub fn new(key: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            display_name: display_name.into(),
            group: String::new(),
        }
    }

    fn validate(&self) -> CommandResult<()> {
        if self.key.trim().is_empty() {
            return Err(DomainError::invalid_argument("PROJECT-0010", "errors.project.role.key_missing").into());
        }
        if self.display_name.trim().is_empty() {
            return Err(DomainError::invalid_argument("PROJECT-0011", "errors.project.role.display_name_missing").into());
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct BulkRolesResult {
    pub details: ObjectDetails,
    /// Keys that were invalid or already present.
    pub failed_keys: Vec<String>,
}

fn roles_query(instance_id: &str, project_id: &str) -> SearchQuery {
    SearchQuery::new(instance_id).filter(
        AggregateFilter::new(project::AGGREGATE_TYPE)
            .aggregate_id(project_id)
            .event_types(LIFECYCLE_EVENT_TYPES)
            .event_types(project::ROLE_EVENT_TYPES),
    )
}

// ─────────────────────────────────────────────────────────────────────────────
// Write models
// ─────────────────────────────────────────────────────────────────────────────

/// One role of a project, plus the project's own lifecycle.
#[derive(Debug, Clone)]
pub struct ProjectRoleWriteModel {
    base: WriteModelBase,
    pub key: String,
    pub display_name: String,
    pub group: String,
    pub state: ProjectRoleState,
    pub project_state: ProjectState,
}

impl ProjectRoleWriteModel {
    pub fn new(project_id: &str, key: &str, resource_owner: &str, instance_id: &str) -> Self {
        Self {
            base: WriteModelBase::new(project_id, resource_owner, instance_id),
            key: key.to_string(),
            display_name: String::new(),
            group: String::new(),
            state: ProjectRoleState::Unspecified,
            project_state: ProjectState::Unspecified,
        }
    }
}

impl WriteModel for ProjectRoleWriteModel {
    fn base(&self) -> &WriteModelBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut WriteModelBase {
        &mut self.base
    }

    fn query(&self) -> SearchQuery {
        roles_query(&self.base.instance_id, &self.base.aggregate_id)
    }

    fn accepts(&self, event: &StoredEvent) -> bool {
        match event.decode::<ProjectEvent>() {
            Ok(Some(e)) => e.role_key().is_none_or(|key| key == self.key),
            Ok(_) => false,
            // Let reduce surface the decoding failure.
            Err(_) => true,
        }
    }

    fn apply(&mut self, event: &StoredEvent) -> Result<(), CodecError> {
        let Some(e) = event.decode::<ProjectEvent>()? else {
            return Ok(());
        };
        if let Some(state) = lifecycle_transition(&e) {
            self.project_state = state;
            if state == ProjectState::Removed {
                self.state = ProjectRoleState::Removed;
            }
        }
        match e {
            ProjectEvent::RoleAdded(e) => {
                self.display_name = e.display_name;
                self.group = e.group;
                self.state = ProjectRoleState::Active;
            }
            ProjectEvent::RoleChanged(e) => {
                if let Some(v) = e.display_name {
                    self.display_name = v;
                }
                if let Some(v) = e.group {
                    self.group = v;
                }
            }
            ProjectEvent::RoleRemoved(_) => self.state = ProjectRoleState::Removed,
            _ => {}
        }
        Ok(())
    }
}

/// All roles of a project, for bulk operations.
#[derive(Debug, Clone)]
pub struct ProjectRolesWriteModel {
    base: WriteModelBase,
    pub roles: BTreeMap<String, ProjectRole>,
    pub project_state: ProjectState,
}

impl ProjectRolesWriteModel {
    pub fn new(project_id: &str, resource_owner: &str, instance_id: &str) -> Self {
        Self {
            base: WriteModelBase::new(project_id, resource_owner, instance_id),
            roles: BTreeMap::new(),
            project_state: ProjectState::Unspecified,
        }
    }
}

impl WriteModel for ProjectRolesWriteModel {
    fn base(&self) -> &WriteModelBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut WriteModelBase {
        &mut self.base
    }

    fn query(&self) -> SearchQuery {
        roles_query(&self.base.instance_id, &self.base.aggregate_id)
    }

    fn apply(&mut self, event: &StoredEvent) -> Result<(), CodecError> {
        let Some(e) = event.decode::<ProjectEvent>()? else {
            return Ok(());
        };
        if let Some(state) = lifecycle_transition(&e) {
            self.project_state = state;
            if state == ProjectState::Removed {
                self.roles.clear();
            }
        }
        match e {
            ProjectEvent::RoleAdded(e) => {
                self.roles.insert(
                    e.key.clone(),
                    ProjectRole {
                        key: e.key,
                        display_name: e.display_name,
                        group: e.group,
                    },
                );
            }
            ProjectEvent::RoleChanged(e) => {
                if let Some(role) = self.roles.get_mut(&e.key) {
                    if let Some(v) = e.display_name {
                        role.display_name = v;
                    }
                    if let Some(v) = e.group {
                        role.group = v;
                    }
                }
            }
            ProjectEvent::RoleRemoved(e) => {
                self.roles.remove(&e.key);
            }
            _ => {}
        }
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Commands
// ─────────────────────────────────────────────────────────────────────────────

fn project_missing() -> DomainError {
    DomainError::precondition_failed("PROJECT-0012", "errors.project.role.project_not_found")
}

fn role_not_found() -> DomainError {
    DomainError::not_found("PROJECT-0014", "errors.project.role.not_found")
}

impl Commands {
    pub async fn add_project_role(
        &self,
        ctx: &Context,
        owner: &str,
        project_id: &str,
        role: ProjectRole,
    ) -> CommandResult<ObjectDetails> {
        role.validate()?;
        self.check_permission(ctx, names::PROJECT_ROLE_WRITE, owner, project_id).await?;

        let mut wm = ProjectRoleWriteModel::new(project_id, role.key.trim(), owner, ctx.instance_id());
        self.execute(ctx, &mut wm, |wm| {
            if !wm.project_state.exists() || !wm.base().is_owned_by(owner) {
                return Err(project_missing().into());
            }
            if wm.state.exists() {
                return Err(DomainError::already_exists("PROJECT-0013", "errors.project.role.already_exists").into());
            }
            Ok(vec![event(
                ctx,
                &wm.base().aggregate(project::AGGREGATE_TYPE),
                &ProjectEvent::RoleAdded(RoleAdded {
                    key: wm.key.clone(),
                    display_name: role.display_name.trim().to_string(),
                    group: role.group.trim().to_string(),
                }),
            )?])
        })
        .await
    }

    /// Add many roles in one push; invalid or existing keys land in
    /// `failed_keys`.
    pub async fn bulk_add_project_roles(
        &self,
        ctx: &Context,
        owner: &str,
        project_id: &str,
        roles: Vec<ProjectRole>,
    ) -> CommandResult<BulkRolesResult> {
        if roles.is_empty() {
            return Err(DomainError::invalid_argument("PROJECT-0016", "errors.project.role.empty").into());
        }
        self.check_permission(ctx, names::PROJECT_ROLE_WRITE, owner, project_id).await?;

        let mut wm = ProjectRolesWriteModel::new(project_id, owner, ctx.instance_id());
        self.load(ctx, &mut wm).await?;
        if !wm.project_state.exists() || !wm.base().is_owned_by(owner) {
            return Err(project_missing().into());
        }

        let aggregate = wm.base().aggregate(project::AGGREGATE_TYPE);
        let mut added = BTreeSet::new();
        let mut failed_keys = Vec::new();
        let mut events = Vec::new();
        for role in roles {
            let key = role.key.trim().to_string();
            if role.validate().is_err() || wm.roles.contains_key(&key) || !added.insert(key.clone()) {
                failed_keys.push(role.key);
                continue;
            }
            events.push(event(
                ctx,
                &aggregate,
                &ProjectEvent::RoleAdded(RoleAdded {
                    key,
                    display_name: role.display_name.trim().to_string(),
                    group: role.group.trim().to_string(),
                }),
            )?);
        }

        self.commit(ctx, &mut wm, events).await?;
        Ok(BulkRolesResult {
            details: wm.details(),
            failed_keys,
        })
    }

    pub async fn change_project_role(
        &self,
        ctx: &Context,
        owner: &str,
        project_id: &str,
        role: ProjectRole,
    ) -> CommandResult<ObjectDetails> {
        role.validate()?;
        self.check_permission(ctx, names::PROJECT_ROLE_WRITE, owner, project_id).await?;

        let mut wm = ProjectRoleWriteModel::new(project_id, role.key.trim(), owner, ctx.instance_id());
        self.execute(ctx, &mut wm, |wm| {
            if !wm.project_state.exists() || !wm.base().is_owned_by(owner) {
                return Err(project_missing().into());
            }
            if !wm.state.exists() {
                return Err(role_not_found().into());
            }
            let display_name = role.display_name.trim();
            let group = role.group.trim();
            let changed = RoleChanged {
                key: wm.key.clone(),
                display_name: (display_name != wm.display_name).then(|| display_name.to_string()),
                group: (group != wm.group).then(|| group.to_string()),
            };
            if changed.display_name.is_none() && changed.group.is_none() {
                return Err(DomainError::precondition_failed("PROJECT-0015", "errors.project.role.not_changed").into());
            }
            Ok(vec![event(
                ctx,
                &wm.base().aggregate(project::AGGREGATE_TYPE),
                &ProjectEvent::RoleChanged(changed),
            )?])
        })
        .await
    }

    pub async fn remove_project_role(
        &self,
        ctx: &Context,
        owner: &str,
        project_id: &str,
        key: &str,
    ) -> CommandResult<ObjectDetails> {
        self.check_permission(ctx, names::PROJECT_ROLE_DELETE, owner, project_id).await?;

        let mut wm = ProjectRoleWriteModel::new(project_id, key.trim(), owner, ctx.instance_id());
        self.execute(ctx, &mut wm, |wm| {
            if !wm.state.exists() || !wm.base().is_owned_by(owner) {
                return Err(role_not_found().into());
            }
            Ok(vec![event(
                ctx,
                &wm.base().aggregate(project::AGGREGATE_TYPE),
                &ProjectEvent::RoleRemoved(RoleRemoved { key: wm.key.clone() }),
            )?])
        })
        .await
    }
}
