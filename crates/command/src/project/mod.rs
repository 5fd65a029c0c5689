//! Projects and their roles.

mod role;

use keyward_auth::permissions::names;
use keyward_core::{Context, DomainError, ObjectDetails};
use keyward_domain::project::{
    self, ProjectAdded, ProjectChanged, ProjectDeactivated, ProjectReactivated, ProjectRemoved,
};
use keyward_domain::{ProjectEvent, ProjectState};
use keyward_events::CodecError;
use keyward_infra::event_store::{AggregateFilter, SearchQuery, StoredEvent};

use crate::commands::Commands;
use crate::engine::event;
use crate::error::CommandResult;
use crate::existence::OrgExistence;
use crate::write_model::{WriteModel, WriteModelBase};

pub use role::{BulkRolesResult, ProjectRole, ProjectRoleWriteModel, ProjectRolesWriteModel};

pub(crate) const LIFECYCLE_EVENT_TYPES: &[&str] = &[
    project::PROJECT_ADDED,
    project::PROJECT_DEACTIVATED,
    project::PROJECT_REACTIVATED,
    project::PROJECT_REMOVED,
];

/// Project state after a lifecycle event, if it is one.
pub(crate) fn lifecycle_transition(event: &ProjectEvent) -> Option<ProjectState> {
    match event {
        ProjectEvent::Added(_) | ProjectEvent::Reactivated(_) => Some(ProjectState::Active),
        ProjectEvent::Deactivated(_) => Some(ProjectState::Inactive),
        ProjectEvent::Removed(_) => Some(ProjectState::Removed),
        _ => None,
    }
}

#[derive(Debug, Clone, Default)]
pub struct AddProject {
    pub id: Option<String>,
    pub name: String,
    pub role_assertion: bool,
    pub role_check: bool,
}

#[derive(Debug, Clone, Default)]
pub struct ChangeProject {
    pub name: Option<String>,
    pub role_assertion: Option<bool>,
    pub role_check: Option<bool>,
}

#[derive(Debug, Clone)]
pub struct ProjectWriteModel {
    base: WriteModelBase,
    pub name: String,
    pub role_assertion: bool,
    pub role_check: bool,
    pub state: ProjectState,
}

impl ProjectWriteModel {
    pub fn new(project_id: &str, resource_owner: &str, instance_id: &str) -> Self {
        Self {
            base: WriteModelBase::new(project_id, resource_owner, instance_id),
            name: String::new(),
            role_assertion: false,
            role_check: false,
            state: ProjectState::Unspecified,
        }
    }

    fn exists_for(&self, owner: &str) -> bool {
        self.state.exists() && self.base.is_owned_by(owner)
    }
}

impl WriteModel for ProjectWriteModel {
    fn base(&self) -> &WriteModelBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut WriteModelBase {
        &mut self.base
    }

    fn query(&self) -> SearchQuery {
        SearchQuery::new(&self.base.instance_id).filter(
            AggregateFilter::new(project::AGGREGATE_TYPE)
                .aggregate_id(&self.base.aggregate_id)
                .event_types(LIFECYCLE_EVENT_TYPES)
                .event_types(&[project::PROJECT_CHANGED]),
        )
    }

    fn apply(&mut self, event: &StoredEvent) -> Result<(), CodecError> {
        let Some(e) = event.decode::<ProjectEvent>()? else {
            return Ok(());
        };
        if let Some(state) = lifecycle_transition(&e) {
            self.state = state;
        }
        match e {
            ProjectEvent::Added(e) => {
                self.name = e.name;
                self.role_assertion = e.role_assertion;
                self.role_check = e.role_check;
            }
            ProjectEvent::Changed(e) => {
                if let Some(name) = e.name {
                    self.name = name;
                }
                if let Some(v) = e.role_assertion {
                    self.role_assertion = v;
                }
                if let Some(v) = e.role_check {
                    self.role_check = v;
                }
            }
            _ => {}
        }
        Ok(())
    }
}

pub(crate) fn project_not_found() -> DomainError {
    DomainError::not_found("PROJECT-0004", "errors.project.not_found")
}

fn project_name(name: &str) -> CommandResult<String> {
    let name = name.trim();
    if name.is_empty() {
        return Err(DomainError::invalid_argument("PROJECT-0001", "errors.project.name_missing").into());
    }
    Ok(name.to_string())
}

impl Commands {
    pub async fn add_project(&self, ctx: &Context, owner: &str, input: AddProject) -> CommandResult<ObjectDetails> {
        let name = project_name(&input.name)?;
        let project_id = self.id_or_next(input.id.as_deref())?;
        self.check_permission(ctx, names::PROJECT_WRITE, owner, &project_id).await?;

        let mut org = OrgExistence::new(owner, ctx.instance_id());
        self.load(ctx, &mut org).await?;
        if !org.is_active() {
            return Err(DomainError::precondition_failed("PROJECT-0002", "errors.project.org_not_active").into());
        }

        let mut wm = ProjectWriteModel::new(&project_id, owner, ctx.instance_id());
        self.load(ctx, &mut wm).await?;
        if wm.state != ProjectState::Unspecified {
            return Err(DomainError::already_exists("PROJECT-0003", "errors.project.already_exists").into());
        }
        let added = event(
            ctx,
            &wm.base().aggregate(project::AGGREGATE_TYPE),
            &ProjectEvent::Added(ProjectAdded {
                name,
                role_assertion: input.role_assertion,
                role_check: input.role_check,
            }),
        )?;
        self.commit_with(ctx, &mut wm, vec![added], vec![org.guard()]).await?;
        Ok(wm.details())
    }

    pub async fn change_project(
        &self,
        ctx: &Context,
        owner: &str,
        project_id: &str,
        input: ChangeProject,
    ) -> CommandResult<ObjectDetails> {
        let name = input.name.as_deref().map(project_name).transpose()?;
        self.check_permission(ctx, names::PROJECT_WRITE, owner, project_id).await?;

        let mut wm = ProjectWriteModel::new(project_id, owner, ctx.instance_id());
        self.execute(ctx, &mut wm, |wm| {
            if !wm.exists_for(owner) {
                return Err(project_not_found().into());
            }
            let changed = ProjectChanged {
                name: name.filter(|n| *n != wm.name),
                role_assertion: input.role_assertion.filter(|v| *v != wm.role_assertion),
                role_check: input.role_check.filter(|v| *v != wm.role_check),
            };
            if changed.is_empty() {
                return Err(DomainError::precondition_failed("PROJECT-0005", "errors.project.not_changed").into());
            }
            Ok(vec![event(
                ctx,
                &wm.base().aggregate(project::AGGREGATE_TYPE),
                &ProjectEvent::Changed(changed),
            )?])
        })
        .await
    }

    #[allow(clippy::too_many_arguments)]
    async fn transition_project(
        &self,
        ctx: &Context,
        owner: &str,
        project_id: &str,
        permission: &str,
        from: ProjectState,
        refused: DomainError,
        transition: impl FnOnce(&ProjectWriteModel) -> ProjectEvent + Send,
    ) -> CommandResult<ObjectDetails> {
        self.check_permission(ctx, permission, owner, project_id).await?;

        let mut wm = ProjectWriteModel::new(project_id, owner, ctx.instance_id());
        self.execute(ctx, &mut wm, |wm| {
            if !wm.exists_for(owner) {
                return Err(project_not_found().into());
            }
            if from != ProjectState::Unspecified && wm.state != from {
                return Err(refused.into());
            }
            Ok(vec![event(
                ctx,
                &wm.base().aggregate(project::AGGREGATE_TYPE),
                &transition(wm),
            )?])
        })
        .await
    }

    pub async fn deactivate_project(&self, ctx: &Context, owner: &str, project_id: &str) -> CommandResult<ObjectDetails> {
        self.transition_project(
            ctx,
            owner,
            project_id,
            names::PROJECT_WRITE,
            ProjectState::Active,
            DomainError::precondition_failed("PROJECT-0006", "errors.project.not_active"),
            |_| ProjectEvent::Deactivated(ProjectDeactivated {}),
        )
        .await
    }

    pub async fn reactivate_project(&self, ctx: &Context, owner: &str, project_id: &str) -> CommandResult<ObjectDetails> {
        self.transition_project(
            ctx,
            owner,
            project_id,
            names::PROJECT_WRITE,
            ProjectState::Inactive,
            DomainError::precondition_failed("PROJECT-0007", "errors.project.not_inactive"),
            |_| ProjectEvent::Reactivated(ProjectReactivated {}),
        )
        .await
    }

    /// Remove from any existing state.
    pub async fn remove_project(&self, ctx: &Context, owner: &str, project_id: &str) -> CommandResult<ObjectDetails> {
        self.transition_project(
            ctx,
            owner,
            project_id,
            names::PROJECT_DELETE,
            ProjectState::Unspecified,
            project_not_found(),
            |wm| ProjectEvent::Removed(ProjectRemoved { name: wm.name.clone() }),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use keyward_core::ErrorKind;

    use super::*;
    use crate::test_support::{fixture, seed_org};

    fn add(id: &str) -> AddProject {
        AddProject {
            id: Some(id.to_string()),
            name: "Portal".to_string(),
            ..AddProject::default()
        }
    }

    #[tokio::test]
    async fn add_requires_active_org() {
        let fx = fixture();
        let ctx = fx.ctx();
        let err = fx.commands.add_project(&ctx, "o1", add("p1")).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PreconditionFailed);

        seed_org(&fx, "o1").await;
        let details = fx.commands.add_project(&ctx, "o1", add("p1")).await.unwrap();
        assert_eq!(details.id, "p1");

        let err = fx.commands.add_project(&ctx, "o1", add("p1")).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AlreadyExists);
    }

    #[tokio::test]
    async fn change_needs_a_difference() {
        let fx = fixture();
        let ctx = fx.ctx();
        seed_org(&fx, "o1").await;
        fx.commands.add_project(&ctx, "o1", add("p1")).await.unwrap();

        let err = fx
            .commands
            .change_project(
                &ctx,
                "o1",
                "p1",
                ChangeProject {
                    name: Some("Portal".into()),
                    role_check: Some(false),
                    ..ChangeProject::default()
                },
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PreconditionFailed);

        let details = fx
            .commands
            .change_project(
                &ctx,
                "o1",
                "p1",
                ChangeProject {
                    role_check: Some(true),
                    ..ChangeProject::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(details.sequence, 2);
    }

    #[tokio::test]
    async fn lifecycle_is_strict() {
        let fx = fixture();
        let ctx = fx.ctx();
        seed_org(&fx, "o1").await;
        fx.commands.add_project(&ctx, "o1", add("p1")).await.unwrap();

        let err = fx.commands.reactivate_project(&ctx, "o1", "p1").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PreconditionFailed);
        fx.commands.deactivate_project(&ctx, "o1", "p1").await.unwrap();
        let err = fx.commands.deactivate_project(&ctx, "o1", "p1").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PreconditionFailed);

        fx.commands.remove_project(&ctx, "o1", "p1").await.unwrap();
        let err = fx.commands.remove_project(&ctx, "o1", "p1").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }
}
