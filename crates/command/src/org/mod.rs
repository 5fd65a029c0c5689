//! Organization commands.

mod domain;
mod policy;

use std::collections::BTreeMap;

use keyward_auth::permissions::names;
use keyward_core::{AggregateRef, Context, DomainError, ObjectDetails};
use keyward_domain::org::{
    self, generated_domain, DomainAdded, DomainPrimarySet, DomainRemoved, DomainVerified, OrgAdded, OrgChanged,
    OrgDeactivated, OrgReactivated, OrgRemoved,
};
use keyward_domain::{OrgEvent, OrgState};
use keyward_events::CodecError;
use keyward_infra::event_store::{AggregateFilter, SearchQuery, StoredEvent};

use crate::commands::Commands;
use crate::engine::event;
use crate::error::CommandResult;
use crate::write_model::{WriteModel, WriteModelBase};

pub use domain::{DomainValidation, OrgDomainWriteModel};
pub use policy::PasswordComplexityPolicyWriteModel;

#[derive(Debug, Clone, Default)]
pub struct AddOrg {
    /// Explicit id; generated when absent.
    pub id: Option<String>,
    pub name: String,
}

// ─────────────────────────────────────────────────────────────────────────────
// Write model
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct OrgWriteModel {
    base: WriteModelBase,
    pub name: String,
    pub state: OrgState,
    pub primary_domain: String,
    /// Active domains and whether each is verified.
    pub domains: BTreeMap<String, bool>,
}

impl OrgWriteModel {
    /// An organization owns itself.
    pub fn new(org_id: &str, instance_id: &str) -> Self {
        Self {
            base: WriteModelBase::new(org_id, org_id, instance_id),
            name: String::new(),
            state: OrgState::Unspecified,
            primary_domain: String::new(),
            domains: BTreeMap::new(),
        }
    }

    fn aggregate(&self) -> AggregateRef {
        self.base.aggregate(org::AGGREGATE_TYPE)
    }
}

impl WriteModel for OrgWriteModel {
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
                    org::ORG_ADDED,
                    org::ORG_CHANGED,
                    org::ORG_DEACTIVATED,
                    org::ORG_REACTIVATED,
                    org::ORG_REMOVED,
                    org::DOMAIN_ADDED,
                    org::DOMAIN_VERIFIED,
                    org::DOMAIN_PRIMARY_SET,
                    org::DOMAIN_REMOVED,
                ]),
        )
    }

    fn apply(&mut self, event: &StoredEvent) -> Result<(), CodecError> {
        match event.decode::<OrgEvent>()? {
            Some(OrgEvent::Added(e)) => {
                self.name = e.name;
                self.state = OrgState::Active;
            }
            Some(OrgEvent::Changed(e)) => self.name = e.name,
            Some(OrgEvent::Deactivated(_)) => self.state = OrgState::Inactive,
            Some(OrgEvent::Reactivated(_)) => self.state = OrgState::Active,
            Some(OrgEvent::Removed(_)) => self.state = OrgState::Removed,
            Some(OrgEvent::DomainAdded(e)) => {
                self.domains.insert(e.domain, false);
            }
            Some(OrgEvent::DomainVerified(e)) => {
                if let Some(verified) = self.domains.get_mut(&e.domain) {
                    *verified = true;
                }
            }
            Some(OrgEvent::DomainPrimarySet(e)) => self.primary_domain = e.domain,
            Some(OrgEvent::DomainRemoved(e)) => {
                self.domains.remove(&e.domain);
            }
            // Verification attempts are folded by the domain model.
            Some(_) | None => {}
        }
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Commands
// ─────────────────────────────────────────────────────────────────────────────

fn validated_name(name: &str) -> CommandResult<String> {
    let name = name.trim();
    if name.is_empty() {
        return Err(DomainError::invalid_argument("ORG-0001", "errors.org.name_invalid").into());
    }
    Ok(name.to_string())
}

fn not_found() -> DomainError {
    DomainError::not_found("ORG-0003", "errors.org.not_found")
}

impl Commands {
    /// Create an organization with its generated, verified primary domain.
    pub async fn add_org(&self, ctx: &Context, input: AddOrg) -> CommandResult<ObjectDetails> {
        let name = validated_name(&input.name)?;
        let org_id = self.id_or_next(input.id.as_deref())?;
        self.check_permission(ctx, names::ORG_CREATE, ctx.instance_id(), &org_id)
            .await?;

        let mut wm = OrgWriteModel::new(&org_id, ctx.instance_id());
        let domain = generated_domain(&name, &org_id, &self.config.default_domain);
        self.execute(ctx, &mut wm, |wm| {
            if wm.state != OrgState::Unspecified {
                return Err(DomainError::already_exists("ORG-0002", "errors.org.already_exists").into());
            }
            let aggregate = wm.aggregate();
            Ok(vec![
                event(ctx, &aggregate, &OrgEvent::Added(OrgAdded { name }))?,
                event(ctx, &aggregate, &OrgEvent::DomainAdded(DomainAdded { domain: domain.clone() }))?,
                event(ctx, &aggregate, &OrgEvent::DomainVerified(DomainVerified { domain: domain.clone() }))?,
                event(ctx, &aggregate, &OrgEvent::DomainPrimarySet(DomainPrimarySet { domain }))?,
            ])
        })
        .await
    }

    /// Rename an organization.
    ///
    /// While the domain generated from the old name is still active it is
    /// replaced by the one generated from the new name: added and verified
    /// (or only verified when it already exists as a custom domain), made
    /// primary if the old one was, and the old one removed.
    pub async fn change_org(&self, ctx: &Context, org_id: &str, name: &str) -> CommandResult<ObjectDetails> {
        let name = validated_name(name)?;
        self.check_permission(ctx, names::ORG_WRITE, org_id, org_id).await?;

        let mut wm = OrgWriteModel::new(org_id, ctx.instance_id());
        let suffix = self.config.default_domain.clone();
        self.execute(ctx, &mut wm, |wm| {
            if !wm.state.exists() {
                return Err(not_found().into());
            }
            if wm.name == name {
                return Err(DomainError::precondition_failed("ORG-0004", "errors.org.not_changed").into());
            }

            let aggregate = wm.aggregate();
            let old_domain = generated_domain(&wm.name, org_id, &suffix);
            let new_domain = generated_domain(&name, org_id, &suffix);
            let mut events = vec![event(ctx, &aggregate, &OrgEvent::Changed(OrgChanged { name }))?];
            if old_domain == new_domain {
                return Ok(events);
            }
            let Some(&old_verified) = wm.domains.get(&old_domain) else {
                return Ok(events);
            };

            match wm.domains.get(&new_domain) {
                None => {
                    events.push(event(ctx, &aggregate, &OrgEvent::DomainAdded(DomainAdded { domain: new_domain.clone() }))?);
                    events.push(event(
                        ctx,
                        &aggregate,
                        &OrgEvent::DomainVerified(DomainVerified { domain: new_domain.clone() }),
                    )?);
                }
                Some(false) => events.push(event(
                    ctx,
                    &aggregate,
                    &OrgEvent::DomainVerified(DomainVerified { domain: new_domain.clone() }),
                )?),
                Some(true) => {}
            }
            if wm.primary_domain == old_domain {
                events.push(event(ctx, &aggregate, &OrgEvent::DomainPrimarySet(DomainPrimarySet { domain: new_domain }))?);
            }
            events.push(event(
                ctx,
                &aggregate,
                &OrgEvent::DomainRemoved(DomainRemoved {
                    domain: old_domain,
                    was_verified: old_verified,
                }),
            )?);
            Ok(events)
        })
        .await
    }

    pub async fn deactivate_org(&self, ctx: &Context, org_id: &str) -> CommandResult<ObjectDetails> {
        self.check_permission(ctx, names::ORG_WRITE, org_id, org_id).await?;

        let mut wm = OrgWriteModel::new(org_id, ctx.instance_id());
        self.execute(ctx, &mut wm, |wm| {
            match wm.state {
                OrgState::Active => {}
                OrgState::Inactive => {
                    return Err(DomainError::precondition_failed("ORG-0005", "errors.org.not_active").into());
                }
                OrgState::Unspecified | OrgState::Removed => return Err(not_found().into()),
            }
            Ok(vec![event(ctx, &wm.aggregate(), &OrgEvent::Deactivated(OrgDeactivated {}))?])
        })
        .await
    }

    pub async fn reactivate_org(&self, ctx: &Context, org_id: &str) -> CommandResult<ObjectDetails> {
        self.check_permission(ctx, names::ORG_WRITE, org_id, org_id).await?;

        let mut wm = OrgWriteModel::new(org_id, ctx.instance_id());
        self.execute(ctx, &mut wm, |wm| {
            match wm.state {
                OrgState::Inactive => {}
                OrgState::Active => {
                    return Err(DomainError::precondition_failed("ORG-0006", "errors.org.not_inactive").into());
                }
                OrgState::Unspecified | OrgState::Removed => return Err(not_found().into()),
            }
            Ok(vec![event(ctx, &wm.aggregate(), &OrgEvent::Reactivated(OrgReactivated {}))?])
        })
        .await
    }

    pub async fn remove_org(&self, ctx: &Context, org_id: &str) -> CommandResult<ObjectDetails> {
        self.check_permission(ctx, names::ORG_DELETE, org_id, org_id).await?;

        let mut wm = OrgWriteModel::new(org_id, ctx.instance_id());
        self.execute(ctx, &mut wm, |wm| {
            if !wm.state.exists() {
                return Err(not_found().into());
            }
            Ok(vec![event(
                ctx,
                &wm.aggregate(),
                &OrgEvent::Removed(OrgRemoved { name: wm.name.clone() }),
            )?])
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use keyward_core::ErrorKind;

    use super::*;
    use crate::test_support::{fixture, FixedCodeGenerator};

    fn add(name: &str) -> AddOrg {
        AddOrg {
            id: Some("o1".into()),
            name: name.into(),
        }
    }

    #[tokio::test]
    async fn add_org_sets_generated_primary_domain() {
        let fx = fixture();
        let ctx = fx.ctx();

        let details = fx.commands.add_org(&ctx, add("ACME Corp")).await.unwrap();
        assert_eq!(details.id, "o1");
        assert_eq!(details.resource_owner, "o1");
        assert_eq!(details.sequence, 4);

        let mut wm = OrgWriteModel::new("o1", ctx.instance_id());
        fx.commands.load(&ctx, &mut wm).await.unwrap();
        assert_eq!(wm.name, "ACME Corp");
        assert_eq!(wm.primary_domain, "acme-corp.keyward.localhost");
        assert_eq!(wm.state, OrgState::Active);
    }

    #[tokio::test]
    async fn add_org_rejects_blank_name_and_duplicates() {
        let fx = fixture();
        let ctx = fx.ctx();

        let err = fx.commands.add_org(&ctx, add("  ")).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
        assert!(fx.store.is_empty());

        fx.commands.add_org(&ctx, add("ACME")).await.unwrap();
        let err = fx.commands.add_org(&ctx, add("Other")).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AlreadyExists);
    }

    #[tokio::test]
    async fn add_org_generates_an_id() {
        let fx = fixture();
        let ctx = fx.ctx();
        let details = fx
            .commands
            .add_org(&ctx, AddOrg { id: None, name: "ACME".into() })
            .await
            .unwrap();
        assert_eq!(details.id, "id1");
    }

    #[tokio::test]
    async fn change_org_moves_the_generated_domain() {
        let fx = fixture();
        let ctx = fx.ctx();
        fx.commands.add_org(&ctx, add("ACME")).await.unwrap();

        fx.commands.change_org(&ctx, "o1", "Globex").await.unwrap();

        let mut wm = OrgWriteModel::new("o1", ctx.instance_id());
        fx.commands.load(&ctx, &mut wm).await.unwrap();
        assert_eq!(wm.name, "Globex");
        assert_eq!(wm.primary_domain, "globex.keyward.localhost");
        assert!(!wm.domains.contains_key("acme.keyward.localhost"));
        assert_eq!(wm.domains.get("globex.keyward.localhost"), Some(&true));
    }

    #[tokio::test]
    async fn change_org_verifies_a_custom_domain_it_promotes() {
        let fx = fixture();
        let ctx = fx.ctx();
        fx.commands.add_org(&ctx, add("Acme")).await.unwrap();
        fx.commands
            .add_org_domain(&ctx, "o1", "beta.keyward.localhost")
            .await
            .unwrap();

        fx.commands.change_org(&ctx, "o1", "Beta").await.unwrap();

        let mut domain = OrgDomainWriteModel::new("o1", "beta.keyward.localhost", ctx.instance_id());
        fx.commands.load(&ctx, &mut domain).await.unwrap();
        assert!(domain.primary);
        assert!(domain.verified);

        let added = fx
            .store
            .events()
            .iter()
            .filter(|e| e.event_type == org::DOMAIN_ADDED)
            .count();
        assert_eq!(added, 2);
    }

    #[tokio::test]
    async fn change_org_replaces_the_generated_domain_even_when_not_primary() {
        let fx = fixture();
        let commands = fx
            .commands
            .clone()
            .with_code_generator(Arc::new(FixedCodeGenerator::new("TOKEN", Duration::from_secs(60))));
        let ctx = fx.ctx();
        commands.add_org(&ctx, add("Acme")).await.unwrap();
        commands.add_org_domain(&ctx, "o1", "acme.test").await.unwrap();
        commands.generate_org_domain_validation(&ctx, "o1", "acme.test").await.unwrap();
        commands.validate_org_domain(&ctx, "o1", "acme.test", "TOKEN").await.unwrap();
        commands.set_primary_org_domain(&ctx, "o1", "acme.test").await.unwrap();

        commands.change_org(&ctx, "o1", "Globex").await.unwrap();

        let mut wm = OrgWriteModel::new("o1", ctx.instance_id());
        commands.load(&ctx, &mut wm).await.unwrap();
        assert_eq!(wm.primary_domain, "acme.test");
        assert!(!wm.domains.contains_key("acme.keyward.localhost"));
        assert_eq!(wm.domains.get("globex.keyward.localhost"), Some(&true));
    }

    #[tokio::test]
    async fn change_org_leaves_domains_alone_once_the_generated_one_is_gone() {
        let fx = fixture();
        let commands = fx
            .commands
            .clone()
            .with_code_generator(Arc::new(FixedCodeGenerator::new("TOKEN", Duration::from_secs(60))));
        let ctx = fx.ctx();
        commands.add_org(&ctx, add("Acme")).await.unwrap();
        commands.add_org_domain(&ctx, "o1", "acme.test").await.unwrap();
        commands.generate_org_domain_validation(&ctx, "o1", "acme.test").await.unwrap();
        commands.validate_org_domain(&ctx, "o1", "acme.test", "TOKEN").await.unwrap();
        commands.set_primary_org_domain(&ctx, "o1", "acme.test").await.unwrap();
        commands.remove_org_domain(&ctx, "o1", "acme.keyward.localhost").await.unwrap();
        let before = fx.store.len();

        commands.change_org(&ctx, "o1", "Globex").await.unwrap();

        assert_eq!(fx.store.len(), before + 1);
        let mut wm = OrgWriteModel::new("o1", ctx.instance_id());
        commands.load(&ctx, &mut wm).await.unwrap();
        assert_eq!(wm.name, "Globex");
        assert_eq!(wm.domains.keys().collect::<Vec<_>>(), ["acme.test"]);
    }

    #[tokio::test]
    async fn change_org_without_change_is_precondition_failed() {
        let fx = fixture();
        let ctx = fx.ctx();
        fx.commands.add_org(&ctx, add("ACME")).await.unwrap();
        let before = fx.store.len();

        let err = fx.commands.change_org(&ctx, "o1", " ACME ").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PreconditionFailed);
        assert_eq!(fx.store.len(), before);

        let err = fx.commands.change_org(&ctx, "missing", "x").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn lifecycle_transitions_are_strict() {
        let fx = fixture();
        let ctx = fx.ctx();
        fx.commands.add_org(&ctx, add("ACME")).await.unwrap();

        let err = fx.commands.reactivate_org(&ctx, "o1").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PreconditionFailed);

        fx.commands.deactivate_org(&ctx, "o1").await.unwrap();
        let err = fx.commands.deactivate_org(&ctx, "o1").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PreconditionFailed);

        fx.commands.reactivate_org(&ctx, "o1").await.unwrap();
        fx.commands.remove_org(&ctx, "o1").await.unwrap();

        let err = fx.commands.remove_org(&ctx, "o1").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        let err = fx.commands.deactivate_org(&ctx, "o1").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn unauthorized_user_is_denied() {
        let fx = fixture();
        let ctx = fx.ctx_for("stranger");
        let err = fx.commands.add_org(&ctx, add("ACME")).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PermissionDenied);
        assert!(fx.store.is_empty());
    }
}
