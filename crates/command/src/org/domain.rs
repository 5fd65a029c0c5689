//! Organization domains: add, verify by token, make primary, remove.

use chrono::{DateTime, Utc};

use keyward_auth::permissions::names;
use keyward_core::{Context, DomainError, ObjectDetails};
use keyward_domain::org::{
    self, DomainAdded, DomainPrimarySet, DomainRemoved, DomainVerificationAdded, DomainVerificationFailed,
    DomainVerified,
};
use keyward_domain::{CodeKind, CryptoValue, OrgDomainState, OrgEvent};
use keyward_events::CodecError;
use keyward_infra::event_store::{AggregateFilter, SearchQuery, StoredEvent};

use crate::commands::Commands;
use crate::engine::event;
use crate::error::CommandResult;
use crate::existence::OrgExistence;
use crate::write_model::{WriteModel, WriteModelBase};

/// Token issued for proving ownership of a domain.
#[derive(Clone)]
pub struct DomainValidation {
    pub details: ObjectDetails,
    pub token: String,
}

impl core::fmt::Debug for DomainValidation {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("DomainValidation")
            .field("details", &self.details)
            .field("token", &"<redacted>")
            .finish()
    }
}

/// One domain of one organization.
///
/// The org stream carries every domain of the org; the model only folds the
/// events of its own domain, except primary changes which affect all of them.
#[derive(Debug, Clone)]
pub struct OrgDomainWriteModel {
    base: WriteModelBase,
    pub domain: String,
    pub state: OrgDomainState,
    pub verified: bool,
    pub primary: bool,
    pub validation: Option<(CryptoValue, DateTime<Utc>)>,
}

impl OrgDomainWriteModel {
    pub fn new(org_id: &str, domain: &str, instance_id: &str) -> Self {
        Self {
            base: WriteModelBase::new(org_id, org_id, instance_id),
            domain: domain.to_string(),
            state: OrgDomainState::Unspecified,
            verified: false,
            primary: false,
            validation: None,
        }
    }
}

impl WriteModel for OrgDomainWriteModel {
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
                    org::DOMAIN_ADDED,
                    org::DOMAIN_VERIFICATION_ADDED,
                    org::DOMAIN_VERIFICATION_FAILED,
                    org::DOMAIN_VERIFIED,
                    org::DOMAIN_PRIMARY_SET,
                    org::DOMAIN_REMOVED,
                ]),
        )
    }

    fn accepts(&self, event: &StoredEvent) -> bool {
        match event.decode::<OrgEvent>() {
            Ok(Some(OrgEvent::DomainPrimarySet(_))) => true,
            Ok(Some(e)) => e.domain() == Some(self.domain.as_str()),
            Ok(None) => false,
            // Let reduce surface the decoding failure.
            Err(_) => true,
        }
    }

    fn apply(&mut self, event: &StoredEvent) -> Result<(), CodecError> {
        match event.decode::<OrgEvent>()? {
            Some(OrgEvent::DomainAdded(_)) => {
                self.state = OrgDomainState::Active;
                self.verified = false;
            }
            Some(OrgEvent::DomainVerificationAdded(e)) => self.validation = Some((e.code, e.expires_at)),
            Some(OrgEvent::DomainVerified(_)) => {
                self.verified = true;
                self.validation = None;
            }
            Some(OrgEvent::DomainPrimarySet(e)) => self.primary = e.domain == self.domain,
            Some(OrgEvent::DomainRemoved(_)) => {
                self.state = OrgDomainState::Removed;
                self.verified = false;
                self.primary = false;
                self.validation = None;
            }
            Some(OrgEvent::DomainVerificationFailed(_)) | Some(_) | None => {}
        }
        Ok(())
    }
}

fn normalized(domain: &str) -> CommandResult<String> {
    let domain = domain.trim().to_lowercase();
    if domain.is_empty() || domain.contains(char::is_whitespace) {
        return Err(DomainError::invalid_argument("ORG-0010", "errors.org.domain_invalid").into());
    }
    Ok(domain)
}

fn domain_not_found() -> DomainError {
    DomainError::not_found("ORG-0012", "errors.org.domain_not_found")
}

fn already_verified() -> DomainError {
    DomainError::precondition_failed("ORG-0013", "errors.org.domain_already_verified")
}

impl Commands {
    async fn load_domain(&self, ctx: &Context, org_id: &str, domain: &str) -> CommandResult<OrgDomainWriteModel> {
        let mut wm = OrgDomainWriteModel::new(org_id, domain, ctx.instance_id());
        self.load(ctx, &mut wm).await?;
        Ok(wm)
    }

    pub async fn add_org_domain(&self, ctx: &Context, org_id: &str, domain: &str) -> CommandResult<ObjectDetails> {
        let domain = normalized(domain)?;
        self.check_permission(ctx, names::ORG_WRITE, org_id, org_id).await?;

        let mut org = OrgExistence::new(org_id, ctx.instance_id());
        self.load(ctx, &mut org).await?;
        if !org.state.exists() {
            return Err(DomainError::precondition_failed("ORG-0019", "errors.org.not_found").into());
        }

        let mut wm = self.load_domain(ctx, org_id, &domain).await?;
        if wm.state.exists() {
            return Err(DomainError::already_exists("ORG-0011", "errors.org.domain_already_exists").into());
        }
        let added = event(
            ctx,
            &wm.base().aggregate(org::AGGREGATE_TYPE),
            &OrgEvent::DomainAdded(DomainAdded { domain }),
        )?;
        self.commit_with(ctx, &mut wm, vec![added], vec![org.guard()]).await?;
        Ok(wm.details())
    }

    /// Issue a verification token for an unverified domain.
    pub async fn generate_org_domain_validation(
        &self,
        ctx: &Context,
        org_id: &str,
        domain: &str,
    ) -> CommandResult<DomainValidation> {
        let domain = normalized(domain)?;
        self.check_permission(ctx, names::ORG_WRITE, org_id, org_id).await?;

        let mut wm = self.load_domain(ctx, org_id, &domain).await?;
        if !wm.state.exists() {
            return Err(domain_not_found().into());
        }
        if wm.verified {
            return Err(already_verified().into());
        }

        let (code, expires_at) = self.generate_code(CodeKind::DomainVerification)?;
        let issued = event(
            ctx,
            &wm.base().aggregate(org::AGGREGATE_TYPE),
            &OrgEvent::DomainVerificationAdded(DomainVerificationAdded {
                domain,
                code: code.crypted,
                expires_at,
            }),
        )?;
        self.commit(ctx, &mut wm, vec![issued]).await?;
        Ok(DomainValidation {
            details: wm.details(),
            token: code.plain,
        })
    }

    /// Verify a domain with the token issued by [`Commands::generate_org_domain_validation`].
    ///
    /// A wrong token is recorded as a failed attempt before the error returns.
    pub async fn validate_org_domain(
        &self,
        ctx: &Context,
        org_id: &str,
        domain: &str,
        token: &str,
    ) -> CommandResult<ObjectDetails> {
        let domain = normalized(domain)?;
        if token.trim().is_empty() {
            return Err(DomainError::invalid_argument("ORG-0016", "errors.org.domain_token_invalid").into());
        }
        self.check_permission(ctx, names::ORG_WRITE, org_id, org_id).await?;

        let mut wm = self.load_domain(ctx, org_id, &domain).await?;
        if !wm.state.exists() {
            return Err(domain_not_found().into());
        }
        if wm.verified {
            return Err(already_verified().into());
        }
        let Some((code, expires_at)) = wm.validation.clone() else {
            return Err(DomainError::precondition_failed("ORG-0014", "errors.org.domain_validation_missing").into());
        };
        if Utc::now() >= expires_at {
            return Err(DomainError::precondition_failed("ORG-0015", "errors.org.domain_token_expired").into());
        }

        let aggregate = wm.base().aggregate(org::AGGREGATE_TYPE);
        if !self.codes.verify(&code, token.trim()) {
            let failed = event(
                ctx,
                &aggregate,
                &OrgEvent::DomainVerificationFailed(DomainVerificationFailed { domain }),
            )?;
            self.commit(ctx, &mut wm, vec![failed]).await?;
            return Err(DomainError::invalid_argument("ORG-0016", "errors.org.domain_token_invalid").into());
        }

        let verified = event(ctx, &aggregate, &OrgEvent::DomainVerified(DomainVerified { domain }))?;
        self.commit(ctx, &mut wm, vec![verified]).await?;
        Ok(wm.details())
    }

    pub async fn set_primary_org_domain(
        &self,
        ctx: &Context,
        org_id: &str,
        domain: &str,
    ) -> CommandResult<ObjectDetails> {
        let domain = normalized(domain)?;
        self.check_permission(ctx, names::ORG_WRITE, org_id, org_id).await?;

        let mut wm = OrgDomainWriteModel::new(org_id, &domain, ctx.instance_id());
        self.execute(ctx, &mut wm, |wm| {
            if !wm.state.exists() {
                return Err(domain_not_found().into());
            }
            if !wm.verified {
                return Err(DomainError::precondition_failed("ORG-0017", "errors.org.domain_not_verified").into());
            }
            if wm.primary {
                return Ok(vec![]);
            }
            Ok(vec![event(
                ctx,
                &wm.base().aggregate(org::AGGREGATE_TYPE),
                &OrgEvent::DomainPrimarySet(DomainPrimarySet { domain }),
            )?])
        })
        .await
    }

    pub async fn remove_org_domain(&self, ctx: &Context, org_id: &str, domain: &str) -> CommandResult<ObjectDetails> {
        let domain = normalized(domain)?;
        self.check_permission(ctx, names::ORG_WRITE, org_id, org_id).await?;

        let mut wm = OrgDomainWriteModel::new(org_id, &domain, ctx.instance_id());
        self.execute(ctx, &mut wm, |wm| {
            if !wm.state.exists() {
                return Err(domain_not_found().into());
            }
            if wm.primary {
                return Err(DomainError::precondition_failed("ORG-0018", "errors.org.domain_is_primary").into());
            }
            Ok(vec![event(
                ctx,
                &wm.base().aggregate(org::AGGREGATE_TYPE),
                &OrgEvent::DomainRemoved(DomainRemoved {
                    domain,
                    was_verified: wm.verified,
                }),
            )?])
        })
        .await
    }
}
