//! Time-based one-time password as a second factor of human users.
//!
//! At most one TOTP factor per user. It starts `NotReady` and becomes `Ready`
//! once the user proves possession with a valid code; a pending enrollment may
//! be replaced by a new one.

use keyward_auth::permissions::names;
use keyward_core::{AggregateRef, Context, DomainError, ObjectDetails};
use keyward_domain::user::{self, lifecycle_transition, HumanOtpAdded, HumanOtpRemoved, HumanOtpVerified};
use keyward_domain::{CryptoValue, FactorState, UserEvent, UserState};
use keyward_events::CodecError;
use keyward_infra::event_store::{AggregateFilter, SearchQuery, StoredEvent};

use super::user_not_found;
use crate::commands::Commands;
use crate::engine::event;
use crate::error::{CommandError, CommandResult};
use crate::write_model::{WriteModel, WriteModelBase};

/// `secret` (base32) and `uri` are shown once to set up an authenticator.
#[derive(Clone)]
pub struct OtpResult {
    pub details: ObjectDetails,
    pub secret: String,
    pub uri: String,
}

impl core::fmt::Debug for OtpResult {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("OtpResult")
            .field("details", &self.details)
            .field("secret", &"<redacted>")
            .finish_non_exhaustive()
    }
}

/// The TOTP factor of one user, plus enough of the user to guard it.
#[derive(Debug, Clone)]
pub struct HumanOtpWriteModel {
    base: WriteModelBase,
    pub username: String,
    pub user_state: UserState,
    pub state: FactorState,
    pub secret: Option<CryptoValue>,
}

impl HumanOtpWriteModel {
    pub fn new(user_id: &str, resource_owner: &str, instance_id: &str) -> Self {
        Self {
            base: WriteModelBase::new(user_id, resource_owner, instance_id),
            username: String::new(),
            user_state: UserState::Unspecified,
            state: FactorState::Unspecified,
            secret: None,
        }
    }

    fn user_exists_for(&self, owner: &str) -> bool {
        self.user_state.exists() && self.base.is_owned_by(owner)
    }

    fn aggregate(&self) -> AggregateRef {
        self.base.aggregate(user::AGGREGATE_TYPE)
    }
}

impl WriteModel for HumanOtpWriteModel {
    fn base(&self) -> &WriteModelBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut WriteModelBase {
        &mut self.base
    }

    fn query(&self) -> SearchQuery {
        SearchQuery::new(&self.base.instance_id).filter(
            AggregateFilter::new(user::AGGREGATE_TYPE)
                .aggregate_id(&self.base.aggregate_id)
                .event_types(user::LIFECYCLE_EVENT_TYPES)
                .event_types(user::OTP_EVENT_TYPES),
        )
    }

    fn apply(&mut self, event: &StoredEvent) -> Result<(), CodecError> {
        let Some(e) = event.decode::<UserEvent>()? else {
            return Ok(());
        };
        if let Some(state) = lifecycle_transition(&e) {
            self.user_state = state;
        }
        match e {
            UserEvent::HumanAdded(e) => self.username = e.username,
            UserEvent::HumanOtpAdded(e) => {
                self.state = FactorState::NotReady;
                self.secret = Some(e.secret);
            }
            UserEvent::HumanOtpVerified(_) => self.state = FactorState::Ready,
            UserEvent::HumanOtpRemoved(_) | UserEvent::Removed(_) => {
                if self.state.exists() {
                    self.state = FactorState::Removed;
                }
                self.secret = None;
            }
            _ => {}
        }
        Ok(())
    }
}

fn otp_not_found() -> DomainError {
    DomainError::not_found("USER-0021", "errors.user.otp_not_found")
}

impl Commands {
    async fn existing_otp_user(&self, ctx: &Context, owner: &str, user_id: &str) -> CommandResult<HumanOtpWriteModel> {
        self.check_self_or(ctx, names::USER_CREDENTIAL_WRITE, owner, user_id).await?;

        let mut wm = HumanOtpWriteModel::new(user_id, owner, ctx.instance_id());
        self.load(ctx, &mut wm).await?;
        if !wm.user_exists_for(owner) {
            return Err(user_not_found().into());
        }
        Ok(wm)
    }

    /// Start a TOTP enrollment. Replaces a pending one; a verified factor
    /// has to be removed first.
    pub async fn add_human_otp(&self, ctx: &Context, owner: &str, user_id: &str) -> CommandResult<OtpResult> {
        let mut wm = self.existing_otp_user(ctx, owner, user_id).await?;
        if wm.state == FactorState::Ready {
            return Err(DomainError::already_exists("USER-0020", "errors.user.otp_already_ready").into());
        }

        let enrollment = self
            .otp
            .enroll(&self.config.default_domain, &wm.username)
            .map_err(CommandError::collaborator)?;
        let added = event(
            ctx,
            &wm.aggregate(),
            &UserEvent::HumanOtpAdded(HumanOtpAdded {
                secret: enrollment.crypted,
            }),
        )?;
        self.commit(ctx, &mut wm, vec![added]).await?;
        tracing::debug!(user_id, "otp factor added");
        Ok(OtpResult {
            details: wm.details(),
            secret: enrollment.secret,
            uri: enrollment.uri,
        })
    }

    /// Complete a pending enrollment with a code from the authenticator.
    pub async fn verify_human_otp(
        &self,
        ctx: &Context,
        owner: &str,
        user_id: &str,
        code: &str,
    ) -> CommandResult<ObjectDetails> {
        if code.trim().is_empty() {
            return Err(DomainError::invalid_argument("USER-0018", "errors.user.code_missing").into());
        }
        let mut wm = self.existing_otp_user(ctx, owner, user_id).await?;
        let secret = match (wm.state, wm.secret.as_ref()) {
            (FactorState::Ready, _) => {
                return Err(DomainError::precondition_failed("USER-0022", "errors.user.otp_already_ready").into());
            }
            (FactorState::NotReady, Some(secret)) => secret,
            _ => return Err(otp_not_found().into()),
        };
        if !self.otp.verify(secret, code.trim()) {
            tracing::info!(user_id, "otp verification failed");
            return Err(DomainError::invalid_argument("USER-0023", "errors.user.otp_code_invalid").into());
        }

        let verified = event(ctx, &wm.aggregate(), &UserEvent::HumanOtpVerified(HumanOtpVerified {}))?;
        self.commit(ctx, &mut wm, vec![verified]).await?;
        Ok(wm.details())
    }

    pub async fn remove_human_otp(&self, ctx: &Context, owner: &str, user_id: &str) -> CommandResult<ObjectDetails> {
        let mut wm = self.existing_otp_user(ctx, owner, user_id).await?;
        if !wm.state.exists() {
            return Err(otp_not_found().into());
        }
        let removed = event(ctx, &wm.aggregate(), &UserEvent::HumanOtpRemoved(HumanOtpRemoved {}))?;
        self.commit(ctx, &mut wm, vec![removed]).await?;
        Ok(wm.details())
    }
}
