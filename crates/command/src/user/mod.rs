//! Human users: creation, profile, lifecycle and removal.

mod email;
mod metadata;
mod otp;
mod password;

use chrono::{DateTime, Utc};

use keyward_auth::permissions::names;
use keyward_core::{AggregateRef, Context, DomainError, ObjectDetails};
use keyward_domain::group::{GroupEvent, MemberCascadeRemoved};
use keyward_domain::user::{
    self, lifecycle_transition, HumanAdded, HumanEmailCodeAdded, HumanEmailVerified, HumanProfileChanged,
    UserDeactivated, UserLocked, UserReactivated, UserRemoved, UserUnlocked,
};
use keyward_domain::{CodeKind, CryptoValue, UserEvent, UserState};
use keyward_events::CodecError;
use keyward_infra::event_store::{AggregateFilter, ConcurrencyGuard, SearchQuery, StoredEvent, UncommittedEvent};

use crate::commands::Commands;
use crate::engine::event;
use crate::error::{CommandError, CommandResult};
use crate::existence::OrgExistence;
use crate::group::GroupMembershipsOfUser;
use crate::write_model::{WriteModel, WriteModelBase};

pub use email::EmailResult;
pub use metadata::{BulkMetadataResult, Metadata, UserMetadataListWriteModel, UserMetadataWriteModel};
pub use otp::{HumanOtpWriteModel, OtpResult};

#[derive(Clone, Default)]
pub struct AddHuman {
    /// Explicit id; generated when absent.
    pub id: Option<String>,
    pub username: String,
    pub given_name: String,
    pub family_name: String,
    /// Defaults to "<given name> <family name>".
    pub display_name: Option<String>,
    pub preferred_language: Option<String>,
    pub email: String,
    /// Skip email verification (e.g. trusted import).
    pub email_verified: bool,
    pub password: Option<String>,
    pub password_change_required: bool,
}

impl core::fmt::Debug for AddHuman {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("AddHuman")
            .field("id", &self.id)
            .field("username", &self.username)
            .field("email", &self.email)
            .field("email_verified", &self.email_verified)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .finish_non_exhaustive()
    }
}

/// `email_code` is the plain verification code, present when the email was
/// not marked verified.
#[derive(Clone)]
pub struct AddHumanResult {
    pub details: ObjectDetails,
    pub email_code: Option<String>,
}

impl core::fmt::Debug for AddHumanResult {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("AddHumanResult")
            .field("details", &self.details)
            .field("email_code", &self.email_code.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Desired profile; `None` leaves a field unchanged.
#[derive(Debug, Clone, Default)]
pub struct ChangeProfile {
    pub given_name: Option<String>,
    pub family_name: Option<String>,
    pub display_name: Option<String>,
    pub preferred_language: Option<String>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Write model
// ─────────────────────────────────────────────────────────────────────────────

/// Everything but metadata of one human user.
#[derive(Debug, Clone)]
pub struct HumanWriteModel {
    base: WriteModelBase,
    pub username: String,
    pub given_name: String,
    pub family_name: String,
    pub display_name: String,
    pub preferred_language: Option<String>,
    pub email: String,
    pub email_verified: bool,
    pub email_code: Option<(CryptoValue, DateTime<Utc>)>,
    pub password_hash: Option<String>,
    pub password_change_required: bool,
    pub state: UserState,
}

impl HumanWriteModel {
    pub fn new(user_id: &str, resource_owner: &str, instance_id: &str) -> Self {
        Self {
            base: WriteModelBase::new(user_id, resource_owner, instance_id),
            username: String::new(),
            given_name: String::new(),
            family_name: String::new(),
            display_name: String::new(),
            preferred_language: None,
            email: String::new(),
            email_verified: false,
            email_code: None,
            password_hash: None,
            password_change_required: false,
            state: UserState::Unspecified,
        }
    }

    /// Existing and owned by `owner` (empty `owner` matches any).
    pub fn exists_for(&self, owner: &str) -> bool {
        self.state.exists() && self.base.is_owned_by(owner)
    }

    pub(crate) fn aggregate(&self) -> AggregateRef {
        self.base.aggregate(user::AGGREGATE_TYPE)
    }
}

impl WriteModel for HumanWriteModel {
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
                .event_types(&[
                    user::HUMAN_ADDED,
                    user::HUMAN_PROFILE_CHANGED,
                    user::HUMAN_EMAIL_CHANGED,
                    user::HUMAN_EMAIL_CODE_ADDED,
                    user::HUMAN_EMAIL_VERIFIED,
                    user::HUMAN_EMAIL_VERIFICATION_FAILED,
                    user::HUMAN_PASSWORD_CHANGED,
                    user::USER_LOCKED,
                    user::USER_UNLOCKED,
                    user::USER_DEACTIVATED,
                    user::USER_REACTIVATED,
                    user::USER_REMOVED,
                ]),
        )
    }

    fn apply(&mut self, event: &StoredEvent) -> Result<(), CodecError> {
        let Some(e) = event.decode::<UserEvent>()? else {
            return Ok(());
        };
        if let Some(state) = lifecycle_transition(&e) {
            self.state = state;
        }
        match e {
            UserEvent::HumanAdded(e) => {
                self.username = e.username;
                self.given_name = e.given_name;
                self.family_name = e.family_name;
                self.display_name = e.display_name;
                self.preferred_language = e.preferred_language;
                self.email = e.email;
                self.email_verified = false;
                self.password_hash = e.password_hash;
                self.password_change_required = e.password_change_required;
            }
            UserEvent::HumanProfileChanged(e) => {
                if let Some(v) = e.given_name {
                    self.given_name = v;
                }
                if let Some(v) = e.family_name {
                    self.family_name = v;
                }
                if let Some(v) = e.display_name {
                    self.display_name = v;
                }
                if e.preferred_language.is_some() {
                    self.preferred_language = e.preferred_language;
                }
            }
            UserEvent::HumanEmailChanged(e) => {
                self.email = e.email;
                self.email_verified = false;
                self.email_code = None;
            }
            UserEvent::HumanEmailCodeAdded(e) => self.email_code = Some((e.code, e.expires_at)),
            UserEvent::HumanEmailVerified(_) => {
                self.email_verified = true;
                self.email_code = None;
            }
            UserEvent::HumanPasswordChanged(e) => {
                self.password_hash = Some(e.hash);
                self.password_change_required = e.change_required;
            }
            // Lifecycle handled above; failed attempts, factors and metadata change nothing here.
            UserEvent::HumanEmailVerificationFailed(_)
            | UserEvent::HumanOtpAdded(_)
            | UserEvent::HumanOtpVerified(_)
            | UserEvent::HumanOtpRemoved(_)
            | UserEvent::Locked(_)
            | UserEvent::Unlocked(_)
            | UserEvent::Deactivated(_)
            | UserEvent::Reactivated(_)
            | UserEvent::Removed(_)
            | UserEvent::MetadataSet(_)
            | UserEvent::MetadataRemoved(_)
            | UserEvent::MetadataRemovedAll(_) => {}
        }
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Commands
// ─────────────────────────────────────────────────────────────────────────────

fn required(value: &str, code: &'static str, key: &'static str) -> CommandResult<String> {
    let value = value.trim();
    if value.is_empty() {
        return Err(DomainError::invalid_argument(code, key).into());
    }
    Ok(value.to_string())
}

pub(crate) fn validated_email(email: &str) -> CommandResult<String> {
    let email = email.trim().to_lowercase();
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && !domain.is_empty() && !email.contains(char::is_whitespace) => {
            Ok(email)
        }
        _ => Err(DomainError::invalid_argument("USER-0004", "errors.user.email_invalid").into()),
    }
}

pub(crate) fn user_not_found() -> DomainError {
    DomainError::not_found("USER-0007", "errors.user.not_found")
}

impl Commands {
    /// Load a human and require it to exist for `owner`.
    pub(crate) async fn existing_human(
        &self,
        ctx: &Context,
        owner: &str,
        user_id: &str,
    ) -> CommandResult<HumanWriteModel> {
        let mut wm = HumanWriteModel::new(user_id, owner, ctx.instance_id());
        self.load(ctx, &mut wm).await?;
        if !wm.exists_for(owner) {
            return Err(user_not_found().into());
        }
        Ok(wm)
    }

    /// Hash `password` after checking it against the org's effective policy.
    pub(crate) async fn hash_password(&self, ctx: &Context, owner: &str, password: &str) -> CommandResult<String> {
        self.effective_password_policy(ctx, owner).await?.check(password)?;
        self.hasher
            .hash(password)
            .map_err(|e| CommandError::collaborator(e.into()))
    }

    pub async fn add_human(&self, ctx: &Context, owner: &str, input: AddHuman) -> CommandResult<AddHumanResult> {
        let owner = required(owner, "USER-0001", "errors.user.owner_missing")?;
        let username = required(&input.username, "USER-0002", "errors.user.username_missing")?;
        let given_name = required(&input.given_name, "USER-0003", "errors.user.name_missing")?;
        let family_name = required(&input.family_name, "USER-0003", "errors.user.name_missing")?;
        let email = validated_email(&input.email)?;
        let display_name = input
            .display_name
            .as_deref()
            .map(str::trim)
            .filter(|d| !d.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| format!("{given_name} {family_name}"));

        let user_id = self.id_or_next(input.id.as_deref())?;
        self.check_permission(ctx, names::USER_WRITE, &owner, &user_id).await?;

        let mut org = OrgExistence::new(&owner, ctx.instance_id());
        self.load(ctx, &mut org).await?;
        if !org.is_active() {
            return Err(DomainError::precondition_failed("USER-0005", "errors.user.org_not_active").into());
        }

        let password_hash = match input.password.as_deref() {
            Some(password) => Some(self.hash_password(ctx, &owner, password).await?),
            None => None,
        };

        let mut wm = HumanWriteModel::new(&user_id, &owner, ctx.instance_id());
        self.load(ctx, &mut wm).await?;
        if wm.state != UserState::Unspecified {
            return Err(DomainError::already_exists("USER-0006", "errors.user.already_exists").into());
        }

        let aggregate = wm.aggregate();
        let mut events = vec![event(
            ctx,
            &aggregate,
            &UserEvent::HumanAdded(HumanAdded {
                username,
                given_name,
                family_name,
                display_name,
                preferred_language: input.preferred_language,
                email,
                password_hash,
                password_change_required: input.password_change_required,
            }),
        )?];
        let mut email_code = None;
        if input.email_verified {
            events.push(event(ctx, &aggregate, &UserEvent::HumanEmailVerified(HumanEmailVerified {}))?);
        } else {
            let (code, expires_at) = self.generate_code(CodeKind::EmailVerification)?;
            events.push(event(
                ctx,
                &aggregate,
                &UserEvent::HumanEmailCodeAdded(HumanEmailCodeAdded {
                    code: code.crypted,
                    expires_at,
                }),
            )?);
            email_code = Some(code.plain);
        }

        self.commit_with(ctx, &mut wm, events, vec![org.guard()]).await?;
        tracing::debug!(user_id = %user_id, resource_owner = %owner, "human added");
        Ok(AddHumanResult {
            details: wm.details(),
            email_code,
        })
    }

    pub async fn change_human_profile(
        &self,
        ctx: &Context,
        owner: &str,
        user_id: &str,
        profile: ChangeProfile,
    ) -> CommandResult<ObjectDetails> {
        let trimmed = |v: &Option<String>| v.as_deref().map(str::trim).map(str::to_string);
        let given_name = trimmed(&profile.given_name);
        let family_name = trimmed(&profile.family_name);
        let display_name = trimmed(&profile.display_name);
        if [&given_name, &family_name, &display_name]
            .iter()
            .any(|v| v.as_deref() == Some(""))
        {
            return Err(DomainError::invalid_argument("USER-0003", "errors.user.name_missing").into());
        }
        self.check_permission(ctx, names::USER_WRITE, owner, user_id).await?;

        let mut wm = HumanWriteModel::new(user_id, owner, ctx.instance_id());
        self.execute(ctx, &mut wm, |wm| {
            if !wm.exists_for(owner) {
                return Err(user_not_found().into());
            }
            let differs = |desired: Option<String>, current: &str| desired.filter(|d| d != current);
            let changed = HumanProfileChanged {
                given_name: differs(given_name, &wm.given_name),
                family_name: differs(family_name, &wm.family_name),
                display_name: differs(display_name, &wm.display_name),
                preferred_language: profile
                    .preferred_language
                    .filter(|l| wm.preferred_language.as_deref() != Some(l.as_str())),
            };
            if changed.is_empty() {
                return Err(DomainError::precondition_failed("USER-0008", "errors.user.profile_not_changed").into());
            }
            Ok(vec![event(ctx, &wm.aggregate(), &UserEvent::HumanProfileChanged(changed))?])
        })
        .await
    }

    async fn transition_user(
        &self,
        ctx: &Context,
        owner: &str,
        user_id: &str,
        allowed: &[UserState],
        refused: DomainError,
        transition: UserEvent,
    ) -> CommandResult<ObjectDetails> {
        self.check_permission(ctx, names::USER_WRITE, owner, user_id).await?;

        let mut wm = HumanWriteModel::new(user_id, owner, ctx.instance_id());
        self.execute(ctx, &mut wm, |wm| {
            if !wm.exists_for(owner) {
                return Err(user_not_found().into());
            }
            if !allowed.contains(&wm.state) {
                return Err(refused.into());
            }
            Ok(vec![event(ctx, &wm.aggregate(), &transition)?])
        })
        .await
    }

    pub async fn lock_user(&self, ctx: &Context, owner: &str, user_id: &str) -> CommandResult<ObjectDetails> {
        self.transition_user(
            ctx,
            owner,
            user_id,
            &[UserState::Active],
            DomainError::precondition_failed("USER-0009", "errors.user.not_active"),
            UserEvent::Locked(UserLocked {}),
        )
        .await
    }

    pub async fn unlock_user(&self, ctx: &Context, owner: &str, user_id: &str) -> CommandResult<ObjectDetails> {
        self.transition_user(
            ctx,
            owner,
            user_id,
            &[UserState::Locked],
            DomainError::precondition_failed("USER-0010", "errors.user.not_locked"),
            UserEvent::Unlocked(UserUnlocked {}),
        )
        .await
    }

    pub async fn deactivate_user(&self, ctx: &Context, owner: &str, user_id: &str) -> CommandResult<ObjectDetails> {
        self.transition_user(
            ctx,
            owner,
            user_id,
            &[UserState::Active, UserState::Locked],
            DomainError::precondition_failed("USER-0011", "errors.user.already_inactive"),
            UserEvent::Deactivated(UserDeactivated {}),
        )
        .await
    }

    pub async fn reactivate_user(&self, ctx: &Context, owner: &str, user_id: &str) -> CommandResult<ObjectDetails> {
        self.transition_user(
            ctx,
            owner,
            user_id,
            &[UserState::Inactive],
            DomainError::precondition_failed("USER-0012", "errors.user.not_inactive"),
            UserEvent::Reactivated(UserReactivated {}),
        )
        .await
    }

    /// Remove a user and, best effort, its group memberships.
    pub async fn remove_user(&self, ctx: &Context, owner: &str, user_id: &str) -> CommandResult<ObjectDetails> {
        self.check_permission(ctx, names::USER_DELETE, owner, user_id).await?;

        let mut wm = self.existing_human(ctx, owner, user_id).await?;
        let mut events = vec![event(
            ctx,
            &wm.aggregate(),
            &UserEvent::Removed(UserRemoved {
                username: wm.username.clone(),
            }),
        )?];
        let (cascade, guard) = self.membership_cascade(ctx, user_id).await;
        events.extend(cascade);

        self.commit_with(ctx, &mut wm, events, guard.into_iter().collect()).await?;
        Ok(wm.details())
    }

    /// `group.member.cascade.removed` for every group the user belongs to,
    /// with the guard of the membership lookup. A failed lookup is logged and
    /// yields neither.
    async fn membership_cascade(
        &self,
        ctx: &Context,
        user_id: &str,
    ) -> (Vec<UncommittedEvent>, Option<ConcurrencyGuard>) {
        let mut memberships = GroupMembershipsOfUser::new(user_id, ctx.instance_id());
        if let Err(error) = self.load(ctx, &mut memberships).await {
            tracing::warn!(user_id, %error, "group membership lookup failed, cascade skipped");
            return (Vec::new(), None);
        }

        let mut events = Vec::new();
        for group in memberships.groups() {
            let cascade = GroupEvent::MemberCascadeRemoved(MemberCascadeRemoved {
                user_id: user_id.to_string(),
            });
            match event(ctx, group, &cascade) {
                Ok(e) => events.push(e),
                Err(error) => tracing::warn!(user_id, group_id = %group.id, %error, "membership cascade skipped"),
            }
        }
        (events, Some(memberships.guard()))
    }
}

#[cfg(test)]
mod tests {
    use keyward_core::ErrorKind;

    use super::*;
    use crate::test_support::{fixture, human, seed_org, seed_user};

    #[tokio::test]
    async fn add_human_with_unverified_email_returns_code() {
        let fx = fixture();
        let ctx = fx.ctx();
        seed_org(&fx, "o1").await;

        let result = fx.commands.add_human(&ctx, "o1", human("u1")).await.unwrap();
        assert_eq!(result.details.id, "u1");
        assert_eq!(result.details.resource_owner, "o1");
        assert_eq!(result.details.sequence, 2);
        assert!(result.email_code.is_some());
        assert!(!format!("{result:?}").contains(result.email_code.as_deref().unwrap()));

        let wm = fx.commands.existing_human(&ctx, "o1", "u1").await.unwrap();
        assert_eq!(wm.display_name, "Ada Lovelace");
        assert_eq!(wm.email, "u1@example.com");
        assert!(!wm.email_verified);
        assert!(wm.email_code.is_some());
        assert!(wm.password_hash.is_some());
    }

    #[tokio::test]
    async fn add_human_validation_and_preconditions() {
        let fx = fixture();
        let ctx = fx.ctx();

        let err = fx
            .commands
            .add_human(&ctx, "o1", AddHuman { email: "not-an-email".into(), ..human("u1") })
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);

        let err = fx.commands.add_human(&ctx, "o1", human("u1")).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PreconditionFailed);

        seed_org(&fx, "o1").await;
        let err = fx
            .commands
            .add_human(&ctx, "o1", AddHuman { password: Some("short".into()), ..human("u1") })
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);

        fx.commands.add_human(&ctx, "o1", human("u1")).await.unwrap();
        let err = fx.commands.add_human(&ctx, "o1", human("u1")).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AlreadyExists);
    }

    #[tokio::test]
    async fn verified_email_skips_code() {
        let fx = fixture();
        let ctx = fx.ctx();
        seed_org(&fx, "o1").await;

        let result = fx
            .commands
            .add_human(&ctx, "o1", AddHuman { email_verified: true, ..human("u1") })
            .await
            .unwrap();
        assert!(result.email_code.is_none());
        let wm = fx.commands.existing_human(&ctx, "o1", "u1").await.unwrap();
        assert!(wm.email_verified);
    }

    #[tokio::test]
    async fn profile_change_detects_no_op() {
        let fx = fixture();
        let ctx = fx.ctx();
        seed_org(&fx, "o1").await;
        seed_user(&fx, "o1", "u1").await;

        let same = ChangeProfile {
            given_name: Some("Ada".into()),
            ..ChangeProfile::default()
        };
        let before = fx.store.len();
        let err = fx
            .commands
            .change_human_profile(&ctx, "o1", "u1", same)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PreconditionFailed);
        assert_eq!(fx.store.len(), before);

        let changed = ChangeProfile {
            given_name: Some("Augusta".into()),
            family_name: Some("Lovelace".into()),
            ..ChangeProfile::default()
        };
        fx.commands
            .change_human_profile(&ctx, "o1", "u1", changed)
            .await
            .unwrap();
        let wm = fx.commands.existing_human(&ctx, "o1", "u1").await.unwrap();
        assert_eq!(wm.given_name, "Augusta");
        assert_eq!(fx.store.len(), before + 1);
    }

    #[tokio::test]
    async fn other_owner_reads_as_not_found() {
        let fx = fixture();
        let ctx = fx.ctx();
        seed_org(&fx, "o1").await;
        seed_user(&fx, "o1", "u1").await;

        let err = fx.commands.lock_user(&ctx, "o2", "u1").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn lifecycle_transitions() {
        let fx = fixture();
        let ctx = fx.ctx();
        seed_org(&fx, "o1").await;
        seed_user(&fx, "o1", "u1").await;

        let err = fx.commands.unlock_user(&ctx, "o1", "u1").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PreconditionFailed);

        fx.commands.lock_user(&ctx, "o1", "u1").await.unwrap();
        fx.commands.deactivate_user(&ctx, "o1", "u1").await.unwrap();
        let err = fx.commands.deactivate_user(&ctx, "o1", "u1").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PreconditionFailed);

        fx.commands.reactivate_user(&ctx, "o1", "u1").await.unwrap();
        let wm = fx.commands.existing_human(&ctx, "o1", "u1").await.unwrap();
        assert_eq!(wm.state, UserState::Active);

        fx.commands.remove_user(&ctx, "o1", "u1").await.unwrap();
        let err = fx.commands.remove_user(&ctx, "o1", "u1").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }
}
