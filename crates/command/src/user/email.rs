use chrono::Utc;

use keyward_auth::permissions::names;
use keyward_core::{Context, DomainError, ObjectDetails};
use keyward_domain::user::{HumanEmailChanged, HumanEmailCodeAdded, HumanEmailVerificationFailed, HumanEmailVerified};
use keyward_domain::{CodeKind, UserEvent};
use keyward_infra::event_store::UncommittedEvent;

use super::{validated_email, HumanWriteModel};
use crate::commands::Commands;
use crate::engine::event;
use crate::error::CommandResult;
use crate::write_model::WriteModel;

/// `code` is the plain verification code when a new one was issued.
#[derive(Clone)]
pub struct EmailResult {
    pub details: ObjectDetails,
    pub code: Option<String>,
}

impl core::fmt::Debug for EmailResult {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("EmailResult")
            .field("details", &self.details)
            .field("code", &self.code.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

fn already_verified() -> DomainError {
    DomainError::precondition_failed("USER-0014", "errors.user.email_already_verified")
}

impl Commands {
    /// Users may manage their own credentials; anyone else needs `permission`.
    pub(super) async fn check_self_or(
        &self,
        ctx: &Context,
        permission: &str,
        owner: &str,
        user_id: &str,
    ) -> CommandResult<()> {
        if ctx.user_id() == user_id {
            return Ok(());
        }
        self.check_permission(ctx, permission, owner, user_id).await
    }

    fn email_code_event(&self, ctx: &Context, wm: &HumanWriteModel) -> CommandResult<(UncommittedEvent, String)> {
        let (code, expires_at) = self.generate_code(CodeKind::EmailVerification)?;
        let added = event(
            ctx,
            &wm.aggregate(),
            &UserEvent::HumanEmailCodeAdded(HumanEmailCodeAdded {
                code: code.crypted,
                expires_at,
            }),
        )?;
        Ok((added, code.plain))
    }

    pub async fn change_user_email(
        &self,
        ctx: &Context,
        owner: &str,
        user_id: &str,
        email: &str,
        verified: bool,
    ) -> CommandResult<EmailResult> {
        let email = validated_email(email)?;
        self.check_self_or(ctx, names::USER_WRITE, owner, user_id).await?;

        let mut wm = self.existing_human(ctx, owner, user_id).await?;
        if wm.email == email && wm.email_verified {
            return Err(DomainError::precondition_failed("USER-0013", "errors.user.email_not_changed").into());
        }

        let aggregate = wm.aggregate();
        let mut events = Vec::new();
        if wm.email != email {
            events.push(event(ctx, &aggregate, &UserEvent::HumanEmailChanged(HumanEmailChanged { email }))?);
        }
        let mut code = None;
        if verified {
            events.push(event(ctx, &aggregate, &UserEvent::HumanEmailVerified(HumanEmailVerified {}))?);
        } else {
            let (added, plain) = self.email_code_event(ctx, &wm)?;
            events.push(added);
            code = Some(plain);
        }

        self.commit(ctx, &mut wm, events).await?;
        Ok(EmailResult {
            details: wm.details(),
            code,
        })
    }

    /// Verify the pending email code. A wrong code is recorded before the
    /// error is returned.
    pub async fn verify_user_email(
        &self,
        ctx: &Context,
        owner: &str,
        user_id: &str,
        code: &str,
    ) -> CommandResult<ObjectDetails> {
        if code.trim().is_empty() {
            return Err(DomainError::invalid_argument("USER-0018", "errors.user.code_missing").into());
        }
        self.check_self_or(ctx, names::USER_WRITE, owner, user_id).await?;

        let mut wm = self.existing_human(ctx, owner, user_id).await?;
        if wm.email_verified {
            return Err(already_verified().into());
        }
        let Some((crypted, expires_at)) = wm.email_code.clone() else {
            return Err(DomainError::precondition_failed("USER-0015", "errors.user.email_code_missing").into());
        };
        if expires_at <= Utc::now() {
            return Err(DomainError::precondition_failed("USER-0016", "errors.user.email_code_expired").into());
        }

        let aggregate = wm.aggregate();
        if !self.codes.verify(&crypted, code.trim()) {
            let failed = event(
                ctx,
                &aggregate,
                &UserEvent::HumanEmailVerificationFailed(HumanEmailVerificationFailed {}),
            )?;
            self.commit(ctx, &mut wm, vec![failed]).await?;
            tracing::info!(user_id, "email verification failed");
            return Err(DomainError::invalid_argument("USER-0017", "errors.user.email_code_invalid").into());
        }

        let verified = event(ctx, &aggregate, &UserEvent::HumanEmailVerified(HumanEmailVerified {}))?;
        self.commit(ctx, &mut wm, vec![verified]).await?;
        Ok(wm.details())
    }

    pub async fn resend_user_email_code(&self, ctx: &Context, owner: &str, user_id: &str) -> CommandResult<EmailResult> {
        self.check_self_or(ctx, names::USER_WRITE, owner, user_id).await?;

        let mut wm = self.existing_human(ctx, owner, user_id).await?;
        if wm.email_verified {
            return Err(already_verified().into());
        }
        let (added, plain) = self.email_code_event(ctx, &wm)?;
        self.commit(ctx, &mut wm, vec![added]).await?;
        Ok(EmailResult {
            details: wm.details(),
            code: Some(plain),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use keyward_core::ErrorKind;

    use crate::test_support::{fixture, human, seed_org, FixedCodeGenerator};

    #[tokio::test]
    async fn wrong_code_is_recorded_then_right_code_verifies() {
        let mut fx = fixture();
        fx.commands = fx
            .commands
            .clone()
            .with_code_generator(Arc::new(FixedCodeGenerator::new("ABC123", Duration::from_secs(600))));
        let ctx = fx.ctx();
        seed_org(&fx, "o1").await;
        let added = fx.commands.add_human(&ctx, "o1", human("u1")).await.unwrap();
        assert_eq!(added.email_code.as_deref(), Some("ABC123"));

        let before = fx.store.len();
        let err = fx
            .commands
            .verify_user_email(&ctx, "o1", "u1", "WRONG")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
        assert_eq!(fx.store.len(), before + 1);

        fx.commands
            .verify_user_email(&ctx, "o1", "u1", "ABC123")
            .await
            .unwrap();
        let wm = fx.commands.existing_human(&ctx, "o1", "u1").await.unwrap();
        assert!(wm.email_verified);

        let err = fx
            .commands
            .resend_user_email_code(&ctx, "o1", "u1")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PreconditionFailed);
    }

    #[tokio::test]
    async fn expired_code_is_rejected_without_push() {
        let mut fx = fixture();
        fx.commands = fx
            .commands
            .clone()
            .with_code_generator(Arc::new(FixedCodeGenerator::new("ABC123", Duration::ZERO)));
        let ctx = fx.ctx();
        seed_org(&fx, "o1").await;
        fx.commands.add_human(&ctx, "o1", human("u1")).await.unwrap();

        let before = fx.store.len();
        let err = fx
            .commands
            .verify_user_email(&ctx, "o1", "u1", "ABC123")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PreconditionFailed);
        assert_eq!(fx.store.len(), before);
    }

    #[tokio::test]
    async fn change_email_resets_verification() {
        let fx = fixture();
        let ctx = fx.ctx();
        seed_org(&fx, "o1").await;
        fx.commands.add_human(&ctx, "o1", human("u1")).await.unwrap();

        let result = fx
            .commands
            .change_user_email(&ctx, "o1", "u1", "New@Example.com", false)
            .await
            .unwrap();
        assert!(result.code.is_some());
        let wm = fx.commands.existing_human(&ctx, "o1", "u1").await.unwrap();
        assert_eq!(wm.email, "new@example.com");
        assert!(!wm.email_verified);

        fx.commands
            .change_user_email(&ctx, "o1", "u1", "new@example.com", true)
            .await
            .unwrap();
        let err = fx
            .commands
            .change_user_email(&ctx, "o1", "u1", "new@example.com", true)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PreconditionFailed);
    }
}
