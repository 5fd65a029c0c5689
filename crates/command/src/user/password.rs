use keyward_auth::permissions::names;
use keyward_core::{Context, DomainError, ObjectDetails};
use keyward_domain::user::HumanPasswordChanged;
use keyward_domain::UserEvent;

use crate::commands::Commands;
use crate::engine::event;
use crate::error::CommandResult;
use crate::write_model::WriteModel;

impl Commands {
    /// Replace the password hash. The new password must satisfy the
    /// effective policy of the user's organization.
    pub async fn set_password(
        &self,
        ctx: &Context,
        owner: &str,
        user_id: &str,
        password: &str,
        change_required: bool,
    ) -> CommandResult<ObjectDetails> {
        if password.is_empty() {
            return Err(DomainError::invalid_argument("USER-0019", "errors.user.password_missing").into());
        }
        if ctx.user_id() != user_id {
            self.check_permission(ctx, names::USER_CREDENTIAL_WRITE, owner, user_id)
                .await?;
        }

        let mut wm = self.existing_human(ctx, owner, user_id).await?;
        let org_id = wm.base().resource_owner.clone();
        let hash = self.hash_password(ctx, &org_id, password).await?;
        let changed = event(
            ctx,
            &wm.aggregate(),
            &UserEvent::HumanPasswordChanged(HumanPasswordChanged { hash, change_required }),
        )?;
        self.commit(ctx, &mut wm, vec![changed]).await?;
        Ok(wm.details())
    }
}

#[cfg(test)]
mod tests {
    use keyward_core::{Context, ErrorKind};

    use crate::test_support::{fixture, seed_org, seed_user};

    #[tokio::test]
    async fn password_must_match_policy() {
        let fx = fixture();
        let ctx = fx.ctx();
        seed_org(&fx, "o1").await;
        seed_user(&fx, "o1", "u1").await;

        let err = fx
            .commands
            .set_password(&ctx, "o1", "u1", "weak", false)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);

        fx.commands
            .set_password(&ctx, "o1", "u1", "Str0ng!Secret", true)
            .await
            .unwrap();
        let wm = fx.commands.existing_human(&ctx, "o1", "u1").await.unwrap();
        assert!(wm.password_change_required);
        let hash = wm.password_hash.unwrap();
        assert!(!hash.contains("Str0ng!Secret"));
    }

    #[tokio::test]
    async fn users_may_set_their_own_password() {
        let fx = fixture();
        seed_org(&fx, "o1").await;
        seed_user(&fx, "o1", "u1").await;

        let own = Context::new(fx.ctx().instance_id(), "u1");
        fx.commands
            .set_password(&own, "o1", "u1", "Str0ng!Secret", false)
            .await
            .unwrap();

        let stranger = fx.ctx_for("u2");
        let err = fx
            .commands
            .set_password(&stranger, "o1", "u1", "Str0ng!Secret", false)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PermissionDenied);
    }
}
