use async_trait::async_trait;

use keyward_core::Context;

use super::SetupStep;
use crate::commands::Commands;
use crate::error::CommandResult;
use crate::org::AddOrg;
use crate::user::AddHuman;

/// Step 1: the instance's default organization.
#[derive(Debug, Clone)]
pub struct CreateDefaultOrg {
    pub org_id: String,
    pub name: String,
}

#[async_trait]
impl SetupStep for CreateDefaultOrg {
    fn step(&self) -> u32 {
        1
    }

    fn name(&self) -> &'static str {
        "create_default_org"
    }

    async fn execute(&self, commands: &Commands, ctx: &Context) -> CommandResult<()> {
        commands
            .add_org(
                ctx,
                AddOrg {
                    id: Some(self.org_id.clone()),
                    name: self.name.clone(),
                },
            )
            .await?;
        Ok(())
    }
}

/// Step 2: the first administrator, a human in the default organization.
#[derive(Debug, Clone)]
pub struct CreateFirstAdmin {
    pub org_id: String,
    pub admin: AddHuman,
}

#[async_trait]
impl SetupStep for CreateFirstAdmin {
    fn step(&self) -> u32 {
        2
    }

    fn name(&self) -> &'static str {
        "create_first_admin"
    }

    async fn execute(&self, commands: &Commands, ctx: &Context) -> CommandResult<()> {
        let admin = AddHuman {
            // Already vetted by the operator.
            email_verified: true,
            ..self.admin.clone()
        };
        let result = commands.add_human(ctx, &self.org_id, admin).await?;
        tracing::info!(user_id = %result.details.id, org_id = %self.org_id, "first admin created");
        Ok(())
    }
}

/// Step 3: pin the configured default password policy on the default org.
#[derive(Debug, Clone)]
pub struct SetDefaultPasswordPolicy {
    pub org_id: String,
}

#[async_trait]
impl SetupStep for SetDefaultPasswordPolicy {
    fn step(&self) -> u32 {
        3
    }

    fn name(&self) -> &'static str {
        "set_default_password_policy"
    }

    async fn execute(&self, commands: &Commands, ctx: &Context) -> CommandResult<()> {
        let policy = commands.config().default_password_policy.clone();
        commands
            .add_password_complexity_policy(ctx, &self.org_id, policy)
            .await?;
        Ok(())
    }
}

/// Bootstrap input for a fresh instance.
#[derive(Debug, Clone)]
pub struct FirstInstance {
    pub org_id: String,
    pub org_name: String,
    pub admin: AddHuman,
}

impl FirstInstance {
    pub fn steps(self) -> Vec<Box<dyn SetupStep>> {
        vec![
            Box::new(CreateDefaultOrg {
                org_id: self.org_id.clone(),
                name: self.org_name,
            }),
            Box::new(CreateFirstAdmin {
                org_id: self.org_id.clone(),
                admin: self.admin,
            }),
            Box::new(SetDefaultPasswordPolicy { org_id: self.org_id }),
        ]
    }
}

#[cfg(test)]
mod tests {
    use keyward_core::Context;

    use super::*;
    use crate::setup::SetupSequencer;
    use crate::test_support::{fixture, human};

    #[tokio::test]
    async fn first_instance_bootstrap() {
        let fx = fixture();
        let ctx = Context::system(fx.ctx().instance_id());

        let first = FirstInstance {
            org_id: "default".into(),
            org_name: "Acme".into(),
            admin: human("admin-user"),
        };
        let sequencer = SetupSequencer::new(first.steps());
        assert_eq!(sequencer.run(&fx.commands, &ctx).await.unwrap(), [1, 2, 3]);

        let admin = fx
            .commands
            .existing_human(&ctx, "default", "admin-user")
            .await
            .unwrap();
        assert!(admin.email_verified);

        let mut policy = crate::org::PasswordComplexityPolicyWriteModel::new("default", ctx.instance_id());
        fx.commands.load(&ctx, &mut policy).await.unwrap();
        assert!(policy.state.exists());

        let state = fx.commands.setup_state(&ctx).await.unwrap();
        assert_eq!((state.started, state.done), (3, 3));
    }
}
