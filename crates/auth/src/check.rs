//! Permission-check collaborator.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;

use keyward_core::{Context, DomainError, DomainResult, SYSTEM_USER};

use crate::roles::default_role_permissions;
use crate::{authorize, Membership, Permission, Role};

/// Authorization contract consumed by command handlers.
///
/// `resource_owner` is the organization owning the target aggregate and
/// `aggregate_id` the aggregate itself; implementations may grant on either.
/// Returns a `PermissionDenied` error on refusal.
#[async_trait]
pub trait PermissionCheck: Send + Sync {
    async fn check(
        &self,
        ctx: &Context,
        permission: &str,
        resource_owner: &str,
        aggregate_id: &str,
    ) -> DomainResult<()>;
}

#[async_trait]
impl<P> PermissionCheck for Arc<P>
where
    P: PermissionCheck + ?Sized,
{
    async fn check(
        &self,
        ctx: &Context,
        permission: &str,
        resource_owner: &str,
        aggregate_id: &str,
    ) -> DomainResult<()> {
        (**self).check(ctx, permission, resource_owner, aggregate_id).await
    }
}

/// In-process permission check backed by role definitions and memberships.
///
/// A user is granted `permission` if one of their memberships whose scope is the
/// instance, the resource owner or the aggregate carries a role mapping to it (or
/// to `"*"`). The system user always passes.
#[derive(Debug, Default)]
pub struct MembershipPermissionCheck {
    roles: RwLock<HashMap<Role, Vec<Permission>>>,
    memberships: RwLock<HashMap<String, Vec<Membership>>>,
}

impl MembershipPermissionCheck {
    pub fn new() -> Self {
        Self::default()
    }

    /// Checker preloaded with the built-in roles.
    pub fn with_default_roles() -> Self {
        let check = Self::new();
        for (role, permissions) in default_role_permissions() {
            check.define_role(role, permissions);
        }
        check
    }

    pub fn define_role(&self, role: Role, permissions: Vec<Permission>) {
        if let Ok(mut roles) = self.roles.write() {
            roles.insert(role, permissions);
        }
    }

    pub fn grant(&self, membership: Membership) {
        if let Ok(mut memberships) = self.memberships.write() {
            let entries = memberships.entry(membership.user_id.clone()).or_default();
            match entries.iter_mut().find(|m| m.scope == membership.scope) {
                Some(existing) => {
                    for role in membership.roles {
                        if !existing.roles.contains(&role) {
                            existing.roles.push(role);
                        }
                    }
                }
                None => entries.push(membership),
            }
        }
    }

    pub fn revoke(&self, user_id: &str, scope: &str) {
        if let Ok(mut memberships) = self.memberships.write() {
            if let Some(entries) = memberships.get_mut(user_id) {
                entries.retain(|m| m.scope != scope);
            }
        }
    }

    fn effective_permissions(&self, user_id: &str, scopes: &[&str]) -> DomainResult<Vec<Permission>> {
        let poisoned = || DomainError::permission_denied("AUTHZ-0002", "errors.permission.unavailable");
        let memberships = self.memberships.read().map_err(|_| poisoned())?;
        let roles = self.roles.read().map_err(|_| poisoned())?;

        let granted = memberships
            .get(user_id)
            .into_iter()
            .flatten()
            .filter(|m| scopes.contains(&m.scope.as_str()))
            .flat_map(|m| m.roles.iter())
            .filter_map(|role| roles.get(role))
            .flatten()
            .cloned()
            .collect();
        Ok(granted)
    }
}

#[async_trait]
impl PermissionCheck for MembershipPermissionCheck {
    async fn check(
        &self,
        ctx: &Context,
        permission: &str,
        resource_owner: &str,
        aggregate_id: &str,
    ) -> DomainResult<()> {
        if ctx.user_id() == SYSTEM_USER {
            return Ok(());
        }

        let scopes = [ctx.instance_id(), resource_owner, aggregate_id];
        let granted = self.effective_permissions(ctx.user_id(), &scopes)?;
        authorize(&granted, &Permission::new(permission.to_string())).map_err(|e| {
            tracing::debug!(user_id = ctx.user_id(), permission, resource_owner, "permission denied");
            DomainError::from(e)
        })
    }
}

#[cfg(test)]
mod tests {
    use keyward_core::ErrorKind;

    use super::*;
    use crate::permissions::names;

    fn checker() -> MembershipPermissionCheck {
        let check = MembershipPermissionCheck::with_default_roles();
        check.grant(Membership::new("owner", "org1", vec![Role::new(Role::ORG_OWNER)]));
        check.grant(Membership::new("admin", "inst", vec![Role::new(Role::IAM_OWNER)]));
        check.grant(Membership::new("pm", "proj1", vec![Role::new(Role::PROJECT_OWNER)]));
        check
    }

    #[tokio::test]
    async fn org_owner_is_scoped_to_their_org() {
        let check = checker();
        let ctx = Context::new("inst", "owner");
        assert!(check.check(&ctx, names::GROUP_WRITE, "org1", "g1").await.is_ok());
        let err = check.check(&ctx, names::GROUP_WRITE, "org2", "g2").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PermissionDenied);
    }

    #[tokio::test]
    async fn instance_membership_applies_everywhere() {
        let check = checker();
        let ctx = Context::new("inst", "admin");
        assert!(check.check(&ctx, names::ORG_DELETE, "any-org", "x").await.is_ok());
    }

    #[tokio::test]
    async fn aggregate_membership_grants_on_that_aggregate_only() {
        let check = checker();
        let ctx = Context::new("inst", "pm");
        assert!(check.check(&ctx, names::PROJECT_ROLE_WRITE, "org1", "proj1").await.is_ok());
        assert!(check.check(&ctx, names::PROJECT_ROLE_WRITE, "org1", "proj2").await.is_err());
    }

    #[tokio::test]
    async fn system_user_always_passes() {
        let check = MembershipPermissionCheck::new();
        let ctx = Context::system("inst");
        assert!(check.check(&ctx, names::ORG_CREATE, "inst", "o1").await.is_ok());
    }

    #[tokio::test]
    async fn revoked_membership_no_longer_grants() {
        let check = checker();
        check.revoke("owner", "org1");
        let ctx = Context::new("inst", "owner");
        assert!(check.check(&ctx, names::GROUP_WRITE, "org1", "g1").await.is_err());
    }
}
