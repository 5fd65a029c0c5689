use std::collections::HashSet;

use thiserror::Error;

use keyward_core::DomainError;

use crate::Permission;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthzError {
    #[error("forbidden: missing permission '{0}'")]
    Forbidden(String),
}

impl From<AuthzError> for DomainError {
    fn from(_: AuthzError) -> Self {
        DomainError::permission_denied("AUTHZ-0001", "errors.permission.denied")
    }
}

/// Check a set of effective permissions against a required one.
///
/// - No IO
/// - No panics
/// - No business logic (pure policy check)
pub fn authorize(granted: &[Permission], required: &Permission) -> Result<(), AuthzError> {
    let perms: HashSet<&str> = granted.iter().map(|p| p.as_str()).collect();

    if perms.contains(Permission::WILDCARD) || perms.contains(required.as_str()) {
        Ok(())
    } else {
        Err(AuthzError::Forbidden(required.as_str().to_string()))
    }
}

#[cfg(test)]
mod tests {
    use keyward_core::ErrorKind;

    use super::*;

    #[test]
    fn explicit_permission_is_granted() {
        let granted = [Permission::new("group.write")];
        assert!(authorize(&granted, &Permission::new("group.write")).is_ok());
    }

    #[test]
    fn wildcard_grants_everything() {
        let granted = [Permission::new("*")];
        assert!(authorize(&granted, &Permission::new("org.delete")).is_ok());
    }

    #[test]
    fn missing_permission_is_forbidden() {
        let granted = [Permission::new("group.write")];
        let err = authorize(&granted, &Permission::new("group.delete")).unwrap_err();
        assert_eq!(err, AuthzError::Forbidden("group.delete".into()));
        assert_eq!(DomainError::from(err).kind(), ErrorKind::PermissionDenied);
    }
}
