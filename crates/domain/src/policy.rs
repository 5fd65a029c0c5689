//! Password complexity policy.

use serde::{Deserialize, Serialize};

use keyward_core::{DomainError, DomainResult};

/// Rules a new password must satisfy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PasswordComplexityPolicy {
    pub min_length: u64,
    pub has_uppercase: bool,
    pub has_lowercase: bool,
    pub has_number: bool,
    pub has_symbol: bool,
}

impl Default for PasswordComplexityPolicy {
    fn default() -> Self {
        Self {
            min_length: 8,
            has_uppercase: true,
            has_lowercase: true,
            has_number: true,
            has_symbol: true,
        }
    }
}

impl PasswordComplexityPolicy {
    /// Structural validity of the policy itself.
    pub fn validate(&self) -> DomainResult<()> {
        if self.min_length == 0 {
            return Err(DomainError::invalid_argument(
                "POLICY-0001",
                "errors.policy.password_complexity.min_length_invalid",
            ));
        }
        Ok(())
    }

    /// Check a plain password against the policy.
    pub fn check(&self, password: &str) -> DomainResult<()> {
        if (password.chars().count() as u64) < self.min_length {
            return Err(DomainError::invalid_argument(
                "POLICY-0002",
                "errors.policy.password_complexity.too_short",
            ));
        }
        if self.has_lowercase && !password.chars().any(|c| c.is_lowercase()) {
            return Err(DomainError::invalid_argument(
                "POLICY-0003",
                "errors.policy.password_complexity.missing_lowercase",
            ));
        }
        if self.has_uppercase && !password.chars().any(|c| c.is_uppercase()) {
            return Err(DomainError::invalid_argument(
                "POLICY-0004",
                "errors.policy.password_complexity.missing_uppercase",
            ));
        }
        if self.has_number && !password.chars().any(|c| c.is_ascii_digit()) {
            return Err(DomainError::invalid_argument(
                "POLICY-0005",
                "errors.policy.password_complexity.missing_number",
            ));
        }
        if self.has_symbol && !password.chars().any(|c| !c.is_alphanumeric()) {
            return Err(DomainError::invalid_argument(
                "POLICY-0006",
                "errors.policy.password_complexity.missing_symbol",
            ));
        }
        Ok(())
    }
}
