//! Organization events (org lifecycle, org domains, org-level policies).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use keyward_events::EventFamily;

use crate::crypto::CryptoValue;
use crate::policy::PasswordComplexityPolicy;

pub const AGGREGATE_TYPE: &str = "org";

pub const ORG_ADDED: &str = "org.added";
pub const ORG_CHANGED: &str = "org.changed";
pub const ORG_DEACTIVATED: &str = "org.deactivated";
pub const ORG_REACTIVATED: &str = "org.reactivated";
pub const ORG_REMOVED: &str = "org.removed";
pub const DOMAIN_ADDED: &str = "org.domain.added";
pub const DOMAIN_VERIFICATION_ADDED: &str = "org.domain.verification.added";
pub const DOMAIN_VERIFICATION_FAILED: &str = "org.domain.verification.failed";
pub const DOMAIN_VERIFIED: &str = "org.domain.verified";
pub const DOMAIN_PRIMARY_SET: &str = "org.domain.primary.set";
pub const DOMAIN_REMOVED: &str = "org.domain.removed";
pub const PASSWORD_COMPLEXITY_ADDED: &str = "org.policy.password.complexity.added";
pub const PASSWORD_COMPLEXITY_CHANGED: &str = "org.policy.password.complexity.changed";
pub const PASSWORD_COMPLEXITY_REMOVED: &str = "org.policy.password.complexity.removed";

// ─────────────────────────────────────────────────────────────────────────────
// State
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Copy, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum OrgState {
    #[default]
    Unspecified,
    Active,
    Inactive,
    Removed,
}

impl OrgState {
    pub fn exists(self) -> bool {
        matches!(self, OrgState::Active | OrgState::Inactive)
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum OrgDomainState {
    #[default]
    Unspecified,
    Active,
    Removed,
}

impl OrgDomainState {
    pub fn exists(self) -> bool {
        self == OrgDomainState::Active
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Events
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrgAdded {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrgChanged {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrgDeactivated {}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrgReactivated {}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrgRemoved {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainAdded {
    pub domain: String,
}

/// A verification token was issued for the domain; `code` protects it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainVerificationAdded {
    pub domain: String,
    pub code: CryptoValue,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainVerificationFailed {
    pub domain: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainVerified {
    pub domain: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainPrimarySet {
    pub domain: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainRemoved {
    pub domain: String,
    pub was_verified: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PasswordComplexityPolicyAdded {
    pub policy: PasswordComplexityPolicy,
}

/// Only the fields that changed are present.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PasswordComplexityPolicyChanged {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_length: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub has_uppercase: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub has_lowercase: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub has_number: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub has_symbol: Option<bool>,
}

impl PasswordComplexityPolicyChanged {
    /// Diff `current` against `desired`; `None` when nothing differs.
    pub fn diff(current: &PasswordComplexityPolicy, desired: &PasswordComplexityPolicy) -> Option<Self> {
        let changed = Self {
            min_length: (current.min_length != desired.min_length).then_some(desired.min_length),
            has_uppercase: (current.has_uppercase != desired.has_uppercase).then_some(desired.has_uppercase),
            has_lowercase: (current.has_lowercase != desired.has_lowercase).then_some(desired.has_lowercase),
            has_number: (current.has_number != desired.has_number).then_some(desired.has_number),
            has_symbol: (current.has_symbol != desired.has_symbol).then_some(desired.has_symbol),
        };
        (changed != Self::default()).then_some(changed)
    }

    pub fn apply_to(&self, policy: &mut PasswordComplexityPolicy) {
        if let Some(v) = self.min_length {
            policy.min_length = v;
        }
        if let Some(v) = self.has_uppercase {
            policy.has_uppercase = v;
        }
        if let Some(v) = self.has_lowercase {
            policy.has_lowercase = v;
        }
        if let Some(v) = self.has_number {
            policy.has_number = v;
        }
        if let Some(v) = self.has_symbol {
            policy.has_symbol = v;
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PasswordComplexityPolicyRemoved {}

/// All organization events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum OrgEvent {
    #[serde(rename = "org.added")]
    Added(OrgAdded),
    #[serde(rename = "org.changed")]
    Changed(OrgChanged),
    #[serde(rename = "org.deactivated")]
    Deactivated(OrgDeactivated),
    #[serde(rename = "org.reactivated")]
    Reactivated(OrgReactivated),
    #[serde(rename = "org.removed")]
    Removed(OrgRemoved),
    #[serde(rename = "org.domain.added")]
    DomainAdded(DomainAdded),
    #[serde(rename = "org.domain.verification.added")]
    DomainVerificationAdded(DomainVerificationAdded),
    #[serde(rename = "org.domain.verification.failed")]
    DomainVerificationFailed(DomainVerificationFailed),
    #[serde(rename = "org.domain.verified")]
    DomainVerified(DomainVerified),
    #[serde(rename = "org.domain.primary.set")]
    DomainPrimarySet(DomainPrimarySet),
    #[serde(rename = "org.domain.removed")]
    DomainRemoved(DomainRemoved),
    #[serde(rename = "org.policy.password.complexity.added")]
    PasswordComplexityPolicyAdded(PasswordComplexityPolicyAdded),
    #[serde(rename = "org.policy.password.complexity.changed")]
    PasswordComplexityPolicyChanged(PasswordComplexityPolicyChanged),
    #[serde(rename = "org.policy.password.complexity.removed")]
    PasswordComplexityPolicyRemoved(PasswordComplexityPolicyRemoved),
}

impl OrgEvent {
    /// Domain referenced by a domain event.
    pub fn domain(&self) -> Option<&str> {
        match self {
            OrgEvent::DomainAdded(e) => Some(&e.domain),
            OrgEvent::DomainVerificationAdded(e) => Some(&e.domain),
            OrgEvent::DomainVerificationFailed(e) => Some(&e.domain),
            OrgEvent::DomainVerified(e) => Some(&e.domain),
            OrgEvent::DomainPrimarySet(e) => Some(&e.domain),
            OrgEvent::DomainRemoved(e) => Some(&e.domain),
            _ => None,
        }
    }
}

impl EventFamily for OrgEvent {
    const AGGREGATE_TYPE: &'static str = AGGREGATE_TYPE;
    const EVENT_TYPES: &'static [&'static str] = &[
        ORG_ADDED,
        ORG_CHANGED,
        ORG_DEACTIVATED,
        ORG_REACTIVATED,
        ORG_REMOVED,
        DOMAIN_ADDED,
        DOMAIN_VERIFICATION_ADDED,
        DOMAIN_VERIFICATION_FAILED,
        DOMAIN_VERIFIED,
        DOMAIN_PRIMARY_SET,
        DOMAIN_REMOVED,
        PASSWORD_COMPLEXITY_ADDED,
        PASSWORD_COMPLEXITY_CHANGED,
        PASSWORD_COMPLEXITY_REMOVED,
    ];

    fn event_type(&self) -> &'static str {
        match self {
            OrgEvent::Added(_) => ORG_ADDED,
            OrgEvent::Changed(_) => ORG_CHANGED,
            OrgEvent::Deactivated(_) => ORG_DEACTIVATED,
            OrgEvent::Reactivated(_) => ORG_REACTIVATED,
            OrgEvent::Removed(_) => ORG_REMOVED,
            OrgEvent::DomainAdded(_) => DOMAIN_ADDED,
            OrgEvent::DomainVerificationAdded(_) => DOMAIN_VERIFICATION_ADDED,
            OrgEvent::DomainVerificationFailed(_) => DOMAIN_VERIFICATION_FAILED,
            OrgEvent::DomainVerified(_) => DOMAIN_VERIFIED,
            OrgEvent::DomainPrimarySet(_) => DOMAIN_PRIMARY_SET,
            OrgEvent::DomainRemoved(_) => DOMAIN_REMOVED,
            OrgEvent::PasswordComplexityPolicyAdded(_) => PASSWORD_COMPLEXITY_ADDED,
            OrgEvent::PasswordComplexityPolicyChanged(_) => PASSWORD_COMPLEXITY_CHANGED,
            OrgEvent::PasswordComplexityPolicyRemoved(_) => PASSWORD_COMPLEXITY_REMOVED,
        }
    }
}

/// Domain generated for an organization from its name, e.g. `"ACME Corp"` ->
/// `"acme-corp.<suffix>"`. Names without any ASCII letter or digit fall back
/// to the org id so no two orgs share a generated domain.
pub fn generated_domain(org_name: &str, org_id: &str, suffix: &str) -> String {
    let mut label = dns_label(org_name);
    if label.is_empty() {
        label = dns_label(org_id);
    }
    format!("{label}.{suffix}")
}

fn dns_label(value: &str) -> String {
    let mut label = String::with_capacity(value.len());
    let mut dash = false;
    for c in value.trim().chars().flat_map(char::to_lowercase) {
        if c.is_ascii_alphanumeric() {
            label.push(c);
            dash = false;
        } else if !dash && !label.is_empty() {
            label.push('-');
            dash = true;
        }
    }
    label.trim_end_matches('-').to_string()
}
