//! User events (human users, their email, password, second factor, lifecycle
//! and metadata).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use keyward_events::EventFamily;

use crate::crypto::CryptoValue;

pub const AGGREGATE_TYPE: &str = "user";

pub const HUMAN_ADDED: &str = "user.human.added";
pub const HUMAN_PROFILE_CHANGED: &str = "user.human.profile.changed";
pub const HUMAN_EMAIL_CHANGED: &str = "user.human.email.changed";
pub const HUMAN_EMAIL_CODE_ADDED: &str = "user.human.email.code.added";
pub const HUMAN_EMAIL_VERIFIED: &str = "user.human.email.verified";
pub const HUMAN_EMAIL_VERIFICATION_FAILED: &str = "user.human.email.verification.failed";
pub const HUMAN_PASSWORD_CHANGED: &str = "user.human.password.changed";
pub const HUMAN_OTP_ADDED: &str = "user.human.mfa.otp.added";
pub const HUMAN_OTP_VERIFIED: &str = "user.human.mfa.otp.verified";
pub const HUMAN_OTP_REMOVED: &str = "user.human.mfa.otp.removed";
pub const USER_LOCKED: &str = "user.locked";
pub const USER_UNLOCKED: &str = "user.unlocked";
pub const USER_DEACTIVATED: &str = "user.deactivated";
pub const USER_REACTIVATED: &str = "user.reactivated";
pub const USER_REMOVED: &str = "user.removed";
pub const METADATA_SET: &str = "user.metadata.set";
pub const METADATA_REMOVED: &str = "user.metadata.removed";
pub const METADATA_REMOVED_ALL: &str = "user.metadata.removed.all";

/// Event types that decide whether a user exists and is usable.
pub const LIFECYCLE_EVENT_TYPES: &[&str] = &[
    HUMAN_ADDED,
    USER_LOCKED,
    USER_UNLOCKED,
    USER_DEACTIVATED,
    USER_REACTIVATED,
    USER_REMOVED,
];

pub const METADATA_EVENT_TYPES: &[&str] = &[METADATA_SET, METADATA_REMOVED, METADATA_REMOVED_ALL];

pub const OTP_EVENT_TYPES: &[&str] = &[HUMAN_OTP_ADDED, HUMAN_OTP_VERIFIED, HUMAN_OTP_REMOVED];

// ─────────────────────────────────────────────────────────────────────────────
// State
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Copy, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum UserState {
    #[default]
    Unspecified,
    Active,
    Inactive,
    Locked,
    Removed,
}

impl UserState {
    pub fn exists(self) -> bool {
        matches!(self, UserState::Active | UserState::Inactive | UserState::Locked)
    }
}

/// Lifecycle of one second factor of a user.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum FactorState {
    #[default]
    Unspecified,
    /// Added but the user has not proven possession yet.
    NotReady,
    Ready,
    Removed,
}

impl FactorState {
    pub fn exists(self) -> bool {
        matches!(self, FactorState::NotReady | FactorState::Ready)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Events
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HumanAdded {
    pub username: String,
    pub given_name: String,
    pub family_name: String,
    pub display_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preferred_language: Option<String>,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password_hash: Option<String>,
    #[serde(default)]
    pub password_change_required: bool,
}

/// Only the fields that changed are present.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HumanProfileChanged {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub given_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub family_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preferred_language: Option<String>,
}

impl HumanProfileChanged {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HumanEmailChanged {
    pub email: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HumanEmailCodeAdded {
    pub code: CryptoValue,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HumanEmailVerified {}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HumanEmailVerificationFailed {}

/// `hash` is the encoded output of the password hasher, never the plain text.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct HumanPasswordChanged {
    pub hash: String,
    #[serde(default)]
    pub change_required: bool,
}

impl core::fmt::Debug for HumanPasswordChanged {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("HumanPasswordChanged")
            .field("hash", &"<redacted>")
            .field("change_required", &self.change_required)
            .finish()
    }
}

/// `secret` is the sealed TOTP secret.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HumanOtpAdded {
    pub secret: CryptoValue,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HumanOtpVerified {}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HumanOtpRemoved {}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserLocked {}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserUnlocked {}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserDeactivated {}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserReactivated {}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserRemoved {
    pub username: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetadataSet {
    pub key: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetadataRemoved {
    pub key: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetadataRemovedAll {}

/// All user events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum UserEvent {
    #[serde(rename = "user.human.added")]
    HumanAdded(HumanAdded),
    #[serde(rename = "user.human.profile.changed")]
    HumanProfileChanged(HumanProfileChanged),
    #[serde(rename = "user.human.email.changed")]
    HumanEmailChanged(HumanEmailChanged),
    #[serde(rename = "user.human.email.code.added")]
    HumanEmailCodeAdded(HumanEmailCodeAdded),
    #[serde(rename = "user.human.email.verified")]
    HumanEmailVerified(HumanEmailVerified),
    #[serde(rename = "user.human.email.verification.failed")]
    HumanEmailVerificationFailed(HumanEmailVerificationFailed),
    #[serde(rename = "user.human.password.changed")]
    HumanPasswordChanged(HumanPasswordChanged),
    #[serde(rename = "user.human.mfa.otp.added")]
    HumanOtpAdded(HumanOtpAdded),
    #[serde(rename = "user.human.mfa.otp.verified")]
    HumanOtpVerified(HumanOtpVerified),
    #[serde(rename = "user.human.mfa.otp.removed")]
    HumanOtpRemoved(HumanOtpRemoved),
    #[serde(rename = "user.locked")]
    Locked(UserLocked),
    #[serde(rename = "user.unlocked")]
    Unlocked(UserUnlocked),
    #[serde(rename = "user.deactivated")]
    Deactivated(UserDeactivated),
    #[serde(rename = "user.reactivated")]
    Reactivated(UserReactivated),
    #[serde(rename = "user.removed")]
    Removed(UserRemoved),
    #[serde(rename = "user.metadata.set")]
    MetadataSet(MetadataSet),
    #[serde(rename = "user.metadata.removed")]
    MetadataRemoved(MetadataRemoved),
    #[serde(rename = "user.metadata.removed.all")]
    MetadataRemovedAll(MetadataRemovedAll),
}

impl EventFamily for UserEvent {
    const AGGREGATE_TYPE: &'static str = AGGREGATE_TYPE;
    const EVENT_TYPES: &'static [&'static str] = &[
        HUMAN_ADDED,
        HUMAN_PROFILE_CHANGED,
        HUMAN_EMAIL_CHANGED,
        HUMAN_EMAIL_CODE_ADDED,
        HUMAN_EMAIL_VERIFIED,
        HUMAN_EMAIL_VERIFICATION_FAILED,
        HUMAN_PASSWORD_CHANGED,
        HUMAN_OTP_ADDED,
        HUMAN_OTP_VERIFIED,
        HUMAN_OTP_REMOVED,
        USER_LOCKED,
        USER_UNLOCKED,
        USER_DEACTIVATED,
        USER_REACTIVATED,
        USER_REMOVED,
        METADATA_SET,
        METADATA_REMOVED,
        METADATA_REMOVED_ALL,
    ];

    fn event_type(&self) -> &'static str {
        match self {
            UserEvent::HumanAdded(_) => HUMAN_ADDED,
            UserEvent::HumanProfileChanged(_) => HUMAN_PROFILE_CHANGED,
            UserEvent::HumanEmailChanged(_) => HUMAN_EMAIL_CHANGED,
            UserEvent::HumanEmailCodeAdded(_) => HUMAN_EMAIL_CODE_ADDED,
            UserEvent::HumanEmailVerified(_) => HUMAN_EMAIL_VERIFIED,
            UserEvent::HumanEmailVerificationFailed(_) => HUMAN_EMAIL_VERIFICATION_FAILED,
            UserEvent::HumanPasswordChanged(_) => HUMAN_PASSWORD_CHANGED,
            UserEvent::HumanOtpAdded(_) => HUMAN_OTP_ADDED,
            UserEvent::HumanOtpVerified(_) => HUMAN_OTP_VERIFIED,
            UserEvent::HumanOtpRemoved(_) => HUMAN_OTP_REMOVED,
            UserEvent::Locked(_) => USER_LOCKED,
            UserEvent::Unlocked(_) => USER_UNLOCKED,
            UserEvent::Deactivated(_) => USER_DEACTIVATED,
            UserEvent::Reactivated(_) => USER_REACTIVATED,
            UserEvent::Removed(_) => USER_REMOVED,
            UserEvent::MetadataSet(_) => METADATA_SET,
            UserEvent::MetadataRemoved(_) => METADATA_REMOVED,
            UserEvent::MetadataRemovedAll(_) => METADATA_REMOVED_ALL,
        }
    }
}

/// State transition caused by a lifecycle event, if any.
pub fn lifecycle_transition(event: &UserEvent) -> Option<UserState> {
    match event {
        UserEvent::HumanAdded(_) | UserEvent::Unlocked(_) | UserEvent::Reactivated(_) => {
            Some(UserState::Active)
        }
        UserEvent::Locked(_) => Some(UserState::Locked),
        UserEvent::Deactivated(_) => Some(UserState::Inactive),
        UserEvent::Removed(_) => Some(UserState::Removed),
        _ => None,
    }
}
