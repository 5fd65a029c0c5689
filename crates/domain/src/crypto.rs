use serde::{Deserialize, Serialize};

/// Protected secret material as carried inside events (hashed or encrypted code).
///
/// Never contains the plain text. `Debug` redacts the value anyway so accidental
/// logging of an event does not leak verifier material.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CryptoValue {
    /// Algorithm identifier understood by the code generator (e.g. `"sha256"`).
    pub algorithm: String,
    /// Key or salt reference needed to verify `value`.
    pub key_id: String,
    pub value: String,
}

impl core::fmt::Debug for CryptoValue {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("CryptoValue")
            .field("algorithm", &self.algorithm)
            .field("key_id", &self.key_id)
            .field("value", &"<redacted>")
            .finish()
    }
}

/// Purpose of a generated one-time code; generators may apply different
/// lengths and lifetimes per kind.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CodeKind {
    EmailVerification,
    DomainVerification,
    PasswordReset,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_redacts_value() {
        let v = CryptoValue {
            algorithm: "sha256".into(),
            key_id: "salt".into(),
            value: "deadbeef".into(),
        };
        let printed = format!("{v:?}");
        assert!(!printed.contains("deadbeef"));
        assert!(printed.contains("sha256"));
    }
}
