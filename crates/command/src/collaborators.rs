//! Narrow contracts for secret handling, plus default implementations.
//!
//! Command handlers only see the traits. Passwords are hashed with Argon2id
//! and encoded in the PHC string format. One-time codes are random and kept as
//! salted SHA-256 digests. TOTP secrets are sealed with AES-256-GCM.

use std::time::Duration;

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use anyhow::anyhow;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::{Algorithm, Argon2, Params, Version};
use base64::engine::general_purpose::STANDARD_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Utc};
use data_encoding::BASE32_NOPAD;
use hmac::{Hmac, Mac};
use rand::distributions::Alphanumeric;
use rand::{Rng, RngCore};
use sha1::Sha1;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use thiserror::Error;

use keyward_domain::{CodeKind, CryptoValue};

// ─────────────────────────────────────────────────────────────────────────────
// Password hashing
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HashError {
    #[error("secret does not match")]
    Mismatch,
    #[error("hash encoding not supported")]
    UnsupportedEncoding,
    #[error("hashing failed: {0}")]
    Failed(String),
}

/// One-way hashing of user secrets (passwords).
pub trait SecretHasher: Send + Sync {
    fn hash(&self, plain: &str) -> Result<String, HashError>;

    fn verify(&self, encoded: &str, plain: &str) -> Result<(), HashError>;

    /// Whether `encoded` was produced by a scheme this hasher can verify.
    fn encoding_supported(&self, encoded: &str) -> bool;
}

/// Argon2id with the parameters of the `argon2` crate by default.
///
/// Hashes are PHC strings (`$argon2id$v=19$m=..,t=..,p=..$<salt>$<hash>`);
/// verification uses the parameters recorded in the hash, so hashes made
/// with other costs keep verifying.
#[derive(Debug, Clone, Default)]
pub struct Argon2SecretHasher {
    params: Params,
}

impl Argon2SecretHasher {
    /// Memory cost in KiB, iterations and lanes.
    pub fn with_costs(memory_kib: u32, iterations: u32, lanes: u32) -> Result<Self, HashError> {
        let params =
            Params::new(memory_kib, iterations, lanes, None).map_err(|e| HashError::Failed(e.to_string()))?;
        Ok(Self { params })
    }

    fn argon2(&self) -> Argon2<'static> {
        Argon2::new(Algorithm::Argon2id, Version::V0x13, self.params.clone())
    }
}

fn parsed_argon2(encoded: &str) -> Option<PasswordHash<'_>> {
    let hash = PasswordHash::new(encoded).ok()?;
    Algorithm::try_from(hash.algorithm).ok()?;
    Some(hash)
}

impl SecretHasher for Argon2SecretHasher {
    fn hash(&self, plain: &str) -> Result<String, HashError> {
        let mut salt = [0u8; 16];
        rand::thread_rng().fill_bytes(&mut salt);
        let salt = SaltString::encode_b64(&salt).map_err(|e| HashError::Failed(e.to_string()))?;
        self.argon2()
            .hash_password(plain.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|e| HashError::Failed(e.to_string()))
    }

    fn verify(&self, encoded: &str, plain: &str) -> Result<(), HashError> {
        let hash = parsed_argon2(encoded).ok_or(HashError::UnsupportedEncoding)?;
        match self.argon2().verify_password(plain.as_bytes(), &hash) {
            Ok(()) => Ok(()),
            Err(argon2::password_hash::Error::Password) => Err(HashError::Mismatch),
            Err(e) => Err(HashError::Failed(e.to_string())),
        }
    }

    fn encoding_supported(&self, encoded: &str) -> bool {
        parsed_argon2(encoded).is_some()
    }
}

fn salted_digest(salt: &[u8], plain: &str) -> Vec<u8> {
    Sha256::new()
        .chain_update(salt)
        .chain_update(plain.as_bytes())
        .finalize()
        .to_vec()
}

fn random_salt() -> [u8; 16] {
    let mut salt = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut salt);
    salt
}

// ─────────────────────────────────────────────────────────────────────────────
// One-time codes
// ─────────────────────────────────────────────────────────────────────────────

/// A freshly generated code: `plain` goes to the user, `crypted` into the event.
#[derive(Clone)]
pub struct GeneratedCode {
    pub plain: String,
    pub crypted: CryptoValue,
    pub expiry: Duration,
}

impl GeneratedCode {
    /// Absolute expiry of the code when issued at `now`.
    pub fn expires_at(&self, now: DateTime<Utc>) -> anyhow::Result<DateTime<Utc>> {
        Ok(now + chrono::Duration::from_std(self.expiry)?)
    }
}

impl core::fmt::Debug for GeneratedCode {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("GeneratedCode")
            .field("plain", &"<redacted>")
            .field("crypted", &self.crypted)
            .field("expiry", &self.expiry)
            .finish()
    }
}

/// Generates and verifies one-time codes (email verification, domain tokens, ...).
pub trait CodeGenerator: Send + Sync {
    fn generate(&self, kind: CodeKind) -> anyhow::Result<GeneratedCode>;

    fn verify(&self, crypted: &CryptoValue, plain: &str) -> bool;
}

/// Random alphanumeric codes protected by a salted SHA-256 digest.
#[derive(Debug, Clone)]
pub struct HashedCodeGenerator {
    email_expiry: Duration,
    domain_expiry: Duration,
    password_reset_expiry: Duration,
}

impl Default for HashedCodeGenerator {
    fn default() -> Self {
        Self {
            email_expiry: Duration::from_secs(60 * 60),
            domain_expiry: Duration::from_secs(7 * 24 * 60 * 60),
            password_reset_expiry: Duration::from_secs(60 * 60),
        }
    }
}

impl HashedCodeGenerator {
    fn settings(&self, kind: CodeKind) -> (usize, Duration) {
        match kind {
            CodeKind::EmailVerification => (8, self.email_expiry),
            CodeKind::DomainVerification => (32, self.domain_expiry),
            CodeKind::PasswordReset => (8, self.password_reset_expiry),
        }
    }

    fn protect(salt: &[u8], plain: &str) -> String {
        STANDARD_NO_PAD.encode(salted_digest(salt, plain))
    }
}

impl CodeGenerator for HashedCodeGenerator {
    fn generate(&self, kind: CodeKind) -> anyhow::Result<GeneratedCode> {
        let (length, expiry) = self.settings(kind);
        let plain: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(length)
            .map(char::from)
            .map(|c| c.to_ascii_uppercase())
            .collect();
        let salt = random_salt();

        Ok(GeneratedCode {
            crypted: CryptoValue {
                algorithm: "sha256".to_string(),
                key_id: STANDARD_NO_PAD.encode(salt),
                value: Self::protect(&salt, &plain),
            },
            plain,
            expiry,
        })
    }

    fn verify(&self, crypted: &CryptoValue, plain: &str) -> bool {
        if crypted.algorithm != "sha256" {
            return false;
        }
        let Ok(salt) = STANDARD_NO_PAD.decode(&crypted.key_id) else {
            return false;
        };
        Self::protect(&salt, plain)
            .as_bytes()
            .ct_eq(crypted.value.as_bytes())
            .into()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Time-based one-time passwords
// ─────────────────────────────────────────────────────────────────────────────

const SEALED_ALGORITHM: &str = "aes256gcm";
const TOTP_DIGITS: u32 = 6;
const TOTP_STEP_SECS: i64 = 30;
/// Steps accepted on either side of the current one.
const TOTP_SKEW: i64 = 1;

type HmacSha1 = Hmac<Sha1>;

/// A new TOTP secret: `secret` (base32) and `uri` go to the user's
/// authenticator, `crypted` into the event.
#[derive(Clone)]
pub struct OtpEnrollment {
    pub secret: String,
    pub uri: String,
    pub crypted: CryptoValue,
}

impl core::fmt::Debug for OtpEnrollment {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("OtpEnrollment")
            .field("secret", &"<redacted>")
            .field("crypted", &self.crypted)
            .finish_non_exhaustive()
    }
}

/// Issues and checks TOTP secrets for the second factor.
pub trait OtpProvider: Send + Sync {
    fn enroll(&self, issuer: &str, account: &str) -> anyhow::Result<OtpEnrollment>;

    fn verify(&self, crypted: &CryptoValue, code: &str) -> bool;
}

/// RFC 6238 codes (HMAC-SHA1, 6 digits, 30 second steps). Secrets are sealed
/// with AES-256-GCM under `key`, so only a provider holding the same key can
/// verify them.
#[derive(Clone)]
pub struct TotpProvider {
    key: [u8; 32],
}

impl TotpProvider {
    pub fn new(key: [u8; 32]) -> Self {
        Self { key }
    }

    /// Key only valid for the lifetime of the process.
    pub fn with_random_key() -> Self {
        let mut key = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut key);
        Self::new(key)
    }

    fn cipher(&self) -> anyhow::Result<Aes256Gcm> {
        <Aes256Gcm as KeyInit>::new_from_slice(&self.key).map_err(|_| anyhow!("invalid otp key length"))
    }

    fn seal(&self, secret: &[u8]) -> anyhow::Result<CryptoValue> {
        let mut nonce = [0u8; 12];
        rand::thread_rng().fill_bytes(&mut nonce);
        let sealed = self
            .cipher()?
            .encrypt(Nonce::from_slice(&nonce), secret)
            .map_err(|_| anyhow!("otp secret encryption failed"))?;
        Ok(CryptoValue {
            algorithm: SEALED_ALGORITHM.to_string(),
            key_id: STANDARD_NO_PAD.encode(nonce),
            value: STANDARD_NO_PAD.encode(sealed),
        })
    }

    fn open(&self, crypted: &CryptoValue) -> Option<Vec<u8>> {
        if crypted.algorithm != SEALED_ALGORITHM {
            return None;
        }
        let nonce = STANDARD_NO_PAD.decode(&crypted.key_id).ok()?;
        let sealed = STANDARD_NO_PAD.decode(&crypted.value).ok()?;
        if nonce.len() != 12 {
            return None;
        }
        self.cipher()
            .ok()?
            .decrypt(Nonce::from_slice(&nonce), sealed.as_slice())
            .ok()
    }
}

impl core::fmt::Debug for TotpProvider {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("TotpProvider").field("key", &"<redacted>").finish()
    }
}

/// HOTP value for `counter` (RFC 4226 dynamic truncation).
fn hotp(secret: &[u8], counter: u64) -> Option<String> {
    let mut mac = <HmacSha1 as Mac>::new_from_slice(secret).ok()?;
    mac.update(&counter.to_be_bytes());
    let digest = mac.finalize().into_bytes();
    let offset = usize::from(digest[digest.len() - 1] & 0x0f);
    let binary = u32::from_be_bytes([
        digest[offset] & 0x7f,
        digest[offset + 1],
        digest[offset + 2],
        digest[offset + 3],
    ]);
    Some(format!(
        "{:0width$}",
        binary % 10u32.pow(TOTP_DIGITS),
        width = TOTP_DIGITS as usize
    ))
}

/// The code an authenticator shows at `at` for a base32 `secret`.
pub fn totp_code(secret: &str, at: DateTime<Utc>) -> Option<String> {
    let secret = BASE32_NOPAD.decode(secret.as_bytes()).ok()?;
    let counter = u64::try_from(at.timestamp().div_euclid(TOTP_STEP_SECS)).ok()?;
    hotp(&secret, counter)
}

impl OtpProvider for TotpProvider {
    fn enroll(&self, issuer: &str, account: &str) -> anyhow::Result<OtpEnrollment> {
        let mut secret = [0u8; 20];
        rand::thread_rng().fill_bytes(&mut secret);
        let encoded = BASE32_NOPAD.encode(&secret);
        let uri = format!(
            "otpauth://totp/{issuer}:{account}?secret={encoded}&issuer={issuer}&algorithm=SHA1&digits={TOTP_DIGITS}&period={TOTP_STEP_SECS}"
        );
        Ok(OtpEnrollment {
            crypted: self.seal(&secret)?,
            secret: encoded,
            uri,
        })
    }

    fn verify(&self, crypted: &CryptoValue, code: &str) -> bool {
        let Some(secret) = self.open(crypted) else {
            return false;
        };
        let current = Utc::now().timestamp().div_euclid(TOTP_STEP_SECS);
        (current - TOTP_SKEW..=current + TOTP_SKEW)
            .filter_map(|step| u64::try_from(step).ok())
            .filter_map(|counter| hotp(&secret, counter))
            .fold(false, |matched, expected| {
                matched | bool::from(expected.as_bytes().ct_eq(code.as_bytes()))
            })
    }
}
