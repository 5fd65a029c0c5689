//! Runtime configuration, read from the environment.
//!
//! | variable | default |
//! |---|---|
//! | `KEYWARD_DEFAULT_DOMAIN` | `keyward.localhost` |
//! | `KEYWARD_COMMAND_TIMEOUT_MS` | `10000` |
//! | `KEYWARD_PASSWORD_MIN_LENGTH` | `8` |
//! | `KEYWARD_PASSWORD_REQUIRE_UPPERCASE` | `true` |
//! | `KEYWARD_PASSWORD_REQUIRE_LOWERCASE` | `true` |
//! | `KEYWARD_PASSWORD_REQUIRE_NUMBER` | `true` |
//! | `KEYWARD_PASSWORD_REQUIRE_SYMBOL` | `true` |

use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

use keyward_domain::PasswordComplexityPolicy;

pub const DEFAULT_DOMAIN: &str = "keyward.localhost";
pub const DEFAULT_COMMAND_TIMEOUT_MS: u64 = 10_000;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value for {name}: '{value}'")]
    Invalid { name: &'static str, value: String },
}

/// Settings the command engine needs at runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Suffix of the domain generated for every new organization.
    pub default_domain: String,
    /// Deadline callers apply to each command's context.
    pub command_timeout: Duration,
    /// Password complexity used for organizations without their own policy.
    pub default_password_policy: PasswordComplexityPolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_domain: DEFAULT_DOMAIN.to_string(),
            command_timeout: Duration::from_millis(DEFAULT_COMMAND_TIMEOUT_MS),
            default_password_policy: PasswordComplexityPolicy::default(),
        }
    }
}

impl EngineConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from an arbitrary variable source (missing variables use defaults).
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let policy = &defaults.default_password_policy;

        let default_domain = lookup("KEYWARD_DEFAULT_DOMAIN")
            .map(|d| d.trim().to_string())
            .unwrap_or(defaults.default_domain.clone());
        if default_domain.is_empty() {
            return Err(ConfigError::Invalid {
                name: "KEYWARD_DEFAULT_DOMAIN",
                value: default_domain,
            });
        }

        let timeout_ms = parse(&lookup, "KEYWARD_COMMAND_TIMEOUT_MS", DEFAULT_COMMAND_TIMEOUT_MS)?;
        let default_password_policy = PasswordComplexityPolicy {
            min_length: parse(&lookup, "KEYWARD_PASSWORD_MIN_LENGTH", policy.min_length)?,
            has_uppercase: parse(&lookup, "KEYWARD_PASSWORD_REQUIRE_UPPERCASE", policy.has_uppercase)?,
            has_lowercase: parse(&lookup, "KEYWARD_PASSWORD_REQUIRE_LOWERCASE", policy.has_lowercase)?,
            has_number: parse(&lookup, "KEYWARD_PASSWORD_REQUIRE_NUMBER", policy.has_number)?,
            has_symbol: parse(&lookup, "KEYWARD_PASSWORD_REQUIRE_SYMBOL", policy.has_symbol)?,
        };
        if default_password_policy.validate().is_err() {
            return Err(ConfigError::Invalid {
                name: "KEYWARD_PASSWORD_MIN_LENGTH",
                value: default_password_policy.min_length.to_string(),
            });
        }

        Ok(Self {
            default_domain,
            command_timeout: Duration::from_millis(timeout_ms),
            default_password_policy,
        })
    }
}

fn parse<F, T>(lookup: &F, name: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(name) {
        None => Ok(default),
        Some(raw) => raw.trim().parse::<T>().map_err(|_| ConfigError::Invalid { name, value: raw }),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn defaults_apply_when_unset() {
        let cfg = EngineConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(cfg, EngineConfig::default());
    }

    #[test]
    fn values_are_parsed() {
        let cfg = EngineConfig::from_lookup(lookup(&[
            ("KEYWARD_DEFAULT_DOMAIN", "id.example.com"),
            ("KEYWARD_COMMAND_TIMEOUT_MS", "250"),
            ("KEYWARD_PASSWORD_MIN_LENGTH", "12"),
            ("KEYWARD_PASSWORD_REQUIRE_SYMBOL", "false"),
        ]))
        .unwrap();
        assert_eq!(cfg.default_domain, "id.example.com");
        assert_eq!(cfg.command_timeout, Duration::from_millis(250));
        assert_eq!(cfg.default_password_policy.min_length, 12);
        assert!(!cfg.default_password_policy.has_symbol);
        assert!(cfg.default_password_policy.has_number);
    }

    #[test]
    fn malformed_values_are_errors() {
        let err = EngineConfig::from_lookup(lookup(&[("KEYWARD_COMMAND_TIMEOUT_MS", "soon")])).unwrap_err();
        assert_eq!(
            err,
            ConfigError::Invalid {
                name: "KEYWARD_COMMAND_TIMEOUT_MS",
                value: "soon".into()
            }
        );
        assert!(EngineConfig::from_lookup(lookup(&[("KEYWARD_PASSWORD_MIN_LENGTH", "0")])).is_err());
        assert!(EngineConfig::from_lookup(lookup(&[("KEYWARD_DEFAULT_DOMAIN", " ")])).is_err());
    }
}
