use std::sync::Arc;

use chrono::{DateTime, Utc};

use keyward_auth::PermissionCheck;
use keyward_core::{IdGenerator, UuidV7Generator};
use keyward_domain::CodeKind;
use keyward_infra::config::EngineConfig;
use keyward_infra::event_store::EventStore;

use crate::collaborators::{
    Argon2SecretHasher, CodeGenerator, GeneratedCode, HashedCodeGenerator, OtpProvider, SecretHasher, TotpProvider,
};
use crate::error::{CommandError, CommandResult};

/// Command orchestrator: one method per business operation.
///
/// Holds only shared, stateless collaborators, so a single instance serves all
/// requests concurrently. Write models are created per call and never cached.
///
/// ```text
/// Commands::create_group(ctx, input)
///   -> validate input                     (no I/O)
///   -> check permission                   (PermissionCheck)
///   -> load write model(s)                (EventStore::filter)
///   -> check invariants, build events
///   -> push with concurrency guard(s)     (EventStore::push)
///   -> fold pushed events, return ObjectDetails
/// ```
#[derive(Clone)]
pub struct Commands {
    pub(crate) store: Arc<dyn EventStore>,
    pub(crate) permissions: Arc<dyn PermissionCheck>,
    pub(crate) ids: Arc<dyn IdGenerator>,
    pub(crate) hasher: Arc<dyn SecretHasher>,
    pub(crate) codes: Arc<dyn CodeGenerator>,
    pub(crate) otp: Arc<dyn OtpProvider>,
    pub(crate) config: EngineConfig,
}

impl Commands {
    /// Orchestrator with default collaborators and configuration. The default
    /// TOTP key lives only as long as the process; deployments that keep
    /// second factors across restarts supply their own provider.
    pub fn new(store: Arc<dyn EventStore>, permissions: Arc<dyn PermissionCheck>) -> Self {
        Self {
            store,
            permissions,
            ids: Arc::new(UuidV7Generator),
            hasher: Arc::new(Argon2SecretHasher::default()),
            codes: Arc::new(HashedCodeGenerator::default()),
            otp: Arc::new(TotpProvider::with_random_key()),
            config: EngineConfig::default(),
        }
    }

    pub fn with_id_generator(mut self, ids: Arc<dyn IdGenerator>) -> Self {
        self.ids = ids;
        self
    }

    pub fn with_hasher(mut self, hasher: Arc<dyn SecretHasher>) -> Self {
        self.hasher = hasher;
        self
    }

    pub fn with_code_generator(mut self, codes: Arc<dyn CodeGenerator>) -> Self {
        self.codes = codes;
        self
    }

    pub fn with_otp_provider(mut self, otp: Arc<dyn OtpProvider>) -> Self {
        self.otp = otp;
        self
    }

    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    #[cfg(test)]
    pub(crate) fn with_store(mut self, store: Arc<dyn EventStore>) -> Self {
        self.store = store;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Caller-provided id, or a fresh one when `id` is `None` or blank.
    pub(crate) fn id_or_next(&self, id: Option<&str>) -> CommandResult<String> {
        match id.map(str::trim).filter(|id| !id.is_empty()) {
            Some(id) => Ok(id.to_string()),
            None => self.ids.next_id().map_err(CommandError::collaborator),
        }
    }

    /// Fresh one-time code and its absolute expiry.
    pub(crate) fn generate_code(&self, kind: CodeKind) -> CommandResult<(GeneratedCode, DateTime<Utc>)> {
        let code = self.codes.generate(kind).map_err(CommandError::collaborator)?;
        let expires_at = code.expires_at(Utc::now()).map_err(CommandError::collaborator)?;
        Ok((code, expires_at))
    }
}

impl core::fmt::Debug for Commands {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Commands")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
