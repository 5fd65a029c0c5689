//! Shared fixtures for handler tests.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use keyward_auth::{Membership, MembershipPermissionCheck, Role};
use keyward_core::{Context, SequentialIdGenerator};
use keyward_domain::{CodeKind, CryptoValue};
use keyward_infra::event_store::{
    ConcurrencyGuard, EventStore, EventStoreError, InMemoryEventStore, SearchQuery, StoredEvent, UncommittedEvent,
};

use crate::action::AddTarget;
use crate::collaborators::{Argon2SecretHasher, CodeGenerator, GeneratedCode};
use crate::commands::Commands;
use crate::org::AddOrg;
use crate::user::AddHuman;

pub const INSTANCE: &str = "inst";
pub const ADMIN: &str = "admin";
/// Satisfies the default complexity policy.
pub const PASSWORD: &str = "Secr3t!Password";

pub struct Fixture {
    pub commands: Commands,
    pub store: Arc<InMemoryEventStore>,
    pub permissions: Arc<MembershipPermissionCheck>,
}

impl Fixture {
    /// Context of an instance owner.
    pub fn ctx(&self) -> Context {
        Context::new(INSTANCE, ADMIN)
    }

    pub fn ctx_for(&self, user_id: &str) -> Context {
        Context::new(INSTANCE, user_id)
    }
}

/// In-memory store, deterministic ids (`id1`, `id2`, ...) and a cheap hasher.
pub fn fixture() -> Fixture {
    let store = Arc::new(InMemoryEventStore::new());
    let permissions = Arc::new(MembershipPermissionCheck::with_default_roles());
    permissions.grant(Membership::new(ADMIN, INSTANCE, vec![Role::new(Role::IAM_OWNER)]));

    let commands = Commands::new(store.clone(), permissions.clone())
        .with_id_generator(Arc::new(SequentialIdGenerator::new("id")))
        .with_hasher(Arc::new(
            Argon2SecretHasher::with_costs(8, 1, 1).expect("minimal argon2 costs"),
        ));
    Fixture {
        commands,
        store,
        permissions,
    }
}

/// Active org named after its id.
pub async fn seed_org(fx: &Fixture, org_id: &str) {
    fx.commands
        .add_org(
            &fx.ctx(),
            AddOrg {
                id: Some(org_id.to_string()),
                name: org_id.to_string(),
            },
        )
        .await
        .unwrap();
}

pub fn human(user_id: &str) -> AddHuman {
    AddHuman {
        id: Some(user_id.to_string()),
        username: user_id.to_string(),
        given_name: "Ada".to_string(),
        family_name: "Lovelace".to_string(),
        email: format!("{user_id}@example.com"),
        password: Some(PASSWORD.to_string()),
        ..AddHuman::default()
    }
}

pub async fn seed_user(fx: &Fixture, owner: &str, user_id: &str) {
    fx.commands.add_human(&fx.ctx(), owner, human(user_id)).await.unwrap();
}

pub fn add_target(name: &str) -> AddTarget {
    AddTarget {
        id: None,
        name: name.to_string(),
        endpoint: format!("https://hooks.example.com/{name}"),
        timeout: Duration::from_secs(10),
        interrupt_on_error: false,
    }
}

/// Adds a target and returns its id.
pub async fn seed_target(fx: &Fixture, name: &str) -> String {
    fx.commands.add_target(&fx.ctx(), add_target(name)).await.unwrap().id
}

// ─────────────────────────────────────────────────────────────────────────────
// Collaborator doubles
// ─────────────────────────────────────────────────────────────────────────────

/// Always issues the same plain code; the "crypted" value is the code itself.
pub struct FixedCodeGenerator {
    plain: String,
    expiry: Duration,
}

impl FixedCodeGenerator {
    pub fn new(plain: &str, expiry: Duration) -> Self {
        Self {
            plain: plain.to_string(),
            expiry,
        }
    }
}

impl CodeGenerator for FixedCodeGenerator {
    fn generate(&self, _kind: CodeKind) -> anyhow::Result<GeneratedCode> {
        Ok(GeneratedCode {
            plain: self.plain.clone(),
            crypted: CryptoValue {
                algorithm: "plain".to_string(),
                key_id: String::new(),
                value: self.plain.clone(),
            },
            expiry: self.expiry,
        })
    }

    fn verify(&self, crypted: &CryptoValue, plain: &str) -> bool {
        crypted.algorithm == "plain" && crypted.value == plain
    }
}

/// Delays every store call.
pub struct SlowStore {
    inner: Arc<dyn EventStore>,
    delay: Duration,
}

impl SlowStore {
    pub fn wrap(inner: Arc<dyn EventStore>, delay: Duration) -> Arc<dyn EventStore> {
        Arc::new(Self { inner, delay })
    }
}

#[async_trait]
impl EventStore for SlowStore {
    async fn filter(&self, query: &SearchQuery) -> Result<Vec<StoredEvent>, EventStoreError> {
        tokio::time::sleep(self.delay).await;
        self.inner.filter(query).await
    }

    async fn push(
        &self,
        events: Vec<UncommittedEvent>,
        guards: Vec<ConcurrencyGuard>,
    ) -> Result<Vec<StoredEvent>, EventStoreError> {
        tokio::time::sleep(self.delay).await;
        self.inner.push(events, guards).await
    }
}

/// Fails reads that scan every stream of `aggregate_type` (no id filter);
/// everything else passes through.
pub struct UnavailableScans {
    inner: Arc<dyn EventStore>,
    aggregate_type: &'static str,
}

impl UnavailableScans {
    pub fn wrap(inner: Arc<dyn EventStore>, aggregate_type: &'static str) -> Arc<dyn EventStore> {
        Arc::new(Self { inner, aggregate_type })
    }
}

#[async_trait]
impl EventStore for UnavailableScans {
    async fn filter(&self, query: &SearchQuery) -> Result<Vec<StoredEvent>, EventStoreError> {
        let scan = query
            .filters
            .iter()
            .any(|f| f.aggregate_type == self.aggregate_type && f.aggregate_ids.is_empty());
        if scan {
            return Err(EventStoreError::Unavailable(format!("{} scan", self.aggregate_type)));
        }
        self.inner.filter(query).await
    }

    async fn push(
        &self,
        events: Vec<UncommittedEvent>,
        guards: Vec<ConcurrencyGuard>,
    ) -> Result<Vec<StoredEvent>, EventStoreError> {
        self.inner.push(events, guards).await
    }
}

/// Pushes `pending` into the inner store right after the first read that
/// scans every stream of `aggregate_type`, as a concurrent writer would.
pub struct InterleavedWrite {
    inner: Arc<dyn EventStore>,
    aggregate_type: &'static str,
    pending: Mutex<Option<UncommittedEvent>>,
}

impl InterleavedWrite {
    pub fn wrap(
        inner: Arc<dyn EventStore>,
        aggregate_type: &'static str,
        pending: UncommittedEvent,
    ) -> Arc<dyn EventStore> {
        Arc::new(Self {
            inner,
            aggregate_type,
            pending: Mutex::new(Some(pending)),
        })
    }
}

#[async_trait]
impl EventStore for InterleavedWrite {
    async fn filter(&self, query: &SearchQuery) -> Result<Vec<StoredEvent>, EventStoreError> {
        let events = self.inner.filter(query).await?;
        let scan = query
            .filters
            .iter()
            .any(|f| f.aggregate_type == self.aggregate_type && f.aggregate_ids.is_empty());
        if scan {
            let pending = self.pending.lock().unwrap().take();
            if let Some(event) = pending {
                self.inner.push(vec![event], vec![]).await?;
            }
        }
        Ok(events)
    }

    async fn push(
        &self,
        events: Vec<UncommittedEvent>,
        guards: Vec<ConcurrencyGuard>,
    ) -> Result<Vec<StoredEvent>, EventStoreError> {
        self.inner.push(events, guards).await
    }
}
