//! Identifier generation for new aggregates.

use std::sync::atomic::{AtomicU64, Ordering};

use uuid::Uuid;

/// Produces globally unique identifiers for new aggregates.
///
/// Shared across all commands; implementations must be safe for concurrent use.
pub trait IdGenerator: Send + Sync {
    fn next_id(&self) -> anyhow::Result<String>;
}

/// Time-ordered UUIDv7 identifiers (simple form, no hyphens).
#[derive(Debug, Default, Clone, Copy)]
pub struct UuidV7Generator;

impl IdGenerator for UuidV7Generator {
    fn next_id(&self) -> anyhow::Result<String> {
        Ok(Uuid::now_v7().simple().to_string())
    }
}

/// Deterministic identifiers (`<prefix>1`, `<prefix>2`, ...).
///
/// Prefer this in tests and local tooling where stable ids make assertions readable.
#[derive(Debug)]
pub struct SequentialIdGenerator {
    prefix: String,
    next: AtomicU64,
}

impl SequentialIdGenerator {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            next: AtomicU64::new(1),
        }
    }
}

impl IdGenerator for SequentialIdGenerator {
    fn next_id(&self) -> anyhow::Result<String> {
        let n = self.next.fetch_add(1, Ordering::Relaxed);
        Ok(format!("{}{}", self.prefix, n))
    }
}

impl<G> IdGenerator for std::sync::Arc<G>
where
    G: IdGenerator + ?Sized,
{
    fn next_id(&self) -> anyhow::Result<String> {
        (**self).next_id()
    }
}
