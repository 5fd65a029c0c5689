use thiserror::Error;

use keyward_core::{DomainError, ErrorKind};
use keyward_events::CodecError;
use keyward_infra::event_store::EventStoreError;

/// Failure of a command.
///
/// Every variant maps onto one [`ErrorKind`]; [`CommandError::code`] and
/// [`CommandError::key`] give the stable detail exposed to callers.
#[derive(Debug, Error)]
pub enum CommandError {
    /// Business rule, validation or authorization failure.
    #[error(transparent)]
    Domain(#[from] DomainError),

    /// Filter/push failed (including optimistic concurrency rejections).
    #[error("event store: {0}")]
    Store(#[from] EventStoreError),

    /// A stored payload could not be decoded into its event family.
    #[error("event decoding: {0}")]
    Decode(#[from] CodecError),

    /// Id generator, hasher or code generator failed.
    #[error("collaborator failed: {0}")]
    Collaborator(anyhow::Error),

    /// The context deadline passed before the command completed.
    #[error("deadline exceeded")]
    DeadlineExceeded,
}

impl CommandError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CommandError::Domain(e) => e.kind(),
            CommandError::Store(EventStoreError::Concurrency(_)) => ErrorKind::Conflict,
            CommandError::Store(EventStoreError::Unavailable(_)) => ErrorKind::Unavailable,
            CommandError::Store(_) => ErrorKind::Internal,
            CommandError::Decode(_) => ErrorKind::Internal,
            CommandError::Collaborator(_) => ErrorKind::Internal,
            CommandError::DeadlineExceeded => ErrorKind::Unavailable,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            CommandError::Domain(e) => e.code(),
            CommandError::Store(EventStoreError::Concurrency(_)) => "COMMAND-0001",
            CommandError::Store(EventStoreError::Unavailable(_)) => "COMMAND-0002",
            CommandError::Store(_) => "COMMAND-0003",
            CommandError::Decode(_) => "COMMAND-0004",
            CommandError::Collaborator(_) => "COMMAND-0005",
            CommandError::DeadlineExceeded => "COMMAND-0006",
        }
    }

    pub fn key(&self) -> &'static str {
        match self {
            CommandError::Domain(e) => e.key(),
            CommandError::Store(EventStoreError::Concurrency(_)) => "errors.concurrency.conflict",
            CommandError::Store(EventStoreError::Unavailable(_)) => "errors.store.unavailable",
            CommandError::Store(_) => "errors.store.rejected",
            CommandError::Decode(_) => "errors.internal",
            CommandError::Collaborator(_) => "errors.internal",
            CommandError::DeadlineExceeded => "errors.deadline_exceeded",
        }
    }

    pub(crate) fn collaborator(err: anyhow::Error) -> Self {
        CommandError::Collaborator(err)
    }
}

pub type CommandResult<T> = Result<T, CommandError>;
