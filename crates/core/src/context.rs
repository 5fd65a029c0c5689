//! Per-request execution context.

use std::time::{Duration, Instant};

/// Identity of the caller used when the system itself issues commands
/// (bootstrap, cascades).
pub const SYSTEM_USER: &str = "SYSTEM";

/// Request-scoped context threaded through every command.
///
/// Carries the instance (installation) the request runs against, the acting
/// user, and an optional deadline that bounds every store call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Context {
    instance_id: String,
    user_id: String,
    deadline: Option<Instant>,
}

impl Context {
    pub fn new(instance_id: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            instance_id: instance_id.into(),
            user_id: user_id.into(),
            deadline: None,
        }
    }

    /// Context acting as the system user.
    pub fn system(instance_id: impl Into<String>) -> Self {
        Self::new(instance_id, SYSTEM_USER)
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn is_expired(&self) -> bool {
        self.deadline.is_some_and(|d| Instant::now() >= d)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_deadline_never_expires() {
        let ctx = Context::new("inst", "u1");
        assert!(!ctx.is_expired());
        assert_eq!(ctx.deadline(), None);
    }

    #[test]
    fn past_deadline_is_expired() {
        let ctx = Context::system("inst").with_deadline(Instant::now() - Duration::from_millis(1));
        assert!(ctx.is_expired());
        assert_eq!(ctx.user_id(), SYSTEM_USER);
    }
}
